//! Per-back-end session supervisor.
//!
//! One supervisor task per configured client walks the lifecycle
//! `disabled → connecting → connected → degraded → disconnected`, with
//! exponential reconnect back-off and periodic health probes. `on_connect`
//! hooks fire exactly once per transition into `connected`; calls issued
//! while the session is down fail fast with `NotConnected` instead of
//! queueing behind the reconnect.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use peermux_core::{BridgeError, BridgeResult, ClientKind, EngineClient};
use peermux_events::{ClientState, Event, EventBus};

/// Hook invoked after each successful transition into `connected`.
pub type ConnectHook = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Supervisor timing knobs; the defaults match production behaviour and
/// tests shrink them.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// First reconnect delay.
    pub initial_backoff: Duration,
    /// Reconnect delay cap.
    pub max_backoff: Duration,
    /// Interval between health probes while connected.
    pub health_interval: Duration,
    /// Deadline on one probe.
    pub probe_timeout: Duration,
    /// Delay between degraded-state probe retries.
    pub degraded_retry: Duration,
    /// Probe retries before the session is declared lost.
    pub degraded_attempts: u32,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
            health_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
            degraded_retry: Duration::from_secs(10),
            degraded_attempts: 3,
        }
    }
}

/// Supervised handle around one engine client.
pub struct ClientManager {
    client: Arc<dyn EngineClient>,
    enabled: bool,
    options: SupervisorOptions,
    state_tx: watch::Sender<ClientState>,
    hooks: Mutex<Vec<ConnectHook>>,
    events: EventBus,
}

impl ClientManager {
    /// Construct a manager; the supervisor task starts with `spawn`.
    #[must_use]
    pub fn new(
        client: Arc<dyn EngineClient>,
        enabled: bool,
        options: SupervisorOptions,
        events: EventBus,
    ) -> Arc<Self> {
        let initial = if enabled {
            ClientState::Connecting
        } else {
            ClientState::Disabled
        };
        let (state_tx, _) = watch::channel(initial);
        Arc::new(Self {
            client,
            enabled,
            options,
            state_tx,
            hooks: Mutex::new(Vec::new()),
            events,
        })
    }

    /// Which back-end this manager supervises.
    #[must_use]
    pub fn kind(&self) -> ClientKind {
        self.client.kind()
    }

    /// Whether the back-end is configured at all.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Atomic read of the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        *self.state_tx.borrow()
    }

    /// Watch lifecycle transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ClientState> {
        self.state_tx.subscribe()
    }

    /// Register a hook fired on every transition into `connected`.
    pub fn on_connect(&self, hook: ConnectHook) {
        self.lock_hooks().push(hook);
    }

    /// The engine client, gated on the session being up.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` whenever the supervisor is not in the
    /// `connected` state; callers never block on the reconnect.
    pub fn engine(&self) -> BridgeResult<Arc<dyn EngineClient>> {
        if self.state() == ClientState::Connected {
            Ok(Arc::clone(&self.client))
        } else {
            Err(BridgeError::NotConnected {
                client: self.client.kind(),
            })
        }
    }

    /// Launch the supervisor task.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.supervise().await })
    }

    async fn supervise(self: Arc<Self>) {
        if !self.enabled {
            self.transition(ClientState::Disabled);
            return;
        }

        let mut backoff = self.options.initial_backoff;
        let mut was_connected = false;
        loop {
            self.transition(if was_connected {
                ClientState::Disconnected
            } else {
                ClientState::Connecting
            });

            match self.client.connect().await {
                Ok(()) => {
                    backoff = self.options.initial_backoff;
                    was_connected = true;
                    self.transition(ClientState::Connected);
                    self.fire_connect_hooks().await;
                    self.run_health_loop().await;
                    self.client.disconnect().await;
                }
                Err(err) => {
                    warn!(
                        client = %self.client.kind(),
                        error = %err,
                        backoff_secs = backoff.as_secs(),
                        "connect failed; scheduling retry"
                    );
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(self.options.max_backoff);
                }
            }
        }
    }

    /// Probe the session until it is declared lost.
    async fn run_health_loop(&self) {
        loop {
            sleep(self.options.health_interval).await;
            if self.probe_once().await {
                continue;
            }

            self.transition(ClientState::Degraded);
            let mut recovered = false;
            for _ in 0..self.options.degraded_attempts {
                sleep(self.options.degraded_retry).await;
                if self.probe_once().await {
                    recovered = true;
                    break;
                }
            }
            if recovered {
                self.transition(ClientState::Connected);
                self.fire_connect_hooks().await;
            } else {
                info!(client = %self.client.kind(), "session lost; reconnecting");
                return;
            }
        }
    }

    async fn probe_once(&self) -> bool {
        match timeout(self.options.probe_timeout, self.client.probe()).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(client = %self.client.kind(), error = %err, "health probe failed");
                false
            }
            Err(_) => {
                warn!(client = %self.client.kind(), "health probe timed out");
                false
            }
        }
    }

    async fn fire_connect_hooks(&self) {
        let hooks = self.lock_hooks().clone();
        for hook in hooks {
            hook().await;
        }
    }

    fn transition(&self, state: ClientState) {
        let changed = {
            let current = *self.state_tx.borrow();
            current != state
        };
        if changed {
            let _ = self.state_tx.send(state);
            self.events.publish(Event::ClientStateChanged {
                client: self.client.kind().as_str().to_string(),
                state,
            });
        }
    }

    fn lock_hooks(&self) -> MutexGuard<'_, Vec<ConnectHook>> {
        match self.hooks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("connect hook lock poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}
