//! BitTorrent session client.
//!
//! A worker task owns the framed line stream. Writes go out FIFO through
//! the command inbox; replies carry a correlation id so the engine may
//! pipeline and answer out of order. A semaphore caps the outstanding
//! call window per session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, info, warn};

use peermux_core::{
    AddRequest, BridgeError, BridgeResult, ClientItem, ClientKind, EngineClient, MirrorCategory,
    PeerInfo,
};

use crate::error::{RpcError, RpcResult};
use crate::types::RtRecord;
use crate::wire::{Request, Response, as_str, field_str};

const COMMAND_QUEUE_DEPTH: usize = 64;

/// Connection settings for the BitTorrent engine.
#[derive(Debug, Clone)]
pub struct RtorrentConfig {
    /// `host:port` of the RPC listener.
    pub addr: String,
    /// Deadline applied to every call.
    pub call_timeout: Duration,
    /// Deadline applied to the dial.
    pub connect_timeout: Duration,
    /// Maximum outstanding calls per session.
    pub max_in_flight: usize,
}

impl Default for RtorrentConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5000".to_string(),
            call_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_in_flight: 16,
        }
    }
}

enum SessionCommand {
    Call {
        request: Request,
        reply: oneshot::Sender<RpcResult<Value>>,
    },
}

#[derive(Clone)]
struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    limiter: Arc<Semaphore>,
}

/// Line-RPC client implementing the engine seam.
pub struct RtorrentClient {
    config: RtorrentConfig,
    session: Mutex<Option<SessionHandle>>,
    next_id: AtomicU64,
}

impl RtorrentClient {
    /// Construct a client; no session is dialed until `connect`.
    #[must_use]
    pub const fn new(config: RtorrentConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    async fn rpc(&self, method: &str, params: Vec<Value>) -> BridgeResult<Value> {
        let handle = self
            .current_session()
            .ok_or(BridgeError::NotConnected {
                client: ClientKind::Rtorrent,
            })?;

        // The cap bounds the outstanding window; the permit is held for
        // the call's full lifetime.
        let permit = handle
            .limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| BridgeError::NotConnected {
                client: ClientKind::Rtorrent,
            })?;

        let request = Request {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: method.to_string(),
            params,
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .commands
            .send(SessionCommand::Call {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| {
                self.drop_session();
                BridgeError::NotConnected {
                    client: ClientKind::Rtorrent,
                }
            })?;

        let outcome = timeout(self.config.call_timeout, reply_rx)
            .await
            .map_err(|_| BridgeError::Timeout {
                operation: "rpc_call",
            })?
            .map_err(|_| {
                self.drop_session();
                BridgeError::NotConnected {
                    client: ClientKind::Rtorrent,
                }
            })?;
        drop(permit);
        outcome.map_err(Into::into)
    }

    fn current_session(&self) -> Option<SessionHandle> {
        self.lock_session().clone()
    }

    fn drop_session(&self) {
        self.lock_session().take();
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<SessionHandle>> {
        match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("rpc session lock poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }

    fn records_from(list: &Value) -> BridgeResult<Vec<ClientItem>> {
        let entries = list
            .as_array()
            .ok_or_else(|| BridgeError::protocol("download list is not an array"))?;
        Ok(entries
            .iter()
            .map(|entry| RtRecord::from_value(entry).into_client_item())
            .collect())
    }
}

#[async_trait]
impl EngineClient for RtorrentClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Rtorrent
    }

    async fn connect(&self) -> BridgeResult<()> {
        let stream = timeout(
            self.config.connect_timeout,
            TcpStream::connect(&self.config.addr),
        )
        .await
        .map_err(|_| BridgeError::Timeout {
            operation: "rpc_connect",
        })?
        .map_err(|err| BridgeError::transport(RpcError::Io(err)))?;

        let framed = Framed::new(stream, LinesCodec::new());
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        tokio::spawn(run_session(framed, commands_rx));
        *self.lock_session() = Some(SessionHandle {
            commands: commands_tx,
            limiter: Arc::new(Semaphore::new(self.config.max_in_flight)),
        });

        // A first round-trip proves the engine actually answers.
        if let Err(err) = self.rpc("system_ping", Vec::new()).await {
            self.drop_session();
            return Err(err);
        }
        info!(addr = %self.config.addr, "rpc session established");
        Ok(())
    }

    async fn probe(&self) -> BridgeResult<()> {
        self.rpc("system_ping", Vec::new()).await.map(|_| ())
    }

    async fn disconnect(&self) {
        if self.lock_session().take().is_some() {
            debug!("rpc session dropped");
        }
    }

    async fn snapshot(&self) -> BridgeResult<Vec<ClientItem>> {
        let downloads = self.rpc("download_list", Vec::new()).await?;
        let seeding = self.rpc("seeding_list", Vec::new()).await?;

        let mut items = Self::records_from(&downloads)?;
        items.extend(Self::records_from(&seeding)?);
        Ok(items)
    }

    async fn add(&self, request: AddRequest) -> BridgeResult<String> {
        let result = match request {
            AddRequest::Magnet { uri, label } => {
                self.rpc("load_magnet", vec![json!(uri), json!(label)])
                    .await?
            }
            AddRequest::TorrentFile { bytes, label } => {
                let encoded = BASE64.encode(bytes);
                self.rpc("load_torrent", vec![json!(encoded), json!(label)])
                    .await?
            }
            AddRequest::Ed2kLink { .. } => {
                return Err(BridgeError::Unsupported {
                    operation: "add_ed2k_link",
                });
            }
        };
        as_str(&result)
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| BridgeError::protocol("load call did not return a hash"))
    }

    async fn remove(&self, hash: &str, delete_files: bool) -> BridgeResult<()> {
        self.rpc("erase", vec![json!(hash), json!(delete_files)])
            .await
            .map(|_| ())
    }

    async fn pause(&self, hash: &str) -> BridgeResult<()> {
        self.rpc("pause", vec![json!(hash)]).await.map(|_| ())
    }

    async fn resume(&self, hash: &str) -> BridgeResult<()> {
        self.rpc("resume", vec![json!(hash)]).await.map(|_| ())
    }

    async fn stop(&self, hash: &str) -> BridgeResult<()> {
        self.rpc("stop", vec![json!(hash)]).await.map(|_| ())
    }

    async fn set_category(&self, hash: &str, token: &str) -> BridgeResult<()> {
        self.rpc("label_set", vec![json!(hash), json!(token)])
            .await
            .map(|_| ())
    }

    async fn list_categories(&self) -> BridgeResult<Vec<MirrorCategory>> {
        let labels = self.rpc("label_list", Vec::new()).await?;
        let entries = labels
            .as_array()
            .ok_or_else(|| BridgeError::protocol("label list is not an array"))?;
        Ok(entries
            .iter()
            .map(|entry| MirrorCategory {
                id: None,
                name: field_str(entry, "name"),
                path: field_str(entry, "path"),
            })
            .collect())
    }

    async fn create_category(&self, name: &str, path: &str) -> BridgeResult<MirrorCategory> {
        self.rpc("label_create", vec![json!(name), json!(path)])
            .await?;
        Ok(MirrorCategory {
            id: None,
            name: name.to_string(),
            path: path.to_string(),
        })
    }

    async fn peers(&self, hash: &str) -> BridgeResult<Vec<PeerInfo>> {
        let list = self.rpc("peer_list", vec![json!(hash)]).await?;
        let entries = list
            .as_array()
            .ok_or_else(|| BridgeError::protocol("peer list is not an array"))?;
        Ok(entries
            .iter()
            .map(|entry| PeerInfo {
                ip: crate::wire::field_str(entry, "ip"),
                hostname: None,
                client_name: crate::wire::field_str(entry, "client"),
                download_speed: crate::wire::field_u64(entry, "down_rate"),
                upload_speed: crate::wire::field_u64(entry, "up_rate"),
            })
            .collect())
    }
}

async fn run_session(
    mut framed: Framed<TcpStream, LinesCodec>,
    mut commands: mpsc::Receiver<SessionCommand>,
) {
    let mut pending: HashMap<u64, oneshot::Sender<RpcResult<Value>>> = HashMap::new();
    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(SessionCommand::Call { request, reply }) => {
                        let line = match serde_json::to_string(&request) {
                            Ok(line) => line,
                            Err(err) => {
                                let _ = reply.send(Err(RpcError::decode(err.to_string())));
                                continue;
                            }
                        };
                        if let Err(err) = framed.send(line).await {
                            let _ = reply.send(Err(RpcError::Io(std::io::Error::other(err))));
                            break;
                        }
                        pending.insert(request.id, reply);
                    }
                    None => break,
                }
            }
            line = framed.next() => {
                match line {
                    Some(Ok(line)) => {
                        match serde_json::from_str::<Response>(&line) {
                            Ok(response) => {
                                if let Some(reply) = pending.remove(&response.id) {
                                    let outcome = match response.error {
                                        Some(message) => Err(RpcError::Call { message }),
                                        None => Ok(response.result.unwrap_or(Value::Null)),
                                    };
                                    let _ = reply.send(outcome);
                                } else {
                                    debug!(id = response.id, "reply for unknown rpc id dropped");
                                }
                            }
                            Err(err) => {
                                warn!(error = %err, "undecodable rpc line dropped");
                            }
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "rpc stream failed; closing session");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
    for (_, reply) in pending {
        let _ = reply.send(Err(RpcError::SessionClosed));
    }
}
