//! Fire-and-forget event hand-off to Apprise and the user event script.
//!
//! The worker consumes the event bus, so emitters never wait on a
//! notification: the snapshot loop publishes and moves on. Failures in
//! either sink are logged and never surface to the triggering action.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use peermux_events::{Event, EventBus};
use peermux_store::{NotificationService, NotificationsConfig, NotificationsStore, ServiceType};

/// Grace period between the polite terminate and the hard kill.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Runtime options for the notifier worker.
#[derive(Debug, Clone)]
pub struct NotifyOptions {
    /// Apprise binary name or path.
    pub apprise_bin: String,
    /// Optional user event script.
    pub script_path: Option<std::path::PathBuf>,
    /// Deadline applied to the Apprise invocation.
    pub apprise_timeout: Duration,
    /// Deadline applied to the event script.
    pub script_timeout: Duration,
}

impl Default for NotifyOptions {
    fn default() -> Self {
        Self {
            apprise_bin: "apprise".to_string(),
            script_path: None,
            apprise_timeout: Duration::from_secs(30),
            script_timeout: Duration::from_secs(30),
        }
    }
}

/// Event hand-off worker.
pub struct Notifier {
    store: NotificationsStore,
    options: NotifyOptions,
}

impl Notifier {
    /// Construct a notifier over the persisted configuration.
    #[must_use]
    pub const fn new(store: NotificationsStore, options: NotifyOptions) -> Self {
        Self { store, options }
    }

    /// Launch the worker over the event bus.
    pub fn spawn(self, events: &EventBus) -> JoinHandle<()> {
        let mut stream = events.subscribe(None);
        let notifier = Arc::new(self);
        tokio::spawn(async move {
            while let Some(envelope) = stream.next().await {
                let Some(event_type) = notifiable_type(&envelope.event) else {
                    continue;
                };
                let config = match notifier.store.load() {
                    Ok(config) => config,
                    Err(err) => {
                        warn!(error = %err, "notification config unreadable; event dropped");
                        continue;
                    }
                };
                if !config.enabled || !event_enabled(&config, event_type) {
                    continue;
                }
                notifier.dispatch(&config, event_type, &envelope.event).await;
            }
        })
    }

    async fn dispatch(&self, config: &NotificationsConfig, event_type: &str, event: &Event) {
        let (title, body) = render(event_type, event);

        let urls: Vec<String> = config
            .services
            .iter()
            .filter(|service| service.enabled)
            .filter_map(build_service_url)
            .collect();
        if !urls.is_empty() {
            self.run_apprise(&title, &body, &urls).await;
        }

        if let Some(script) = self.options.script_path.clone() {
            self.run_script(&script, event_type, event).await;
        }
    }

    async fn run_apprise(&self, title: &str, body: &str, urls: &[String]) {
        let mut command = Command::new(&self.options.apprise_bin);
        command
            .arg("-t")
            .arg(title)
            .arg("-b")
            .arg(body)
            .args(urls)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(bin = %self.options.apprise_bin, "apprise unavailable; notification skipped");
                return;
            }
            Err(err) => {
                warn!(error = %err, "apprise spawn failed");
                return;
            }
        };

        match timeout(self.options.apprise_timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => debug!("apprise delivered"),
            Ok(Ok(status)) => warn!(status = %status, "apprise exited non-zero"),
            Ok(Err(err)) => warn!(error = %err, "apprise wait failed"),
            Err(_) => {
                warn!("apprise timed out; killing");
                terminate(&mut child).await;
            }
        }
    }

    async fn run_script(&self, script: &std::path::Path, event_type: &str, event: &Event) {
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "event payload unserialisable; script skipped");
                return;
            }
        };

        let mut command = Command::new(script);
        command
            .arg(event_type)
            .env("EVENT_TYPE", event_type)
            .env("EVENT_HASH", event.hash().unwrap_or_default())
            .env("EVENT_FILENAME", event_filename(event))
            .env("EVENT_CLIENT_TYPE", event_client(event))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(script = %script.display(), error = %err, "event script spawn failed");
                return;
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(&payload).await {
                warn!(error = %err, "event script stdin write failed");
            }
            drop(stdin);
        }

        match timeout(self.options.script_timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => debug!("event script completed"),
            Ok(Ok(status)) => warn!(status = %status, "event script exited non-zero"),
            Ok(Err(err)) => warn!(error = %err, "event script wait failed"),
            Err(_) => {
                warn!(script = %script.display(), "event script timed out; terminating");
                terminate(&mut child).await;
            }
        }
    }
}

/// Polite terminate, then a hard kill after the grace period.
async fn terminate(child: &mut tokio::process::Child) {
    if let Some(pid) = child.id() {
        let polite = Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .status()
            .await;
        if polite.is_ok() {
            sleep(KILL_GRACE).await;
            if matches!(child.try_wait(), Ok(Some(_))) {
                return;
            }
        }
    }
    let _ = child.kill().await;
}

/// Map a bus event onto the fixed notifiable set; `None` filters it out.
fn notifiable_type(event: &Event) -> Option<&'static str> {
    match event {
        Event::DownloadAdded { .. } => Some("downloadAdded"),
        Event::DownloadFinished { .. } => Some("downloadFinished"),
        Event::CategoryChanged { .. } => Some("categoryChanged"),
        Event::FileMoved { .. } => Some("fileMoved"),
        Event::FileDeleted { .. } => Some("fileDeleted"),
        Event::ClientStateChanged { .. } | Event::CategoriesUpdated => None,
    }
}

fn event_enabled(config: &NotificationsConfig, event_type: &str) -> bool {
    match event_type {
        "downloadAdded" => config.events.download_added,
        "downloadFinished" => config.events.download_finished,
        "categoryChanged" => config.events.category_changed,
        "fileMoved" => config.events.file_moved,
        "fileDeleted" => config.events.file_deleted,
        _ => false,
    }
}

fn render(event_type: &str, event: &Event) -> (String, String) {
    let name = event_filename(event);
    let title = match event_type {
        "downloadAdded" => "Download added",
        "downloadFinished" => "Download finished",
        "categoryChanged" => "Category changed",
        "fileMoved" => "File moved",
        "fileDeleted" => "File deleted",
        _ => "Peermux event",
    };
    let body = if name.is_empty() {
        serde_json::to_string(event).unwrap_or_default()
    } else {
        name
    };
    (title.to_string(), body)
}

fn event_filename(event: &Event) -> String {
    match event {
        Event::DownloadAdded { name, .. }
        | Event::DownloadFinished { name, .. }
        | Event::FileDeleted { name, .. } => name.clone(),
        Event::FileMoved { path, .. } => path.clone(),
        Event::CategoryChanged { category, .. } => category.clone(),
        Event::ClientStateChanged { .. } | Event::CategoriesUpdated => String::new(),
    }
}

fn event_client(event: &Event) -> String {
    match event {
        Event::DownloadAdded { client, .. } | Event::DownloadFinished { client, .. } => {
            client.clone()
        }
        _ => String::new(),
    }
}

/// Build the Apprise URL for one configured service.
///
/// Unknown or under-configured services yield `None` and are skipped.
#[must_use]
pub fn build_service_url(service: &NotificationService) -> Option<String> {
    let option = |key: &str| -> Option<String> {
        service
            .options
            .get(key)
            .and_then(serde_json::Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    match service.service_type {
        ServiceType::Discord => Some(format!(
            "discord://{}/{}",
            option("webhookId")?,
            option("webhookToken")?
        )),
        ServiceType::Telegram => Some(format!(
            "tgram://{}/{}",
            option("botToken")?,
            option("chatId")?
        )),
        ServiceType::Slack => Some(format!(
            "slack://{}/{}/{}",
            option("tokenA")?,
            option("tokenB")?,
            option("tokenC")?
        )),
        ServiceType::Pushover => Some(format!(
            "pover://{}@{}",
            option("userKey")?,
            option("appToken")?
        )),
        ServiceType::Ntfy => Some(format!("ntfy://{}/{}", option("host")?, option("topic")?)),
        ServiceType::Gotify => Some(format!(
            "gotify://{}/{}",
            option("host")?,
            option("token")?
        )),
        ServiceType::Email => option("to").map(|to| format!("mailto://{to}")),
        ServiceType::Webhook => option("url").map(|url| format!("json://{url}")),
        ServiceType::Custom => option("url"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn service(service_type: ServiceType, options: serde_json::Value) -> NotificationService {
        NotificationService {
            id: Uuid::new_v4(),
            name: "svc".into(),
            service_type,
            enabled: true,
            options,
        }
    }

    #[test]
    fn url_builder_covers_each_service_kind() {
        let cases = [
            (
                service(
                    ServiceType::Discord,
                    json!({"webhookId": "id", "webhookToken": "tok"}),
                ),
                Some("discord://id/tok".to_string()),
            ),
            (
                service(
                    ServiceType::Telegram,
                    json!({"botToken": "bot", "chatId": "42"}),
                ),
                Some("tgram://bot/42".to_string()),
            ),
            (
                service(
                    ServiceType::Slack,
                    json!({"tokenA": "a", "tokenB": "b", "tokenC": "c"}),
                ),
                Some("slack://a/b/c".to_string()),
            ),
            (
                service(
                    ServiceType::Pushover,
                    json!({"userKey": "u", "appToken": "t"}),
                ),
                Some("pover://u@t".to_string()),
            ),
            (
                service(ServiceType::Ntfy, json!({"host": "ntfy.sh", "topic": "dl"})),
                Some("ntfy://ntfy.sh/dl".to_string()),
            ),
            (
                service(
                    ServiceType::Gotify,
                    json!({"host": "gotify.local", "token": "t"}),
                ),
                Some("gotify://gotify.local/t".to_string()),
            ),
            (
                service(ServiceType::Email, json!({"to": "ops@example.com"})),
                Some("mailto://ops@example.com".to_string()),
            ),
            (
                service(ServiceType::Webhook, json!({"url": "hooks.example/x"})),
                Some("json://hooks.example/x".to_string()),
            ),
            (
                service(ServiceType::Custom, json!({"url": "pover://custom"})),
                Some("pover://custom".to_string()),
            ),
        ];
        for (service, expected) in cases {
            assert_eq!(build_service_url(&service), expected);
        }
    }

    #[test]
    fn under_configured_service_is_skipped() {
        let incomplete = service(ServiceType::Discord, json!({"webhookId": "only"}));
        assert!(build_service_url(&incomplete).is_none());
        let empty = service(ServiceType::Custom, json!({"url": ""}));
        assert!(build_service_url(&empty).is_none());
    }

    #[test]
    fn only_the_five_event_types_notify() {
        let hash = "a".repeat(40);
        assert_eq!(
            notifiable_type(&Event::DownloadAdded {
                hash: hash.clone(),
                name: "x".into(),
                client: "amule".into(),
            }),
            Some("downloadAdded")
        );
        assert_eq!(
            notifiable_type(&Event::ClientStateChanged {
                client: "amule".into(),
                state: peermux_events::ClientState::Connected,
            }),
            None
        );
        assert_eq!(notifiable_type(&Event::CategoriesUpdated), None);
    }

    #[test]
    fn render_prefers_file_names() {
        let (title, body) = render(
            "downloadFinished",
            &Event::DownloadFinished {
                hash: "a".repeat(40),
                name: "demo.mkv".into(),
                client: "rtorrent".into(),
            },
        );
        assert_eq!(title, "Download finished");
        assert_eq!(body, "demo.mkv");
    }

    #[test]
    fn per_event_enable_map_is_honoured() {
        let mut config = NotificationsConfig {
            enabled: true,
            ..NotificationsConfig::default()
        };
        assert!(event_enabled(&config, "downloadFinished"));
        assert!(!event_enabled(&config, "downloadAdded"));
        config.events.download_added = true;
        assert!(event_enabled(&config, "downloadAdded"));
    }
}
