//! ED2K session client.
//!
//! One TCP session carries all EC traffic. A worker task owns the framed
//! stream and correlates replies FIFO with outstanding calls; callers hand
//! a frame plus a oneshot reply slot through an mpsc inbox. The bridge's
//! client manager supervises connect/probe/disconnect.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use peermux_core::{
    AddRequest, BridgeError, BridgeResult, ClientItem, ClientKind, Ed2kLink, EngineClient,
    MirrorCategory, SearchResult, ServerInfo,
};

use crate::codec::{EcCodec, EcFrame, EcTag, EcValue};
use crate::error::{EcError, EcResult};
use crate::tags::{op, tag};
use crate::types::{AmuleRecord, category_from_tag};

const COMMAND_QUEUE_DEPTH: usize = 64;

/// Connection settings for the ED2K engine.
#[derive(Debug, Clone)]
pub struct AmuleConfig {
    /// Engine host.
    pub host: String,
    /// EC port.
    pub port: u16,
    /// EC password.
    pub password: String,
    /// Banner sent during the handshake.
    pub client_name: String,
    /// Deadline applied to every call.
    pub call_timeout: Duration,
    /// Deadline applied to the dial + handshake.
    pub connect_timeout: Duration,
}

impl Default for AmuleConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4712,
            password: String::new(),
            client_name: "peermux".to_string(),
            call_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

enum SessionCommand {
    Call {
        frame: EcFrame,
        reply: oneshot::Sender<EcResult<EcFrame>>,
    },
}

#[derive(Clone)]
struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

/// EC client implementing the engine seam.
pub struct AmuleClient {
    config: AmuleConfig,
    session: Mutex<Option<SessionHandle>>,
}

impl AmuleClient {
    /// Construct a client; no session is dialed until `connect`.
    #[must_use]
    pub const fn new(config: AmuleConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    async fn call(&self, frame: EcFrame) -> BridgeResult<EcFrame> {
        let handle = self
            .current_session()
            .ok_or(BridgeError::NotConnected {
                client: ClientKind::Amule,
            })?;
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .commands
            .send(SessionCommand::Call {
                frame,
                reply: reply_tx,
            })
            .await
            .map_err(|_| {
                self.drop_session();
                BridgeError::NotConnected {
                    client: ClientKind::Amule,
                }
            })?;

        let outcome = timeout(self.config.call_timeout, reply_rx)
            .await
            .map_err(|_| BridgeError::Timeout { operation: "ec_call" })?
            .map_err(|_| {
                self.drop_session();
                BridgeError::NotConnected {
                    client: ClientKind::Amule,
                }
            })?;
        outcome.map_err(Into::into)
    }

    async fn call_expecting(&self, frame: EcFrame, expected: u8) -> BridgeResult<EcFrame> {
        let response = self.call(frame).await?;
        match response.opcode {
            opcode if opcode == expected => Ok(response),
            op::FAILED => {
                let detail = response
                    .tag(tag::MESSAGE)
                    .and_then(EcTag::as_str)
                    .unwrap_or("engine reported failure")
                    .to_string();
                Err(BridgeError::BadRequest { detail })
            }
            opcode => Err(EcError::UnexpectedResponse { opcode }.into()),
        }
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
                warn!("ec session lock poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }

    fn items_from(frame: &EcFrame, shared: bool) -> BridgeResult<Vec<ClientItem>> {
        let mut items = Vec::new();
        for item_tag in frame.tags_named(tag::ITEM) {
            let record = AmuleRecord::from_tag(item_tag)?;
            items.push(record.into_client_item(shared));
        }
        Ok(items)
    }
}

#[async_trait]
impl EngineClient for AmuleClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Amule
    }

    async fn connect(&self) -> BridgeResult<()> {
        let addr = (self.config.host.as_str(), self.config.port);
        let dial = async {
            let stream = TcpStream::connect(addr).await.map_err(EcError::Io)?;
            let mut framed = Framed::new(stream, EcCodec);

            let auth = EcFrame::new(
                op::AUTH_REQ,
                vec![
                    EcTag::string(tag::PASSWORD, self.config.password.clone()),
                    EcTag::string(tag::CLIENT_NAME, self.config.client_name.clone()),
                    EcTag::u8(tag::PROTOCOL_VERSION, 1),
                ],
            );
            framed.send(auth).await?;
            let response = framed
                .next()
                .await
                .ok_or(EcError::SessionClosed)??;
            match response.opcode {
                op::AUTH_OK => Ok(framed),
                op::AUTH_FAIL => Err(EcError::AuthRejected),
                opcode => Err(EcError::UnexpectedResponse { opcode }),
            }
        };

        let framed = timeout(self.config.connect_timeout, dial)
            .await
            .map_err(|_| BridgeError::Timeout {
                operation: "ec_connect",
            })??;

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        tokio::spawn(run_session(framed, commands_rx));
        *self.lock_session() = Some(SessionHandle {
            commands: commands_tx,
        });
        info!(host = %self.config.host, port = self.config.port, "ec session established");
        Ok(())
    }

    async fn probe(&self) -> BridgeResult<()> {
        self.call_expecting(EcFrame::new(op::STAT_REQ, Vec::new()), op::STATS)
            .await
            .map(|_| ())
    }

    async fn disconnect(&self) {
        if self.lock_session().take().is_some() {
            debug!("ec session dropped");
        }
    }

    async fn snapshot(&self) -> BridgeResult<Vec<ClientItem>> {
        let downloads = self
            .call_expecting(EcFrame::new(op::GET_DLOAD_QUEUE, Vec::new()), op::DLOAD_QUEUE)
            .await?;
        let shared = self
            .call_expecting(
                EcFrame::new(op::GET_SHARED_FILES, Vec::new()),
                op::SHARED_FILES,
            )
            .await?;

        let mut items = Self::items_from(&downloads, false)?;
        items.extend(Self::items_from(&shared, true)?);
        Ok(items)
    }

    async fn add(&self, request: AddRequest) -> BridgeResult<String> {
        let AddRequest::Ed2kLink { link, category_id } = request else {
            return Err(BridgeError::Unsupported {
                operation: "add_magnet",
            });
        };
        let parsed = Ed2kLink::parse(&link)?;
        let frame = EcFrame::new(
            op::ADD_LINK,
            vec![
                EcTag::string(tag::ED2K_LINK, link),
                EcTag::u32(tag::CATEGORY_ID, category_id),
            ],
        );
        self.call_expecting(frame, op::NOOP).await?;
        Ok(parsed.hash)
    }

    async fn remove(&self, hash: &str, delete_files: bool) -> BridgeResult<()> {
        let frame = EcFrame::new(
            op::DELETE,
            vec![
                EcTag::hash(tag::ITEM_HASH, parse_hash(hash)?),
                EcTag::u8(tag::DELETE_FILES, u8::from(delete_files)),
            ],
        );
        self.call_expecting(frame, op::NOOP).await.map(|_| ())
    }

    async fn pause(&self, hash: &str) -> BridgeResult<()> {
        let frame = EcFrame::new(
            op::PAUSE,
            vec![EcTag::hash(tag::ITEM_HASH, parse_hash(hash)?)],
        );
        self.call_expecting(frame, op::NOOP).await.map(|_| ())
    }

    async fn resume(&self, hash: &str) -> BridgeResult<()> {
        let frame = EcFrame::new(
            op::RESUME,
            vec![EcTag::hash(tag::ITEM_HASH, parse_hash(hash)?)],
        );
        self.call_expecting(frame, op::NOOP).await.map(|_| ())
    }

    async fn set_category(&self, hash: &str, token: &str) -> BridgeResult<()> {
        let category_id: u32 = token.parse().map_err(|_| {
            BridgeError::bad_request(format!("'{token}' is not a numeric category id"))
        })?;
        let frame = EcFrame::new(
            op::SET_CATEGORY,
            vec![
                EcTag::hash(tag::ITEM_HASH, parse_hash(hash)?),
                EcTag::u32(tag::CATEGORY_ID, category_id),
            ],
        );
        self.call_expecting(frame, op::NOOP).await.map(|_| ())
    }

    async fn list_categories(&self) -> BridgeResult<Vec<MirrorCategory>> {
        let response = self
            .call_expecting(EcFrame::new(op::GET_CATEGORIES, Vec::new()), op::CATEGORIES)
            .await?;
        let mut categories = Vec::new();
        for category_tag in response.tags_named(tag::CATEGORY) {
            categories.push(category_from_tag(category_tag)?);
        }
        Ok(categories)
    }

    async fn create_category(&self, name: &str, path: &str) -> BridgeResult<MirrorCategory> {
        let frame = EcFrame::new(
            op::CREATE_CATEGORY,
            vec![EcTag::with_children(
                tag::CATEGORY,
                EcValue::Custom(Vec::new()),
                vec![
                    EcTag::string(tag::CATEGORY_TITLE, name),
                    EcTag::string(tag::CATEGORY_PATH, path),
                ],
            )],
        );
        let response = self.call_expecting(frame, op::CATEGORIES).await?;
        let created = response
            .tags_named(tag::CATEGORY)
            .map(category_from_tag)
            .collect::<EcResult<Vec<_>>>()?
            .into_iter()
            .find(|mirror| mirror.name == name)
            .ok_or_else(|| BridgeError::protocol("engine did not echo the created category"))?;
        Ok(created)
    }

    async fn update_category(&self, mirror: &MirrorCategory) -> BridgeResult<()> {
        let id = mirror.id.ok_or_else(|| {
            BridgeError::bad_request("ec category update requires a numeric id")
        })?;
        let frame = EcFrame::new(
            op::UPDATE_CATEGORY,
            vec![EcTag::with_children(
                tag::CATEGORY,
                EcValue::Custom(Vec::new()),
                vec![
                    EcTag::u32(tag::CATEGORY_ID, id),
                    EcTag::string(tag::CATEGORY_TITLE, mirror.name.clone()),
                    EcTag::string(tag::CATEGORY_PATH, mirror.path.clone()),
                ],
            )],
        );
        self.call_expecting(frame, op::NOOP).await.map(|_| ())
    }

    async fn delete_category(&self, token: &str) -> BridgeResult<()> {
        let category_id: u32 = token.parse().map_err(|_| {
            BridgeError::bad_request(format!("'{token}' is not a numeric category id"))
        })?;
        let frame = EcFrame::new(
            op::DELETE_CATEGORY,
            vec![EcTag::u32(tag::CATEGORY_ID, category_id)],
        );
        self.call_expecting(frame, op::NOOP).await.map(|_| ())
    }

    async fn search(&self, query: &str) -> BridgeResult<Vec<SearchResult>> {
        let frame = EcFrame::new(
            op::SEARCH,
            vec![EcTag::string(tag::SEARCH_QUERY, query)],
        );
        let response = self.call_expecting(frame, op::SEARCH_RESULTS).await?;
        let mut results = Vec::new();
        for item_tag in response.tags_named(tag::ITEM) {
            results.push(AmuleRecord::from_tag(item_tag)?.into_search_result());
        }
        Ok(results)
    }

    async fn list_servers(&self) -> BridgeResult<Vec<ServerInfo>> {
        let response = self
            .call_expecting(EcFrame::new(op::GET_SERVERS, Vec::new()), op::SERVERS)
            .await?;
        let mut servers = Vec::new();
        for server_tag in response.tags_named(tag::SERVER) {
            servers.push(server_from_tag(server_tag)?);
        }
        Ok(servers)
    }

    async fn server_action(&self, addr: &str, action: &str) -> BridgeResult<()> {
        if !matches!(action, "connect" | "disconnect" | "remove") {
            return Err(BridgeError::bad_request(format!(
                "unknown server action '{action}'"
            )));
        }
        let frame = EcFrame::new(
            op::SERVER_ACTION,
            vec![
                EcTag::string(tag::SERVER_ADDR, addr),
                EcTag::string(tag::SERVER_ACTION_KIND, action),
            ],
        );
        self.call_expecting(frame, op::NOOP).await.map(|_| ())
    }
}

fn server_from_tag(server: &EcTag) -> BridgeResult<ServerInfo> {
    let addr = server
        .child(tag::SERVER_ADDR)
        .and_then(EcTag::as_str)
        .ok_or_else(|| BridgeError::protocol("server record lacks an address"))?
        .to_string();
    Ok(ServerInfo {
        name: server
            .child(tag::SERVER_NAME)
            .and_then(EcTag::as_str)
            .unwrap_or_default()
            .to_string(),
        addr,
        users: server
            .child(tag::SERVER_USERS)
            .and_then(EcTag::as_u64)
            .unwrap_or_default(),
        files: server
            .child(tag::SERVER_FILES)
            .and_then(EcTag::as_u64)
            .unwrap_or_default(),
        connected: server
            .child(tag::SERVER_CONNECTED)
            .and_then(EcTag::as_u64)
            .is_some_and(|flag| flag != 0),
    })
}

fn parse_hash(hash: &str) -> BridgeResult<[u8; 16]> {
    let bytes = hex::decode(hash)
        .map_err(|_| BridgeError::bad_request(format!("'{hash}' is not a hex ed2k hash")))?;
    bytes
        .try_into()
        .map_err(|_| BridgeError::bad_request(format!("'{hash}' is not 16 bytes")))
}

async fn run_session(
    mut framed: Framed<TcpStream, EcCodec>,
    mut commands: mpsc::Receiver<SessionCommand>,
) {
    let mut pending: VecDeque<oneshot::Sender<EcResult<EcFrame>>> = VecDeque::new();
    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(SessionCommand::Call { frame, reply }) => {
                        if let Err(err) = framed.send(frame).await {
                            let _ = reply.send(Err(err));
                            break;
                        }
                        pending.push_back(reply);
                    }
                    None => break,
                }
            }
            frame = framed.next() => {
                match frame {
                    Some(Ok(frame)) => {
                        if let Some(reply) = pending.pop_front() {
                            let _ = reply.send(Ok(frame));
                        } else {
                            debug!(opcode = frame.opcode, "unsolicited ec frame dropped");
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "ec stream decode failed; closing session");
                        if let Some(reply) = pending.pop_front() {
                            let _ = reply.send(Err(err));
                        }
                        break;
                    }
                    None => break,
                }
            }
        }
    }
    for reply in pending {
        let _ = reply.send(Err(EcError::SessionClosed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tokio::net::TcpListener;

    /// Minimal EC engine: accepts one session, authenticates, then answers
    /// per opcode until the peer hangs up.
    async fn spawn_fake_engine() -> Result<std::net::SocketAddr> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let mut framed = Framed::new(stream, EcCodec);

            while let Some(Ok(frame)) = framed.next().await {
                let response = match frame.opcode {
                    op::AUTH_REQ => {
                        let authorized = frame
                            .tag(tag::PASSWORD)
                            .and_then(EcTag::as_str)
                            .is_some_and(|password| password == "secret");
                        if authorized {
                            EcFrame::new(op::AUTH_OK, Vec::new())
                        } else {
                            EcFrame::new(op::AUTH_FAIL, Vec::new())
                        }
                    }
                    op::STAT_REQ => EcFrame::new(op::STATS, Vec::new()),
                    op::GET_DLOAD_QUEUE => EcFrame::new(
                        op::DLOAD_QUEUE,
                        vec![EcTag::with_children(
                            tag::ITEM,
                            EcValue::Custom(Vec::new()),
                            vec![
                                EcTag::hash(tag::ITEM_HASH, [0xaa; 16]),
                                EcTag::string(tag::ITEM_NAME, "queued.iso"),
                                EcTag::u64(tag::ITEM_SIZE_FULL, 100),
                                EcTag::u64(tag::ITEM_SIZE_DONE, 50),
                                EcTag::u8(tag::ITEM_STATUS, 0),
                            ],
                        )],
                    ),
                    op::GET_SHARED_FILES => EcFrame::new(op::SHARED_FILES, Vec::new()),
                    op::ADD_LINK => EcFrame::new(op::NOOP, Vec::new()),
                    _ => EcFrame::new(
                        op::FAILED,
                        vec![EcTag::string(tag::MESSAGE, "unhandled opcode")],
                    ),
                };
                if framed.send(response).await.is_err() {
                    break;
                }
            }
        });
        Ok(addr)
    }

    fn client_for(addr: std::net::SocketAddr, password: &str) -> AmuleClient {
        AmuleClient::new(AmuleConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            password: password.to_string(),
            call_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(2),
            ..AmuleConfig::default()
        })
    }

    #[tokio::test]
    async fn calls_fail_fast_before_connect() {
        let client = AmuleClient::new(AmuleConfig::default());
        assert!(matches!(
            client.probe().await,
            Err(BridgeError::NotConnected { .. })
        ));
    }

    #[tokio::test]
    async fn handshake_probe_and_snapshot() -> Result<()> {
        let addr = spawn_fake_engine().await?;
        let client = client_for(addr, "secret");
        client.connect().await?;
        client.probe().await?;

        let items = client.snapshot().await?;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item.name, "queued.iso");
        assert_eq!(items[0].item.progress, 50);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() -> Result<()> {
        let addr = spawn_fake_engine().await?;
        let client = client_for(addr, "wrong");
        assert!(client.connect().await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn add_parses_link_and_returns_hash() -> Result<()> {
        let addr = spawn_fake_engine().await?;
        let client = client_for(addr, "secret");
        client.connect().await?;

        let hash = client
            .add(AddRequest::Ed2kLink {
                link: "ed2k://|file|demo.iso|100|0123456789ABCDEF0123456789ABCDEF|/".to_string(),
                category_id: 0,
            })
            .await?;
        assert_eq!(hash, "0123456789ABCDEF0123456789ABCDEF");
        Ok(())
    }

    #[tokio::test]
    async fn unhandled_opcode_maps_to_bad_request() -> Result<()> {
        let addr = spawn_fake_engine().await?;
        let client = client_for(addr, "secret");
        client.connect().await?;
        assert!(matches!(
            client.search("query").await,
            Err(BridgeError::BadRequest { .. })
        ));
        Ok(())
    }
}
