//! Engine client trait implemented by the back-end adapters.

use async_trait::async_trait;

use crate::error::{BridgeError, BridgeResult};
use crate::model::{
    AddRequest, ClientItem, ClientKind, MirrorCategory, PeerInfo, SearchResult, ServerInfo,
};

/// Seam between the bridge and a back-end engine session.
///
/// Both engine crates implement this; operations an engine cannot express
/// keep the `Unsupported` default so callers dispatch uniformly.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Which back-end this client drives.
    fn kind(&self) -> ClientKind;

    /// Dial and handshake a fresh session.
    async fn connect(&self) -> BridgeResult<()>;

    /// Cheap liveness probe issued while connected.
    async fn probe(&self) -> BridgeResult<()>;

    /// Tear the session down; idempotent.
    async fn disconnect(&self);

    /// Live downloads plus shared/seeding records, projected into the
    /// unified shape with the raw category token attached.
    async fn snapshot(&self) -> BridgeResult<Vec<ClientItem>>;

    /// Admit a new record.
    async fn add(&self, request: AddRequest) -> BridgeResult<String>;

    /// Remove a record, optionally deleting payload data.
    async fn remove(&self, hash: &str, delete_files: bool) -> BridgeResult<()>;

    /// Pause a record.
    async fn pause(&self, hash: &str) -> BridgeResult<()>;

    /// Resume a paused record.
    async fn resume(&self, hash: &str) -> BridgeResult<()>;

    /// Hard-stop a record; engines without a stop verb keep the default.
    async fn stop(&self, _hash: &str) -> BridgeResult<()> {
        Err(BridgeError::Unsupported { operation: "stop" })
    }

    /// Re-categorise a record using the engine's raw token.
    async fn set_category(&self, hash: &str, token: &str) -> BridgeResult<()>;

    /// List the engine-side category mirror.
    async fn list_categories(&self) -> BridgeResult<Vec<MirrorCategory>>;

    /// Create a category inside the engine's mirror.
    async fn create_category(&self, name: &str, path: &str) -> BridgeResult<MirrorCategory>;

    /// Update a mirrored category; engines without rename support keep the
    /// default.
    async fn update_category(&self, _mirror: &MirrorCategory) -> BridgeResult<()> {
        Err(BridgeError::Unsupported {
            operation: "update_category",
        })
    }

    /// Delete a mirrored category.
    async fn delete_category(&self, _token: &str) -> BridgeResult<()> {
        Err(BridgeError::Unsupported {
            operation: "delete_category",
        })
    }

    /// Run a name search; only the ED2K engine supports this.
    async fn search(&self, _query: &str) -> BridgeResult<Vec<SearchResult>> {
        Err(BridgeError::Unsupported {
            operation: "search",
        })
    }

    /// Connected peers for one record; engines without a peer surface
    /// keep the default.
    async fn peers(&self, _hash: &str) -> BridgeResult<Vec<PeerInfo>> {
        Err(BridgeError::Unsupported { operation: "peers" })
    }

    /// List the engine's server table; ED2K only.
    async fn list_servers(&self) -> BridgeResult<Vec<ServerInfo>> {
        Err(BridgeError::Unsupported {
            operation: "list_servers",
        })
    }

    /// Apply a server action (`connect`, `disconnect`, `remove`); ED2K
    /// only.
    async fn server_action(&self, _addr: &str, _action: &str) -> BridgeResult<()> {
        Err(BridgeError::Unsupported {
            operation: "server_action",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubClient;

    #[async_trait]
    impl EngineClient for StubClient {
        fn kind(&self) -> ClientKind {
            ClientKind::Rtorrent
        }

        async fn connect(&self) -> BridgeResult<()> {
            Ok(())
        }

        async fn probe(&self) -> BridgeResult<()> {
            Ok(())
        }

        async fn disconnect(&self) {}

        async fn snapshot(&self) -> BridgeResult<Vec<ClientItem>> {
            Ok(Vec::new())
        }

        async fn add(&self, _request: AddRequest) -> BridgeResult<String> {
            Ok("0".repeat(40))
        }

        async fn remove(&self, _hash: &str, _delete_files: bool) -> BridgeResult<()> {
            Ok(())
        }

        async fn pause(&self, _hash: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn resume(&self, _hash: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn set_category(&self, _hash: &str, _token: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn list_categories(&self) -> BridgeResult<Vec<MirrorCategory>> {
            Ok(Vec::new())
        }

        async fn create_category(&self, name: &str, path: &str) -> BridgeResult<MirrorCategory> {
            Ok(MirrorCategory {
                id: None,
                name: name.to_string(),
                path: path.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn default_methods_report_unsupported() {
        let client = StubClient;
        assert!(matches!(
            client.search("query").await,
            Err(BridgeError::Unsupported { operation }) if operation == "search"
        ));
        assert!(client.stop("hash").await.is_err());
        assert!(client.peers("hash").await.is_err());
        assert!(client.list_servers().await.is_err());
        assert!(client.server_action("srv.example:4661", "connect").await.is_err());
        assert!(client.delete_category("token").await.is_err());
        assert!(
            client
                .update_category(&MirrorCategory {
                    id: Some(1),
                    name: "Movies".to_string(),
                    path: "/mnt/m".to_string(),
                })
                .await
                .is_err()
        );
    }
}
