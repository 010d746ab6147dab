//! Reverse DNS backends.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use tracing::debug;

/// Backend performing one reverse lookup; the cache owns timeouts and
/// single-flight, the backend just answers.
#[async_trait]
pub trait ReverseLookup: Send + Sync {
    /// Resolve an IP to a hostname; `None` on any failure.
    async fn lookup(&self, ip: IpAddr) -> Option<String>;
}

/// Reverse lookup over the system's configured DNS.
pub struct DnsReverseLookup {
    resolver: TokioAsyncResolver,
}

impl DnsReverseLookup {
    /// Build a resolver from `/etc/resolv.conf` (or platform equivalent).
    ///
    /// # Errors
    ///
    /// Returns an error when the system resolver configuration cannot be
    /// read.
    pub fn from_system_conf() -> Result<Arc<Self>, hickory_resolver::error::ResolveError> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()?;
        Ok(Arc::new(Self { resolver }))
    }
}

#[async_trait]
impl ReverseLookup for DnsReverseLookup {
    async fn lookup(&self, ip: IpAddr) -> Option<String> {
        match self.resolver.reverse_lookup(ip).await {
            Ok(names) => names.iter().next().map(|name| {
                let rendered = name.to_utf8();
                rendered.trim_end_matches('.').to_string()
            }),
            Err(err) => {
                debug!(ip = %ip, error = %err, "reverse dns lookup failed");
                None
            }
        }
    }
}
