//! Reverse DNS lookups for visitor IPs
//!
//! A [`HostnameResolver`] blocks. Async callers go through
//! [`resolve_hostnames`], which runs every distinct lookup on tokio's
//! blocking pool at the same time and stops waiting once the deadline has
//! passed. Results (including failures) are cached process-wide by
//! [`DnsHostnameResolver`].

use moka::sync::Cache;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::debug;

pub trait HostnameResolver: Send + Sync {
    /// Hostname for `ip`, or `None` when it cannot be resolved. May block.
    fn reverse(&self, ip: &str) -> Option<String>;
}

/// Resolver used when hostname lookups are disabled: never resolves.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHostnameResolver;

impl HostnameResolver for NoopHostnameResolver {
    fn reverse(&self, _ip: &str) -> Option<String> {
        None
    }
}

/// System resolver behind a cache.
pub struct DnsHostnameResolver {
    cache: Cache<IpAddr, Option<String>>,
}

impl DnsHostnameResolver {
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(600))
            .build();
        Self { cache }
    }
}

impl Default for DnsHostnameResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl HostnameResolver for DnsHostnameResolver {
    fn reverse(&self, ip: &str) -> Option<String> {
        let addr: IpAddr = ip.parse().ok()?;
        self.cache.get_with(addr, || match dns_lookup::lookup_addr(&addr) {
            Ok(host) => Some(host),
            Err(e) => {
                debug!("Reverse lookup for {} failed: {}", addr, e);
                None
            }
        })
    }
}

/// Resolve the distinct `ips` concurrently, giving up on whatever is still
/// pending after `timeout`.
///
/// Every input IP gets an entry; unresolved ones map to themselves.
pub async fn resolve_hostnames<I>(
    resolver: Arc<dyn HostnameResolver>,
    ips: I,
    timeout: Duration,
) -> HashMap<String, String>
where
    I: IntoIterator<Item = String>,
{
    let mut hostnames: HashMap<String, String> =
        ips.into_iter().map(|ip| (ip.clone(), ip)).collect();

    let mut lookups = JoinSet::new();
    for ip in hostnames.keys().cloned() {
        let resolver = Arc::clone(&resolver);
        lookups.spawn_blocking(move || {
            let host = resolver.reverse(&ip);
            (ip, host)
        });
    }

    let deadline = Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, lookups.join_next()).await {
            Ok(Some(Ok((ip, Some(host))))) => {
                hostnames.insert(ip, host);
            }
            Ok(Some(Ok((_, None)))) => {}
            Ok(Some(Err(e))) => debug!("Reverse lookup task failed: {}", e),
            Ok(None) => break,
            Err(_) => {
                debug!(
                    "{} reverse lookups still pending after {:?}",
                    lookups.len(),
                    timeout
                );
                // Blocking lookups cannot be interrupted; they finish on the
                // pool and fill the cache for later requests.
                lookups.detach_all();
                break;
            }
        }
    }

    hostnames
}
