//! Reverse DNS (PTR) lookups through trust-dns.

use log::{info, warn};
use std::net::IpAddr;
use std::time::Duration;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::Resolver;

use super::cache::{ResolveError, ReverseResolver};

/// Blocking PTR resolver.
///
/// Owns its own runtime, so it must be used from plain threads (capture
/// thread, detail workers, `web::block`), never from async tasks.
pub struct DnsReverseResolver {
    resolver: Resolver,
}

impl DnsReverseResolver {
    pub fn new(timeout: Duration) -> Result<Self, ResolveError> {
        let (config, mut opts) = match trust_dns_resolver::system_conf::read_system_conf() {
            Ok(conf) => conf,
            Err(e) => {
                // Fallback to Google DNS if system config fails
                warn!("Failed to read system DNS config ({}), using Google DNS", e);
                (ResolverConfig::google(), ResolverOpts::default())
            }
        };
        opts.timeout = timeout;
        opts.attempts = 1;

        let resolver =
            Resolver::new(config, opts).map_err(|e| ResolveError::Lookup(e.to_string()))?;
        info!("Reverse DNS resolver ready (timeout {:?})", timeout);
        Ok(DnsReverseResolver { resolver })
    }
}

impl ReverseResolver for DnsReverseResolver {
    fn reverse(&self, addr: IpAddr) -> Result<String, ResolveError> {
        match self.resolver.reverse_lookup(addr) {
            Ok(lookup) => lookup
                .iter()
                .next()
                .map(|name| name.to_string().trim_end_matches('.').to_string())
                .ok_or(ResolveError::NotFound(addr)),
            Err(e) => Err(match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => ResolveError::NotFound(addr),
                ResolveErrorKind::Timeout => ResolveError::Timeout(addr),
                _ => ResolveError::Lookup(e.to_string()),
            }),
        }
    }
}
