use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// Hostname recorded for addresses that do not resolve
pub const UNKNOWN_HOST: &str = "Unknown";

/// Default number of cached addresses
pub const DEFAULT_CAPACITY: usize = 1024;

/// Reverse lookup failures. These never leave the cache.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("no PTR record for {0}")]
    NotFound(IpAddr),

    #[error("lookup for {0} timed out")]
    Timeout(IpAddr),

    #[error("lookup failed: {0}")]
    Lookup(String),
}

/// Reverse DNS collaborator
pub trait ReverseResolver: Send + Sync {
    fn reverse(&self, addr: IpAddr) -> Result<String, ResolveError>;
}

struct Entry {
    hostname: String,
    last_used: u64,
}

#[derive(Default)]
struct LruState {
    entries: HashMap<IpAddr, Entry>,
    /// last-used tick -> address, oldest first
    recency: BTreeMap<u64, IpAddr>,
    tick: u64,
}

impl LruState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, addr: IpAddr) -> Option<String> {
        let tick = self.next_tick();
        let entry = self.entries.get_mut(&addr)?;
        self.recency.remove(&entry.last_used);
        entry.last_used = tick;
        self.recency.insert(tick, addr);
        Some(entry.hostname.clone())
    }
}

/// Memoizing, bounded reverse-DNS cache.
///
/// Failed lookups are cached as [`UNKNOWN_HOST`] and never retried while
/// they stay cached. An entry is written once; when two threads miss on the
/// same address concurrently the first insert wins and both callers get it.
pub struct ResolutionCache {
    resolver: Arc<dyn ReverseResolver>,
    capacity: usize,
    state: Mutex<LruState>,
}

impl ResolutionCache {
    pub fn new(resolver: Arc<dyn ReverseResolver>, capacity: usize) -> Self {
        ResolutionCache {
            resolver,
            capacity: capacity.max(1),
            state: Mutex::new(LruState::default()),
        }
    }

    /// Resolve an address to a hostname, or [`UNKNOWN_HOST`]
    pub fn resolve(&self, addr: IpAddr) -> String {
        if let Some(hostname) = self.state.lock().touch(addr) {
            return hostname;
        }

        // The lookup runs without the lock held so one slow PTR query
        // does not stall every other caller.
        let hostname = match catch_unwind(AssertUnwindSafe(|| self.resolver.reverse(addr))) {
            Ok(Ok(hostname)) if !hostname.is_empty() => hostname,
            Ok(Ok(_)) => UNKNOWN_HOST.to_string(),
            Ok(Err(e)) => {
                debug!("Reverse lookup for {} failed: {}", addr, e);
                UNKNOWN_HOST.to_string()
            }
            Err(_) => {
                warn!("Reverse resolver panicked for {}", addr);
                UNKNOWN_HOST.to_string()
            }
        };

        self.insert(addr, hostname)
    }

    fn insert(&self, addr: IpAddr, hostname: String) -> String {
        let mut state = self.state.lock();
        if let Some(existing) = state.touch(addr) {
            return existing;
        }

        if state.entries.len() >= self.capacity {
            if let Some((_, evicted)) = state.recency.pop_first() {
                state.entries.remove(&evicted);
                debug!("Evicted {} from resolution cache", evicted);
            }
        }

        let tick = state.next_tick();
        state.recency.insert(tick, addr);
        state.entries.insert(
            addr,
            Entry {
                hostname: hostname.clone(),
                last_used: tick,
            },
        );
        hostname
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        self.state.lock().entries.contains_key(&addr)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    /// Resolves 10.x addresses to `host-<last octet>`, everything else fails
    #[derive(Default)]
    struct CountingResolver {
        calls: AtomicUsize,
    }

    impl ReverseResolver for CountingResolver {
        fn reverse(&self, addr: IpAddr) -> Result<String, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match addr {
                IpAddr::V4(v4) if v4.octets()[0] == 10 => Ok(format!("host-{}", v4.octets()[3])),
                _ => Err(ResolveError::NotFound(addr)),
            }
        }
    }

    struct PanickingResolver;

    impl ReverseResolver for PanickingResolver {
        fn reverse(&self, _addr: IpAddr) -> Result<String, ResolveError> {
            panic!("resolver bug");
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn repeated_lookups_hit_the_resolver_once() {
        let resolver = Arc::new(CountingResolver::default());
        let cache = ResolutionCache::new(resolver.clone(), 16);

        let first = cache.resolve(ip("10.0.0.7"));
        let second = cache.resolve(ip("10.0.0.7"));
        assert_eq!(first, "host-7");
        assert_eq!(first, second);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failures_are_cached_as_unknown() {
        let resolver = Arc::new(CountingResolver::default());
        let cache = ResolutionCache::new(resolver.clone(), 16);

        assert_eq!(cache.resolve(ip("192.168.1.1")), UNKNOWN_HOST);
        assert_eq!(cache.resolve(ip("192.168.1.1")), UNKNOWN_HOST);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn resolver_panics_become_unknown() {
        let cache = ResolutionCache::new(Arc::new(PanickingResolver), 4);
        assert_eq!(cache.resolve(ip("10.0.0.1")), UNKNOWN_HOST);
        assert!(cache.contains(ip("10.0.0.1")));
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let cache = ResolutionCache::new(Arc::new(CountingResolver::default()), 8);
        for i in 0..100u8 {
            cache.resolve(IpAddr::from([10, 1, 0, i]));
            assert!(cache.len() <= 8);
        }
        assert_eq!(cache.len(), 8);
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let resolver = Arc::new(CountingResolver::default());
        let cache = ResolutionCache::new(resolver.clone(), 2);

        cache.resolve(ip("10.0.0.1"));
        cache.resolve(ip("10.0.0.2"));
        // refresh .1 so .2 becomes the oldest
        cache.resolve(ip("10.0.0.1"));
        cache.resolve(ip("10.0.0.3"));

        assert!(cache.contains(ip("10.0.0.1")));
        assert!(!cache.contains(ip("10.0.0.2")));
        assert!(cache.contains(ip("10.0.0.3")));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn concurrent_callers_agree() {
        let cache = Arc::new(ResolutionCache::new(
            Arc::new(CountingResolver::default()),
            64,
        ));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || {
                    (0..32u8)
                        .map(|i| cache.resolve(IpAddr::from([10, 0, 0, i])))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<Vec<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(cache.len(), 32);
    }
}
