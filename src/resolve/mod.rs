//! Hostname resolution for conversation keys.

pub mod cache;
pub mod dns;

pub use cache::{ResolutionCache, ResolveError, ReverseResolver, UNKNOWN_HOST};
pub use dns::DnsReverseResolver;
