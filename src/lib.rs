//! Live packet sniffer that groups traffic into conversations, flags
//! human-readable payloads and describes individual packets on demand.

pub mod api;
pub mod capture;
pub mod detail;
pub mod dispatch;
pub mod models;
pub mod resolve;
pub mod utils;
