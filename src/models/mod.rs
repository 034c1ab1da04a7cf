pub mod config;
pub mod conversation;
pub mod detail;
pub mod interface;
pub mod packet;
pub mod stats;
