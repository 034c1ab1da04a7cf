use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::capture::classifier::READABLE_THRESHOLD;
use crate::resolve::cache::DEFAULT_CAPACITY;
use crate::utils::error::AppResult;

/// How detail requests identify the service behind a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortLookup {
    /// Scan the host with nmap
    Nmap,
    /// Look the port up in a static table of well-known services
    Table,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Network interface to capture from at startup
    pub interface: Option<String>,

    /// Port for the REST API server
    pub port: u16,

    /// Enable promiscuous mode
    pub promiscuous: bool,

    /// Bytes captured per frame
    pub snaplen: i32,

    /// Source read timeout; bounds how long a stop request waits on a quiet link
    pub read_timeout_ms: i32,

    /// BPF filter expression
    pub filter: Option<String>,

    /// Readable-character ratio above which a payload counts as readable
    pub readable_threshold: f64,

    /// Reverse DNS cache size
    pub cache_capacity: usize,

    /// Reverse DNS lookup timeout
    pub dns_timeout_ms: u64,

    /// Worker threads serving detail requests
    pub detail_workers: usize,

    /// Base URL of the Ollama server
    pub ollama_url: String,

    /// Model used for payload descriptions
    pub ollama_model: String,

    /// HTTP timeout for the language model
    pub llm_timeout_secs: u64,

    /// Port identification strategy
    pub port_lookup: PortLookup,

    /// Extra nmap arguments for service identification
    pub scan_arguments: Vec<String>,

    /// Per-host nmap timeout
    pub scan_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            interface: None,
            port: 3000,
            promiscuous: false,
            snaplen: 65535,
            read_timeout_ms: 500,
            filter: None,
            readable_threshold: READABLE_THRESHOLD,
            cache_capacity: DEFAULT_CAPACITY,
            dns_timeout_ms: 2000,
            detail_workers: 4,
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3".to_string(),
            llm_timeout_secs: 120,
            port_lookup: PortLookup::Nmap,
            scan_arguments: vec!["-sS".to_string()],
            scan_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load a JSON configuration file; missing fields take their defaults
    pub fn load(path: &Path) -> AppResult<Self> {
        let contents = fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }
}
