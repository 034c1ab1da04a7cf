//! On-demand packet descriptions.

pub mod format;
pub mod pipeline;
pub mod scanner;
pub mod summarizer;

pub use pipeline::{Describer, DetailPipeline, DetailTicket};
pub use scanner::{NmapScanner, PortScanner, ScanError, WellKnownPorts};
pub use summarizer::{OllamaSummarizer, SummarizeError, Summarizer};
