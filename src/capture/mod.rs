pub mod classifier;
pub mod engine;
pub mod parser;
pub mod pcap_file;
pub mod source;
pub mod store;

pub use engine::{CaptureEngine, EngineState, Ingestor};
pub use source::{PacketEvent, PacketSource, SourceError, SourceFactory};
pub use store::ConversationStore;
