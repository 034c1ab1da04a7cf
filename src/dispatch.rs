//! The fixed set of consumer commands and the dispatcher that serves them.

use dashmap::DashMap;
use log::{debug, info};
use serde::Serialize;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::capture::classifier::Classifier;
use crate::capture::engine::{CaptureEngine, EngineState, Ingestor};
use crate::capture::pcap_file;
use crate::capture::source::{LiveCaptureOptions, PcapSourceFactory};
use crate::detail::pipeline::{Describer, DetailPipeline, DetailTicket};
use crate::detail::scanner::{NmapScanner, PortScanner, WellKnownPorts};
use crate::detail::summarizer::OllamaSummarizer;
use crate::models::config::{AppConfig, PortLookup};
use crate::models::conversation::{
    ConversationPackets, ConversationSnapshot, ConversationSummary, SourceGroup,
};
use crate::models::detail::{DetailOutcome, DetailResult, DetailStatus, EngineEvent};
use crate::models::interface::{list_interfaces, InterfaceInfo};
use crate::models::packet::PacketRecord;
use crate::models::stats::SessionStats;
use crate::resolve::cache::ResolutionCache;
use crate::resolve::dns::DnsReverseResolver;
use crate::utils::error::{AppError, AppResult};

/// Everything a consumer can ask of the sniffer
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ListInterfaces,
    Start { interface: String },
    Stop,
    Status,
    Summary,
    ReadableOnly,
    EncryptedOnly,
    GroupBySource,
    ConversationPackets { source: IpAddr, destination: IpAddr },
    Packet { id: u64 },
    RequestDetail { packet_id: u64 },
    DetailStatus { request_id: Uuid },
    CancelDetail { request_id: Uuid },
    Save { path: PathBuf },
    Load { path: PathBuf },
}

/// Engine status as reported to consumers
#[derive(Debug, Clone, Serialize)]
pub struct CaptureStatus {
    pub state: EngineState,
    pub interface: Option<String>,
    pub stats: SessionStats,
    pub conversations: usize,
    pub packets: usize,
    pub pending_details: usize,
    /// Finished detail results not yet fetched
    pub unread_details: usize,
}

/// A filed packet with its payload rendered for display
#[derive(Debug, Clone, Serialize)]
pub struct PacketView {
    #[serde(flatten)]
    pub packet: PacketRecord,
    pub payload_hex: String,
    pub payload_text: String,
}

impl From<&PacketRecord> for PacketView {
    fn from(record: &PacketRecord) -> Self {
        PacketView {
            payload_hex: record.payload_hex(),
            payload_text: record.payload_text(),
            packet: record.clone(),
        }
    }
}

/// Reply to a command
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Interfaces(Vec<InterfaceInfo>),
    Status(CaptureStatus),
    Conversations(Vec<ConversationSummary>),
    Groups(Vec<SourceGroup>),
    PacketList(ConversationPackets),
    Packet(PacketView),
    Ticket(DetailTicket),
    Detail(DetailStatus),
    Saved { path: PathBuf, packets: usize },
    Loaded { path: PathBuf, stats: SessionStats },
    Ack { message: String },
}

impl Reply {
    fn ack(message: impl Into<String>) -> Self {
        Reply::Ack {
            message: message.into(),
        }
    }
}

fn summaries(snapshots: Vec<ConversationSnapshot>) -> Vec<ConversationSummary> {
    snapshots.iter().map(ConversationSummary::from).collect()
}

/// Routes commands to the capture engine and the detail pipeline and keeps
/// the status of detail requests for consumers that poll. A finished result
/// is handed out once and then forgotten.
pub struct Dispatcher {
    engine: CaptureEngine,
    pipeline: DetailPipeline,
    details: DashMap<Uuid, DetailStatus>,
}

impl Dispatcher {
    pub fn new(engine: CaptureEngine, pipeline: DetailPipeline) -> Self {
        Dispatcher {
            engine,
            pipeline,
            details: DashMap::new(),
        }
    }

    /// Wire up the live collaborators described by `config`
    pub fn from_config(config: &AppConfig, events: UnboundedSender<EngineEvent>) -> AppResult<Self> {
        let resolver = DnsReverseResolver::new(Duration::from_millis(config.dns_timeout_ms))
            .map_err(|e| AppError::GenericError(format!("Failed to create DNS resolver: {}", e)))?;
        let cache = Arc::new(ResolutionCache::new(Arc::new(resolver), config.cache_capacity));

        let factory = PcapSourceFactory::new(LiveCaptureOptions {
            promiscuous: config.promiscuous,
            snaplen: config.snaplen,
            read_timeout_ms: config.read_timeout_ms,
            filter: config.filter.clone(),
        });
        let ingestor = Arc::new(Ingestor::new(
            cache.clone(),
            Classifier::new(config.readable_threshold),
        ));
        let engine = CaptureEngine::new(Arc::new(factory), ingestor, events.clone());

        let scanner: Arc<dyn PortScanner> = match config.port_lookup {
            PortLookup::Nmap => Arc::new(NmapScanner::new(
                config.scan_arguments.clone(),
                Duration::from_secs(config.scan_timeout_secs),
            )),
            PortLookup::Table => Arc::new(WellKnownPorts),
        };
        let summarizer = OllamaSummarizer::new(
            &config.ollama_url,
            &config.ollama_model,
            Duration::from_secs(config.llm_timeout_secs),
        )
        .map_err(|e| AppError::GenericError(format!("Failed to create model client: {}", e)))?;
        info!(
            "Packet descriptions use {:?} port lookup and model {} at {}",
            config.port_lookup,
            config.ollama_model,
            summarizer.endpoint()
        );

        let describer = Describer::new(scanner, Arc::new(summarizer), cache);
        let pipeline = DetailPipeline::new(describer, config.detail_workers, events)?;

        Ok(Dispatcher::new(engine, pipeline))
    }

    pub fn engine(&self) -> &CaptureEngine {
        &self.engine
    }

    /// Execute one command. Blocking; call it off the async runtime.
    pub fn dispatch(&self, command: Command) -> AppResult<Reply> {
        debug!("Dispatching {:?}", command);
        match command {
            Command::ListInterfaces => Ok(Reply::Interfaces(list_interfaces())),
            Command::Start { interface } => {
                self.engine.start(&interface)?;
                Ok(Reply::ack(format!("Capture started on {}", interface)))
            }
            Command::Stop => {
                self.engine.stop()?;
                Ok(Reply::ack("Stop requested"))
            }
            Command::Status => Ok(Reply::Status(self.status())),
            Command::Summary => Ok(Reply::Conversations(summaries(self.engine.store().snapshot()))),
            Command::ReadableOnly => Ok(Reply::Conversations(summaries(
                self.engine.store().snapshot_readable_only(),
            ))),
            Command::EncryptedOnly => Ok(Reply::Conversations(summaries(
                self.engine.store().snapshot_encrypted_only(),
            ))),
            Command::GroupBySource => Ok(Reply::Groups(self.engine.store().group_by_source())),
            Command::ConversationPackets { source, destination } => self
                .engine
                .store()
                .conversation(source, destination)
                .map(|snapshot| Reply::PacketList(ConversationPackets::from(&snapshot)))
                .ok_or(AppError::UnknownConversation {
                    from: source,
                    to: destination,
                }),
            Command::Packet { id } => {
                let record = self
                    .engine
                    .store()
                    .find_record(id)
                    .ok_or(AppError::UnknownPacket(id))?;
                Ok(Reply::Packet(PacketView::from(record.as_ref())))
            }
            Command::RequestDetail { packet_id } => {
                let record = self
                    .engine
                    .store()
                    .find_record(packet_id)
                    .ok_or(AppError::UnknownPacket(packet_id))?;
                let ticket = self.pipeline.request_detail(record)?;
                // The result may already have been recorded by the event pump
                self.details
                    .entry(ticket.request_id)
                    .or_insert(DetailStatus::Pending {
                        request_id: ticket.request_id,
                        packet_id,
                    });
                Ok(Reply::Ticket(ticket))
            }
            Command::DetailStatus { request_id } => {
                if let Some((_, ready)) = self
                    .details
                    .remove_if(&request_id, |_, status| matches!(status, DetailStatus::Ready(_)))
                {
                    return Ok(Reply::Detail(ready));
                }
                self.details
                    .get(&request_id)
                    .map(|status| Reply::Detail(status.value().clone()))
                    .ok_or(AppError::UnknownRequest(request_id))
            }
            Command::CancelDetail { request_id } => {
                let ticket = self.pipeline.cancel(request_id)?;
                // The caller learns the outcome from this reply
                self.details.remove(&request_id);
                Ok(Reply::Detail(DetailStatus::Ready(DetailResult {
                    request_id,
                    packet_id: ticket.packet_id,
                    outcome: DetailOutcome::Cancelled,
                })))
            }
            Command::Save { path } => {
                let records = self.engine.store().records();
                let packets = pcap_file::save(&records, &path)?;
                Ok(Reply::Saved { path, packets })
            }
            Command::Load { path } => {
                let stats = self.engine.ingest_file(&path)?;
                Ok(Reply::Loaded { path, stats })
            }
        }
    }

    /// Keep the detail registry in step with pipeline results
    pub fn handle_event(&self, event: &EngineEvent) {
        let EngineEvent::DetailReady(result) = event else {
            return;
        };
        let ready = DetailStatus::Ready(result.clone());
        if result.outcome == DetailOutcome::Cancelled {
            // A cancel through `dispatch` already answered its caller
            if let Some(mut status) = self.details.get_mut(&result.request_id) {
                *status = ready;
            }
        } else {
            self.details.insert(result.request_id, ready);
        }
    }

    pub fn status(&self) -> CaptureStatus {
        let store = self.engine.store();
        CaptureStatus {
            state: self.engine.state(),
            interface: self.engine.interface(),
            stats: self.engine.stats(),
            conversations: store.len(),
            packets: store.packet_count(),
            pending_details: self.pipeline.in_flight(),
            unread_details: self
                .details
                .iter()
                .filter(|status| matches!(status.value(), DetailStatus::Ready(_)))
                .count(),
        }
    }

    /// Stop accepting work: cancel outstanding details and stop any capture
    pub fn shutdown(&self) {
        self.pipeline.shutdown();
        if matches!(self.engine.state(), EngineState::Running | EngineState::Loading) {
            let _ = self.engine.stop();
        }
    }
}
