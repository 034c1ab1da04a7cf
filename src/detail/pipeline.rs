use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::detail::format::{wrap_words, WRAP_COLUMNS};
use crate::detail::scanner::PortScanner;
use crate::detail::summarizer::Summarizer;
use crate::models::detail::{DetailOutcome, DetailResult, EngineEvent};
use crate::models::packet::PacketRecord;
use crate::resolve::cache::ResolutionCache;
use crate::utils::error::{AppError, AppResult};

/// Handle returned immediately for a detail request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailTicket {
    pub request_id: Uuid,
    pub packet_id: u64,
}

struct TicketState {
    packet_id: u64,
    cancelled: AtomicBool,
    delivered: AtomicBool,
}

impl TicketState {
    fn new(packet_id: u64) -> Self {
        TicketState {
            packet_id,
            cancelled: AtomicBool::new(false),
            delivered: AtomicBool::new(false),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct Job {
    ticket: DetailTicket,
    record: Arc<PacketRecord>,
    state: Arc<TicketState>,
}

/// Builds the text description of one packet
pub struct Describer {
    scanner: Arc<dyn PortScanner>,
    summarizer: Arc<dyn Summarizer>,
    cache: Arc<ResolutionCache>,
}

impl Describer {
    pub fn new(
        scanner: Arc<dyn PortScanner>,
        summarizer: Arc<dyn Summarizer>,
        cache: Arc<ResolutionCache>,
    ) -> Self {
        Describer {
            scanner,
            summarizer,
            cache,
        }
    }

    /// Describe `record`, or `None` if `cancelled` turns true between steps
    pub fn describe(&self, record: &PacketRecord, cancelled: &dyn Fn() -> bool) -> Option<DetailOutcome> {
        let mut text = String::from("Detailed Packet Information:\n\n");
        let _ = writeln!(
            text,
            "Source IP: {} ({})",
            record.source_ip,
            self.cache.resolve(record.source_ip)
        );
        let _ = writeln!(
            text,
            "Destination IP: {} ({})\n",
            record.destination_ip,
            self.cache.resolve(record.destination_ip)
        );
        let _ = writeln!(text, "Transport Layer Protocol: {}\n", record.protocol);

        for (label, ip, port) in [
            ("Source", record.source_ip, record.source_port),
            ("Destination", record.destination_ip, record.destination_port),
        ] {
            if cancelled() {
                return None;
            }
            let service = self
                .scanner
                .service(ip, port)
                .unwrap_or_else(|e| e.to_string());
            let _ = writeln!(text, "{} Port {} is used for: {}", label, port, service);
        }

        if record.payload.is_empty() {
            text.push_str("\nPayload not available for this packet.\n");
            return Some(DetailOutcome::Description(text));
        }

        let decoded = record.payload_text();
        let _ = writeln!(text, "\nThe payload is {}", record.payload_hex());
        let _ = writeln!(text, "With translation, it is: {}", decoded);

        if cancelled() {
            return None;
        }
        match self.summarizer.summarize(&decoded) {
            Ok(reply) => {
                text.push_str(&wrap_words(&format!("ai says: {}", reply), WRAP_COLUMNS));
                Some(DetailOutcome::Description(text))
            }
            Err(e) => Some(DetailOutcome::Error(e.to_string())),
        }
    }
}

struct Shared {
    tickets: DashMap<Uuid, Arc<TicketState>>,
    events: UnboundedSender<EngineEvent>,
}

impl Shared {
    /// Deliver the one result for a ticket; later calls are ignored
    fn deliver(&self, ticket: DetailTicket, state: &TicketState, outcome: DetailOutcome) -> bool {
        if state
            .delivered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.tickets.remove(&ticket.request_id);

        let result = DetailResult {
            request_id: ticket.request_id,
            packet_id: ticket.packet_id,
            outcome,
        };
        if self.events.send(EngineEvent::DetailReady(result)).is_err() {
            debug!("No event listener for detail {}", ticket.request_id);
        }
        true
    }
}

/// Fixed pool of worker threads serving detail requests.
///
/// Requests are queued and picked up by the first free worker. Every request
/// yields exactly one `EngineEvent::DetailReady`, whether it succeeds, fails,
/// panics or is cancelled.
pub struct DetailPipeline {
    sender: Mutex<Option<Sender<Job>>>,
    shared: Arc<Shared>,
}

impl DetailPipeline {
    pub fn new(describer: Describer, workers: usize, events: UnboundedSender<EngineEvent>) -> AppResult<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let describer = Arc::new(describer);
        let shared = Arc::new(Shared {
            tickets: DashMap::new(),
            events,
        });

        let workers = workers.max(1);
        for index in 0..workers {
            let receiver = receiver.clone();
            let describer = describer.clone();
            let shared = shared.clone();
            thread::Builder::new()
                .name(format!("detail-worker-{}", index))
                .spawn(move || worker_loop(receiver, describer, shared))?;
        }
        info!("Detail pipeline started with {} workers", workers);

        Ok(DetailPipeline {
            sender: Mutex::new(Some(sender)),
            shared,
        })
    }

    /// Queue a record for description. Returns without waiting.
    pub fn request_detail(&self, record: Arc<PacketRecord>) -> AppResult<DetailTicket> {
        let ticket = DetailTicket {
            request_id: Uuid::new_v4(),
            packet_id: record.id,
        };
        let state = Arc::new(TicketState::new(ticket.packet_id));
        self.shared.tickets.insert(ticket.request_id, state.clone());

        let sent = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(Job { ticket, record, state }).is_ok(),
            None => false,
        };
        if !sent {
            self.shared.tickets.remove(&ticket.request_id);
            return Err(AppError::PipelineClosed);
        }

        debug!("Queued detail request {} for packet {}", ticket.request_id, ticket.packet_id);
        Ok(ticket)
    }

    /// Cancel an outstanding request; its cancelled result is delivered now
    pub fn cancel(&self, request_id: Uuid) -> AppResult<DetailTicket> {
        let ticket_state = self
            .shared
            .tickets
            .get(&request_id)
            .map(|entry| entry.value().clone())
            .ok_or(AppError::UnknownRequest(request_id))?;
        ticket_state.cancelled.store(true, Ordering::SeqCst);

        let ticket = DetailTicket {
            request_id,
            packet_id: ticket_state.packet_id,
        };
        if !self.shared.deliver(ticket, &ticket_state, DetailOutcome::Cancelled) {
            // A worker delivered first
            return Err(AppError::UnknownRequest(request_id));
        }
        info!("Cancelled detail request {}", request_id);
        Ok(ticket)
    }

    /// Number of requests that have not produced their result yet
    pub fn in_flight(&self) -> usize {
        self.shared.tickets.len()
    }

    /// Stop accepting requests and cancel everything outstanding.
    /// Workers exit once the queue is drained.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        let outstanding: Vec<Uuid> = self.shared.tickets.iter().map(|t| *t.key()).collect();
        for request_id in outstanding {
            let _ = self.cancel(request_id);
        }
    }
}

impl Drop for DetailPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: Arc<Mutex<Receiver<Job>>>, describer: Arc<Describer>, shared: Arc<Shared>) {
    loop {
        let job = receiver.lock().recv();
        let Ok(job) = job else {
            break;
        };
        if job.state.is_cancelled() {
            continue;
        }

        let state = job.state.clone();
        let outcome = match catch_unwind(AssertUnwindSafe(|| {
            describer.describe(&job.record, &|| state.is_cancelled())
        })) {
            Ok(Some(outcome)) => outcome,
            Ok(None) => continue,
            Err(_) => {
                warn!("Detail worker panicked on packet {}", job.ticket.packet_id);
                DetailOutcome::Error(format!(
                    "internal error while describing packet {}",
                    job.ticket.packet_id
                ))
            }
        };
        shared.deliver(job.ticket, &job.state, outcome);
    }
    debug!("Detail worker exiting");
}
