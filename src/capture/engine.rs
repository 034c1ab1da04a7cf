use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::UnboundedSender;

use crate::capture::classifier::Classifier;
use crate::capture::parser::PacketParser;
use crate::capture::pcap_file;
use crate::capture::source::{PacketEvent, PacketSource, SourceError, SourceFactory};
use crate::capture::store::ConversationStore;
use crate::models::conversation::ConversationKey;
use crate::models::detail::EngineEvent;
use crate::models::packet::PacketRecord;
use crate::models::stats::{SessionCounters, SessionStats};
use crate::resolve::cache::ResolutionCache;
use crate::utils::error::{AppError, AppResult};

/// Lifecycle of the capture engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Running,
    /// A capture file is being replayed
    Loading,
    Stopping,
}

/// What happened to one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    Filed { id: u64, readable: bool },
    Skipped(&'static str),
}

/// Turns frames into filed records: decode, resolve, classify, file.
///
/// Shared by live sessions and capture file loads.
pub struct Ingestor {
    parser: PacketParser,
    cache: Arc<ResolutionCache>,
    classifier: Classifier,
    next_id: AtomicU64,
}

impl Ingestor {
    pub fn new(cache: Arc<ResolutionCache>, classifier: Classifier) -> Self {
        Ingestor {
            parser: PacketParser::new(),
            cache,
            classifier,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn ingest(&self, event: &PacketEvent, interface: &str, store: &ConversationStore) -> Result<Ingested> {
        let decoded = self
            .parser
            .parse_packet(&event.data, event.link_type)
            .with_context(|| format!("{} byte frame from {}", event.data.len(), interface))?;

        let Some((source_ip, destination_ip)) = decoded.addresses() else {
            return Ok(Ingested::Skipped("no network layer"));
        };
        let Some(transport) = decoded.transport else {
            return Ok(Ingested::Skipped("not TCP or UDP"));
        };
        if transport.payload.is_empty() {
            return Ok(Ingested::Skipped("empty payload"));
        }
        if transport.payload == [0x00] {
            return Ok(Ingested::Skipped("single zero byte payload"));
        }

        let key = ConversationKey::new(
            source_ip,
            self.cache.resolve(source_ip),
            destination_ip,
            self.cache.resolve(destination_ip),
        );
        let readable = self.classifier.is_readable(&transport.payload);

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = Arc::new(PacketRecord {
            id,
            timestamp: event.timestamp,
            interface: interface.to_string(),
            link_type: event.link_type,
            length: event.wire_len,
            protocol: transport.protocol,
            source_ip,
            destination_ip,
            source_port: transport.source_port,
            destination_port: transport.destination_port,
            payload: transport.payload,
            raw_data: event.data.clone(),
        });

        trace!("Filing packet {} under {} (readable: {})", id, key, readable);
        store.file_record(key, record, readable);
        Ok(Ingested::Filed { id, readable })
    }

    /// Ingest one frame, containing any error or panic and counting the outcome
    fn process(&self, event: &PacketEvent, interface: &str, store: &ConversationStore, counters: &SessionCounters) {
        contain(interface, counters, || self.ingest(event, interface, store));
    }
}

/// Run one ingest step, counting its outcome. Errors and panics are logged
/// and counted; they never reach the caller.
fn contain(interface: &str, counters: &SessionCounters, step: impl FnOnce() -> Result<Ingested>) {
    counters.packet_seen();
    match catch_unwind(AssertUnwindSafe(step)) {
        Ok(Ok(Ingested::Filed { .. })) => counters.packet_filed(),
        Ok(Ok(Ingested::Skipped(reason))) => {
            trace!("Skipping packet: {}", reason);
            counters.packet_skipped();
        }
        Ok(Err(e)) => {
            debug!("Failed to process packet: {:#}", e);
            counters.packet_failed();
        }
        Err(_) => {
            warn!("Packet processing panicked on {}, continuing", interface);
            counters.packet_failed();
        }
    }
}

/// One capture session: where it reads, how far it got, and its stop flag
pub struct CaptureSession {
    interface: String,
    started_at: DateTime<Utc>,
    ended_at: Mutex<Option<DateTime<Utc>>>,
    cancelled: AtomicBool,
    counters: SessionCounters,
}

impl CaptureSession {
    fn new(interface: &str) -> Self {
        CaptureSession {
            interface: interface.to_string(),
            started_at: Utc::now(),
            ended_at: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            counters: SessionCounters::default(),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn finish(&self) -> SessionStats {
        let ended_at = Utc::now();
        *self.ended_at.lock() = Some(ended_at);
        self.counters.snapshot(Some(self.started_at), Some(ended_at))
    }

    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot(Some(self.started_at), *self.ended_at.lock())
    }
}

type CaptureOutcome = Result<SessionStats, SourceError>;

struct EngineInner {
    state: EngineState,
    session: Option<Arc<CaptureSession>>,
    handle: Option<JoinHandle<CaptureOutcome>>,
}

/// Runs capture sessions on a dedicated thread and owns the current store.
///
/// At most one session is active. `stop` only raises the cancellation flag;
/// the capture thread notices it within one source read timeout, returns the
/// engine to `Idle` and reports the end of the session on the event channel.
pub struct CaptureEngine {
    factory: Arc<dyn SourceFactory>,
    ingestor: Arc<Ingestor>,
    events: UnboundedSender<EngineEvent>,
    inner: Arc<Mutex<EngineInner>>,
    store: RwLock<Arc<ConversationStore>>,
}

impl CaptureEngine {
    pub fn new(
        factory: Arc<dyn SourceFactory>,
        ingestor: Arc<Ingestor>,
        events: UnboundedSender<EngineEvent>,
    ) -> Self {
        CaptureEngine {
            factory,
            ingestor,
            events,
            inner: Arc::new(Mutex::new(EngineInner {
                state: EngineState::Idle,
                session: None,
                handle: None,
            })),
            store: RwLock::new(Arc::new(ConversationStore::new())),
        }
    }

    /// Start capturing on `interface` into a fresh conversation store
    pub fn start(&self, interface: &str) -> AppResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != EngineState::Idle {
            let current = inner
                .session
                .as_ref()
                .map(|s| s.interface.clone())
                .unwrap_or_default();
            return Err(AppError::AlreadyRunning(current));
        }

        if let Some(handle) = inner.handle.take() {
            reap(handle);
        }

        info!("Starting capture on interface: {}", interface);
        let source = self.factory.open(interface)?;

        let store = Arc::new(ConversationStore::new());
        *self.store.write() = store.clone();
        let session = Arc::new(CaptureSession::new(interface));

        let handle = {
            let session = session.clone();
            let ingestor = self.ingestor.clone();
            let engine = self.inner.clone();
            let events = self.events.clone();
            thread::Builder::new()
                .name(format!("capture-{}", interface))
                .spawn(move || capture_thread(source, session, ingestor, store, engine, events))?
        };

        inner.state = EngineState::Running;
        inner.session = Some(session);
        inner.handle = Some(handle);

        // Sent under the lock so it always precedes the session's end event
        self.emit(EngineEvent::SessionStarted {
            interface: interface.to_string(),
        });
        Ok(())
    }

    /// Request the running session to stop. Does not wait for it.
    pub fn stop(&self) -> AppResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            EngineState::Running | EngineState::Loading => {
                if let Some(session) = &inner.session {
                    info!("Stopping packet capture on {}", session.interface);
                    session.cancel();
                }
                inner.state = EngineState::Stopping;
                Ok(())
            }
            EngineState::Stopping => {
                debug!("Stop already requested");
                Ok(())
            }
            EngineState::Idle => Err(AppError::NotRunning),
        }
    }

    /// Block until the current or last session's capture thread exits
    pub fn join(&self) -> AppResult<SessionStats> {
        let handle = self.inner.lock().handle.take().ok_or(AppError::NotRunning)?;
        match handle.join() {
            Ok(outcome) => outcome.map_err(AppError::from),
            Err(_) => Err(AppError::GenericError("capture thread panicked".to_string())),
        }
    }

    pub fn state(&self) -> EngineState {
        self.inner.lock().state
    }

    /// Interface of the current or last session
    pub fn interface(&self) -> Option<String> {
        self.inner.lock().session.as_ref().map(|s| s.interface.clone())
    }

    /// Live statistics of the current or last session
    pub fn stats(&self) -> SessionStats {
        self.inner
            .lock()
            .session
            .as_ref()
            .map(|s| s.stats())
            .unwrap_or_default()
    }

    /// The store the current or last session filed into
    pub fn store(&self) -> Arc<ConversationStore> {
        self.store.read().clone()
    }

    /// Replay a capture file into a fresh store. Only allowed while idle.
    ///
    /// The engine reports `Loading` during the replay and the lock is not held
    /// while frames are processed, so status queries and `stop` stay
    /// responsive. A stop ends the replay early and keeps what was read.
    pub fn ingest_file(&self, path: &Path) -> AppResult<SessionStats> {
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let (mut source, session, previous) = {
            let mut inner = self.inner.lock();
            if inner.state != EngineState::Idle {
                let current = inner
                    .session
                    .as_ref()
                    .map(|s| s.interface.clone())
                    .unwrap_or_default();
                return Err(AppError::AlreadyRunning(current));
            }
            if let Some(handle) = inner.handle.take() {
                reap(handle);
            }

            let source = pcap_file::open(path)?;
            let session = Arc::new(CaptureSession::new(&label));
            inner.state = EngineState::Loading;
            let previous = inner.session.replace(session.clone());
            (source, session, previous)
        };

        info!("Loading capture file {}", path.display());
        let store = Arc::new(ConversationStore::new());
        let outcome = replay(source.as_mut(), &session, &self.ingestor, &store);
        let stats = session.finish();

        let mut inner = self.inner.lock();
        inner.state = EngineState::Idle;
        match outcome {
            Ok(()) => {
                info!(
                    "Loaded {} of {} packets from {}",
                    stats.filed_packets,
                    stats.total_packets,
                    path.display()
                );
                *self.store.write() = store;
                Ok(stats)
            }
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                inner.session = previous;
                Err(e.into())
            }
        }
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            debug!("No event listener attached");
        }
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        if let Some(session) = &self.inner.lock().session {
            session.cancel();
        }
    }
}

/// Log the outcome of a finished session nobody joined
fn reap(handle: JoinHandle<CaptureOutcome>) {
    match handle.join() {
        Ok(Ok(stats)) => debug!("Previous session filed {} packets", stats.filed_packets),
        Ok(Err(e)) => debug!("Previous session failed: {}", e),
        Err(_) => warn!("Previous capture thread panicked"),
    }
}

fn capture_thread(
    source: Box<dyn PacketSource>,
    session: Arc<CaptureSession>,
    ingestor: Arc<Ingestor>,
    store: Arc<ConversationStore>,
    engine: Arc<Mutex<EngineInner>>,
    events: UnboundedSender<EngineEvent>,
) -> CaptureOutcome {
    let result = run_capture(source, &session, &ingestor, &store);
    let stats = session.finish();

    engine.lock().state = EngineState::Idle;

    let interface = session.interface.clone();
    let event = match &result {
        Ok(()) => {
            info!(
                "Capture on {} ended: {} packets read, {} filed",
                interface, stats.total_packets, stats.filed_packets
            );
            EngineEvent::SessionEnded {
                interface,
                stats: stats.clone(),
            }
        }
        Err(e) => {
            error!("Capture on {} failed: {}", interface, e);
            EngineEvent::SessionFailed {
                interface,
                error: e.to_string(),
                stats: stats.clone(),
            }
        }
    };
    if events.send(event).is_err() {
        debug!("No event listener attached");
    }

    result.map(|()| stats)
}

fn replay(
    source: &mut dyn PacketSource,
    session: &CaptureSession,
    ingestor: &Ingestor,
    store: &ConversationStore,
) -> Result<(), SourceError> {
    while !session.is_cancelled() {
        match source.next_packet() {
            Ok(Some(event)) => ingestor.process(&event, &session.interface, store, &session.counters),
            Ok(None) => continue,
            Err(SourceError::EndOfCapture) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
    info!("Loading {} stopped early", session.interface);
    Ok(())
}

fn run_capture(
    mut source: Box<dyn PacketSource>,
    session: &CaptureSession,
    ingestor: &Ingestor,
    store: &ConversationStore,
) -> Result<(), SourceError> {
    info!("Starting capture loop for interface: {}", session.interface);

    while !session.is_cancelled() {
        let next = catch_unwind(AssertUnwindSafe(|| source.next_packet()))
            .unwrap_or_else(|_| Err(SourceError::Read("packet source panicked".to_string())));

        match next {
            Ok(Some(event)) => ingestor.process(&event, &session.interface, store, &session.counters),
            Ok(None) => trace!("Packet capture timed out, continuing"),
            Err(SourceError::EndOfCapture) => {
                info!("Packet source on {} is exhausted", session.interface);
                break;
            }
            Err(e) => return Err(e),
        }
    }

    info!("Capture loop stopped for interface: {}", session.interface);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn panicking_step_is_counted_and_contained() {
        let counters = SessionCounters::default();

        contain("eth0", &counters, || panic!("malformed frame"));
        contain("eth0", &counters, || Err(anyhow!("truncated header")));
        contain("eth0", &counters, || Ok(Ingested::Skipped("empty payload")));
        contain("eth0", &counters, || Ok(Ingested::Filed { id: 1, readable: true }));

        let stats = counters.snapshot(None, None);
        assert_eq!(stats.total_packets, 4);
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.skipped_packets, 1);
        assert_eq!(stats.filed_packets, 1);
    }
}
