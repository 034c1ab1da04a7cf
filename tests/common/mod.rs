#![allow(dead_code)]

use chrono::Utc;
use parking_lot::Mutex;
use pnet::packet::ethernet::{EtherTypes, MutableEthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::{self, MutableIpv4Packet};
use pnet::packet::tcp::MutableTcpPacket;
use pnet::packet::udp::MutableUdpPacket;
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use sniffsight::capture::classifier::Classifier;
use sniffsight::capture::engine::{CaptureEngine, Ingestor};
use sniffsight::capture::source::{PacketEvent, PacketSource, SourceError, SourceFactory};
use sniffsight::detail::pipeline::{Describer, DetailPipeline};
use sniffsight::detail::scanner::WellKnownPorts;
use sniffsight::detail::summarizer::{SummarizeError, Summarizer};
use sniffsight::dispatch::Dispatcher;
use sniffsight::models::detail::EngineEvent;
use sniffsight::models::packet::LinkType;
use sniffsight::resolve::cache::{ResolutionCache, ResolveError, ReverseResolver};

pub const CLIENT: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub const SERVER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

/// Resolver for an offline test network: nothing has a PTR record
pub struct NoDns;

impl ReverseResolver for NoDns {
    fn reverse(&self, addr: IpAddr) -> Result<String, ResolveError> {
        Err(ResolveError::NotFound(addr))
    }
}

/// Resolver whose lookups block until the gate sender is dropped
pub struct GatedDns {
    gate: Mutex<Receiver<()>>,
}

impl GatedDns {
    pub fn new(gate: Receiver<()>) -> Self {
        GatedDns {
            gate: Mutex::new(gate),
        }
    }
}

impl ReverseResolver for GatedDns {
    fn reverse(&self, addr: IpAddr) -> Result<String, ResolveError> {
        let _ = self.gate.lock().recv_timeout(Duration::from_secs(10));
        Err(ResolveError::NotFound(addr))
    }
}

pub struct CannedSummary;

impl Summarizer for CannedSummary {
    fn summarize(&self, _payload_text: &str) -> Result<String, SummarizeError> {
        Ok("A plain HTTP GET request for the site root.".to_string())
    }
}

fn ipv4(src: Ipv4Addr, dst: Ipv4Addr, proto: IpNextHeaderProtocol, transport: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 20 + transport.len()];
    let mut ip = MutableIpv4Packet::new(&mut buf).unwrap();
    ip.set_version(4);
    ip.set_header_length(5);
    ip.set_total_length((20 + transport.len()) as u16);
    ip.set_ttl(64);
    ip.set_next_level_protocol(proto);
    ip.set_source(src);
    ip.set_destination(dst);
    ip.set_payload(transport);
    let checksum = ipv4::checksum(&ip.to_immutable());
    ip.set_checksum(checksum);
    buf
}

fn ethernet(payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 14 + payload.len()];
    let mut eth = MutableEthernetPacket::new(&mut buf).unwrap();
    eth.set_ethertype(EtherTypes::Ipv4);
    eth.set_payload(payload);
    buf
}

/// Ethernet/IPv4/TCP frame
pub fn tcp_frame(src: Ipv4Addr, sport: u16, dst: Ipv4Addr, dport: u16, payload: &[u8]) -> Vec<u8> {
    let mut segment = vec![0u8; 20 + payload.len()];
    let mut tcp = MutableTcpPacket::new(&mut segment).unwrap();
    tcp.set_source(sport);
    tcp.set_destination(dport);
    tcp.set_data_offset(5);
    tcp.set_window(64240);
    tcp.set_payload(payload);
    ethernet(&ipv4(src, dst, IpNextHeaderProtocols::Tcp, &segment))
}

/// Ethernet/IPv4/UDP frame
pub fn udp_frame(src: Ipv4Addr, sport: u16, dst: Ipv4Addr, dport: u16, payload: &[u8]) -> Vec<u8> {
    let mut datagram = vec![0u8; 8 + payload.len()];
    let mut udp = MutableUdpPacket::new(&mut datagram).unwrap();
    udp.set_source(sport);
    udp.set_destination(dport);
    udp.set_length((8 + payload.len()) as u16);
    udp.set_payload(payload);
    ethernet(&ipv4(src, dst, IpNextHeaderProtocols::Udp, &datagram))
}

/// Ethernet/IPv4/ICMP echo request
pub fn icmp_frame(src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
    ethernet(&ipv4(src, dst, IpNextHeaderProtocols::Icmp, &[8, 0, 0, 0, 0, 1, 0, 1]))
}

pub fn http_request() -> Vec<u8> {
    tcp_frame(CLIENT, 1234, SERVER, 80, b"GET / HTTP/1.1")
}

pub fn event(data: Vec<u8>) -> PacketEvent {
    PacketEvent {
        timestamp: Utc::now(),
        link_type: LinkType::Ethernet,
        wire_len: data.len(),
        data,
    }
}

/// What a scripted source does once its frames run out
#[derive(Clone)]
pub enum Ending {
    Exhausted,
    Fails(String),
}

/// Replays frames, then ends or fails
pub struct ScriptedSource {
    frames: VecDeque<Vec<u8>>,
    ending: Ending,
}

impl PacketSource for ScriptedSource {
    fn next_packet(&mut self) -> Result<Option<PacketEvent>, SourceError> {
        match self.frames.pop_front() {
            Some(frame) => Ok(Some(event(frame))),
            None => match &self.ending {
                Ending::Exhausted => Err(SourceError::EndOfCapture),
                Ending::Fails(message) => Err(SourceError::Read(message.clone())),
            },
        }
    }
}

/// Yields nothing until its gate sender is dropped, then times out forever
pub struct GatedSource {
    gate: Receiver<()>,
}

impl PacketSource for GatedSource {
    fn next_packet(&mut self) -> Result<Option<PacketEvent>, SourceError> {
        match self.gate.recv_timeout(Duration::from_secs(30)) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(Duration::from_millis(1));
                Ok(None)
            }
        }
    }
}

/// Hands out prepared sources in order
#[derive(Default)]
pub struct FakeFactory {
    sources: Mutex<VecDeque<Box<dyn PacketSource>>>,
}

impl FakeFactory {
    pub fn scripted(self: &Arc<Self>, frames: Vec<Vec<u8>>, ending: Ending) -> Arc<Self> {
        self.sources.lock().push_back(Box::new(ScriptedSource {
            frames: frames.into(),
            ending,
        }));
        self.clone()
    }

    pub fn gated(self: &Arc<Self>, gate: Receiver<()>) -> Arc<Self> {
        self.sources.lock().push_back(Box::new(GatedSource { gate }));
        self.clone()
    }
}

impl SourceFactory for FakeFactory {
    fn open(&self, interface: &str) -> Result<Box<dyn PacketSource>, SourceError> {
        self.sources.lock().pop_front().ok_or_else(|| SourceError::Open {
            interface: interface.to_string(),
            message: "no such device".to_string(),
        })
    }
}

pub fn cache() -> Arc<ResolutionCache> {
    cache_with(Arc::new(NoDns))
}

fn cache_with(resolver: Arc<dyn ReverseResolver>) -> Arc<ResolutionCache> {
    Arc::new(ResolutionCache::new(resolver, 64))
}

pub fn engine(factory: Arc<FakeFactory>) -> (CaptureEngine, UnboundedReceiver<EngineEvent>) {
    let (tx, rx) = unbounded_channel();
    (engine_with(factory, tx), rx)
}

fn engine_with(factory: Arc<FakeFactory>, events: UnboundedSender<EngineEvent>) -> CaptureEngine {
    engine_on(factory, cache(), events)
}

fn engine_on(
    factory: Arc<FakeFactory>,
    cache: Arc<ResolutionCache>,
    events: UnboundedSender<EngineEvent>,
) -> CaptureEngine {
    let ingestor = Arc::new(Ingestor::new(cache, Classifier::default()));
    CaptureEngine::new(factory, ingestor, events)
}

/// Dispatcher over fakes: no DNS, table port lookup, canned model replies
pub fn dispatcher(factory: Arc<FakeFactory>) -> (Dispatcher, UnboundedReceiver<EngineEvent>) {
    dispatcher_with_resolver(factory, Arc::new(NoDns))
}

pub fn dispatcher_with_resolver(
    factory: Arc<FakeFactory>,
    resolver: Arc<dyn ReverseResolver>,
) -> (Dispatcher, UnboundedReceiver<EngineEvent>) {
    let (tx, rx) = unbounded_channel();
    let cache = cache_with(resolver);
    let engine = engine_on(factory, cache.clone(), tx.clone());
    let describer = Describer::new(Arc::new(WellKnownPorts), Arc::new(CannedSummary), cache);
    let pipeline = DetailPipeline::new(describer, 2, tx).unwrap();
    (Dispatcher::new(engine, pipeline), rx)
}

/// Drain events until `pred` matches or the deadline passes
pub fn wait_for_event(
    rx: &mut UnboundedReceiver<EngineEvent>,
    pred: impl Fn(&EngineEvent) -> bool,
) -> Option<EngineEvent> {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        match rx.try_recv() {
            Ok(event) if pred(&event) => return Some(event),
            Ok(_) => continue,
            Err(_) => std::thread::sleep(Duration::from_millis(5)),
        }
    }
    None
}

/// Everything currently queued on the channel
pub fn drain(rx: &mut UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
