use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info, warn};
use pcap::{Activated, Active, Capture, Offline};
use std::path::Path;
use thiserror::Error;

use crate::models::packet::LinkType;

/// One frame handed over by a packet source
#[derive(Debug, Clone)]
pub struct PacketEvent {
    /// Capture timestamp reported by the source
    pub timestamp: DateTime<Utc>,

    /// Framing of `data`
    pub link_type: LinkType,

    /// Captured bytes (at most snaplen)
    pub data: Vec<u8>,

    /// Original length on the wire
    pub wire_len: usize,
}

/// Capture source errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open {interface}: {message}")]
    Open { interface: String, message: String },

    #[error("invalid capture filter '{filter}': {message}")]
    Filter { filter: String, message: String },

    #[error("unsupported link type (DLT {0})")]
    UnsupportedLinkType(i32),

    #[error("capture read failed: {0}")]
    Read(String),

    /// The source has no more frames (end of a capture file)
    #[error("end of capture")]
    EndOfCapture,
}

/// A stream of captured frames.
///
/// `Ok(None)` means the read timed out without a frame; callers use it to
/// check for cancellation. Any `Err` ends the session.
pub trait PacketSource: Send {
    fn next_packet(&mut self) -> Result<Option<PacketEvent>, SourceError>;
}

/// Opens packet sources by interface name
pub trait SourceFactory: Send + Sync {
    fn open(&self, interface: &str) -> Result<Box<dyn PacketSource>, SourceError>;
}

/// Settings for live captures
#[derive(Debug, Clone)]
pub struct LiveCaptureOptions {
    pub promiscuous: bool,
    pub snaplen: i32,
    pub read_timeout_ms: i32,
    pub filter: Option<String>,
}

impl Default for LiveCaptureOptions {
    fn default() -> Self {
        LiveCaptureOptions {
            promiscuous: false,
            snaplen: 65535,
            read_timeout_ms: 500,
            filter: None,
        }
    }
}

/// libpcap-backed source, live or offline
pub struct PcapSource<T: Activated + ?Sized> {
    capture: Capture<T>,
    link_type: LinkType,
}

impl<T: Activated + ?Sized> PcapSource<T> {
    fn with_capture(capture: Capture<T>) -> Result<Self, SourceError> {
        let dlt = capture.get_datalink().0;
        let link_type = LinkType::from_dlt(dlt).ok_or(SourceError::UnsupportedLinkType(dlt))?;
        Ok(PcapSource { capture, link_type })
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }
}

impl PcapSource<Active> {
    /// Open a live capture on `interface`
    pub fn open_live(interface: &str, options: &LiveCaptureOptions) -> Result<Self, SourceError> {
        let open_error = |e: pcap::Error| SourceError::Open {
            interface: interface.to_string(),
            message: e.to_string(),
        };

        info!(
            "Opening capture on {} (promiscuous: {}, snaplen: {}, timeout: {}ms)",
            interface, options.promiscuous, options.snaplen, options.read_timeout_ms
        );
        let mut capture = Capture::from_device(interface)
            .map_err(open_error)?
            .promisc(options.promiscuous)
            .snaplen(options.snaplen)
            .timeout(options.read_timeout_ms)
            .open()
            .map_err(open_error)?;

        if let Some(filter) = &options.filter {
            capture
                .filter(filter, true)
                .map_err(|e| SourceError::Filter {
                    filter: filter.clone(),
                    message: e.to_string(),
                })?;
            info!("Filter applied successfully: {}", filter);
        }

        Self::with_capture(capture)
    }
}

impl PcapSource<Offline> {
    /// Open a pcap or pcapng file
    pub fn open_file(path: &Path) -> Result<Self, SourceError> {
        let capture = Capture::from_file(path).map_err(|e| SourceError::Open {
            interface: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::with_capture(capture)
    }
}

impl<T: Activated + ?Sized> PacketSource for PcapSource<T>
where
    Capture<T>: Send,
{
    fn next_packet(&mut self) -> Result<Option<PacketEvent>, SourceError> {
        match self.capture.next_packet() {
            Ok(packet) => {
                let header = packet.header;
                if header.caplen as usize != packet.data.len() {
                    debug!(
                        "Packet length mismatch: header says {} but data is {} bytes",
                        header.caplen,
                        packet.data.len()
                    );
                }

                let timestamp = Utc
                    .timestamp_opt(header.ts.tv_sec as i64, (header.ts.tv_usec as u32) * 1000)
                    .single()
                    .unwrap_or_else(|| {
                        warn!("Invalid packet timestamp, using current time");
                        Utc::now()
                    });

                Ok(Some(PacketEvent {
                    timestamp,
                    link_type: self.link_type,
                    data: packet.data.to_vec(),
                    wire_len: header.len as usize,
                }))
            }
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(pcap::Error::NoMorePackets) => Err(SourceError::EndOfCapture),
            Err(e) => Err(SourceError::Read(e.to_string())),
        }
    }
}

/// Opens live pcap captures with fixed options
#[derive(Debug, Clone, Default)]
pub struct PcapSourceFactory {
    options: LiveCaptureOptions,
}

impl PcapSourceFactory {
    pub fn new(options: LiveCaptureOptions) -> Self {
        PcapSourceFactory { options }
    }
}

impl SourceFactory for PcapSourceFactory {
    fn open(&self, interface: &str) -> Result<Box<dyn PacketSource>, SourceError> {
        let source = PcapSource::open_live(interface, &self.options)?;
        Ok(Box::new(source))
    }
}
