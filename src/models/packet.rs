use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::capture::classifier::decode_ascii;
use crate::models::conversation::ConversationKey;

/// Transport protocols whose payload the sniffer tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportProtocol {
    Tcp,
    Udp,
}

impl TransportProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Tcp => "TCP",
            TransportProtocol::Udp => "UDP",
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link-layer framing of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkType {
    Ethernet,
    RawIp,
    LinuxSll,
}

impl LinkType {
    /// Map a libpcap DLT value onto a supported framing
    pub fn from_dlt(dlt: i32) -> Option<Self> {
        match dlt {
            1 => Some(LinkType::Ethernet),
            12 | 101 | 228 | 229 => Some(LinkType::RawIp),
            113 => Some(LinkType::LinuxSll),
            _ => None,
        }
    }

    /// DLT value written to capture files
    pub fn dlt(&self) -> i32 {
        match self {
            LinkType::Ethernet => 1,
            LinkType::RawIp => 101,
            LinkType::LinuxSll => 113,
        }
    }
}

/// A captured packet that carried a transport payload.
///
/// Records are built once by the capture engine and shared as
/// `Arc<PacketRecord>` between the conversation store, snapshots and
/// detail requests; nothing mutates them afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct PacketRecord {
    /// Unique identifier for this packet
    pub id: u64,

    /// Timestamp when the packet was captured
    pub timestamp: DateTime<Utc>,

    /// Interface (or capture file) the packet came from
    pub interface: String,

    /// Framing of `raw_data`
    pub link_type: LinkType,

    /// Length of the packet on the wire
    pub length: usize,

    /// Transport protocol
    pub protocol: TransportProtocol,

    /// Source IP address
    pub source_ip: IpAddr,

    /// Destination IP address
    pub destination_ip: IpAddr,

    /// Source port
    pub source_port: u16,

    /// Destination port
    pub destination_port: u16,

    /// Transport payload
    #[serde(skip_serializing)]
    pub payload: Vec<u8>,

    /// The raw frame bytes, kept for capture file export
    #[serde(skip_serializing)]
    pub raw_data: Vec<u8>,
}

impl PacketRecord {
    /// Payload rendered as colon separated hex, the way packet tools print it
    pub fn payload_hex(&self) -> String {
        self.payload
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Payload decoded with the readability scheme
    pub fn payload_text(&self) -> String {
        decode_ascii(&self.payload)
    }
}

/// A more concise representation of a packet for list views
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketSummary {
    /// Unique identifier for this packet
    pub id: u64,

    /// Timestamp when the packet was captured
    pub timestamp: DateTime<Utc>,

    /// Protocol (TCP or UDP)
    pub protocol: TransportProtocol,

    /// Source address (IP:port)
    pub source: String,

    /// Resolved name of the source address
    pub source_hostname: String,

    /// Destination address (IP:port)
    pub destination: String,

    /// Resolved name of the destination address
    pub destination_hostname: String,

    /// Length of the packet in bytes
    pub length: usize,

    /// Number of payload bytes
    pub payload_length: usize,

    /// Start of the decoded payload
    pub preview: String,
}

const PREVIEW_CHARS: usize = 80;

impl PacketSummary {
    /// Summarize a record filed under `key`, which carries the hostnames
    pub fn new(packet: &PacketRecord, key: &ConversationKey) -> Self {
        PacketSummary {
            id: packet.id,
            timestamp: packet.timestamp,
            protocol: packet.protocol,
            source: format_endpoint(packet.source_ip, packet.source_port),
            source_hostname: key.source_hostname.clone(),
            destination: format_endpoint(packet.destination_ip, packet.destination_port),
            destination_hostname: key.destination_hostname.clone(),
            length: packet.length,
            payload_length: packet.payload.len(),
            preview: packet.payload_text().chars().take(PREVIEW_CHARS).collect(),
        }
    }
}

impl fmt::Display for PacketSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "From {} ({}) to {} ({}), Protocol: {}, Length: {}",
            self.source_hostname,
            self.source,
            self.destination_hostname,
            self.destination,
            self.protocol,
            self.length
        )
    }
}

/// Format an endpoint, bracketing IPv6 addresses
pub fn format_endpoint(ip: IpAddr, port: u16) -> String {
    match ip {
        IpAddr::V4(addr) => format!("{}:{}", addr, port),
        IpAddr::V6(addr) => format!("[{}]:{}", addr, port),
    }
}
