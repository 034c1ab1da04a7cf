use anyhow::{anyhow, Result};
use log::{log_enabled, trace, Level};
use pnet::packet::{
    ethernet::{EtherType, EtherTypes, EthernetPacket},
    ip::{IpNextHeaderProtocol, IpNextHeaderProtocols},
    ipv4::Ipv4Packet,
    ipv6::Ipv6Packet,
    tcp::TcpPacket,
    udp::UdpPacket,
    Packet as PnetPacket,
};
use std::net::IpAddr;

use crate::models::packet::{LinkType, TransportProtocol};

/// Linux cooked capture (SLL) header length
const SLL_HEADER_LEN: usize = 16;

/// Transport-layer fields of a TCP or UDP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSegment {
    pub protocol: TransportProtocol,
    pub source_port: u16,
    pub destination_port: u16,
    pub payload: Vec<u8>,
}

/// The network and transport fields the sniffer cares about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedPacket {
    pub source_ip: Option<IpAddr>,
    pub destination_ip: Option<IpAddr>,
    pub transport: Option<TransportSegment>,
    /// Short name of the innermost protocol seen, for logging
    pub protocol_name: String,
}

impl DecodedPacket {
    /// Both addresses, when the frame carried an IP header
    pub fn addresses(&self) -> Option<(IpAddr, IpAddr)> {
        Some((self.source_ip?, self.destination_ip?))
    }
}

/// Parses raw frames into the fields used for conversation tracking
#[derive(Debug, Default)]
pub struct PacketParser {}

impl PacketParser {
    /// Create a new packet parser
    pub fn new() -> Self {
        Self {}
    }

    /// Parse a captured frame according to its link type
    pub fn parse_packet(&self, data: &[u8], link_type: LinkType) -> Result<DecodedPacket> {
        let mut packet = DecodedPacket {
            protocol_name: "Unknown".to_string(),
            ..DecodedPacket::default()
        };

        match link_type {
            LinkType::Ethernet => {
                let eth_packet =
                    EthernetPacket::new(data).ok_or_else(|| anyhow!("Failed to parse Ethernet packet"))?;
                if log_enabled!(Level::Trace) {
                    trace!(
                        "EtherType: {:?}, src: {}, dst: {}",
                        eth_packet.get_ethertype(),
                        eth_packet.get_source(),
                        eth_packet.get_destination()
                    );
                }
                self.parse_ethertype(eth_packet.get_ethertype(), eth_packet.payload(), &mut packet)?;
            }
            LinkType::LinuxSll => {
                if data.len() < SLL_HEADER_LEN {
                    return Err(anyhow!("Failed to parse Linux cooked header"));
                }
                let ethertype = EtherType(u16::from_be_bytes([data[14], data[15]]));
                self.parse_ethertype(ethertype, &data[SLL_HEADER_LEN..], &mut packet)?;
            }
            LinkType::RawIp => match data.first().map(|b| b >> 4) {
                Some(4) => self.parse_ipv4(data, &mut packet)?,
                Some(6) => self.parse_ipv6(data, &mut packet)?,
                Some(version) => packet.protocol_name = format!("IP version {}", version),
                None => return Err(anyhow!("Empty raw IP packet")),
            },
        }

        Ok(packet)
    }

    fn parse_ethertype(&self, ethertype: EtherType, data: &[u8], packet: &mut DecodedPacket) -> Result<()> {
        match ethertype {
            EtherTypes::Ipv4 => self.parse_ipv4(data, packet),
            EtherTypes::Ipv6 => self.parse_ipv6(data, packet),
            _ => {
                packet.protocol_name = format!("Other ({:?})", ethertype);
                Ok(())
            }
        }
    }

    /// Parse IPv4 packet
    fn parse_ipv4(&self, data: &[u8], packet: &mut DecodedPacket) -> Result<()> {
        let ipv4_packet = Ipv4Packet::new(data).ok_or_else(|| anyhow!("Failed to parse IPv4 packet"))?;

        packet.source_ip = Some(IpAddr::V4(ipv4_packet.get_source()));
        packet.destination_ip = Some(IpAddr::V4(ipv4_packet.get_destination()));

        if log_enabled!(Level::Trace) {
            trace!(
                "IPv4 - src: {}, dst: {}, proto: {:?}",
                ipv4_packet.get_source(),
                ipv4_packet.get_destination(),
                ipv4_packet.get_next_level_protocol()
            );
        }

        self.parse_transport_protocol(ipv4_packet.get_next_level_protocol(), ipv4_packet.payload(), packet)
    }

    /// Parse IPv6 packet
    fn parse_ipv6(&self, data: &[u8], packet: &mut DecodedPacket) -> Result<()> {
        let ipv6_packet = Ipv6Packet::new(data).ok_or_else(|| anyhow!("Failed to parse IPv6 packet"))?;

        packet.source_ip = Some(IpAddr::V6(ipv6_packet.get_source()));
        packet.destination_ip = Some(IpAddr::V6(ipv6_packet.get_destination()));

        self.parse_transport_protocol(ipv6_packet.get_next_header(), ipv6_packet.payload(), packet)
    }

    /// Parse transport layer protocols
    fn parse_transport_protocol(
        &self,
        proto: IpNextHeaderProtocol,
        data: &[u8],
        packet: &mut DecodedPacket,
    ) -> Result<()> {
        if log_enabled!(Level::Trace) {
            trace!("Transport protocol: {:?}, data length: {}", proto, data.len());
        }

        match proto {
            IpNextHeaderProtocols::Tcp => {
                let tcp_packet = TcpPacket::new(data).ok_or_else(|| anyhow!("Failed to parse TCP packet"))?;
                packet.protocol_name = "TCP".to_string();
                packet.transport = Some(TransportSegment {
                    protocol: TransportProtocol::Tcp,
                    source_port: tcp_packet.get_source(),
                    destination_port: tcp_packet.get_destination(),
                    payload: tcp_packet.payload().to_vec(),
                });
            }
            IpNextHeaderProtocols::Udp => {
                let udp_packet = UdpPacket::new(data).ok_or_else(|| anyhow!("Failed to parse UDP packet"))?;
                packet.protocol_name = "UDP".to_string();
                packet.transport = Some(TransportSegment {
                    protocol: TransportProtocol::Udp,
                    source_port: udp_packet.get_source(),
                    destination_port: udp_packet.get_destination(),
                    payload: udp_packet.payload().to_vec(),
                });
            }
            _ => {
                packet.protocol_name = format!("IP({:?})", proto);
            }
        }

        Ok(())
    }
}
