//! Capture file export and import.
//!
//! Both directions go through libpcap: saving uses a dead capture handle and
//! its savefile, loading accepts pcap and pcapng.

use log::{info, warn};
use pcap::{Capture, Linktype, Packet, PacketHeader};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::capture::source::{PacketSource, PcapSource, SourceError};
use crate::models::packet::{LinkType, PacketRecord};

/// Largest frame the dead capture handle accepts
const SAVE_SNAPLEN: usize = 65535;

/// Capture file errors
#[derive(Debug, Error)]
pub enum CaptureFileError {
    #[error("cannot write capture file: {0}")]
    Pcap(#[from] pcap::Error),

    #[error("cannot read capture file: {0}")]
    Source(#[from] SourceError),
}

/// libpcap record header for `record`, or `None` when its time or length
/// cannot be represented in a pcap file
fn record_header(record: &PacketRecord, caplen: usize) -> Option<PacketHeader> {
    // Classic pcap stores seconds as an unsigned 32 bit value
    let seconds = u32::try_from(record.timestamp.timestamp()).ok()?;
    Some(PacketHeader {
        ts: libc::timeval {
            tv_sec: seconds.try_into().ok()?,
            tv_usec: record.timestamp.timestamp_subsec_micros().try_into().ok()?,
        },
        caplen: u32::try_from(caplen).ok()?,
        len: u32::try_from(record.length.max(caplen)).ok()?,
    })
}

/// Save records to a pcap file, returning how many were written.
///
/// The file link type is taken from the first record; records with another
/// framing cannot share the file and are skipped, as are records whose
/// timestamp falls outside the pcap range.
pub fn save(records: &[Arc<PacketRecord>], path: &Path) -> Result<usize, CaptureFileError> {
    let link_type = records
        .first()
        .map(|r| r.link_type)
        .unwrap_or(LinkType::Ethernet);

    let capture = Capture::dead(Linktype(link_type.dlt()))?;
    let mut savefile = capture.savefile(path)?;

    let mut written = 0;
    for record in records {
        if record.link_type != link_type {
            warn!(
                "Skipping packet {} with link type {:?} (file uses {:?})",
                record.id, record.link_type, link_type
            );
            continue;
        }

        let captured = &record.raw_data[..record.raw_data.len().min(SAVE_SNAPLEN)];
        let Some(header) = record_header(record, captured.len()) else {
            warn!(
                "Skipping packet {} captured at {}, not representable in pcap",
                record.id, record.timestamp
            );
            continue;
        };
        savefile.write(&Packet::new(&header, captured));
        written += 1;
    }

    savefile.flush()?;
    info!("Saved {} packets to {}", written, path.display());
    Ok(written)
}

/// Open a pcap or pcapng file as a packet source
pub fn open(path: &Path) -> Result<Box<dyn PacketSource>, CaptureFileError> {
    let source = PcapSource::open_file(path)?;
    info!(
        "Opened capture file {} ({:?})",
        path.display(),
        source.link_type()
    );
    Ok(Box::new(source))
}
