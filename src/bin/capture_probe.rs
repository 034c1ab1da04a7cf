//! Opens a live capture the same way the sniffer does and decodes a few
//! frames, to check libpcap permissions and link type support.

use pcap::Device;
use std::env;
use std::process;

use sniffsight::capture::classifier::is_readable;
use sniffsight::capture::parser::PacketParser;
use sniffsight::capture::source::{LiveCaptureOptions, PacketSource, PcapSource};

const FRAMES: usize = 3;
const MAX_TIMEOUTS: usize = 20;

fn main() {
    println!("Capture probe");

    let interface_name = match env::args().nth(1) {
        Some(name) => name,
        None => {
            println!("No interface specified, listing available interfaces:");
            let devices = match Device::list() {
                Ok(devices) => devices,
                Err(e) => {
                    eprintln!("Failed to list devices: {}", e);
                    process::exit(1);
                }
            };
            for (i, device) in devices.iter().enumerate() {
                println!("  {}: {} - {}", i, device.name, device.desc.as_deref().unwrap_or("No description"));
            }
            match devices.first() {
                Some(device) => {
                    println!("Using first interface by default");
                    device.name.clone()
                }
                None => {
                    eprintln!("No capture devices found!");
                    process::exit(1);
                }
            }
        }
    };

    println!("Opening capture on interface: {}", interface_name);
    let options = LiveCaptureOptions {
        promiscuous: true,
        ..LiveCaptureOptions::default()
    };
    let mut source = match PcapSource::open_live(&interface_name, &options) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to open capture: {}", e);
            process::exit(1);
        }
    };
    println!("Capture opened, link type {:?}", source.link_type());

    let parser = PacketParser::new();
    let mut captured = 0;
    let mut timeouts = 0;
    while captured < FRAMES && timeouts < MAX_TIMEOUTS {
        match source.next_packet() {
            Ok(Some(event)) => {
                captured += 1;
                match parser.parse_packet(&event.data, event.link_type) {
                    Ok(decoded) => {
                        let readable = decoded
                            .transport
                            .as_ref()
                            .map(|t| is_readable(&t.payload))
                            .unwrap_or(false);
                        println!(
                            "Frame {}: {} bytes, {} {:?} -> {:?}, readable payload: {}",
                            captured,
                            event.wire_len,
                            decoded.protocol_name,
                            decoded.source_ip,
                            decoded.destination_ip,
                            readable
                        );
                    }
                    Err(e) => println!("Frame {}: {} bytes, not decoded: {}", captured, event.wire_len, e),
                }
            }
            Ok(None) => timeouts += 1,
            Err(e) => {
                eprintln!("Error capturing packet: {}", e);
                process::exit(1);
            }
        }
    }

    if captured == 0 {
        println!("No traffic seen; the capture works but the link is quiet");
    } else {
        println!("Probe completed successfully!");
    }
}
