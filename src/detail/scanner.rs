use log::{debug, trace};
use std::net::IpAddr;
use std::process::Command;
use std::time::Duration;
use thiserror::Error;

/// Port lookup failures. Their text is embedded in packet descriptions.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Host {0} not found in scan results.")]
    HostNotFound(IpAddr),

    #[error("Port {0} not found in scan results.")]
    PortNotFound(u16),

    #[error("Error: failed to run nmap: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("PortScannerError: {0}")]
    Failed(String),
}

/// Identifies the service behind a port on a host
pub trait PortScanner: Send + Sync {
    fn service(&self, ip: IpAddr, port: u16) -> Result<String, ScanError>;
}

/// Runs `nmap` against one host and port and reads its greppable output
#[derive(Debug, Clone)]
pub struct NmapScanner {
    binary: String,
    arguments: Vec<String>,
    host_timeout: Duration,
}

impl NmapScanner {
    pub fn new(arguments: Vec<String>, host_timeout: Duration) -> Self {
        NmapScanner {
            binary: "nmap".to_string(),
            arguments,
            host_timeout,
        }
    }

    /// Use a different nmap executable
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn command(&self, ip: IpAddr, port: u16) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(&self.arguments);
        if ip.is_ipv6() {
            command.arg("-6");
        }
        command
            .arg("-p")
            .arg(port.to_string())
            .arg("--host-timeout")
            .arg(format!("{}s", self.host_timeout.as_secs().max(1)))
            .arg("-oG")
            .arg("-")
            .arg(ip.to_string());
        command
    }
}

impl PortScanner for NmapScanner {
    fn service(&self, ip: IpAddr, port: u16) -> Result<String, ScanError> {
        debug!("Scanning {} port {}", ip, port);
        let output = self.command(ip, port).output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScanError::Failed(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!("nmap output: {}", stdout);
        parse_greppable(&stdout, ip, port)
    }
}

/// Find the service name for `port` in nmap `-oG` output
pub fn parse_greppable(output: &str, ip: IpAddr, port: u16) -> Result<String, ScanError> {
    let ports = output
        .lines()
        .filter(|line| line.starts_with("Host:"))
        .find_map(|line| line.split_once("Ports:"))
        .map(|(_, ports)| ports.split('\t').next().unwrap_or_default())
        .ok_or(ScanError::HostNotFound(ip))?;

    // Entries look like `80/open/tcp//http///` and are separated by ", "
    for entry in ports.split(", ") {
        let fields: Vec<&str> = entry.trim().split('/').collect();
        if fields.first().and_then(|p| p.parse::<u16>().ok()) != Some(port) {
            continue;
        }
        let service = fields.get(4).copied().unwrap_or_default();
        return Ok(if service.is_empty() {
            "unknown".to_string()
        } else {
            service.to_string()
        });
    }

    Err(ScanError::PortNotFound(port))
}

/// Offline lookup against a table of well-known ports
#[derive(Debug, Clone, Copy, Default)]
pub struct WellKnownPorts;

impl PortScanner for WellKnownPorts {
    fn service(&self, _ip: IpAddr, port: u16) -> Result<String, ScanError> {
        well_known_service(port)
            .map(str::to_string)
            .ok_or(ScanError::PortNotFound(port))
    }
}

/// IANA service name for common ports
pub fn well_known_service(port: u16) -> Option<&'static str> {
    let name = match port {
        20 => "ftp-data",
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        53 => "domain",
        67 => "dhcps",
        68 => "dhcpc",
        69 => "tftp",
        80 => "http",
        110 => "pop3",
        123 => "ntp",
        137 => "netbios-ns",
        138 => "netbios-dgm",
        139 => "netbios-ssn",
        143 => "imap",
        161 => "snmp",
        389 => "ldap",
        443 => "https",
        445 => "microsoft-ds",
        465 => "smtps",
        514 => "syslog",
        587 => "submission",
        631 => "ipp",
        853 => "domain-s",
        993 => "imaps",
        995 => "pop3s",
        1900 => "upnp",
        3306 => "mysql",
        3389 => "ms-wbt-server",
        5353 => "mdns",
        5432 => "postgresql",
        6379 => "redis",
        8080 => "http-proxy",
        8443 => "https-alt",
        11434 => "ollama",
        _ => return None,
    };
    Some(name)
}
