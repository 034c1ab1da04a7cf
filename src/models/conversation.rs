use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use crate::models::packet::{PacketRecord, PacketSummary};

/// Identity of one directed conversation.
///
/// Keys are direction-sensitive: a reply travelling destination -> source
/// produces a different key than the request that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub source_address: IpAddr,
    pub source_hostname: String,
    pub destination_address: IpAddr,
    pub destination_hostname: String,
}

impl ConversationKey {
    pub fn new(
        source_address: IpAddr,
        source_hostname: impl Into<String>,
        destination_address: IpAddr,
        destination_hostname: impl Into<String>,
    ) -> Self {
        ConversationKey {
            source_address,
            source_hostname: source_hostname.into(),
            destination_address,
            destination_hostname: destination_hostname.into(),
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) <-> {}({})",
            self.source_address,
            self.source_hostname,
            self.destination_address,
            self.destination_hostname
        )
    }
}

/// Packets accumulated for one conversation, split by readability
#[derive(Debug, Clone, Default)]
pub struct ConversationBucket {
    pub readable: Vec<Arc<PacketRecord>>,
    pub encrypted: Vec<Arc<PacketRecord>>,
}

impl ConversationBucket {
    pub fn total(&self) -> usize {
        self.readable.len() + self.encrypted.len()
    }
}

/// Point-in-time copy of one conversation
#[derive(Debug, Clone)]
pub struct ConversationSnapshot {
    pub key: ConversationKey,
    pub bucket: ConversationBucket,
}

/// Counts and packet ids of one conversation, as served to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub key: ConversationKey,
    pub label: String,
    pub readable: usize,
    pub encrypted: usize,
    pub readable_ids: Vec<u64>,
    pub encrypted_ids: Vec<u64>,
}

impl From<&ConversationSnapshot> for ConversationSummary {
    fn from(snapshot: &ConversationSnapshot) -> Self {
        ConversationSummary {
            key: snapshot.key.clone(),
            label: snapshot.key.to_string(),
            readable: snapshot.bucket.readable.len(),
            encrypted: snapshot.bucket.encrypted.len(),
            readable_ids: snapshot.bucket.readable.iter().map(|p| p.id).collect(),
            encrypted_ids: snapshot.bucket.encrypted.iter().map(|p| p.id).collect(),
        }
    }
}

/// One conversation's packets, listed the way a packet picker shows them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationPackets {
    pub key: ConversationKey,
    pub label: String,
    pub readable: Vec<PacketSummary>,
    pub encrypted: Vec<PacketSummary>,
}

impl From<&ConversationSnapshot> for ConversationPackets {
    fn from(snapshot: &ConversationSnapshot) -> Self {
        let list = |records: &[Arc<PacketRecord>]| {
            records
                .iter()
                .map(|record| PacketSummary::new(record, &snapshot.key))
                .collect()
        };
        ConversationPackets {
            key: snapshot.key.clone(),
            label: snapshot.key.to_string(),
            readable: list(&snapshot.bucket.readable),
            encrypted: list(&snapshot.bucket.encrypted),
        }
    }
}

/// Conversations that share a source address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceGroup {
    pub source_address: IpAddr,
    pub source_hostname: String,
    pub conversations: Vec<ConversationSummary>,
}
