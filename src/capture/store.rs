use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use crate::models::conversation::{
    ConversationBucket, ConversationKey, ConversationSnapshot, ConversationSummary, SourceGroup,
};
use crate::models::packet::PacketRecord;

/// Ordering used by snapshot views
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrder {
    /// All conversations, most packets first
    Total,
    /// Conversations with readable packets, most readable first
    ReadableOnly,
    /// Conversations with opaque packets, most opaque first
    EncryptedOnly,
}

#[derive(Default)]
struct StoreInner {
    /// Buckets in first-seen order
    buckets: Vec<(ConversationKey, ConversationBucket)>,
    index: HashMap<ConversationKey, usize>,
    records: HashMap<u64, Arc<PacketRecord>>,
}

/// Thread-safe conversation store for one capture session.
///
/// A single lock covers bucket creation, appends and every read, so a
/// snapshot never observes a half-filed record.
#[derive(Default)]
pub struct ConversationStore {
    inner: Mutex<StoreInner>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to the bucket for `key`, creating the bucket on first use
    pub fn file_record(&self, key: ConversationKey, record: Arc<PacketRecord>, readable: bool) {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        let slot = match inner.index.get(&key) {
            Some(&slot) => slot,
            None => {
                let slot = inner.buckets.len();
                inner.index.insert(key.clone(), slot);
                inner.buckets.push((key, ConversationBucket::default()));
                slot
            }
        };

        inner.records.insert(record.id, record.clone());
        let bucket = &mut inner.buckets[slot].1;
        if readable {
            bucket.readable.push(record);
        } else {
            bucket.encrypted.push(record);
        }
    }

    /// All conversations, most packets first; ties keep first-seen order
    pub fn snapshot(&self) -> Vec<ConversationSnapshot> {
        self.snapshot_ordered(SnapshotOrder::Total)
    }

    /// Conversations with readable packets, most readable first
    pub fn snapshot_readable_only(&self) -> Vec<ConversationSnapshot> {
        self.snapshot_ordered(SnapshotOrder::ReadableOnly)
    }

    /// Conversations with opaque packets, most opaque first
    pub fn snapshot_encrypted_only(&self) -> Vec<ConversationSnapshot> {
        self.snapshot_ordered(SnapshotOrder::EncryptedOnly)
    }

    pub fn snapshot_ordered(&self, order: SnapshotOrder) -> Vec<ConversationSnapshot> {
        let mut snapshots: Vec<ConversationSnapshot> = {
            let inner = self.inner.lock();
            inner
                .buckets
                .iter()
                .filter(|(_, bucket)| match order {
                    SnapshotOrder::Total => true,
                    SnapshotOrder::ReadableOnly => !bucket.readable.is_empty(),
                    SnapshotOrder::EncryptedOnly => !bucket.encrypted.is_empty(),
                })
                .map(|(key, bucket)| ConversationSnapshot {
                    key: key.clone(),
                    bucket: bucket.clone(),
                })
                .collect()
        };

        // sort_by_key is stable, which keeps encounter order for ties
        snapshots.sort_by_key(|s| {
            std::cmp::Reverse(match order {
                SnapshotOrder::Total => s.bucket.total(),
                SnapshotOrder::ReadableOnly => s.bucket.readable.len(),
                SnapshotOrder::EncryptedOnly => s.bucket.encrypted.len(),
            })
        });
        snapshots
    }

    /// Conversations grouped by source address, busiest group first.
    ///
    /// Every conversation is grouped, opaque-only ones included; callers that
    /// want only readable traffic filter the summaries' `readable` counts.
    pub fn group_by_source(&self) -> Vec<SourceGroup> {
        let mut groups: Vec<SourceGroup> = Vec::new();
        for snapshot in self.snapshot() {
            let summary = ConversationSummary::from(&snapshot);
            match groups
                .iter_mut()
                .find(|g| g.source_address == snapshot.key.source_address)
            {
                Some(group) => group.conversations.push(summary),
                None => groups.push(SourceGroup {
                    source_address: snapshot.key.source_address,
                    source_hostname: snapshot.key.source_hostname.clone(),
                    conversations: vec![summary],
                }),
            }
        }
        groups
    }

    /// The conversation from `source` to `destination`. If the hostnames of
    /// an address changed mid-capture, the first-filed key wins.
    pub fn conversation(&self, source: IpAddr, destination: IpAddr) -> Option<ConversationSnapshot> {
        let inner = self.inner.lock();
        inner
            .buckets
            .iter()
            .find(|(key, _)| key.source_address == source && key.destination_address == destination)
            .map(|(key, bucket)| ConversationSnapshot {
                key: key.clone(),
                bucket: bucket.clone(),
            })
    }

    /// Look up a filed record by id
    pub fn find_record(&self, id: u64) -> Option<Arc<PacketRecord>> {
        self.inner.lock().records.get(&id).cloned()
    }

    /// Every filed record in capture order
    pub fn records(&self) -> Vec<Arc<PacketRecord>> {
        let mut records: Vec<Arc<PacketRecord>> =
            self.inner.lock().records.values().cloned().collect();
        records.sort_by_key(|r| r.id);
        records
    }

    /// Number of conversations
    pub fn len(&self) -> usize {
        self.inner.lock().buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of filed records
    pub fn packet_count(&self) -> usize {
        self.inner.lock().records.len()
    }
}
