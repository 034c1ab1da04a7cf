use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for one capture session
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SessionStats {
    /// Total number of packets read from the source
    pub total_packets: u64,

    /// Packets filed into the conversation store
    pub filed_packets: u64,

    /// Packets dropped because they carried no usable payload
    pub skipped_packets: u64,

    /// Packets whose processing failed
    pub errors: u64,

    /// Capture start time
    pub start_time: Option<DateTime<Utc>>,

    /// Capture end time (if stopped)
    pub end_time: Option<DateTime<Utc>>,
}

/// Lock-free counters updated by the capture thread
#[derive(Debug, Default)]
pub struct SessionCounters {
    total: AtomicU64,
    filed: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
}

impl SessionCounters {
    pub fn packet_seen(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_filed(&self) {
        self.filed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_failed(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the counters into a stats value
    pub fn snapshot(
        &self,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> SessionStats {
        SessionStats {
            total_packets: self.total.load(Ordering::Relaxed),
            filed_packets: self.filed.load(Ordering::Relaxed),
            skipped_packets: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            start_time,
            end_time,
        }
    }
}
