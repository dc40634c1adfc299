//! Recent sync runs kept for display. Not durable and not authoritative.

use std::collections::VecDeque;

use adspend_core::{DateRange, SyncResult, SyncStatus};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncHistoryEntry {
    pub id: Uuid,
    pub business_unit: String,
    pub platform: String,
    pub date_range: DateRange,
    pub updated_count: usize,
    pub unchanged_count: usize,
    pub malformed_count: usize,
    pub status: SyncStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl SyncHistoryEntry {
    pub fn succeeded(
        business_unit: &str,
        platform: &str,
        date_range: DateRange,
        result: &SyncResult,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            business_unit: business_unit.to_string(),
            platform: platform.to_string(),
            date_range,
            updated_count: result.updated.len(),
            unchanged_count: result.unchanged.len(),
            malformed_count: result.malformed.len(),
            status: SyncStatus::of(result),
            started_at,
            completed_at: Utc::now(),
            error: None,
        }
    }

    pub fn failed(
        business_unit: &str,
        platform: &str,
        date_range: DateRange,
        error: String,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            business_unit: business_unit.to_string(),
            platform: platform.to_string(),
            date_range,
            updated_count: 0,
            unchanged_count: 0,
            malformed_count: 0,
            status: SyncStatus::Failed,
            started_at,
            completed_at: Utc::now(),
            error: Some(error),
        }
    }
}

/// Append-only log capped at `capacity`; the oldest entry drops first.
#[derive(Debug)]
pub struct SyncHistory {
    entries: Mutex<VecDeque<SyncHistoryEntry>>,
    capacity: usize,
}

impl SyncHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record(&self, entry: SyncHistoryEntry) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    /// Newest first.
    pub fn recent(&self) -> Vec<SyncHistoryEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
