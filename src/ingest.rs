//! Simulated document ingestion: `uploading → indexing → ready`.
//!
//! No I/O happens. Each record's status is a pure function of the time
//! elapsed since it was added, so transitions need no timers and a removed
//! record can never come back.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::time::Instant;
use ulid::Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploading,
    Indexing,
    Ready,
    Error,
}

/// Stage delays. `ready_after` counts from the start of indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestTimings {
    pub indexing_after: Duration,
    pub ready_after: Duration,
}

impl Default for IngestTimings {
    fn default() -> Self {
        Self {
            indexing_after: Duration::from_millis(1500),
            ready_after: Duration::from_millis(2000),
        }
    }
}

/// Snapshot of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub id: Ulid,
    pub name: String,
    pub size_bytes: u64,
    pub status: UploadStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl UploadRecord {
    /// Size for display: `512 B`, `1.5 KB`, `2.0 MB`.
    #[must_use]
    pub fn human_size(&self) -> String {
        const KB: f64 = 1024.0;
        const MB: f64 = KB * 1024.0;
        match self.size_bytes {
            n if n < 1024 => format!("{n} B"),
            n if (n as f64) < MB => format!("{:.1} KB", n as f64 / KB),
            n => format!("{:.1} MB", n as f64 / MB),
        }
    }
}

struct Entry {
    id: Ulid,
    name: String,
    size_bytes: u64,
    created_at: OffsetDateTime,
    started: Instant,
    failed: bool,
}

impl Entry {
    fn status_at(&self, now: Instant, timings: &IngestTimings) -> UploadStatus {
        if self.failed {
            return UploadStatus::Error;
        }
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed >= timings.indexing_after + timings.ready_after {
            UploadStatus::Ready
        } else if elapsed >= timings.indexing_after {
            UploadStatus::Indexing
        } else {
            UploadStatus::Uploading
        }
    }

    /// Instant of the next scheduled transition, if one remains.
    fn next_transition(&self, now: Instant, timings: &IngestTimings) -> Option<Instant> {
        match self.status_at(now, timings) {
            UploadStatus::Uploading => Some(self.started + timings.indexing_after),
            UploadStatus::Indexing => {
                Some(self.started + timings.indexing_after + timings.ready_after)
            }
            UploadStatus::Ready | UploadStatus::Error => None,
        }
    }

    fn snapshot(&self, now: Instant, timings: &IngestTimings) -> UploadRecord {
        UploadRecord {
            id: self.id,
            name: self.name.clone(),
            size_bytes: self.size_bytes,
            status: self.status_at(now, timings),
            created_at: self.created_at,
        }
    }
}

/// Owner-scoped set of simulated uploads.
#[derive(Default)]
pub struct IngestionSimulator {
    timings: IngestTimings,
    entries: Mutex<Vec<Entry>>,
}

impl IngestionSimulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timings(timings: IngestTimings) -> Self {
        Self {
            timings,
            entries: Mutex::default(),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a selected or dropped file. It starts in `Uploading`.
    pub fn add(&self, name: impl Into<String>, size_bytes: u64) -> UploadRecord {
        let now = Instant::now();
        let entry = Entry {
            id: Ulid::new(),
            name: name.into(),
            size_bytes,
            created_at: OffsetDateTime::now_utc(),
            started: now,
            failed: false,
        };
        let record = entry.snapshot(now, &self.timings);
        tracing::debug!(id = %record.id, name = %record.name, size_bytes, "Upload added");
        self.entries().push(entry);
        record
    }

    #[must_use]
    pub fn get(&self, id: Ulid) -> Option<UploadRecord> {
        let now = Instant::now();
        self.entries()
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.snapshot(now, &self.timings))
    }

    /// All records, newest first.
    #[must_use]
    pub fn records(&self) -> Vec<UploadRecord> {
        let now = Instant::now();
        self.entries()
            .iter()
            .rev()
            .map(|e| e.snapshot(now, &self.timings))
            .collect()
    }

    /// Remove a record in any state. Returns whether it existed.
    pub fn remove(&self, id: Ulid) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() != before;
        if removed {
            tracing::debug!(%id, "Upload removed");
        }
        removed
    }

    /// Move a record that is not yet ready into the terminal `Error` state.
    pub fn mark_failed(&self, id: Ulid) -> bool {
        let now = Instant::now();
        let mut entries = self.entries();
        let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
            return false;
        };
        match entry.status_at(now, &self.timings) {
            UploadStatus::Uploading | UploadStatus::Indexing => {
                entry.failed = true;
                true
            }
            UploadStatus::Ready | UploadStatus::Error => false,
        }
    }

    /// Wait until the record settles in `Ready` or `Error`.
    ///
    /// Returns `None` if the record is (or becomes) removed.
    pub async fn wait_until_settled(&self, id: Ulid) -> Option<UploadRecord> {
        loop {
            let now = Instant::now();
            let next = {
                let entries = self.entries();
                let entry = entries.iter().find(|e| e.id == id)?;
                match entry.next_transition(now, &self.timings) {
                    Some(at) => at,
                    None => return Some(entry.snapshot(now, &self.timings)),
                }
            };
            tokio::time::sleep_until(next).await;
        }
    }
}
