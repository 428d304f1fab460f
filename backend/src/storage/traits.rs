//! # Storage Traits
//!
//! This module defines the storage abstraction traits that allow different
//! storage backends to be used interchangeably in the domain layer.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use shared::{AttendanceRecord, Child};
use tokio::task::JoinHandle;

/// Callback invoked with the full present-set for a subscribed date
pub type AttendanceCallback = dyn Fn(Vec<AttendanceRecord>) + Send + Sync;

/// Trait defining the interface for child storage operations
#[async_trait]
pub trait ChildStorage: Send + Sync {
    /// Store a new child
    async fn store_child(&self, child: &Child) -> Result<()>;

    /// Retrieve a specific child by ID
    async fn get_child(&self, child_id: &str) -> Result<Option<Child>>;

    /// List all children ordered by name
    async fn list_children(&self) -> Result<Vec<Child>>;

    /// Update an existing child
    async fn update_child(&self, child: &Child) -> Result<()>;

    /// Delete a child by ID
    async fn delete_child(&self, child_id: &str) -> Result<()>;
}

/// Trait defining the interface for attendance storage operations.
///
/// Attendance is persisted in two physical forms at once: a flat ledger of
/// self-describing documents, and a per-date bucket partition keyed by child.
/// Implementations must keep both forms in agreement: every write either
/// lands in both or in neither.
#[async_trait]
pub trait AttendanceStorage: Send + Sync {
    /// All present-marked records for a date. Reads the bucket partition;
    /// falls back to a ledger scan if the partition cannot be read.
    async fn get_by_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>>;

    /// A child's attendance history, most recent date first
    async fn get_by_child(&self, child_id: &str) -> Result<Vec<AttendanceRecord>>;

    /// Every stored record, most recent date first. Reads the ledger form
    /// only; the bucket partitions are not scanned.
    async fn get_all(&self) -> Result<Vec<AttendanceRecord>>;

    /// Mark a child present or absent on a date, atomically across both
    /// physical forms. Returns the stored record, or `None` when marking
    /// absent (absence is represented by the absence of a document).
    async fn mark_attendance(
        &self,
        child_id: &str,
        date: NaiveDate,
        present: bool,
    ) -> Result<Option<AttendanceRecord>>;

    /// Replace a date's attendance wholesale: every existing record for the
    /// date is removed from both forms and `child_ids` becomes the new
    /// present-set, all inside one batch.
    async fn replace_date(&self, date: NaiveDate, child_ids: &[String]) -> Result<()>;

    /// Establish a live feed over the bucket partition for `date`. The
    /// callback receives the full current present-set on establishment and
    /// after every committed change, never a diff.
    fn subscribe_by_date(
        &self,
        date: NaiveDate,
        callback: Box<AttendanceCallback>,
    ) -> SubscriptionHandle;
}

/// Trait defining the interface for binary photo storage
#[async_trait]
pub trait PhotoStorage: Send + Sync {
    /// Store photo bytes under a generated key and return a retrieval URL
    async fn save_photo(&self, child_id: &str, file_name: &str, bytes: &[u8]) -> Result<String>;
}

/// Handle to a live attendance feed.
///
/// Unsubscribing stops the feed; no callbacks are delivered afterwards.
/// Unsubscribe is idempotent, and dropping the handle unsubscribes too.
pub struct SubscriptionHandle {
    task: JoinHandle<()>,
    active: AtomicBool,
}

impl SubscriptionHandle {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self {
            task,
            active: AtomicBool::new(true),
        }
    }

    /// Tear down the feed. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.task.is_finished()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
