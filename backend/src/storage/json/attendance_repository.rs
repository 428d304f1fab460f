use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::AttendanceRecord;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connection::JsonConnection;
use crate::storage::traits::{AttendanceCallback, AttendanceStorage, SubscriptionHandle};

/// Flat ledger collection; documents are keyed by an opaque id and carry
/// their child and date as fields
const LEDGER_COLLECTION: &str = "attendance/ledger";

/// Ledger-form document
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerDoc {
    child_id: String,
    date: NaiveDate,
    present: bool,
    marked_at: DateTime<Utc>,
}

/// Ledger document as seen by the lenient fallback scan; legacy rows may be
/// missing fields
#[derive(Debug, Clone, Deserialize)]
struct LenientLedgerDoc {
    #[serde(default)]
    child_id: Option<String>,
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde(default)]
    present: Option<bool>,
    #[serde(default)]
    marked_at: Option<DateTime<Utc>>,
}

/// Bucket-form document, keyed by child id under the per-date partition.
/// Absence of a document means the child is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BucketDoc {
    present: bool,
    marked_at: DateTime<Utc>,
}

/// Dual-form attendance repository over the JSON document tree
#[derive(Clone)]
pub struct AttendanceRepository {
    connection: Arc<JsonConnection>,
}

impl AttendanceRepository {
    pub fn new(connection: Arc<JsonConnection>) -> Self {
        Self { connection }
    }

    /// Bucket partition for a date: `attendance/{year}/{month}/{date}/records`
    fn bucket_collection(date: NaiveDate) -> String {
        format!(
            "attendance/{}/{}/{}/records",
            date.year(),
            date.month(),
            date
        )
    }

    /// Present-set from the bucket partition for `date`
    fn read_bucket(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        let docs = self
            .connection
            .list_documents::<BucketDoc>(&Self::bucket_collection(date))?;

        let mut records: Vec<AttendanceRecord> = docs
            .into_iter()
            .map(|(child_id, doc)| AttendanceRecord {
                child_id,
                date,
                present: doc.present,
                marked_at: doc.marked_at,
            })
            .collect();
        records.sort_by(|a, b| a.child_id.cmp(&b.child_id));

        Ok(records)
    }

    /// Fallback for a failed bucket read: scan the ledger for present-marked
    /// records on `date`
    fn scan_ledger_for_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        let docs = self
            .connection
            .list_documents_lossy::<LenientLedgerDoc>(LEDGER_COLLECTION)?;

        let mut records: Vec<AttendanceRecord> = docs
            .into_iter()
            .filter(|(_, doc)| doc.date == Some(date) && doc.present == Some(true))
            .filter_map(|(_, doc)| {
                doc.child_id.map(|child_id| AttendanceRecord {
                    child_id,
                    date,
                    present: true,
                    marked_at: doc.marked_at.unwrap_or(DateTime::<Utc>::MIN_UTC),
                })
            })
            .collect();
        records.sort_by(|a, b| a.child_id.cmp(&b.child_id));

        Ok(records)
    }

    /// Strict, ordered ledger history for one child
    fn child_history(&self, child_id: &str) -> Result<Vec<AttendanceRecord>> {
        let docs = self.connection.list_documents::<LedgerDoc>(LEDGER_COLLECTION)?;

        let mut records: Vec<AttendanceRecord> = docs
            .into_iter()
            .filter(|(_, doc)| doc.child_id == child_id)
            .map(|(_, doc)| AttendanceRecord {
                child_id: doc.child_id,
                date: doc.date,
                present: doc.present,
                marked_at: doc.marked_at,
            })
            .collect();
        records.sort_by(|a, b| b.date.cmp(&a.date));

        Ok(records)
    }

    /// Fallback history scan: tolerates malformed rows, sorts client-side
    /// with a missing date treated as the lowest possible value
    fn child_history_lenient(&self, child_id: &str) -> Result<Vec<AttendanceRecord>> {
        let docs = self
            .connection
            .list_documents_lossy::<LenientLedgerDoc>(LEDGER_COLLECTION)?;

        let mut rows: Vec<LenientLedgerDoc> = docs
            .into_iter()
            .map(|(_, doc)| doc)
            .filter(|doc| doc.child_id.as_deref() == Some(child_id))
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date));

        Ok(rows
            .into_iter()
            .map(|doc| AttendanceRecord {
                child_id: child_id.to_string(),
                date: doc.date.unwrap_or(NaiveDate::MIN),
                present: doc.present.unwrap_or(false),
                marked_at: doc.marked_at.unwrap_or(DateTime::<Utc>::MIN_UTC),
            })
            .collect())
    }

    /// Find the ledger document id for `(child_id, date)`, if one exists
    fn find_ledger_doc(&self, child_id: &str, date: NaiveDate) -> Result<Option<String>> {
        let docs = self
            .connection
            .list_documents_lossy::<LenientLedgerDoc>(LEDGER_COLLECTION)?;

        Ok(docs
            .into_iter()
            .find(|(_, doc)| {
                doc.child_id.as_deref() == Some(child_id) && doc.date == Some(date)
            })
            .map(|(id, _)| id))
    }
}

#[async_trait]
impl AttendanceStorage for AttendanceRepository {
    async fn get_by_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        match self.read_bucket(date) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!("Bucket read failed for {date}, falling back to ledger scan: {e:#}");
                self.scan_ledger_for_date(date)
            }
        }
    }

    async fn get_by_child(&self, child_id: &str) -> Result<Vec<AttendanceRecord>> {
        match self.child_history(child_id) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!("Ordered history query failed for {child_id}, falling back to lenient scan: {e:#}");
                self.child_history_lenient(child_id)
            }
        }
    }

    async fn get_all(&self) -> Result<Vec<AttendanceRecord>> {
        let docs = self.connection.list_documents::<LedgerDoc>(LEDGER_COLLECTION)?;

        let mut records: Vec<AttendanceRecord> = docs
            .into_iter()
            .map(|(_, doc)| AttendanceRecord {
                child_id: doc.child_id,
                date: doc.date,
                present: doc.present,
                marked_at: doc.marked_at,
            })
            .collect();
        records.sort_by(|a, b| b.date.cmp(&a.date));

        Ok(records)
    }

    async fn mark_attendance(
        &self,
        child_id: &str,
        date: NaiveDate,
        present: bool,
    ) -> Result<Option<AttendanceRecord>> {
        info!("Marking {child_id} {} on {date}", if present { "present" } else { "absent" });

        let existing = self.find_ledger_doc(child_id, date)?;
        let bucket = Self::bucket_collection(date);
        let mut batch = self.connection.batch();

        if present {
            let marked_at = Utc::now();
            let ledger_id = existing.unwrap_or_else(|| Uuid::new_v4().to_string());
            batch.set(
                LEDGER_COLLECTION,
                &ledger_id,
                &LedgerDoc {
                    child_id: child_id.to_string(),
                    date,
                    present: true,
                    marked_at,
                },
            )?;
            batch.set(&bucket, child_id, &BucketDoc { present: true, marked_at })?;
            self.connection.commit(batch)?;

            Ok(Some(AttendanceRecord {
                child_id: child_id.to_string(),
                date,
                present: true,
                marked_at,
            }))
        } else {
            if let Some(ledger_id) = existing {
                batch.delete(LEDGER_COLLECTION, &ledger_id);
            }
            batch.delete(&bucket, child_id);
            self.connection.commit(batch)?;

            Ok(None)
        }
    }

    async fn replace_date(&self, date: NaiveDate, child_ids: &[String]) -> Result<()> {
        info!("Replacing attendance for {date} with {} children", child_ids.len());

        let bucket = Self::bucket_collection(date);
        let mut batch = self.connection.batch();

        for (id, doc) in self
            .connection
            .list_documents_lossy::<LenientLedgerDoc>(LEDGER_COLLECTION)?
        {
            if doc.date == Some(date) {
                batch.delete(LEDGER_COLLECTION, &id);
            }
        }
        for (child_id, _) in self.connection.list_documents_lossy::<BucketDoc>(&bucket)? {
            batch.delete(&bucket, &child_id);
        }

        let marked_at = Utc::now();
        for child_id in child_ids {
            batch.set(
                LEDGER_COLLECTION,
                &Uuid::new_v4().to_string(),
                &LedgerDoc {
                    child_id: child_id.clone(),
                    date,
                    present: true,
                    marked_at,
                },
            )?;
            batch.set(&bucket, child_id, &BucketDoc { present: true, marked_at })?;
        }

        self.connection.commit(batch)
    }

    fn subscribe_by_date(
        &self,
        date: NaiveDate,
        callback: Box<AttendanceCallback>,
    ) -> SubscriptionHandle {
        let bucket = Self::bucket_collection(date);
        let mut rx = self.connection.watch(&bucket);
        let repository = self.clone();

        let task = tokio::spawn(async move {
            debug!("Live attendance feed established for {date}");
            loop {
                // Full current present-set on every delivery, never a diff
                match repository.read_bucket(date) {
                    Ok(records) => callback(records),
                    Err(e) => warn!("Live feed read failed for {date}: {e:#}"),
                }

                match rx.recv().await {
                    Ok(()) => {}
                    // Missed notifications collapse into one fresh snapshot
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        SubscriptionHandle::new(task)
    }
}
