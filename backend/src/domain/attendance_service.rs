use std::sync::Arc;

use chrono::NaiveDate;
use shared::AttendanceRecord;
use tracing::info;

use crate::error::AppError;
use crate::storage::json::{AttendanceRepository, JsonConnection};
use crate::storage::traits::{AttendanceStorage, SubscriptionHandle};

/// Service for recording and querying attendance.
///
/// The repository underneath keeps the two physical record forms (flat
/// ledger, per-date bucket) in agreement; this service is the seam the
/// controller and handlers go through.
#[derive(Clone)]
pub struct AttendanceService {
    repository: AttendanceRepository,
}

impl AttendanceService {
    /// Create a new AttendanceService
    pub fn new(connection: Arc<JsonConnection>) -> Self {
        Self {
            repository: AttendanceRepository::new(connection),
        }
    }

    /// Present-set for a date
    pub async fn get_by_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, AppError> {
        Ok(self.repository.get_by_date(date).await?)
    }

    /// A child's history, most recent date first
    pub async fn get_by_child(&self, child_id: &str) -> Result<Vec<AttendanceRecord>, AppError> {
        self.validate_child_id(child_id)?;
        Ok(self.repository.get_by_child(child_id).await?)
    }

    /// Every record, most recent date first
    pub async fn get_all(&self) -> Result<Vec<AttendanceRecord>, AppError> {
        Ok(self.repository.get_all().await?)
    }

    /// Mark a child present or absent on a date. Returns the stored record,
    /// or `None` when marking absent.
    pub async fn mark_attendance(
        &self,
        child_id: &str,
        date: NaiveDate,
        present: bool,
    ) -> Result<Option<AttendanceRecord>, AppError> {
        self.validate_child_id(child_id)?;
        Ok(self.repository.mark_attendance(child_id, date, present).await?)
    }

    /// Replace a date's attendance wholesale with a new present-set
    pub async fn replace_date(
        &self,
        date: NaiveDate,
        child_ids: &[String],
    ) -> Result<(), AppError> {
        for child_id in child_ids {
            self.validate_child_id(child_id)?;
        }
        info!("Bulk attendance update for {date}");
        Ok(self.repository.replace_date(date, child_ids).await?)
    }

    /// Live present-set feed for a date
    pub fn subscribe_by_date<F>(&self, date: NaiveDate, callback: F) -> SubscriptionHandle
    where
        F: Fn(Vec<AttendanceRecord>) + Send + Sync + 'static,
    {
        self.repository.subscribe_by_date(date, Box::new(callback))
    }

    fn validate_child_id(&self, child_id: &str) -> Result<(), AppError> {
        if child_id.trim().is_empty() {
            return Err(AppError::Validation("Child id cannot be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup() -> (AttendanceService, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let connection = Arc::new(JsonConnection::new(temp_dir.path()).unwrap());
        (AttendanceService::new(connection), temp_dir)
    }

    #[tokio::test]
    async fn test_empty_child_id_rejected_before_any_write() {
        let (service, _dir) = setup();
        let d: NaiveDate = "2025-07-20".parse().unwrap();

        let err = service.mark_attendance("  ", d, true).await;
        assert!(matches!(err, Err(AppError::Validation(_))));
        assert!(service.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_and_query_round_trip() {
        let (service, _dir) = setup();
        let d: NaiveDate = "2025-07-20".parse().unwrap();

        let record = service.mark_attendance("child::a", d, true).await.unwrap().unwrap();
        assert_eq!(service.get_by_date(d).await.unwrap(), vec![record.clone()]);
        assert_eq!(service.get_by_child("child::a").await.unwrap(), vec![record.clone()]);
        assert_eq!(service.get_all().await.unwrap(), vec![record]);
    }
}
