use std::sync::Arc;

use chrono::{Datelike, Utc};
use shared::{Child, CreateChildRequest, UpdateChildRequest};
use tracing::{info, warn};

use crate::error::AppError;
use crate::storage::json::{ChildRepository, JsonConnection, PhotoRepository};
use crate::storage::traits::{ChildStorage, PhotoStorage};

/// Service for managing the child roster
#[derive(Clone)]
pub struct RosterService {
    child_repository: ChildRepository,
    photo_repository: PhotoRepository,
}

impl RosterService {
    /// Create a new RosterService
    pub fn new(connection: Arc<JsonConnection>) -> Self {
        Self {
            child_repository: ChildRepository::new(Arc::clone(&connection)),
            photo_repository: PhotoRepository::new(connection),
        }
    }

    /// Add a child to the roster
    pub async fn create_child(&self, request: CreateChildRequest) -> Result<Child, AppError> {
        info!("Creating child: name={}, birth_date={}", request.name, request.birth_date);

        self.validate_name(&request.name)?;
        self.validate_birth_date(request.birth_date.year())?;

        let now = Utc::now();
        let child = Child {
            id: Child::generate_id(),
            name: request.name.trim().to_string(),
            birth_date: Some(request.birth_date),
            address: request.address,
            parent_name: request.parent_name,
            parent_phone: request.parent_phone,
            parent_email: request.parent_email,
            medical_notes: request.medical_notes,
            photo_url: request.photo_url,
            class: request.class,
            created_at: now,
            updated_at: now,
        };

        self.child_repository.store_child(&child).await?;

        info!("Created child: {} with ID: {}", child.name, child.id);
        Ok(child)
    }

    /// Get a child by ID
    pub async fn get_child(&self, child_id: &str) -> Result<Option<Child>, AppError> {
        Ok(self.child_repository.get_child(child_id).await?)
    }

    /// List all children, ordered by name
    pub async fn list_children(&self) -> Result<Vec<Child>, AppError> {
        let children = self.child_repository.list_children().await?;
        info!("Found {} children", children.len());
        Ok(children)
    }

    /// Merge a partial update into an existing child and refresh its
    /// modification timestamp
    pub async fn update_child(
        &self,
        child_id: &str,
        request: UpdateChildRequest,
    ) -> Result<Child, AppError> {
        info!("Updating child: {child_id}");

        let mut child = self
            .child_repository
            .get_child(child_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Child not found: {child_id}")))?;

        if let Some(ref name) = request.name {
            self.validate_name(name)?;
        }
        if let Some(birth_date) = request.birth_date {
            self.validate_birth_date(birth_date.year())?;
        }

        if let Some(name) = request.name {
            child.name = name.trim().to_string();
        }
        if let Some(birth_date) = request.birth_date {
            child.birth_date = Some(birth_date);
        }
        if let Some(address) = request.address {
            child.address = Some(address);
        }
        if let Some(parent_name) = request.parent_name {
            child.parent_name = Some(parent_name);
        }
        if let Some(parent_phone) = request.parent_phone {
            child.parent_phone = Some(parent_phone);
        }
        if let Some(parent_email) = request.parent_email {
            child.parent_email = Some(parent_email);
        }
        if let Some(medical_notes) = request.medical_notes {
            child.medical_notes = Some(medical_notes);
        }
        if let Some(photo_url) = request.photo_url {
            child.photo_url = Some(photo_url);
        }
        if let Some(class) = request.class {
            child.class = Some(class);
        }
        child.updated_at = Utc::now();

        self.child_repository.update_child(&child).await?;

        info!("Updated child: {} with ID: {}", child.name, child.id);
        Ok(child)
    }

    /// Delete a child. Attendance history survives; there is no cascading
    /// cleanup.
    pub async fn delete_child(&self, child_id: &str) -> Result<Child, AppError> {
        info!("Deleting child: {child_id}");

        let child = self
            .child_repository
            .get_child(child_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Child not found: {child_id}")))?;

        self.child_repository.delete_child(child_id).await?;

        info!("Deleted child: {} with ID: {}", child.name, child.id);
        Ok(child)
    }

    /// Store a photo for a child and record the returned URL on the child
    /// document
    pub async fn upload_photo(
        &self,
        child_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Child, AppError> {
        info!("Uploading photo for child: {child_id} ({} bytes)", bytes.len());

        let mut child = self
            .child_repository
            .get_child(child_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Child not found: {child_id}")))?;

        if bytes.is_empty() {
            return Err(AppError::Validation("Photo upload is empty".to_string()));
        }

        let url = self.photo_repository.save_photo(child_id, file_name, bytes).await?;
        child.photo_url = Some(url);
        child.updated_at = Utc::now();
        self.child_repository.update_child(&child).await?;

        Ok(child)
    }

    fn validate_name(&self, name: &str) -> Result<(), AppError> {
        if name.trim().is_empty() {
            return Err(AppError::Validation("Child name cannot be empty".to_string()));
        }
        if name.len() > 100 {
            warn!("Rejected over-long child name ({} chars)", name.len());
            return Err(AppError::Validation(
                "Child name cannot exceed 100 characters".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_birth_date(&self, year: i32) -> Result<(), AppError> {
        if !(1900..=2100).contains(&year) {
            return Err(AppError::Validation(
                "Birth year must be between 1900 and 2100".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::json::AttendanceRepository;
    use crate::storage::traits::AttendanceStorage;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn setup() -> (RosterService, Arc<JsonConnection>, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let connection = Arc::new(JsonConnection::new(temp_dir.path()).unwrap());
        (RosterService::new(Arc::clone(&connection)), connection, temp_dir)
    }

    fn create_request(name: &str, birth_date: &str) -> CreateChildRequest {
        CreateChildRequest {
            name: name.to_string(),
            birth_date: birth_date.parse().unwrap(),
            address: None,
            parent_name: None,
            parent_phone: None,
            parent_email: None,
            medical_notes: None,
            photo_url: None,
            class: None,
        }
    }

    #[tokio::test]
    async fn test_create_child_trims_name() {
        let (service, _conn, _dir) = setup();

        let child = service
            .create_child(create_request("  Emma Johnson ", "2018-03-15"))
            .await
            .unwrap();
        assert_eq!(child.name, "Emma Johnson");
        assert_eq!(child.birth_date, Some("2018-03-15".parse().unwrap()));
        assert!(child.id.starts_with("child::"));
    }

    #[tokio::test]
    async fn test_create_child_validation() {
        let (service, _conn, _dir) = setup();

        let err = service.create_child(create_request("  ", "2018-03-15")).await;
        assert!(matches!(err, Err(AppError::Validation(_))));

        let err = service
            .create_child(create_request(&"a".repeat(101), "2018-03-15"))
            .await;
        assert!(matches!(err, Err(AppError::Validation(_))));

        let err = service.create_child(create_request("Old Timer", "1850-01-01")).await;
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_child_merges_partial_fields() {
        let (service, _conn, _dir) = setup();

        let child = service
            .create_child(create_request("Emma Johnson", "2018-03-15"))
            .await
            .unwrap();

        let updated = service
            .update_child(
                &child.id,
                UpdateChildRequest {
                    parent_phone: Some("+234 801 234 5678".to_string()),
                    class: Some("Cupbearers".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Untouched fields survive the merge
        assert_eq!(updated.name, "Emma Johnson");
        assert_eq!(updated.birth_date, child.birth_date);
        assert_eq!(updated.parent_phone.as_deref(), Some("+234 801 234 5678"));
        assert_eq!(updated.class.as_deref(), Some("Cupbearers"));
        assert!(updated.updated_at >= child.updated_at);
        assert_eq!(updated.created_at, child.created_at);
    }

    #[tokio::test]
    async fn test_update_missing_child_is_not_found() {
        let (service, _conn, _dir) = setup();

        let err = service
            .update_child("child::missing", UpdateChildRequest::default())
            .await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_child_keeps_attendance_history() {
        let (service, connection, _dir) = setup();
        let attendance = AttendanceRepository::new(connection);

        let child = service
            .create_child(create_request("Emma Johnson", "2018-03-15"))
            .await
            .unwrap();
        let d: NaiveDate = "2025-07-20".parse().unwrap();
        attendance.mark_attendance(&child.id, d, true).await.unwrap();

        service.delete_child(&child.id).await.unwrap();
        assert!(service.get_child(&child.id).await.unwrap().is_none());

        // No cascading delete: the history is still queryable
        let history = attendance.get_by_child(&child.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].date, d);
    }

    #[tokio::test]
    async fn test_upload_photo_sets_photo_url() {
        let (service, _conn, _dir) = setup();

        let child = service
            .create_child(create_request("Emma Johnson", "2018-03-15"))
            .await
            .unwrap();

        let updated = service
            .upload_photo(&child.id, "portrait.jpg", b"bytes")
            .await
            .unwrap();
        let url = updated.photo_url.unwrap();
        assert!(url.starts_with("/photos/"));

        // The URL is persisted on the child document
        let reloaded = service.get_child(&child.id).await.unwrap().unwrap();
        assert!(reloaded.photo_url.is_some());

        let err = service.upload_photo(&child.id, "portrait.jpg", b"").await;
        assert!(matches!(err, Err(AppError::Validation(_))));
    }
}
