use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::Child;
use tracing::{debug, warn};

use super::connection::JsonConnection;
use crate::storage::traits::ChildStorage;

const CHILDREN_COLLECTION: &str = "children";

/// Child roster repository over the JSON document tree
#[derive(Clone)]
pub struct ChildRepository {
    connection: Arc<JsonConnection>,
}

impl ChildRepository {
    pub fn new(connection: Arc<JsonConnection>) -> Self {
        Self { connection }
    }

    fn write_child(&self, child: &Child) -> Result<()> {
        let mut batch = self.connection.batch();
        batch.set(CHILDREN_COLLECTION, &child.id, child)?;
        self.connection.commit(batch)
    }
}

#[async_trait]
impl ChildStorage for ChildRepository {
    /// Store a new child
    async fn store_child(&self, child: &Child) -> Result<()> {
        self.write_child(child)
    }

    /// Retrieve a specific child by ID
    async fn get_child(&self, child_id: &str) -> Result<Option<Child>> {
        self.connection.read_document(CHILDREN_COLLECTION, child_id)
    }

    /// List all children ordered by name
    async fn list_children(&self) -> Result<Vec<Child>> {
        let docs = self
            .connection
            .list_documents_lossy::<Child>(CHILDREN_COLLECTION)?;

        let mut children: Vec<Child> = docs.into_iter().map(|(_, child)| child).collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));

        debug!("Listed {} children", children.len());
        Ok(children)
    }

    /// Update an existing child
    async fn update_child(&self, child: &Child) -> Result<()> {
        if self.get_child(&child.id).await?.is_none() {
            warn!("Attempted to update a non-existent child: {}", child.id);
            return Err(anyhow!("Child not found for update"));
        }
        self.write_child(child)
    }

    /// Delete a child by ID. Attendance history is deliberately left in
    /// place; there is no cascading cleanup.
    async fn delete_child(&self, child_id: &str) -> Result<()> {
        let mut batch = self.connection.batch();
        batch.delete(CHILDREN_COLLECTION, child_id);
        self.connection.commit(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn setup() -> (ChildRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let connection = JsonConnection::new(temp_dir.path()).unwrap();
        (ChildRepository::new(Arc::new(connection)), temp_dir)
    }

    fn make_child(name: &str) -> Child {
        let now = Utc::now();
        Child {
            id: Child::generate_id(),
            name: name.to_string(),
            birth_date: Some("2018-03-15".parse().unwrap()),
            address: None,
            parent_name: None,
            parent_phone: None,
            parent_email: None,
            medical_notes: None,
            photo_url: None,
            class: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_store_and_get_child() {
        let (repo, _dir) = setup();
        let child = make_child("Emma Johnson");

        repo.store_child(&child).await.unwrap();

        let loaded = repo.get_child(&child.id).await.unwrap().unwrap();
        assert_eq!(loaded, child);
        assert!(repo.get_child("child::missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_children_sorted_by_name() {
        let (repo, _dir) = setup();

        repo.store_child(&make_child("Noah Wilson")).await.unwrap();
        repo.store_child(&make_child("Ava Brown")).await.unwrap();
        repo.store_child(&make_child("Liam Smith")).await.unwrap();

        let names: Vec<String> = repo
            .list_children()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Ava Brown", "Liam Smith", "Noah Wilson"]);
    }

    #[tokio::test]
    async fn test_update_missing_child_fails() {
        let (repo, _dir) = setup();
        let child = make_child("Emma Johnson");

        assert!(repo.update_child(&child).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_child() {
        let (repo, _dir) = setup();
        let child = make_child("Emma Johnson");

        repo.store_child(&child).await.unwrap();
        repo.delete_child(&child.id).await.unwrap();
        assert!(repo.get_child(&child.id).await.unwrap().is_none());

        // Deleting again is a no-op
        repo.delete_child(&child.id).await.unwrap();
    }
}
