use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Connection to the JSON document tree.
///
/// Collections are relative paths with `/` separators (for example
/// `attendance/2025/7/2025-07-22/records`); documents are `{id}.json` files
/// inside them.
pub struct JsonConnection {
    base_dir: PathBuf,
    commit_lock: Mutex<()>,
    watchers: Mutex<HashMap<String, broadcast::Sender<()>>>,
}

impl JsonConnection {
    /// Open (creating if needed) a document tree rooted at `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("Failed to create data directory {}", base_dir.display()))?;

        Ok(Self {
            base_dir,
            commit_lock: Mutex::new(()),
            watchers: Mutex::new(HashMap::new()),
        })
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_dir
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.base_dir.join(collection)
    }

    fn document_path(&self, collection: &str, id: &str) -> PathBuf {
        self.collection_dir(collection).join(format!("{id}.json"))
    }

    /// Read one document; `None` if it does not exist
    pub fn read_document<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>> {
        let path = self.document_path(collection, id);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read document {}", path.display()))?;
        let document = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse document {}", path.display()))?;

        Ok(Some(document))
    }

    /// List every document in a collection as `(id, document)` pairs.
    /// A missing collection directory is an empty collection; a document
    /// that fails to parse is an error.
    pub fn list_documents<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<(String, T)>> {
        self.scan_collection(collection, true)
    }

    /// Like [`list_documents`](Self::list_documents), but skips documents
    /// that cannot be parsed instead of failing the whole scan.
    pub fn list_documents_lossy<T: DeserializeOwned>(
        &self,
        collection: &str,
    ) -> Result<Vec<(String, T)>> {
        self.scan_collection(collection, false)
    }

    fn scan_collection<T: DeserializeOwned>(
        &self,
        collection: &str,
        strict: bool,
    ) -> Result<Vec<(String, T)>> {
        let dir = self.collection_dir(collection);
        if !dir.exists() {
            debug!("Collection {collection} does not exist yet, returning empty list");
            return Ok(Vec::new());
        }

        let mut documents = Vec::new();
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("Failed to read collection {collection}"))?
        {
            let path = entry?.path();
            if path.is_dir() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let id = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem.to_string(),
                None => continue,
            };

            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read document {}", path.display()))?;
            match serde_json::from_str(&content) {
                Ok(document) => documents.push((id, document)),
                Err(e) if strict => {
                    return Err(e).with_context(|| {
                        format!("Failed to parse document {}", path.display())
                    });
                }
                Err(e) => {
                    warn!("Skipping unparseable document {}: {e}", path.display());
                }
            }
        }

        Ok(documents)
    }

    pub fn batch(&self) -> WriteBatch {
        WriteBatch { ops: Vec::new() }
    }

    /// Commit a batch: every set and delete lands, or none do.
    ///
    /// Sets are staged to temp files before anything becomes visible, so
    /// serialization, directory, and disk errors surface with no partial
    /// effect. Staged files are then renamed into place in op order.
    pub fn commit(&self, batch: WriteBatch) -> Result<()> {
        let _guard = self.commit_lock.lock().unwrap();

        let mut staged: Vec<PathBuf> = Vec::new();
        for op in &batch.ops {
            if let BatchOp::Set { collection, id, body } = op {
                let dir = self.collection_dir(collection);
                let result = fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create collection {collection}"))
                    .and_then(|_| {
                        let temp = self.document_path(collection, id).with_extension("json.tmp");
                        fs::write(&temp, body)
                            .with_context(|| format!("Failed to stage document {}", temp.display()))
                            .map(|_| temp)
                    });

                match result {
                    Ok(temp) => staged.push(temp),
                    Err(e) => {
                        for temp in staged {
                            let _ = fs::remove_file(temp);
                        }
                        return Err(e);
                    }
                }
            }
        }

        for op in &batch.ops {
            match op {
                BatchOp::Set { collection, id, .. } => {
                    let path = self.document_path(collection, id);
                    fs::rename(path.with_extension("json.tmp"), &path).with_context(|| {
                        format!("Failed to publish document {}", path.display())
                    })?;
                }
                BatchOp::Delete { collection, id } => {
                    let path = self.document_path(collection, id);
                    if let Err(e) = fs::remove_file(&path) {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            return Err(e).with_context(|| {
                                format!("Failed to delete document {}", path.display())
                            });
                        }
                    }
                }
            }
        }

        let touched: BTreeSet<&str> = batch.ops.iter().map(BatchOp::collection).collect();
        for collection in touched {
            self.notify(collection);
        }

        Ok(())
    }

    /// Subscribe to change notifications for a collection. One notification
    /// is delivered per committed batch touching the collection.
    pub fn watch(&self, collection: &str) -> broadcast::Receiver<()> {
        let mut watchers = self.watchers.lock().unwrap();
        watchers
            .entry(collection.to_string())
            .or_insert_with(|| broadcast::channel(16).0)
            .subscribe()
    }

    fn notify(&self, collection: &str) {
        let watchers = self.watchers.lock().unwrap();
        if let Some(sender) = watchers.get(collection) {
            // No receivers is fine
            let _ = sender.send(());
        }
    }
}

/// Staged multi-document write, applied all-or-nothing by
/// [`JsonConnection::commit`]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

enum BatchOp {
    Set {
        collection: String,
        id: String,
        body: Vec<u8>,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl BatchOp {
    fn collection(&self) -> &str {
        match self {
            BatchOp::Set { collection, .. } | BatchOp::Delete { collection, .. } => collection,
        }
    }
}

impl WriteBatch {
    /// Stage an upsert. The document is serialized immediately, so a
    /// serialization failure rejects the batch before commit.
    pub fn set<T: Serialize>(&mut self, collection: &str, id: &str, document: &T) -> Result<()> {
        let body = serde_json::to_vec_pretty(document)
            .with_context(|| format!("Failed to serialize document {collection}/{id}"))?;
        self.ops.push(BatchOp::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            body,
        });
        Ok(())
    }

    /// Stage a delete; deleting a missing document is a no-op
    pub fn delete(&mut self, collection: &str, id: &str) {
        self.ops.push(BatchOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
