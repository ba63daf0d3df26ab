use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Serialize, Serializer};
use serde_json::Value;
use spdlog::{debug, warn};
use tempfile::NamedTempFile;

use crate::error::{ChronicleError, Result};
use crate::post::{normalize_legacy_ids, Post, PostId};

/// One record of the store. Records that do not decode into a [`Post`] are
/// kept as they were read, so they survive a save and can still be deleted.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEntry {
    Valid(Post),
    Malformed {
        id: Option<PostId>,
        raw: Value,
        reason: String,
    },
}

impl StoreEntry {
    /// Decodes record number `index` (0 based) of the store.
    pub fn decode(index: usize, raw: Value) -> StoreEntry {
        match serde_json::from_value::<Post>(raw.clone()) {
            Ok(post) => StoreEntry::Valid(post),
            Err(e) => {
                let id = raw.get("id").and_then(Value::as_str).map(|id| PostId(id.to_string()));
                let reason = match id {
                    Some(ref id) => format!("record #{} (id {}) is malformed: {}", index, id, e),
                    None => format!("record #{} is malformed: {}", index, e),
                };
                warn!("{}", reason);
                StoreEntry::Malformed { id, raw, reason }
            }
        }
    }

    pub fn id(&self) -> Option<&PostId> {
        match self {
            StoreEntry::Valid(post) => Some(&post.id),
            StoreEntry::Malformed { id, .. } => id.as_ref(),
        }
    }

    pub fn has_id(&self, id: &str) -> bool {
        self.id().map(|own| own.as_str() == id).unwrap_or(false)
    }

    pub fn as_post(&self) -> Option<&Post> {
        match self {
            StoreEntry::Valid(post) => Some(post),
            StoreEntry::Malformed { .. } => None,
        }
    }

    /// The record as it would be written to the store.
    pub fn to_value(&self) -> Result<Value> {
        match self {
            StoreEntry::Valid(post) => serde_json::to_value(post)
                .map_err(|e| ChronicleError::InvalidInput(e.to_string())),
            StoreEntry::Malformed { raw, .. } => Ok(raw.clone()),
        }
    }
}

impl From<Post> for StoreEntry {
    fn from(post: Post) -> Self {
        StoreEntry::Valid(post)
    }
}

impl Serialize for StoreEntry {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
        where
            S: Serializer,
    {
        match self {
            StoreEntry::Valid(post) => post.serialize(serializer),
            StoreEntry::Malformed { raw, .. } => raw.serialize(serializer),
        }
    }
}

pub fn valid_posts(entries: Vec<StoreEntry>) -> Vec<Post> {
    entries
        .into_iter()
        .filter_map(|entry| match entry {
            StoreEntry::Valid(post) => Some(post),
            StoreEntry::Malformed { .. } => None,
        })
        .collect()
}

/// The single source of truth: an ordered list of posts, newest first.
///
/// `save` always replaces the whole list. There is no locking, callers must
/// `load` again before a find-then-update sequence.
pub trait PostStore {
    fn load(&self) -> Result<Vec<StoreEntry>>;
    fn save(&self, entries: &[StoreEntry]) -> Result<()>;
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PostStore for JsonFileStore {
    /// Only data that is not a JSON array at all fails the whole load.
    fn load(&self) -> Result<Vec<StoreEntry>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Post store {} does not exist yet", self.path.display());
                return Ok(vec![]);
            }
            Err(e) => return Err(e.into()),
        };

        let mut records: Vec<Value> = serde_json::from_str(&raw).map_err(|e| ChronicleError::CorruptStore {
            path: self.path.clone(),
            source: e,
        })?;
        normalize_legacy_ids(&mut records);

        Ok(records
            .into_iter()
            .enumerate()
            .map(|(index, record)| StoreEntry::decode(index, record))
            .collect())
    }

    fn save(&self, entries: &[StoreEntry]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| ChronicleError::InvalidInput(e.to_string()))?;

        // Written next to the store and renamed over it, readers never see half a list
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!("Saved {} posts to {}", entries.len(), self.path.display());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<StoreEntry>>,
}

impl MemoryStore {
    pub fn new(posts: Vec<Post>) -> Self {
        Self::with_entries(posts.into_iter().map(StoreEntry::from).collect())
    }

    pub fn with_entries(entries: Vec<StoreEntry>) -> Self {
        MemoryStore {
            entries: Mutex::new(entries),
        }
    }
}

impl PostStore for MemoryStore {
    fn load(&self) -> Result<Vec<StoreEntry>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.clone())
    }

    fn save(&self, entries: &[StoreEntry]) -> Result<()> {
        let mut stored = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        *stored = entries.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::test_data::{entries, sample_post, MIXED_STORE_DATA, STORE_DATA};

    use super::*;

    #[test]
    fn test_missing_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("blog-posts.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_store_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blog-posts.json");
        fs::write(&path, "[{\"id\": \"a\", ").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(ChronicleError::CorruptStore { .. })));
        // Nothing gets repaired behind the operator's back
        assert_eq!(fs::read_to_string(&path).unwrap(), "[{\"id\": \"a\", ");
    }

    #[test]
    fn test_store_that_is_not_a_list_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blog-posts.json");
        fs::write(&path, r#"{"posts": []}"#).unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(ChronicleError::CorruptStore { .. })));
    }

    #[test]
    fn test_malformed_record_stays_local() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blog-posts.json");
        fs::write(&path, MIXED_STORE_DATA).unwrap();

        let store = JsonFileStore::new(&path);
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(loaded[0].as_post().is_some());
        assert!(loaded[2].as_post().is_some());

        match loaded[1] {
            StoreEntry::Malformed { ref id, ref reason, .. } => {
                assert_eq!(id.as_ref().map(|id| id.as_str()), Some("bad"));
                assert!(reason.contains("record #1"));
                assert!(reason.contains("id bad"));
            }
            StoreEntry::Valid(_) => panic!("record with an invalid date decoded"),
        }

        // Saved back untouched, next to the good ones
        store.save(&loaded).unwrap();
        let saved: Vec<Value> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved[1]["date"], "someday");
        assert_eq!(saved[1]["mood"], "cursed");
        assert_eq!(store.load().unwrap(), loaded);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("blog-posts.json");
        let store = JsonFileStore::new(&path);

        let posts: Vec<Post> = serde_json::from_str(STORE_DATA).unwrap();
        store.save(&entries(&posts)).unwrap();
        assert_eq!(valid_posts(store.load().unwrap()), posts);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("[\n  {\n    \"id\": \"the-printer-demon\""));

        // Only the store file is left behind, no temporary files
        let dir_entries: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(dir_entries.len(), 1);
    }

    #[test]
    fn test_legacy_ids_are_assigned_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blog-posts.json");
        fs::write(&path, r#"[{"date": "2024-01-01", "timestamp": 1704100000000, "content": "legacy"}]"#).unwrap();

        let store = JsonFileStore::new(&path);
        let loaded = store.load().unwrap();
        assert_eq!(loaded[0].id().unwrap().as_str(), "1704100000000");

        store.save(&loaded).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("\"id\": \"1704100000000\""));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::default();
        assert!(store.load().unwrap().is_empty());
        store.save(&entries(&[sample_post("a", "x"), sample_post("b", "y")])).unwrap();
        let ids: Vec<_> = store.load().unwrap().iter().map(|e| e.id().unwrap().0.clone()).collect();
        assert_eq!(ids, ["a", "b"]);
    }
}
