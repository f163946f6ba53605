use crate::document::DocumentFormat;
use crate::error::{Result, ScanError};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

pub const FAILURE_FILE: &str = "failed_panos.yaml";

/// Persistent home for raw provider documents and the failure set.
///
/// Documents are write-once: `put` on an existing key leaves the stored
/// bytes untouched and returns `false`.
pub trait DocumentStore: Send + Sync {
    fn get(&self, id: &str, format: DocumentFormat) -> Result<Option<Vec<u8>>>;
    fn put(&self, id: &str, format: DocumentFormat, raw: &[u8]) -> Result<bool>;
    fn has(&self, id: &str, format: DocumentFormat) -> Result<bool>;
    fn load_failures(&self) -> Result<HashSet<String>>;
    fn save_failures(&self, failures: &HashSet<String>) -> Result<()>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for Box<T> {
    fn get(&self, id: &str, format: DocumentFormat) -> Result<Option<Vec<u8>>> {
        (**self).get(id, format)
    }

    fn put(&self, id: &str, format: DocumentFormat, raw: &[u8]) -> Result<bool> {
        (**self).put(id, format, raw)
    }

    fn has(&self, id: &str, format: DocumentFormat) -> Result<bool> {
        (**self).has(id, format)
    }

    fn load_failures(&self) -> Result<HashSet<String>> {
        (**self).load_failures()
    }

    fn save_failures(&self, failures: &HashSet<String>) -> Result<()> {
        (**self).save_failures(failures)
    }
}

/// One file per document under a cache directory, named `<id><ext>`.
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn doc_path(&self, id: &str, format: DocumentFormat) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(ScanError::Other(format!("unsafe document id: {id:?}")));
        }
        Ok(self.dir.join(format!("{id}{}", format.ext())))
    }

    fn failure_path(&self) -> PathBuf {
        self.dir.join(FAILURE_FILE)
    }
}

impl DocumentStore for FsStore {
    fn get(&self, id: &str, format: DocumentFormat) -> Result<Option<Vec<u8>>> {
        let path = self.doc_path(id, format)?;
        match fs::read(&path) {
            // an interrupted write leaves an empty file behind
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, id: &str, format: DocumentFormat, raw: &[u8]) -> Result<bool> {
        if self.has(id, format)? {
            return Ok(false);
        }
        let path = self.doc_path(id, format)?;
        let tmp = path.with_extension("part");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &path)?;
        debug!("Stored {}", path.display());
        Ok(true)
    }

    fn has(&self, id: &str, format: DocumentFormat) -> Result<bool> {
        let path = self.doc_path(id, format)?;
        Ok(fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false))
    }

    fn load_failures(&self) -> Result<HashSet<String>> {
        let content = match fs::read_to_string(self.failure_path()) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(HashSet::new());
        }
        let ids: Option<Vec<String>> = serde_yaml::from_str(&content)?;
        Ok(ids.unwrap_or_default().into_iter().collect())
    }

    fn save_failures(&self, failures: &HashSet<String>) -> Result<()> {
        let mut ids: Vec<&String> = failures.iter().collect();
        ids.sort();
        fs::write(self.failure_path(), serde_yaml::to_string(&ids)?)?;
        Ok(())
    }
}

/// Volatile store for tests and one-off lookups.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<(String, DocumentFormat), Vec<u8>>>,
    failures: RwLock<HashSet<String>>,
}

fn poisoned<T>(_: T) -> ScanError {
    ScanError::Other("store lock poisoned".into())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, id: &str, format: DocumentFormat) -> Result<Option<Vec<u8>>> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.get(&(id.to_string(), format)).cloned())
    }

    fn put(&self, id: &str, format: DocumentFormat, raw: &[u8]) -> Result<bool> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        let key = (id.to_string(), format);
        if docs.contains_key(&key) {
            return Ok(false);
        }
        docs.insert(key, raw.to_vec());
        Ok(true)
    }

    fn has(&self, id: &str, format: DocumentFormat) -> Result<bool> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.contains_key(&(id.to_string(), format)))
    }

    fn load_failures(&self) -> Result<HashSet<String>> {
        Ok(self.failures.read().map_err(poisoned)?.clone())
    }

    fn save_failures(&self, failures: &HashSet<String>) -> Result<()> {
        *self.failures.write().map_err(poisoned)? = failures.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fs_store_is_write_once() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path()).unwrap();

        assert!(!store.has("abc", DocumentFormat::Json).unwrap());
        assert!(store.put("abc", DocumentFormat::Json, b"{\"v\":1}").unwrap());
        assert!(!store.put("abc", DocumentFormat::Json, b"{\"v\":2}").unwrap());
        assert_eq!(
            store.get("abc", DocumentFormat::Json).unwrap(),
            Some(b"{\"v\":1}".to_vec())
        );
        assert!(dir.path().join("abc.json").exists());
        assert!(!store.has("abc", DocumentFormat::Xml).unwrap());
    }

    #[test]
    fn test_fs_store_empty_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path()).unwrap();
        fs::write(dir.path().join("half.xml"), b"").unwrap();

        assert!(!store.has("half", DocumentFormat::Xml).unwrap());
        assert_eq!(store.get("half", DocumentFormat::Xml).unwrap(), None);
        assert!(store.put("half", DocumentFormat::Xml, b"<a/>").unwrap());
    }

    #[test]
    fn test_fs_store_rejects_path_ids() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path()).unwrap();
        assert!(store.get("../etc/passwd", DocumentFormat::Json).is_err());
    }

    #[test]
    fn test_fs_failures_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path()).unwrap();
        assert!(store.load_failures().unwrap().is_empty());

        let failures: HashSet<String> = ["b".to_string(), "a".to_string()].into();
        store.save_failures(&failures).unwrap();
        let content = fs::read_to_string(dir.path().join(FAILURE_FILE)).unwrap();
        assert_eq!(content, "- a\n- b\n");

        let reopened = FsStore::new(dir.path()).unwrap();
        assert_eq!(reopened.load_failures().unwrap(), failures);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert!(store.put("x", DocumentFormat::Xml, b"<x/>").unwrap());
        assert!(!store.put("x", DocumentFormat::Xml, b"<y/>").unwrap());
        assert_eq!(store.get("x", DocumentFormat::Xml).unwrap(), Some(b"<x/>".to_vec()));
        assert_eq!(store.len(), 1);
    }
}
