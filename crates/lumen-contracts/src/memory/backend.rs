use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};

/// Durable string-keyed blob storage.
pub trait MemoryBackend: Send + Sync {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn save(&self, key: &str, blob: &str) -> anyhow::Result<()>;
}

/// All keys live in one JSON object file. The file is re-read on every load
/// and merged on every save, so other writers' keys survive.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MemoryBackend for JsonFileBackend {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let on_disk = read_json_object(&self.path)?;
        Ok(on_disk.get(key).and_then(Value::as_str).map(str::to_string))
    }

    fn save(&self, key: &str, blob: &str) -> anyhow::Result<()> {
        // An unreadable file is replaced rather than blocking every later save.
        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        on_disk.insert(key.to_string(), Value::String(blob.to_string()));
        write_json_object(&self.path, &on_disk)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryBackend for InMemoryBackend {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory backend lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, blob: &str) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory backend lock poisoned"))?;
        entries.insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

fn read_json_object(path: &Path) -> anyhow::Result<Map<String, Value>> {
    let raw = std::fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&raw)?;
    match parsed {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("{} is not a JSON object", path.display()),
    }
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{InMemoryBackend, JsonFileBackend, MemoryBackend};

    #[test]
    fn file_backend_missing_file_loads_nothing() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let backend = JsonFileBackend::new(temp.path().join("memory.json"));
        assert_eq!(backend.load("key")?, None);
        Ok(())
    }

    #[test]
    fn file_backend_persists_across_instances() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("memory.json");
        JsonFileBackend::new(&path).save("key", "blob")?;
        assert_eq!(JsonFileBackend::new(&path).load("key")?.as_deref(), Some("blob"));
        Ok(())
    }

    #[test]
    fn file_backend_merges_keys_from_other_writers() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("memory.json");
        let a = JsonFileBackend::new(&path);
        let b = JsonFileBackend::new(&path);
        a.save("a", "1")?;
        b.save("b", "2")?;
        a.save("a", "3")?;
        assert_eq!(b.load("a")?.as_deref(), Some("3"));
        assert_eq!(a.load("b")?.as_deref(), Some("2"));
        Ok(())
    }

    #[test]
    fn file_backend_reports_corrupt_file_and_recovers_on_save() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("memory.json");
        std::fs::write(&path, "{not json")?;
        let backend = JsonFileBackend::new(&path);
        assert!(backend.load("key").is_err());
        backend.save("key", "fresh")?;
        assert_eq!(backend.load("key")?.as_deref(), Some("fresh"));
        Ok(())
    }

    #[test]
    fn in_memory_backend_roundtrip() -> anyhow::Result<()> {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.load("key")?, None);
        backend.save("key", "blob")?;
        assert_eq!(backend.load("key")?.as_deref(), Some("blob"));
        Ok(())
    }
}
