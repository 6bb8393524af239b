use crate::domain::ports::ArtifactStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

const EXTENSION: &str = "json";

/// One pretty-printed JSON file per artifact key under a root directory.
///
/// Keys are percent-encoded into file names, so `model/boosted` becomes
/// `model%2Fboosted.json`. Writes go to a temp file first and are renamed
/// into place.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            fs::create_dir_all(&root)
                .await
                .context(format!("Failed to create artifact directory {:?}", root))?;
        }
        info!("Artifact store at {:?}", root);
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{}", encode_key(key), EXTENSION))
    }
}

#[async_trait]
impl ArtifactStore for JsonFileStore {
    async fn put(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let path = self.path_for(key);
        let content =
            serde_json::to_string_pretty(value).context("Failed to serialize artifact")?;

        // Atomic write: write to temp file then rename
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content)
            .await
            .context(format!("Failed to write temp artifact file {:?}", temp_path))?;
        fs::rename(&temp_path, &path)
            .await
            .context(format!("Failed to rename artifact file {:?}", path))?;

        debug!("Saved artifact '{}' to {:?}", key, path);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .await
            .context(format!("Failed to read artifact file {:?}", path))?;
        let value = serde_json::from_str(&content)
            .context(format!("Failed to parse artifact JSON {:?}", path))?;
        Ok(Some(value))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .await
            .context(format!("Failed to delete artifact file {:?}", path))?;
        Ok(true)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .context(format!("Failed to list artifact directory {:?}", self.root))?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(decode_key)
            else {
                continue;
            };
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn decode_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
