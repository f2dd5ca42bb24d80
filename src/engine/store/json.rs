//! JSON-backed zone store.
//!
//! `JsonZoneStore` keeps every store-origin zone in a single JSON file:
//!
//! ```json
//! { "version": 1, "items": [ { "id": "office", "name": "Office", ... } ] }
//! ```
//!
//! ### I/O characteristics
//! - Every write **reads then rewrites** the whole file. For large collections,
//!   use the SQLite store.
//! - Writes go to a sibling temp file which is then renamed over the original.
//! - A missing file is an empty store; a corrupt file is an error.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use crate::engine::store::{record_id, ZoneStore, STORAGE_VERSION};
use crate::engine::zone::ZoneDefinition;

/// On-disk representation of the store.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ZoneStoreFile {
    version: u32,
    items: Vec<ZoneDefinition>,
}

pub struct JsonZoneStore {
    /// Path to the JSON file
    path: PathBuf,
    /// Serializes read-modify-write cycles
    io: Mutex<()>,
}

impl JsonZoneStore {
    /// Opens a store at `path`. The file is created on the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_file(&self) -> Result<ZoneStoreFile> {
        if !self.path.exists() {
            return Ok(ZoneStoreFile {
                version: STORAGE_VERSION,
                items: vec![],
            });
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("cannot read zone store {}", self.path.display()))?;
        let file: ZoneStoreFile = serde_json::from_str(&contents)
            .with_context(|| format!("cannot parse zone store {}", self.path.display()))?;
        if file.version > STORAGE_VERSION {
            bail!(
                "zone store {} has version {}, newest supported is {}",
                self.path.display(),
                file.version,
                STORAGE_VERSION
            );
        }
        Ok(file)
    }

    fn save_file(&self, file: &ZoneStoreFile) -> Result<()> {
        let contents = serde_json::to_string_pretty(file)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)
            .with_context(|| format!("cannot write zone store {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("cannot replace zone store {}", self.path.display()))?;
        Ok(())
    }

    fn modify(&self, f: impl FnOnce(&mut Vec<ZoneDefinition>) -> Result<()>) -> Result<()> {
        let _guard = self.io.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = self.load_file()?;
        f(&mut file.items)?;
        file.version = STORAGE_VERSION;
        self.save_file(&file)
    }
}

impl ZoneStore for JsonZoneStore {
    fn load_all(&self) -> Result<Vec<ZoneDefinition>> {
        let _guard = self.io.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let file = self.load_file()?;
        for zone in &file.items {
            record_id(zone)?;
        }
        Ok(file.items)
    }

    fn save(&self, zone: &ZoneDefinition) -> Result<()> {
        let id = record_id(zone)?.to_string();
        self.modify(|items| {
            match items.iter_mut().find(|z| z.id.as_deref() == Some(id.as_str())) {
                Some(existing) => *existing = zone.clone(),
                None => items.push(zone.clone()),
            }
            Ok(())
        })
    }

    fn remove(&self, id: &str) -> Result<()> {
        self.modify(|items| {
            items.retain(|z| z.id.as_deref() != Some(id));
            Ok(())
        })
    }
}
