//! Line oriented persistence for permanent overrides.
//!
//! Each record is `host:port<TAB>score<TAB>lastAccessed<TAB>fingerprint,reasons`
//! where `reasons` uses the compact letter form of [`OverrideBits`]. Temporary
//! overrides are session-only and never reach the file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::fingerprint::Fingerprint;
use crate::overrides::{MatchedOverride, OverrideBits, OverrideEntry, OverrideKey, OverrideStore};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Io error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed record at line {line}: {content:?}")]
    Malformed { line: usize, content: String },
    #[error("Host {0:?} cannot be stored")]
    UnstorableHost(String),
}

// Hosts are written unescaped, so separators would corrupt the record.
fn is_storable_host(host: &str) -> bool {
    !host.is_empty() && !host.chars().any(|c| c == ',' || c.is_control())
}

pub fn parse_line(line: &str) -> Option<OverrideEntry> {
    let mut columns = line.split('\t');
    let key: OverrideKey = columns.next()?.parse().ok()?;
    let score = columns.next()?.parse().ok()?;
    let last_accessed = columns.next()?.parse().ok()?;
    let mut fields = columns.next()?.split(',');
    if columns.next().is_some() {
        return None;
    }
    let fingerprint: Fingerprint = fields.next()?.parse().ok()?;
    let bits = OverrideBits::from_letters(fields.next()?).ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some(OverrideEntry {
        key,
        fingerprint,
        bits,
        temporary: false,
        score,
        last_accessed,
    })
}

pub fn format_entry(entry: &OverrideEntry) -> String {
    format!(
        "{}\t{}\t{}\t{},{}",
        entry.key,
        entry.score,
        entry.last_accessed,
        entry.fingerprint,
        entry.bits.to_letters()
    )
}

pub fn parse(contents: &str) -> Result<Vec<OverrideEntry>, StorageError> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            parse_line(line).ok_or_else(|| StorageError::Malformed {
                line: i + 1,
                content: line.to_string(),
            })
        })
        .collect()
}

/// Serializes the permanent entries of `store`, sorted by key.
pub fn serialize(store: &OverrideStore) -> String {
    let mut entries: Vec<&OverrideEntry> = store.permanent_entries().collect();
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    entries
        .into_iter()
        .map(|entry| format_entry(entry) + "\n")
        .collect()
}

/// An [`OverrideStore`] backed by a file. Changes to permanent entries are
/// written through immediately.
#[derive(Debug)]
pub struct OverrideFile {
    path: PathBuf,
    store: OverrideStore,
}

impl OverrideFile {
    /// Loads the records at `path` into `store`. A missing file is an empty one.
    pub fn open(path: &Path, mut store: OverrideStore) -> Result<Self, StorageError> {
        if path.exists() {
            for entry in parse(&fs::read_to_string(path)?)? {
                store.insert_entry(entry);
            }
            debug!("Loaded {} overrides from {:?}", store.len(), path);
        }
        Ok(Self {
            path: path.into(),
            store,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> &OverrideStore {
        &self.store
    }

    pub fn remember(
        &mut self,
        host: &str,
        port: i32,
        fingerprint: &Fingerprint,
        bits: OverrideBits,
        temporary: bool,
    ) -> Result<bool, StorageError> {
        if !temporary && !is_storable_host(host) {
            return Err(StorageError::UnstorableHost(host.to_string()));
        }
        let replaced_permanent = self
            .store
            .get(host, port)
            .map_or(false, |entry| !entry.temporary);
        let new = self.store.remember(host, port, fingerprint, bits, temporary);
        if !temporary || replaced_permanent {
            self.save()?;
        }
        Ok(new)
    }

    /// Access statistics are only flushed on the next write.
    pub fn matching_override(
        &mut self,
        host: &str,
        port: i32,
        fingerprint: &Fingerprint,
    ) -> Option<MatchedOverride> {
        self.store.matching_override(host, port, fingerprint)
    }

    pub fn clear(&mut self, host: &str, port: i32) -> Result<Option<OverrideEntry>, StorageError> {
        let removed = self.store.clear(host, port);
        if removed.as_ref().map_or(false, |entry| !entry.temporary) {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn end_session(&mut self) -> usize {
        self.store.end_session()
    }

    pub fn save(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                warn!("Creating missing directory {:?}", parent);
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serialize(&self.store))?;
        debug!("Wrote {} permanent overrides to {:?}", self.store.permanent_entries().count(), self.path);
        Ok(())
    }

    pub fn into_store(self) -> OverrideStore {
        self.store
    }
}
