//! Snapshot persistence for the registry state.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// File name of the registry snapshot inside the data directory.
pub const SNAPSHOT_FILE: &str = "registry.snapshot.json";

/// A persisted checkpoint of the folded state.
///
/// Written atomically (`.tmp` + rename). On the next open only records
/// after `offset` are folded. The file is plain JSON:
///
/// ```text
/// $ jq '{offset, seq, hash}' registry.snapshot.json
/// { "offset": 18234, "seq": 41, "hash": "9c1e0f3b2a7d44e1" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Snapshot<S> {
    pub state: S,

    /// Byte offset into `journal.jsonl` just past the last folded record.
    /// Always relative to the active journal: a snapshot has already
    /// consumed the whole archive.
    pub offset: u64,

    /// Hex xxh64 hash of the last folded line, checked on load.
    pub hash: String,

    /// Sequence number of the last folded record.
    pub seq: u64,
}

impl<S> Snapshot<S> {
    pub fn new(state: S, offset: u64, hash: String, seq: u64) -> Self {
        Snapshot {
            state,
            offset,
            hash,
            seq,
        }
    }
}

/// Save a snapshot atomically. A crash mid-write leaves the previous
/// snapshot intact.
pub fn save<S: Serialize>(path: &Path, snapshot: &Snapshot<S>) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_vec(snapshot)?;

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(&json)?;
    file.sync_data()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load a snapshot.
///
/// Returns `Ok(None)` if there is none, or if it cannot be decoded: a
/// corrupt snapshot is treated as missing and the journal is replayed.
pub fn load<S: DeserializeOwned>(path: &Path) -> Result<Option<Snapshot<S>>> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_slice(&contents) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(e) => {
            log::warn!("ignoring unreadable snapshot {}: {e}", path.display());
            Ok(None)
        }
    }
}

/// Delete a snapshot and its temporary file. Idempotent.
pub fn delete(path: &Path) -> Result<()> {
    for target in [path.to_path_buf(), path.with_extension("json.tmp")] {
        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
