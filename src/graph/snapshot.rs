//! Snapshot persistence
//!
//! A snapshot holds the authoritative rows (organizations, persons with the
//! review queue, roles, grants) as bincode inside a gzip stream. Connection
//! edges and lookup indices are regenerated on load.

use super::records::{Grant, Organization, Role};
use super::store::GraphStore;
use crate::identity::PersonRegistry;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::info;

const FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Unsupported snapshot format version {0}")]
    UnsupportedVersion(u32),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Summary of a written snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub saved_at: DateTime<Utc>,
    pub organizations: usize,
    pub persons: usize,
    pub roles: usize,
    pub grants: usize,
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    format_version: u32,
    saved_at: DateTime<Utc>,
    organizations: Vec<Organization>,
    persons: PersonRegistry,
    roles: Vec<Role>,
    grants: Vec<Grant>,
}

/// Write a compressed snapshot of `store` to `writer`
pub fn write_to<W: Write>(store: &GraphStore, writer: W) -> SnapshotResult<SnapshotInfo> {
    let file = SnapshotFile {
        format_version: FORMAT_VERSION,
        saved_at: Utc::now(),
        organizations: store.organizations().cloned().collect(),
        persons: store.persons().clone(),
        roles: store.roles().cloned().collect(),
        grants: store.grants().cloned().collect(),
    };

    let mut encoder = GzEncoder::new(writer, Compression::default());
    bincode::serialize_into(&mut encoder, &file)?;
    encoder.finish()?.flush()?;

    Ok(SnapshotInfo {
        saved_at: file.saved_at,
        organizations: file.organizations.len(),
        persons: file.persons.len(),
        roles: file.roles.len(),
        grants: file.grants.len(),
    })
}

/// Read a compressed snapshot and rebuild the store
pub fn read_from<R: Read>(reader: R) -> SnapshotResult<GraphStore> {
    let decoder = GzDecoder::new(reader);
    let file: SnapshotFile = bincode::deserialize_from(decoder)?;
    if file.format_version != FORMAT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(file.format_version));
    }
    Ok(GraphStore::from_parts(file.organizations, file.persons, file.roles, file.grants))
}

pub fn save(store: &GraphStore, path: impl AsRef<Path>) -> SnapshotResult<SnapshotInfo> {
    let path = path.as_ref();
    let info = write_to(store, BufWriter::new(File::create(path)?))?;
    info!(
        "Saved snapshot to {:?}: {} organizations, {} persons, {} roles, {} grants",
        path, info.organizations, info.persons, info.roles, info.grants
    );
    Ok(info)
}

pub fn load(path: impl AsRef<Path>) -> SnapshotResult<GraphStore> {
    let path = path.as_ref();
    let store = read_from(BufReader::new(File::open(path)?))?;
    info!(
        "Loaded snapshot from {:?}: {} organizations, {} persons",
        path,
        store.organization_count(),
        store.person_count()
    );
    Ok(store)
}
