//! Persistence coordinator: batches pending rewrites by location and
//! writes them back to loose files or archive members.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use thiserror::Error;
use zip::write::SimpleFileOptions;

use crate::rewrite::Modification;
use crate::scan::ScanLocation;

/// Error type for persistence.
#[derive(Debug, Error)]
pub enum PersistError {
    /// More than one modification was queued against one loose-file
    /// location. Single-file locations are 1:1 with compiled units, so
    /// this is an upstream queuing bug, never a recoverable condition.
    #[error("more than one modification queued for single-file location {0}")]
    TooManyModificationsForSingleFile(String),

    /// The flush target is neither a loose file nor an archive.
    #[error("unsupported location scheme for persistence: {0}")]
    UnsupportedLocationScheme(String),

    /// An I/O failure, wrapped with the offending location.
    #[error("I/O error writing {location}")]
    Io { location: String, #[source] source: std::io::Error },

    /// The archive could not be read or rewritten.
    #[error("archive error rewriting {location}")]
    Archive { location: String, #[source] source: zip::result::ZipError },

    /// A queued modification names an archive member the archive does not
    /// contain.
    #[error("archive {location} has no member {member}")]
    MissingArchiveMember { location: String, member: String },
}

/// Lifecycle of the coordinator across one discovery cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinatorState {
    #[default]
    Idle,
    Collecting,
    Flushing,
}

/// Owns the queue of pending modifications for one discovery cycle.
///
/// Idle until a cycle begins, Collecting while modifications are enqueued
/// by location, Flushing while they are written back. The pending queue is
/// cleared unconditionally when flushing completes or fails, so a failed
/// cycle never leaks stale modifications into the next one.
#[derive(Debug, Default)]
pub struct PersistenceCoordinator {
    pending: BTreeMap<ScanLocation, Vec<Modification>>,
    state: CoordinatorState,
}

impl PersistenceCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Number of modifications currently queued.
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Start a discovery cycle, dropping anything left from a prior one.
    pub fn begin(&mut self) {
        self.pending.clear();
        self.state = CoordinatorState::Collecting;
    }

    /// Queue a modification under its originating location. Unmodified
    /// results are dropped; there is nothing to write back for them.
    pub fn enqueue(&mut self, modification: Modification) {
        if !modification.is_modified() {
            return;
        }
        self.state = CoordinatorState::Collecting;
        self.pending
            .entry(modification.origin().location.clone())
            .or_default()
            .push(modification);
    }

    /// Write every queued modification back to its location, in location
    /// order. The queue is taken out before any write happens, so the
    /// coordinator returns to Idle with an empty queue whether or not the
    /// flush succeeds.
    pub fn flush(&mut self) -> Result<(), PersistError> {
        self.state = CoordinatorState::Flushing;
        let pending = std::mem::take(&mut self.pending);
        let result = Self::flush_all(&pending);
        self.state = CoordinatorState::Idle;
        result
    }

    fn flush_all(pending: &BTreeMap<ScanLocation, Vec<Modification>>) -> Result<(), PersistError> {
        for (location, modifications) in pending {
            match location {
                ScanLocation::File(path) => Self::flush_loose_file(path, modifications)?,
                ScanLocation::Archive(path) => Self::flush_archive(path, modifications)?,
                ScanLocation::Dir(_) => {
                    return Err(PersistError::UnsupportedLocationScheme(location.to_string()));
                }
            }
        }
        Ok(())
    }

    fn flush_loose_file(path: &Path, modifications: &[Modification]) -> Result<(), PersistError> {
        let location = path.display().to_string();
        if modifications.len() != 1 {
            return Err(PersistError::TooManyModificationsForSingleFile(location));
        }
        fs::write(path, modifications[0].bytes())
            .map_err(|source| PersistError::Io { location, source })
    }

    /// Rewrite an archive by copy-and-replace: every member of the
    /// original is streamed into a temporary file beside it, with modified
    /// members substituted by name, and the temporary file then atomically
    /// replaces the original. The temporary file cleans itself up if the
    /// rewrite fails before the final rename.
    fn flush_archive(path: &Path, modifications: &[Modification]) -> Result<(), PersistError> {
        let location = path.display().to_string();

        let mut replacements: HashMap<&str, &Modification> = HashMap::new();
        for modification in modifications {
            let member = modification.origin().member.as_deref().ok_or_else(|| {
                PersistError::MissingArchiveMember {
                    location: location.clone(),
                    member: String::new(),
                }
            })?;
            replacements.insert(member, modification);
        }

        let file = fs::File::open(path)
            .map_err(|source| PersistError::Io { location: location.clone(), source })?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|source| PersistError::Archive { location: location.clone(), source })?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let staged = NamedTempFile::new_in(dir)
            .map_err(|source| PersistError::Io { location: location.clone(), source })?;
        let mut writer = zip::ZipWriter::new(staged);

        let mut unmatched: std::collections::HashSet<&str> =
            replacements.keys().copied().collect();
        for i in 0..archive.len() {
            let member = archive
                .by_index(i)
                .map_err(|source| PersistError::Archive { location: location.clone(), source })?;
            match replacements.get(member.name()) {
                Some(modification) => {
                    let member_name = member.name().to_string();
                    let options = SimpleFileOptions::default()
                        .compression_method(zip::CompressionMethod::Deflated);
                    writer.start_file(&member_name, options).map_err(|source| {
                        PersistError::Archive { location: location.clone(), source }
                    })?;
                    writer.write_all(modification.bytes()).map_err(|source| {
                        PersistError::Io { location: location.clone(), source }
                    })?;
                    unmatched.remove(member_name.as_str());
                }
                None => {
                    writer.raw_copy_file(member).map_err(|source| {
                        PersistError::Archive { location: location.clone(), source }
                    })?;
                }
            }
        }
        if let Some(member) = unmatched.into_iter().next() {
            return Err(PersistError::MissingArchiveMember { location, member: member.to_string() });
        }

        let staged = writer
            .finish()
            .map_err(|source| PersistError::Archive { location: location.clone(), source })?;
        staged
            .persist(path)
            .map_err(|source| PersistError::Io { location, source: source.error })?;
        Ok(())
    }
}
