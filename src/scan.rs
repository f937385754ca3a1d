//! Location resolution and the binary unit scanner.
//!
//! The scanner walks loose directories and archives, parses each compiled
//! unit's structure (never loading or executing it), records what it saw in
//! the session [`UnitPool`], and hands every non-interface unit to an
//! injected callback. What to *do* with a candidate unit is entirely the
//! callback's business; the binding index and the discovery pipeline are
//! both thin policies over this one scanner.

use std::collections::HashSet;
use std::env;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

use crate::classfile::annotations::{Annotation, AnnotationsAttribute, RUNTIME_VISIBLE_ANNOTATIONS};
use crate::classfile::{ClassFile, FormatError};
use crate::pool::{UnitFacts, UnitPool};

/// A place compiled units live: a loose directory tree, an archive of
/// units, or a single loose unit file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScanLocation {
    Dir(PathBuf),
    Archive(PathBuf),
    File(PathBuf),
}

impl ScanLocation {
    /// Classify a path into a location by shape: directories scan
    /// recursively, `.jar`/`.zip` files are archives, `.class` files are
    /// single loose units. Anything else is an unsupported scheme.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, ScanError> {
        let path = path.into();
        if path.is_dir() {
            return Ok(ScanLocation::Dir(path));
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("jar") | Some("zip") => Ok(ScanLocation::Archive(path)),
            Some("class") => Ok(ScanLocation::File(path)),
            _ => Err(ScanError::UnsupportedLocationScheme(path.display().to_string())),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ScanLocation::Dir(p) | ScanLocation::Archive(p) | ScanLocation::File(p) => p,
        }
    }

    /// Resolve to an absolute location before scanning. Falls back to
    /// joining onto the current directory when the path cannot be
    /// canonicalized (it may not exist yet at resolution time).
    pub fn absolutize(self) -> Result<Self, ScanError> {
        let rebuild = |p: PathBuf| -> Result<PathBuf, ScanError> {
            match p.canonicalize() {
                Ok(abs) => Ok(abs),
                Err(_) => {
                    let cwd = env::current_dir().map_err(|source| ScanError::Io {
                        location: p.display().to_string(),
                        source,
                    })?;
                    Ok(cwd.join(p))
                }
            }
        };
        Ok(match self {
            ScanLocation::Dir(p) => ScanLocation::Dir(rebuild(p)?),
            ScanLocation::Archive(p) => ScanLocation::Archive(rebuild(p)?),
            ScanLocation::File(p) => ScanLocation::File(rebuild(p)?),
        })
    }
}

impl fmt::Display for ScanLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanLocation::Dir(p) => write!(f, "dir:{}", p.display()),
            ScanLocation::Archive(p) => write!(f, "archive:{}", p.display()),
            ScanLocation::File(p) => write!(f, "file:{}", p.display()),
        }
    }
}

/// Where one unit's bytes came from: its location, plus the member name
/// when the location is an archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitOrigin {
    pub location: ScanLocation,
    pub member: Option<String>,
}

impl UnitOrigin {
    pub fn loose(path: impl Into<PathBuf>) -> Self {
        Self { location: ScanLocation::File(path.into()), member: None }
    }

    pub fn archived(archive: impl Into<PathBuf>, member: impl Into<String>) -> Self {
        Self { location: ScanLocation::Archive(archive.into()), member: Some(member.into()) }
    }
}

impl fmt::Display for UnitOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.member {
            Some(member) => write!(f, "{}!{member}", self.location),
            None => write!(f, "{}", self.location),
        }
    }
}

/// One metadata attribute found on a unit: the annotation's dotted type
/// name plus its parsed entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataEntry {
    pub type_name: String,
    pub annotation: Annotation,
}

/// Borrowed view of one scanned unit, alive only for the duration of the
/// scan callback. Callers keep primitive facts (name strings), never the
/// view itself.
#[derive(Debug)]
pub struct CompiledUnit<'a> {
    /// Dotted unit name.
    pub name: String,
    /// Dotted names of the interfaces the unit declares.
    pub interfaces: Vec<String>,
    /// Class-level metadata entries, in declaration order.
    pub annotations: Vec<MetadataEntry>,
    pub origin: &'a UnitOrigin,
    pub bytes: &'a [u8],
}

/// Error type for scanning.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A required input was empty.
    #[error("invalid argument: {0} must not be empty")]
    InvalidArgument(&'static str),

    /// A location is neither a loose unit, a directory, nor an archive.
    #[error("unsupported location scheme: {0}")]
    UnsupportedLocationScheme(String),

    /// An I/O failure, wrapped with the offending location.
    #[error("I/O error scanning {location}")]
    Io { location: String, #[source] source: std::io::Error },

    /// An archive could not be opened or traversed.
    #[error("archive error in {location}")]
    Archive { location: String, #[source] source: zip::result::ZipError },

    /// A unit's binary structure could not be parsed.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// A discovery listener failed; dispatch stops and the failure
    /// surfaces through the scan call that triggered it.
    #[error("discovery listener failed")]
    Listener(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Convenience result type for scan operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Walks locations and reports candidate units to a callback.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    ignored_prefixes: HashSet<String>,
}

impl Scanner {
    pub fn new(ignored_prefixes: impl IntoIterator<Item = String>) -> Self {
        Self { ignored_prefixes: ignored_prefixes.into_iter().collect() }
    }

    /// Whether a dotted name falls under one of the ignored prefixes.
    pub fn should_ignore(&self, name: &str) -> bool {
        self.ignored_prefixes.iter().any(|prefix| name.starts_with(prefix.as_str()))
    }

    /// Scan every unit reachable from `locations`, recording each parsed
    /// unit in `pool` and invoking `callback` once per non-interface unit
    /// that is not excluded by an ignored prefix.
    ///
    /// Interface units are parsed for structure and pooled, but the
    /// callback never sees them: an interface is never a discoverable
    /// implementation.
    pub fn scan<F>(&self, locations: &[ScanLocation], pool: &UnitPool, mut callback: F) -> ScanResult<()>
    where
        F: FnMut(&CompiledUnit<'_>) -> ScanResult<()>,
    {
        if locations.is_empty() {
            return Err(ScanError::InvalidArgument("locations"));
        }
        let mut visited = HashSet::new();
        for location in locations {
            // Locations are resolved to absolute form up front so unit
            // origins stay stable however the caller addressed them, and
            // a location listed twice is walked once.
            let location = location.clone().absolutize()?;
            if !visited.insert(location.clone()) {
                continue;
            }
            match location {
                ScanLocation::Dir(path) => self.scan_dir(&path, pool, &mut callback)?,
                ScanLocation::Archive(path) => self.scan_archive(&path, pool, &mut callback)?,
                ScanLocation::File(path) => {
                    let bytes = read_file(&path)?;
                    let origin = UnitOrigin::loose(path);
                    self.scan_unit_bytes(&origin, &bytes, pool, &mut callback)?;
                }
            }
        }
        Ok(())
    }

    /// Feed one already-loaded unit through the same filtering and pool
    /// recording as location scanning. This is the entry point for callers
    /// holding pre-opened unit collections.
    pub fn scan_unit_bytes<F>(
        &self,
        origin: &UnitOrigin,
        bytes: &[u8],
        pool: &UnitPool,
        callback: &mut F,
    ) -> ScanResult<()>
    where
        F: FnMut(&CompiledUnit<'_>) -> ScanResult<()>,
    {
        let class = ClassFile::parse(bytes)?;
        let name = class.name()?;
        if self.should_ignore(&name) {
            return Ok(());
        }
        let interfaces = class.interface_names()?;
        let is_interface = class.is_interface();

        let first_sighting = pool.insert(
            &name,
            UnitFacts {
                origin: origin.clone(),
                bytes: bytes.to_vec(),
                is_interface,
                interfaces: interfaces.clone(),
                super_name: class.super_name()?,
            },
        );

        // A unit already recorded this session is never reported again, so
        // overlapping locations collapse onto the first sighting.
        if !first_sighting || is_interface {
            return Ok(());
        }

        let annotations = match class.attribute(RUNTIME_VISIBLE_ANNOTATIONS) {
            Some(attr) => AnnotationsAttribute::parse(&attr.data)?
                .annotations
                .into_iter()
                .map(|annotation| {
                    Ok(MetadataEntry {
                        type_name: annotation.type_name(&class.const_pool)?,
                        annotation,
                    })
                })
                .collect::<Result<Vec<_>, FormatError>>()?,
            None => Vec::new(),
        };

        let unit = CompiledUnit { name, interfaces, annotations, origin, bytes };
        callback(&unit)
    }

    fn scan_dir<F>(&self, root: &Path, pool: &UnitPool, callback: &mut F) -> ScanResult<()>
    where
        F: FnMut(&CompiledUnit<'_>) -> ScanResult<()>,
    {
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| ScanError::Io {
                location: root.display().to_string(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("class") {
                continue;
            }
            let bytes = read_file(path)?;
            let origin = UnitOrigin::loose(path.to_path_buf());
            self.scan_unit_bytes(&origin, &bytes, pool, callback)?;
        }
        Ok(())
    }

    fn scan_archive<F>(&self, path: &Path, pool: &UnitPool, callback: &mut F) -> ScanResult<()>
    where
        F: FnMut(&CompiledUnit<'_>) -> ScanResult<()>,
    {
        let location = path.display().to_string();
        let file = fs::File::open(path)
            .map_err(|source| ScanError::Io { location: location.clone(), source })?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|source| ScanError::Archive { location: location.clone(), source })?;
        for i in 0..archive.len() {
            let mut member = archive
                .by_index(i)
                .map_err(|source| ScanError::Archive { location: location.clone(), source })?;
            let member_name = member.name().to_string();
            if !member_name.ends_with(".class") {
                continue;
            }
            let mut bytes = Vec::with_capacity(member.size() as usize);
            member
                .read_to_end(&mut bytes)
                .map_err(|source| ScanError::Io { location: location.clone(), source })?;
            let origin = UnitOrigin::archived(path.to_path_buf(), member_name);
            self.scan_unit_bytes(&origin, &bytes, pool, callback)?;
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> ScanResult<Vec<u8>> {
    fs::read(path).map_err(|source| ScanError::Io { location: path.display().to_string(), source })
}
