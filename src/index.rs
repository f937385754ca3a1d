//! Binding index: turns a scan into an interface-name to
//! implementation-name mapping.

use std::collections::{BTreeMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::pool::UnitPool;
use crate::scan::{ScanLocation, ScanResult, Scanner};

/// Annotation-type prefix marking a unit as a participant in declarative
/// binding.
pub const BINDING_ANNOTATION_PREFIX: &str = "javax.xml.bind.annotation.";

/// Accept/reject policy over discovered (interface, implementation) pairs.
///
/// Implementations must reject pairs where either name is empty.
pub trait BindingFilter {
    fn accept(&self, interface_name: &str, implementation_name: &str) -> bool;
}

/// Rejects interface names matching a regular expression; everything else
/// is accepted.
#[derive(Debug, Clone)]
pub struct RejectPatternFilter {
    regex: Regex,
}

impl RejectPatternFilter {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self { regex: Regex::new(pattern)? })
    }

    pub fn from_regex(regex: Regex) -> Self {
        Self { regex }
    }
}

impl BindingFilter for RejectPatternFilter {
    fn accept(&self, interface_name: &str, implementation_name: &str) -> bool {
        !interface_name.is_empty()
            && !implementation_name.is_empty()
            && self.regex.find(interface_name).is_none()
    }
}

/// Accepts only interface names matching a regular expression.
#[derive(Debug, Clone)]
pub struct AcceptPatternFilter {
    regex: Regex,
}

impl AcceptPatternFilter {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self { regex: Regex::new(pattern)? })
    }

    pub fn from_regex(regex: Regex) -> Self {
        Self { regex }
    }
}

impl BindingFilter for AcceptPatternFilter {
    fn accept(&self, interface_name: &str, implementation_name: &str) -> bool {
        !interface_name.is_empty()
            && !implementation_name.is_empty()
            && self.regex.find(interface_name).is_some()
    }
}

/// A duplicate binding for an interface that was already bound. The first
/// writer is kept; conflicts are reported, not fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingConflict {
    pub interface_name: String,
    /// The implementation that won (first occurrence).
    pub kept: String,
    /// The implementation that arrived later and was not recorded.
    pub rejected: String,
}

/// Result of one indexing pass: the sorted binding mapping plus any
/// duplicate-binding conflicts observed along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingOutcome {
    /// Interface name to implementation name, iteration order sorted by
    /// interface name.
    pub bindings: BTreeMap<String, String>,
    pub conflicts: Vec<BindingConflict>,
}

impl BindingOutcome {
    /// Serialize the outcome for the package-level aggregator, which
    /// consumes the binding mapping as this crate's sole output contract.
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Policy layer over the scanner that accumulates interface-to-
/// implementation bindings.
pub struct BindingIndex {
    marker_prefix: String,
    ignored_prefixes: HashSet<String>,
    filter: Option<Box<dyn BindingFilter>>,
}

impl Default for BindingIndex {
    fn default() -> Self {
        Self {
            marker_prefix: BINDING_ANNOTATION_PREFIX.to_string(),
            ignored_prefixes: HashSet::new(),
            filter: None,
        }
    }
}

impl BindingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper to override the binding marker prefix.
    pub fn with_marker_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.marker_prefix = prefix.into();
        self
    }

    /// Builder-style helper to exclude units and interfaces under the
    /// given dot-separated name prefixes.
    pub fn with_ignored_prefixes(mut self, prefixes: impl IntoIterator<Item = String>) -> Self {
        self.ignored_prefixes = prefixes.into_iter().collect();
        self
    }

    /// Builder-style helper to attach an accept/reject filter.
    pub fn with_filter(mut self, filter: Box<dyn BindingFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    fn should_ignore(&self, name: &str) -> bool {
        self.ignored_prefixes.iter().any(|prefix| name.starts_with(prefix.as_str()))
    }

    /// Scan `locations` and build the binding mapping.
    ///
    /// A unit contributes bindings when it is not an interface, carries at
    /// least one marker annotation, and declares at least one interface
    /// surviving the ignored prefixes and the filter. Once one marker
    /// annotation on a unit has contributed, the unit's remaining
    /// annotations are not consulted. The first binding recorded for an
    /// interface wins; later ones are reported as conflicts.
    pub fn index(&self, locations: &[ScanLocation], pool: &UnitPool) -> ScanResult<BindingOutcome> {
        let scanner = Scanner::new(self.ignored_prefixes.iter().cloned());
        let mut outcome = BindingOutcome::default();

        scanner.scan(locations, pool, |unit| {
            for entry in &unit.annotations {
                if !entry.type_name.starts_with(self.marker_prefix.as_str()) {
                    continue;
                }
                let mut processed_one = false;
                for interface_name in &unit.interfaces {
                    if self.should_ignore(interface_name) {
                        continue;
                    }
                    if let Some(filter) = &self.filter {
                        if !filter.accept(interface_name, &unit.name) {
                            continue;
                        }
                    }
                    processed_one = true;
                    match outcome.bindings.get(interface_name) {
                        Some(kept) => outcome.conflicts.push(BindingConflict {
                            interface_name: interface_name.clone(),
                            kept: kept.clone(),
                            rejected: unit.name.clone(),
                        }),
                        None => {
                            outcome
                                .bindings
                                .insert(interface_name.clone(), unit.name.clone());
                        }
                    }
                }
                if processed_one {
                    break;
                }
            }
            Ok(())
        })?;

        Ok(outcome)
    }
}
