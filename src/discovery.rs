//! Discovery event pipeline: wraps a scan in a started/discovered/ended
//! sequence and fans each discovered pair out to registered listeners.
//!
//! Dispatch is synchronous, on the calling thread, in listener registration
//! order. There is no isolation between listeners: a failing listener stops
//! the remaining dispatch for that event and the failure surfaces through
//! the triggering `run` call. Listeners are a side channel, not a gate; the
//! scan proceeds even when none are registered.

use std::collections::HashSet;

use crate::pool::UnitPool;
use crate::scan::{ScanError, ScanLocation, ScanResult, Scanner};

/// One discovered (interface, implementation) pair, alive for a single
/// synchronous dispatch. The session pool rides along so listeners can
/// resolve either side by name.
#[derive(Debug)]
pub struct DiscoveryEvent<'a> {
    pub interface_name: &'a str,
    pub implementation_name: &'a str,
    pub pool: &'a UnitPool,
}

/// Error type listeners report; the pipeline wraps it and aborts the scan.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives the discovery lifecycle.
pub trait DiscoveryListener {
    fn discovery_started(&mut self) -> Result<(), ListenerError> {
        Ok(())
    }

    fn implementation_discovered(&mut self, event: &DiscoveryEvent<'_>) -> Result<(), ListenerError>;

    fn discovery_ended(&mut self) -> Result<(), ListenerError> {
        Ok(())
    }
}

/// Drives a scan and dispatches discovery events.
pub struct ImplementationFinder {
    marker_prefix: String,
    ignored_prefixes: HashSet<String>,
    listeners: Vec<Box<dyn DiscoveryListener>>,
}

impl Default for ImplementationFinder {
    fn default() -> Self {
        Self {
            marker_prefix: crate::index::BINDING_ANNOTATION_PREFIX.to_string(),
            ignored_prefixes: HashSet::new(),
            listeners: Vec::new(),
        }
    }
}

impl ImplementationFinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_marker_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.marker_prefix = prefix.into();
        self
    }

    pub fn with_ignored_prefixes(mut self, prefixes: impl IntoIterator<Item = String>) -> Self {
        self.ignored_prefixes = prefixes.into_iter().collect();
        self
    }

    /// Register a listener. Dispatch happens in registration order.
    pub fn add_listener(&mut self, listener: Box<dyn DiscoveryListener>) {
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Run one discovery cycle over `locations`: `discovery_started`, one
    /// `implementation_discovered` per qualifying pair, `discovery_ended`.
    pub fn run(&mut self, locations: &[ScanLocation], pool: &UnitPool) -> ScanResult<()> {
        for listener in &mut self.listeners {
            listener.discovery_started().map_err(ScanError::Listener)?;
        }

        let scanner = Scanner::new(self.ignored_prefixes.iter().cloned());
        let marker_prefix = &self.marker_prefix;
        let ignored_prefixes = &self.ignored_prefixes;
        let listeners = &mut self.listeners;

        scanner.scan(locations, pool, |unit| {
            for entry in &unit.annotations {
                if !entry.type_name.starts_with(marker_prefix.as_str()) {
                    continue;
                }
                let mut dispatched_one = false;
                for interface_name in &unit.interfaces {
                    if ignored_prefixes.iter().any(|p| interface_name.starts_with(p.as_str())) {
                        continue;
                    }
                    dispatched_one = true;
                    let event = DiscoveryEvent {
                        interface_name,
                        implementation_name: &unit.name,
                        pool,
                    };
                    for listener in listeners.iter_mut() {
                        listener
                            .implementation_discovered(&event)
                            .map_err(ScanError::Listener)?;
                    }
                }
                if dispatched_one {
                    break;
                }
            }
            Ok(())
        })?;

        for listener in &mut self.listeners {
            listener.discovery_ended().map_err(ScanError::Listener)?;
        }
        Ok(())
    }
}
