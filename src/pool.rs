//! Session-scoped cache of scanned unit bytes and type facts.
//!
//! The pool replaces what would otherwise be implicit global state: it is
//! created once per scanning session, handed by reference to every component
//! that resolves units by name, and dropped at session end. It is
//! deliberately not `Sync`; callers driving concurrent scans must use one
//! pool per scan.

use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::scan::UnitOrigin;

/// Everything the pool retains about one scanned unit.
#[derive(Debug, Clone)]
pub struct UnitFacts {
    pub origin: UnitOrigin,
    pub bytes: Vec<u8>,
    pub is_interface: bool,
    /// Dotted names of the interfaces the unit declares.
    pub interfaces: Vec<String>,
    /// Dotted superclass name, absent only for the root type.
    pub super_name: Option<String>,
}

/// In-memory unit cache keyed by dotted unit name.
#[derive(Debug, Default)]
pub struct UnitPool {
    units: RefCell<HashMap<String, UnitFacts>>,
}

impl UnitPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a unit, returning whether this was its first sighting. The
    /// first record for a name wins; a unit seen again (the same archive
    /// listed twice, say) does not replace the original.
    pub fn insert(&self, name: &str, facts: UnitFacts) -> bool {
        match self.units.borrow_mut().entry(name.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(facts);
                true
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.borrow().contains_key(name)
    }

    /// Fetch a unit's facts by name, cloned out of the cache.
    pub fn get(&self, name: &str) -> Option<UnitFacts> {
        self.units.borrow().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.units.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.borrow().is_empty()
    }

    /// Decide whether `implementation_name` is assignable to
    /// `interface_name`, walking recorded supertypes and interface lists.
    ///
    /// Returns `None` when the question cannot be settled from the pool:
    /// either endpoint is unknown, or the walk runs off the edge of the
    /// scanned world before finding the interface. `Some(false)` is only
    /// returned when every reachable supertype was resolvable and none of
    /// them is the interface.
    pub fn is_assignable(&self, interface_name: &str, implementation_name: &str) -> Option<bool> {
        if interface_name == implementation_name {
            return Some(true);
        }
        let units = self.units.borrow();
        if !units.contains_key(interface_name) || !units.contains_key(implementation_name) {
            return None;
        }

        let mut stack = vec![implementation_name.to_string()];
        let mut seen = std::collections::HashSet::new();
        let mut hit_unknown = false;
        while let Some(name) = stack.pop() {
            if name == interface_name {
                return Some(true);
            }
            if !seen.insert(name.clone()) {
                continue;
            }
            match units.get(&name) {
                Some(facts) => {
                    stack.extend(facts.interfaces.iter().cloned());
                    if let Some(super_name) = &facts.super_name {
                        // The root type closes the chain without being scanned.
                        if super_name != "java.lang.Object" {
                            stack.push(super_name.clone());
                        }
                    }
                }
                None => hit_unknown = true,
            }
        }
        if hit_unknown {
            None
        } else {
            Some(false)
        }
    }
}
