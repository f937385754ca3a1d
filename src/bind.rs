//! Listener that rewrites discovered interfaces and persists the results.
//!
//! One discovery cycle maps onto the coordinator's lifecycle: start clears
//! and begins collecting, each discovered pair is rewritten and queued, and
//! cycle end flushes everything back to its originating location.

use crate::discovery::{DiscoveryEvent, DiscoveryListener, ListenerError};
use crate::generate::{package_name, AdapterNameTemplate};
use crate::persist::PersistenceCoordinator;
use crate::rewrite::AdapterInstaller;

/// Binds discovered implementations by decorating their interfaces with
/// the type-adapter annotation and writing the modified units back.
#[derive(Debug, Default)]
pub struct AdapterBinder {
    installer: AdapterInstaller,
    template: AdapterNameTemplate,
    /// Package for generated adapter names; defaults to the package of the
    /// implementation class.
    adapter_package: Option<String>,
    coordinator: PersistenceCoordinator,
}

impl AdapterBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_installer(mut self, installer: AdapterInstaller) -> Self {
        self.installer = installer;
        self
    }

    pub fn with_template(mut self, template: AdapterNameTemplate) -> Self {
        self.template = template;
        self
    }

    /// Pin the package used for adapter names instead of deriving it from
    /// the implementation class.
    pub fn with_adapter_package(mut self, package: impl Into<String>) -> Self {
        self.adapter_package = Some(package.into());
        self
    }

    pub fn coordinator(&self) -> &PersistenceCoordinator {
        &self.coordinator
    }

    fn adapter_package_for(&self, implementation_name: &str) -> String {
        match &self.adapter_package {
            Some(package) => package.clone(),
            None => package_name(implementation_name).to_string(),
        }
    }
}

impl DiscoveryListener for AdapterBinder {
    fn discovery_started(&mut self) -> Result<(), ListenerError> {
        self.coordinator.begin();
        Ok(())
    }

    fn implementation_discovered(
        &mut self,
        event: &DiscoveryEvent<'_>,
    ) -> Result<(), ListenerError> {
        let package = self.adapter_package_for(event.implementation_name);
        let adapter_name =
            self.template.render(&package, event.interface_name, event.implementation_name)?;
        let modification =
            self.installer.install_by_name(event.pool, event.interface_name, &adapter_name)?;
        self.coordinator.enqueue(modification);
        Ok(())
    }

    fn discovery_ended(&mut self) -> Result<(), ListenerError> {
        self.coordinator.flush()?;
        Ok(())
    }
}
