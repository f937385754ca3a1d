//! classbind
//!
//! Discovers which concrete compiled unit implements which interface by
//! inspecting class-file structure (never loading or executing anything),
//! and mechanically rewrites interface metadata to declare a type-adapter
//! binding so a declarative marshalling layer can substitute the concrete
//! type wherever the interface appears.
//!
//! The pieces, leaves first: a minimal class-file parser/patcher
//! ([`classfile`]), a location scanner ([`scan`]) feeding a session unit
//! cache ([`pool`]), a binding index ([`index`]), a synchronous discovery
//! event pipeline ([`discovery`]), the adapter metadata rewriter
//! ([`rewrite`]) and adapter unit generator ([`generate`]), and a
//! persistence coordinator ([`persist`]) that writes modified units back
//! to loose files or archives. [`bind`] wires rewrite and persistence into
//! a single discovery listener.

pub mod bind;
pub mod classfile;
pub mod discovery;
pub mod generate;
pub mod index;
pub mod persist;
pub mod pool;
pub mod rewrite;
pub mod scan;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
