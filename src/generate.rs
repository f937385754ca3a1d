//! Adapter unit generator: synthesizes the compiled unit for a universal
//! adapter subclass parameterized by one interface and one implementation.

use thiserror::Error;

use crate::classfile::{
    internal_form, AttributeEntry, ClassFile, ConstPool, ACC_PUBLIC, ACC_SUPER,
    SIGNATURE_ATTRIBUTE,
};
use crate::pool::UnitPool;

/// Default dotted name of the generic two-type-parameter adapter base.
pub const UNIVERSAL_ADAPTER_BASE: &str = "classbind.runtime.UniversalAdapter";

/// Default adapter naming template.
pub const DEFAULT_NAME_TEMPLATE: &str = "{package}.{interface}To{implementation}Adapter";

/// Class-file version the generator emits (Java 8).
const GENERATED_MAJOR_VERSION: u16 = 52;

/// Error type for adapter generation.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// A required input was empty.
    #[error("invalid argument: {0} must not be empty")]
    InvalidArgument(&'static str),

    /// The pool proved the implementation does not reach the interface.
    #[error("{implementation} is not assignable to {interface}")]
    NotAssignable { interface: String, implementation: String },
}

/// Returns the last segment of a dotted name, the whole name when it has
/// no dot, or the empty string when the name ends with a dot.
pub fn simple_name(name: &str) -> &str {
    match name.rfind('.') {
        Some(index) => &name[index + 1..],
        None => name,
    }
}

/// Returns everything before the last dot of a dotted name, or the empty
/// string when the name has no dot.
pub fn package_name(name: &str) -> &str {
    match name.rfind('.') {
        Some(index) => &name[..index],
        None => "",
    }
}

/// Naming policy for generated adapters.
///
/// The template's `{package}`, `{interface}` and `{implementation}` slots
/// are filled with the package name and the *simple* interface and
/// implementation names. The default yields
/// `<package>.<Interface>To<Implementation>Adapter`.
#[derive(Debug, Clone)]
pub struct AdapterNameTemplate {
    template: String,
}

impl Default for AdapterNameTemplate {
    fn default() -> Self {
        Self { template: DEFAULT_NAME_TEMPLATE.to_string() }
    }
}

impl AdapterNameTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into() }
    }

    /// Compute the adapter type name for the given package and pair.
    pub fn render(
        &self,
        package: &str,
        interface_name: &str,
        implementation_name: &str,
    ) -> Result<String, GenerateError> {
        if interface_name.is_empty() {
            return Err(GenerateError::InvalidArgument("interface_name"));
        }
        if implementation_name.is_empty() {
            return Err(GenerateError::InvalidArgument("implementation_name"));
        }
        let rendered = self
            .template
            .replace("{package}", package)
            .replace("{interface}", simple_name(interface_name))
            .replace("{implementation}", simple_name(implementation_name));
        // A default-package adapter would otherwise keep a dangling dot.
        if package.is_empty() {
            Ok(rendered.trim_start_matches('.').to_string())
        } else {
            Ok(rendered)
        }
    }
}

/// Synthesizes adapter units. Same inputs always produce byte-identical
/// output: no timestamps, no random identifiers.
#[derive(Debug, Clone)]
pub struct AdapterGenerator {
    base_class: String,
}

impl Default for AdapterGenerator {
    fn default() -> Self {
        Self { base_class: UNIVERSAL_ADAPTER_BASE.to_string() }
    }
}

impl AdapterGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the adapter base class the generated unit extends.
    pub fn with_base_class(mut self, dotted_name: impl Into<String>) -> Self {
        self.base_class = dotted_name.into();
        self
    }

    /// Generate the compiled unit for `adapter_name`, a subclass of the
    /// adapter base instantiated with `(interface_name,
    /// implementation_name)` as its type arguments.
    ///
    /// Name-only generation performs no assignability validation; the
    /// caller vouches that the implementation really implements the
    /// interface. Use [`AdapterGenerator::generate_checked`] when scanned
    /// type facts are available.
    pub fn generate(
        &self,
        adapter_name: &str,
        interface_name: &str,
        implementation_name: &str,
    ) -> Result<Vec<u8>, GenerateError> {
        if adapter_name.is_empty() {
            return Err(GenerateError::InvalidArgument("adapter_name"));
        }
        if interface_name.is_empty() {
            return Err(GenerateError::InvalidArgument("interface_name"));
        }
        if implementation_name.is_empty() {
            return Err(GenerateError::InvalidArgument("implementation_name"));
        }

        let mut pool = ConstPool::new();
        let this_class = pool.add_class(adapter_name);
        let super_class = pool.add_class(&self.base_class);

        // Default constructor: aload_0; invokespecial super.<init>()V; return.
        let ctor_name = pool.add_utf8("<init>");
        let ctor_descriptor = pool.add_utf8("()V");
        let ctor_nat = pool.add_name_and_type("<init>", "()V");
        let super_ctor = pool.add_method_ref(super_class, ctor_nat);
        let code_name = pool.add_utf8("Code");

        let mut body = Vec::new();
        body.extend_from_slice(&0u16.to_be_bytes()); // fields_count
        body.extend_from_slice(&1u16.to_be_bytes()); // methods_count
        body.extend_from_slice(&ACC_PUBLIC.to_be_bytes());
        body.extend_from_slice(&ctor_name.to_be_bytes());
        body.extend_from_slice(&ctor_descriptor.to_be_bytes());
        body.extend_from_slice(&1u16.to_be_bytes()); // attributes_count
        body.extend_from_slice(&code_name.to_be_bytes());
        body.extend_from_slice(&17u32.to_be_bytes()); // Code attribute length
        body.extend_from_slice(&1u16.to_be_bytes()); // max_stack
        body.extend_from_slice(&1u16.to_be_bytes()); // max_locals
        body.extend_from_slice(&5u32.to_be_bytes()); // code_length
        body.push(0x2a); // aload_0
        body.push(0xb7); // invokespecial
        body.extend_from_slice(&super_ctor.to_be_bytes());
        body.push(0xb1); // return
        body.extend_from_slice(&0u16.to_be_bytes()); // exception_table_length
        body.extend_from_slice(&0u16.to_be_bytes()); // code attributes_count

        let signature = format!(
            "L{}<L{};L{};>;",
            internal_form(&self.base_class),
            internal_form(interface_name),
            internal_form(implementation_name)
        );
        let signature_name = pool.add_utf8(SIGNATURE_ATTRIBUTE);
        let signature_value = pool.add_utf8(&signature);
        let mut signature_data = Vec::with_capacity(2);
        signature_data.extend_from_slice(&signature_value.to_be_bytes());

        let class = ClassFile {
            minor_version: 0,
            major_version: GENERATED_MAJOR_VERSION,
            const_pool: pool,
            access_flags: ACC_PUBLIC | ACC_SUPER,
            this_class,
            super_class,
            interfaces: Vec::new(),
            body,
            attributes: vec![AttributeEntry { name_index: signature_name, data: signature_data }],
        };
        Ok(class.to_bytes())
    }

    /// Like [`AdapterGenerator::generate`], but rejects pairs the session
    /// pool can prove incompatible. When either type is unresolved in the
    /// pool the check is skipped and responsibility shifts to the caller.
    pub fn generate_checked(
        &self,
        pool: &UnitPool,
        adapter_name: &str,
        interface_name: &str,
        implementation_name: &str,
    ) -> Result<Vec<u8>, GenerateError> {
        if pool.is_assignable(interface_name, implementation_name) == Some(false) {
            return Err(GenerateError::NotAssignable {
                interface: interface_name.to_string(),
                implementation: implementation_name.to_string(),
            });
        }
        self.generate(adapter_name, interface_name, implementation_name)
    }
}

/// Recover the `(interface, implementation)` type arguments from a
/// generated adapter's generic signature, in dotted form.
pub fn signature_type_arguments(signature: &str) -> Option<(String, String)> {
    let open = signature.find('<')?;
    let close = signature.rfind('>')?;
    let args = &signature[open + 1..close];
    let mut names = Vec::new();
    for part in args.split(';') {
        if part.is_empty() {
            continue;
        }
        let internal = part.strip_prefix('L')?;
        names.push(crate::classfile::dotted_form(internal));
    }
    if names.len() != 2 {
        return None;
    }
    let implementation = names.pop()?;
    let interface = names.pop()?;
    Some((interface, implementation))
}
