//! Minimal class-file reader/writer for binding metadata work.
//!
//! This module parses exactly what the rest of the crate needs from a
//! compiled unit: the header, the constant pool, the access flags and
//! declared interfaces, and the class-level attribute table. Fields and
//! methods are carried as an opaque byte region so that an unmodified unit
//! serializes back byte-identically. Nothing in here loads or executes the
//! unit; it is structure only.

use thiserror::Error;

pub mod annotations;

/// Class-file magic number.
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Access flag marking a unit as an interface.
pub const ACC_INTERFACE: u16 = 0x0200;

/// Public access flag.
pub const ACC_PUBLIC: u16 = 0x0001;

/// Treat-superclass-methods-specially flag, set on every modern class.
pub const ACC_SUPER: u16 = 0x0020;

/// Attribute name of the generic-signature metadata.
pub const SIGNATURE_ATTRIBUTE: &str = "Signature";

/// Error type for parsing or patching a unit's binary structure.
///
/// A unit that trips any of these is never silently skipped; a partially
/// understood unit would be unsafe to rewrite and persist.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The input ended before a required field.
    #[error("truncated class file: needed {needed} byte(s) at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    /// The first four bytes are not the class-file magic.
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),

    /// An unrecognized constant pool tag.
    #[error("unknown constant pool tag {tag} at entry {index}")]
    UnknownTag { tag: u8, index: u16 },

    /// A constant pool index pointed outside the pool.
    #[error("constant pool index {0} out of range")]
    IndexOutOfRange(u16),

    /// A constant pool index resolved to an entry of the wrong kind.
    #[error("constant pool entry {index} is not a {expected}")]
    WrongConstant { index: u16, expected: &'static str },

    /// A constant pool string entry held invalid UTF-8.
    #[error("invalid UTF-8 in constant pool entry {0}")]
    InvalidUtf8(u16),

    /// The annotation table inside an attribute could not be decoded.
    #[error("malformed annotation data: {0}")]
    Annotation(String),

    /// Bytes remained after the last attribute.
    #[error("{0} trailing byte(s) after class structure")]
    TrailingBytes(usize),
}

/// Convenience result type for format operations.
pub type FormatResult<T> = Result<T, FormatError>;

/// Convert a dotted unit name (`com.acme.Person`) to internal form
/// (`com/acme/Person`).
pub fn internal_form(name: &str) -> String {
    name.replace('.', "/")
}

/// Decode the modified UTF-8 used by `Utf8` constants: no byte is ever
/// zero, NUL is the two-byte form `C0 80`, and supplementary characters
/// are six bytes (a surrogate pair, each half in the three-byte form).
fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let unit = if b & 0x80 == 0 {
            if b == 0 {
                return None;
            }
            i += 1;
            u32::from(b)
        } else if b & 0xE0 == 0xC0 {
            let b2 = *bytes.get(i + 1)?;
            if b2 & 0xC0 != 0x80 {
                return None;
            }
            i += 2;
            (u32::from(b & 0x1F) << 6) | u32::from(b2 & 0x3F)
        } else if b & 0xF0 == 0xE0 {
            let b2 = *bytes.get(i + 1)?;
            let b3 = *bytes.get(i + 2)?;
            if b2 & 0xC0 != 0x80 || b3 & 0xC0 != 0x80 {
                return None;
            }
            i += 3;
            (u32::from(b & 0x0F) << 12) | (u32::from(b2 & 0x3F) << 6) | u32::from(b3 & 0x3F)
        } else {
            return None;
        };
        let code = if (0xD800..=0xDBFF).contains(&unit) {
            // High surrogate: the low half must follow, also three bytes.
            let b1 = *bytes.get(i)?;
            let b2 = *bytes.get(i + 1)?;
            let b3 = *bytes.get(i + 2)?;
            if b1 & 0xF0 != 0xE0 || b2 & 0xC0 != 0x80 || b3 & 0xC0 != 0x80 {
                return None;
            }
            let low =
                (u32::from(b1 & 0x0F) << 12) | (u32::from(b2 & 0x3F) << 6) | u32::from(b3 & 0x3F);
            if !(0xDC00..=0xDFFF).contains(&low) {
                return None;
            }
            i += 3;
            0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00)
        } else {
            unit
        };
        out.push(char::from_u32(code)?);
    }
    Some(out)
}

/// Encode a string in modified UTF-8, the exact inverse of
/// [`decode_modified_utf8`] so parsed pools serialize back byte-identically.
fn encode_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for c in s.chars() {
        let code = u32::from(c);
        match code {
            0 => out.extend_from_slice(&[0xC0, 0x80]),
            1..=0x7F => out.push(code as u8),
            0x80..=0x7FF => {
                out.push(0xC0 | (code >> 6) as u8);
                out.push(0x80 | (code & 0x3F) as u8);
            }
            0x800..=0xFFFF => {
                out.push(0xE0 | (code >> 12) as u8);
                out.push(0x80 | ((code >> 6) & 0x3F) as u8);
                out.push(0x80 | (code & 0x3F) as u8);
            }
            _ => {
                let v = code - 0x10000;
                for half in [0xD800 + (v >> 10), 0xDC00 + (v & 0x3FF)] {
                    out.push(0xE0 | (half >> 12) as u8);
                    out.push(0x80 | ((half >> 6) & 0x3F) as u8);
                    out.push(0x80 | (half & 0x3F) as u8);
                }
            }
        }
    }
    out
}

/// Convert an internal-form unit name back to dotted form.
pub fn dotted_form(name: &str) -> String {
    name.replace('/', ".")
}

/// Cursor over a byte slice with bounds-checked big-endian reads.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn bytes(&mut self, n: usize) -> FormatResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(FormatError::Truncated { offset: self.pos, needed: n - self.remaining() });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self) -> FormatResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> FormatResult<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> FormatResult<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// One constant pool entry.
///
/// Only `Utf8` and `Class` are resolved by the rest of the crate; every
/// other tag is parsed just far enough to round-trip and to keep the slot
/// numbering intact.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class { name_index: u16 },
    String { string_index: u16 },
    FieldRef { class_index: u16, name_and_type_index: u16 },
    MethodRef { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    Dynamic { bootstrap_index: u16, name_and_type_index: u16 },
    InvokeDynamic { bootstrap_index: u16, name_and_type_index: u16 },
    Module { name_index: u16 },
    Package { name_index: u16 },
    /// Placeholder occupying the phantom slot after a `Long` or `Double`,
    /// and the unused slot zero.
    Unusable,
}

/// The constant pool of one unit.
#[derive(Debug, Clone, Default)]
pub struct ConstPool {
    entries: Vec<Const>,
}

impl ConstPool {
    /// A pool with only the unused zero slot, ready for entries.
    pub fn new() -> Self {
        Self { entries: vec![Const::Unusable] }
    }

    /// The pool count as encoded on disk (entries plus the zero slot).
    pub fn count(&self) -> u16 {
        self.entries.len() as u16
    }

    pub fn get(&self, index: u16) -> FormatResult<&Const> {
        match self.entries.get(index as usize) {
            Some(entry) if index != 0 => Ok(entry),
            _ => Err(FormatError::IndexOutOfRange(index)),
        }
    }

    /// Resolve an index that must denote a `Utf8` entry.
    pub fn utf8_at(&self, index: u16) -> FormatResult<&str> {
        match self.get(index)? {
            Const::Utf8(s) => Ok(s),
            _ => Err(FormatError::WrongConstant { index, expected: "Utf8" }),
        }
    }

    /// Resolve an index that must denote a `Class` entry, returning the
    /// dotted unit name.
    pub fn class_name_at(&self, index: u16) -> FormatResult<String> {
        match self.get(index)? {
            Const::Class { name_index } => Ok(dotted_form(self.utf8_at(*name_index)?)),
            _ => Err(FormatError::WrongConstant { index, expected: "Class" }),
        }
    }

    /// Return the index of a `Utf8` entry with the given content, adding
    /// one if absent. Existing entries are reused so repeated patching does
    /// not grow the pool. The encoded content must fit the format's
    /// two-byte length field.
    pub fn add_utf8(&mut self, value: &str) -> u16 {
        debug_assert!(
            encode_modified_utf8(value).len() <= u16::MAX as usize,
            "Utf8 constant exceeds the format's length cap"
        );
        for (i, entry) in self.entries.iter().enumerate() {
            if let Const::Utf8(s) = entry {
                if s == value {
                    return i as u16;
                }
            }
        }
        self.entries.push(Const::Utf8(value.to_string()));
        (self.entries.len() - 1) as u16
    }

    /// Return the index of a `Class` entry for the given dotted name,
    /// adding the entry (and its `Utf8` name) if absent.
    pub fn add_class(&mut self, dotted_name: &str) -> u16 {
        let name_index = self.add_utf8(&internal_form(dotted_name));
        for (i, entry) in self.entries.iter().enumerate() {
            if let Const::Class { name_index: ni } = entry {
                if *ni == name_index {
                    return i as u16;
                }
            }
        }
        self.entries.push(Const::Class { name_index });
        (self.entries.len() - 1) as u16
    }

    /// Add a `NameAndType` entry for the given member name and descriptor.
    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.add_utf8(name);
        let descriptor_index = self.add_utf8(descriptor);
        self.entries.push(Const::NameAndType { name_index, descriptor_index });
        (self.entries.len() - 1) as u16
    }

    /// Add a `MethodRef` entry pointing at the given class and member.
    pub fn add_method_ref(&mut self, class_index: u16, name_and_type_index: u16) -> u16 {
        self.entries.push(Const::MethodRef { class_index, name_and_type_index });
        (self.entries.len() - 1) as u16
    }

    fn parse(r: &mut Reader<'_>) -> FormatResult<Self> {
        let count = r.u16()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Const::Unusable);
        let mut index: u16 = 1;
        while index < count {
            let tag = r.u8()?;
            let entry = match tag {
                1 => {
                    let len = r.u16()? as usize;
                    let bytes = r.bytes(len)?;
                    let s = decode_modified_utf8(bytes)
                        .ok_or(FormatError::InvalidUtf8(index))?;
                    Const::Utf8(s)
                }
                3 => Const::Integer(r.u32()? as i32),
                4 => Const::Float(r.u32()?),
                5 => {
                    let high = r.u32()? as u64;
                    let low = r.u32()? as u64;
                    Const::Long(((high << 32) | low) as i64)
                }
                6 => {
                    let high = r.u32()? as u64;
                    let low = r.u32()? as u64;
                    Const::Double((high << 32) | low)
                }
                7 => Const::Class { name_index: r.u16()? },
                8 => Const::String { string_index: r.u16()? },
                9 => Const::FieldRef { class_index: r.u16()?, name_and_type_index: r.u16()? },
                10 => Const::MethodRef { class_index: r.u16()?, name_and_type_index: r.u16()? },
                11 => Const::InterfaceMethodRef {
                    class_index: r.u16()?,
                    name_and_type_index: r.u16()?,
                },
                12 => Const::NameAndType { name_index: r.u16()?, descriptor_index: r.u16()? },
                15 => Const::MethodHandle { reference_kind: r.u8()?, reference_index: r.u16()? },
                16 => Const::MethodType { descriptor_index: r.u16()? },
                17 => Const::Dynamic { bootstrap_index: r.u16()?, name_and_type_index: r.u16()? },
                18 => Const::InvokeDynamic {
                    bootstrap_index: r.u16()?,
                    name_and_type_index: r.u16()?,
                },
                19 => Const::Module { name_index: r.u16()? },
                20 => Const::Package { name_index: r.u16()? },
                other => return Err(FormatError::UnknownTag { tag: other, index }),
            };
            let wide = matches!(entry, Const::Long(_) | Const::Double(_));
            entries.push(entry);
            if wide {
                // Longs and doubles occupy two pool slots.
                entries.push(Const::Unusable);
                index += 2;
            } else {
                index += 1;
            }
        }
        Ok(Self { entries })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.count().to_be_bytes());
        for entry in &self.entries {
            match entry {
                Const::Unusable => {}
                Const::Utf8(s) => {
                    out.push(1);
                    let encoded = encode_modified_utf8(s);
                    debug_assert!(encoded.len() <= u16::MAX as usize);
                    out.extend_from_slice(&(encoded.len() as u16).to_be_bytes());
                    out.extend_from_slice(&encoded);
                }
                Const::Integer(v) => {
                    out.push(3);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Const::Float(v) => {
                    out.push(4);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Const::Long(v) => {
                    out.push(5);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Const::Double(v) => {
                    out.push(6);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Const::Class { name_index } => {
                    out.push(7);
                    out.extend_from_slice(&name_index.to_be_bytes());
                }
                Const::String { string_index } => {
                    out.push(8);
                    out.extend_from_slice(&string_index.to_be_bytes());
                }
                Const::FieldRef { class_index, name_and_type_index } => {
                    out.push(9);
                    out.extend_from_slice(&class_index.to_be_bytes());
                    out.extend_from_slice(&name_and_type_index.to_be_bytes());
                }
                Const::MethodRef { class_index, name_and_type_index } => {
                    out.push(10);
                    out.extend_from_slice(&class_index.to_be_bytes());
                    out.extend_from_slice(&name_and_type_index.to_be_bytes());
                }
                Const::InterfaceMethodRef { class_index, name_and_type_index } => {
                    out.push(11);
                    out.extend_from_slice(&class_index.to_be_bytes());
                    out.extend_from_slice(&name_and_type_index.to_be_bytes());
                }
                Const::NameAndType { name_index, descriptor_index } => {
                    out.push(12);
                    out.extend_from_slice(&name_index.to_be_bytes());
                    out.extend_from_slice(&descriptor_index.to_be_bytes());
                }
                Const::MethodHandle { reference_kind, reference_index } => {
                    out.push(15);
                    out.push(*reference_kind);
                    out.extend_from_slice(&reference_index.to_be_bytes());
                }
                Const::MethodType { descriptor_index } => {
                    out.push(16);
                    out.extend_from_slice(&descriptor_index.to_be_bytes());
                }
                Const::Dynamic { bootstrap_index, name_and_type_index } => {
                    out.push(17);
                    out.extend_from_slice(&bootstrap_index.to_be_bytes());
                    out.extend_from_slice(&name_and_type_index.to_be_bytes());
                }
                Const::InvokeDynamic { bootstrap_index, name_and_type_index } => {
                    out.push(18);
                    out.extend_from_slice(&bootstrap_index.to_be_bytes());
                    out.extend_from_slice(&name_and_type_index.to_be_bytes());
                }
                Const::Module { name_index } => {
                    out.push(19);
                    out.extend_from_slice(&name_index.to_be_bytes());
                }
                Const::Package { name_index } => {
                    out.push(20);
                    out.extend_from_slice(&name_index.to_be_bytes());
                }
            }
        }
    }
}

/// One entry in a unit's attribute table: a name index into the constant
/// pool plus the raw attribute payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeEntry {
    pub name_index: u16,
    pub data: Vec<u8>,
}

/// Parsed view of one compiled unit.
///
/// Fields and methods (the `body`) are opaque bytes; the attribute table
/// and constant pool are structured so metadata can be read and patched.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub const_pool: ConstPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    /// Raw bytes spanning `fields_count` through the end of the methods
    /// table, carried untouched.
    pub body: Vec<u8>,
    pub attributes: Vec<AttributeEntry>,
}

impl ClassFile {
    /// Parse a unit from its on-disk bytes without resolving or executing
    /// anything.
    pub fn parse(bytes: &[u8]) -> FormatResult<Self> {
        let mut r = Reader::new(bytes);
        let magic = r.u32()?;
        if magic != MAGIC {
            return Err(FormatError::BadMagic(magic));
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        let const_pool = ConstPool::parse(&mut r)?;
        let access_flags = r.u16()?;
        let this_class = r.u16()?;
        let super_class = r.u16()?;
        let interface_count = r.u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(r.u16()?);
        }

        let body_start = r.pos();
        skip_members(&mut r)?; // fields
        skip_members(&mut r)?; // methods
        let body = bytes[body_start..r.pos()].to_vec();

        let attr_count = r.u16()?;
        let mut attributes = Vec::with_capacity(attr_count as usize);
        for _ in 0..attr_count {
            let name_index = r.u16()?;
            let len = r.u32()? as usize;
            attributes.push(AttributeEntry { name_index, data: r.bytes(len)?.to_vec() });
        }
        if r.remaining() != 0 {
            return Err(FormatError::TrailingBytes(r.remaining()));
        }

        Ok(Self {
            minor_version,
            major_version,
            const_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            body,
            attributes,
        })
    }

    /// Serialize the unit back to bytes. Parsing followed by serializing an
    /// untouched unit reproduces the input exactly.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 256);
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&self.minor_version.to_be_bytes());
        out.extend_from_slice(&self.major_version.to_be_bytes());
        self.const_pool.write(&mut out);
        out.extend_from_slice(&self.access_flags.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());
        out.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for index in &self.interfaces {
            out.extend_from_slice(&index.to_be_bytes());
        }
        out.extend_from_slice(&self.body);
        out.extend_from_slice(&(self.attributes.len() as u16).to_be_bytes());
        for attr in &self.attributes {
            out.extend_from_slice(&attr.name_index.to_be_bytes());
            out.extend_from_slice(&(attr.data.len() as u32).to_be_bytes());
            out.extend_from_slice(&attr.data);
        }
        out
    }

    /// The unit's dotted name.
    pub fn name(&self) -> FormatResult<String> {
        self.const_pool.class_name_at(self.this_class)
    }

    /// The dotted name of the superclass, or `None` for the root type.
    pub fn super_name(&self) -> FormatResult<Option<String>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        Ok(Some(self.const_pool.class_name_at(self.super_class)?))
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    /// Dotted names of the interfaces this unit declares.
    pub fn interface_names(&self) -> FormatResult<Vec<String>> {
        self.interfaces.iter().map(|i| self.const_pool.class_name_at(*i)).collect()
    }

    /// Look up a class-level attribute by name. Entries whose name index
    /// does not resolve to a `Utf8` constant are never a match.
    pub fn attribute(&self, name: &str) -> Option<&AttributeEntry> {
        self.attributes
            .iter()
            .find(|attr| self.const_pool.utf8_at(attr.name_index).ok() == Some(name))
    }

    /// Install an attribute by replacement: any existing attribute of the
    /// same name is removed before the new payload is appended. The format
    /// attaches metadata this way, so a mutated attribute must always be
    /// re-attached rather than edited in place.
    pub fn replace_attribute(&mut self, name: &str, data: Vec<u8>) {
        let pool = &self.const_pool;
        self.attributes.retain(|attr| pool.utf8_at(attr.name_index).ok() != Some(name));
        let name_index = self.const_pool.add_utf8(name);
        self.attributes.push(AttributeEntry { name_index, data });
    }

    /// The unit's generic-signature string, if it carries one.
    pub fn signature(&self) -> FormatResult<Option<String>> {
        let attr = match self.attribute(SIGNATURE_ATTRIBUTE) {
            Some(attr) => attr,
            None => return Ok(None),
        };
        let mut r = Reader::new(&attr.data);
        let index = r.u16()?;
        Ok(Some(self.const_pool.utf8_at(index)?.to_string()))
    }
}

/// Skip a fields or methods table, validating only its framing.
fn skip_members(r: &mut Reader<'_>) -> FormatResult<()> {
    let count = r.u16()?;
    for _ in 0..count {
        r.bytes(6)?; // access_flags, name_index, descriptor_index
        let attr_count = r.u16()?;
        for _ in 0..attr_count {
            r.u16()?; // attribute_name_index
            let len = r.u32()? as usize;
            r.bytes(len)?;
        }
    }
    Ok(())
}
