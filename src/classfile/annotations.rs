//! Runtime-visible annotation table: the metadata entries the scanner reads
//! and the rewriter patches.

use super::{dotted_form, internal_form, ConstPool, FormatError, FormatResult, Reader};

/// Attribute name of the runtime-visible annotation table.
pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";

/// Build the field-descriptor form of a dotted unit name
/// (`com.acme.Person` becomes `Lcom/acme/Person;`).
pub fn descriptor_of(dotted_name: &str) -> String {
    format!("L{};", internal_form(dotted_name))
}

/// Recover a dotted unit name from a field descriptor. Returns `None` for
/// descriptors that do not denote a single class type.
pub fn descriptor_to_dotted(descriptor: &str) -> Option<String> {
    let inner = descriptor.strip_prefix('L')?.strip_suffix(';')?;
    Some(dotted_form(inner))
}

/// One annotation member value.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    /// A primitive or string constant; `tag` is the original kind byte.
    Const { tag: u8, index: u16 },
    Enum { type_name_index: u16, const_name_index: u16 },
    /// A class reference; the index resolves to a `Utf8` descriptor.
    Class { descriptor_index: u16 },
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

impl ElementValue {
    fn parse(r: &mut Reader<'_>) -> FormatResult<Self> {
        let tag = r.u8()?;
        match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => {
                Ok(ElementValue::Const { tag, index: r.u16()? })
            }
            b'e' => Ok(ElementValue::Enum {
                type_name_index: r.u16()?,
                const_name_index: r.u16()?,
            }),
            b'c' => Ok(ElementValue::Class { descriptor_index: r.u16()? }),
            b'@' => Ok(ElementValue::Annotation(Annotation::parse(r)?)),
            b'[' => {
                let count = r.u16()?;
                let mut values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    values.push(ElementValue::parse(r)?);
                }
                Ok(ElementValue::Array(values))
            }
            other => Err(FormatError::Annotation(format!("unknown element value tag {other:#04x}"))),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            ElementValue::Const { tag, index } => {
                out.push(*tag);
                out.extend_from_slice(&index.to_be_bytes());
            }
            ElementValue::Enum { type_name_index, const_name_index } => {
                out.push(b'e');
                out.extend_from_slice(&type_name_index.to_be_bytes());
                out.extend_from_slice(&const_name_index.to_be_bytes());
            }
            ElementValue::Class { descriptor_index } => {
                out.push(b'c');
                out.extend_from_slice(&descriptor_index.to_be_bytes());
            }
            ElementValue::Annotation(annotation) => {
                out.push(b'@');
                annotation.write(out);
            }
            ElementValue::Array(values) => {
                out.push(b'[');
                out.extend_from_slice(&(values.len() as u16).to_be_bytes());
                for value in values {
                    value.write(out);
                }
            }
        }
    }
}

/// One annotation entry: a type descriptor plus named member values.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// `Utf8` index of the annotation type's field descriptor.
    pub type_index: u16,
    /// `(name_index, value)` pairs in declaration order.
    pub elements: Vec<(u16, ElementValue)>,
}

impl Annotation {
    /// Construct an empty annotation of the given dotted type.
    pub fn of_type(pool: &mut ConstPool, dotted_type: &str) -> Self {
        Self { type_index: pool.add_utf8(&descriptor_of(dotted_type)), elements: Vec::new() }
    }

    /// The annotation's dotted type name. Tolerates both descriptor form
    /// and bare internal names, which some producers emit.
    pub fn type_name(&self, pool: &ConstPool) -> FormatResult<String> {
        let raw = pool.utf8_at(self.type_index)?;
        Ok(descriptor_to_dotted(raw).unwrap_or_else(|| dotted_form(raw)))
    }

    /// Look up a member value by name.
    pub fn member<'a>(&'a self, pool: &ConstPool, name: &str) -> Option<&'a ElementValue> {
        self.elements
            .iter()
            .find(|(name_index, _)| pool.utf8_at(*name_index).ok() == Some(name))
            .map(|(_, value)| value)
    }

    /// Set or replace a member value by name.
    pub fn set_member(&mut self, pool: &mut ConstPool, name: &str, value: ElementValue) {
        for (name_index, existing) in &mut self.elements {
            if pool.utf8_at(*name_index).ok() == Some(name) {
                *existing = value;
                return;
            }
        }
        let name_index = pool.add_utf8(name);
        self.elements.push((name_index, value));
    }

    /// Resolve a member as a class reference, returning its dotted name.
    pub fn class_value(&self, pool: &ConstPool, name: &str) -> FormatResult<Option<String>> {
        match self.member(pool, name) {
            Some(ElementValue::Class { descriptor_index }) => {
                let descriptor = pool.utf8_at(*descriptor_index)?;
                descriptor_to_dotted(descriptor).map(Some).ok_or_else(|| {
                    FormatError::Annotation(format!("{descriptor:?} is not a class descriptor"))
                })
            }
            Some(_) => Err(FormatError::Annotation(format!("member {name:?} is not a class value"))),
            None => Ok(None),
        }
    }

    fn parse(r: &mut Reader<'_>) -> FormatResult<Self> {
        let type_index = r.u16()?;
        let count = r.u16()?;
        let mut elements = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name_index = r.u16()?;
            elements.push((name_index, ElementValue::parse(r)?));
        }
        Ok(Self { type_index, elements })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.type_index.to_be_bytes());
        out.extend_from_slice(&(self.elements.len() as u16).to_be_bytes());
        for (name_index, value) in &self.elements {
            out.extend_from_slice(&name_index.to_be_bytes());
            value.write(out);
        }
    }
}

/// Parsed payload of a `RuntimeVisibleAnnotations` attribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationsAttribute {
    pub annotations: Vec<Annotation>,
}

impl AnnotationsAttribute {
    /// Decode the attribute payload. The payload must be consumed exactly.
    pub fn parse(data: &[u8]) -> FormatResult<Self> {
        let mut r = Reader::new(data);
        let count = r.u16()?;
        let mut annotations = Vec::with_capacity(count as usize);
        for _ in 0..count {
            annotations.push(Annotation::parse(&mut r)?);
        }
        if r.remaining() != 0 {
            return Err(FormatError::Annotation(format!(
                "{} trailing byte(s) in annotation table",
                r.remaining()
            )));
        }
        Ok(Self { annotations })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.annotations.len() as u16).to_be_bytes());
        for annotation in &self.annotations {
            annotation.write(&mut out);
        }
        out
    }

    /// Index of the first annotation with the given dotted type name.
    pub fn find(&self, pool: &ConstPool, dotted_type: &str) -> Option<usize> {
        self.annotations
            .iter()
            .position(|a| a.type_name(pool).ok().as_deref() == Some(dotted_type))
    }
}
