#![allow(dead_code)]

//! Shared fixture builders: compiled units are produced with the crate's
//! own class-file writer and laid out on disk the way a build tool would.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use classbind::classfile::annotations::{
    Annotation, AnnotationsAttribute, RUNTIME_VISIBLE_ANNOTATIONS,
};
use classbind::classfile::{
    internal_form, AttributeEntry, ClassFile, ConstPool, ACC_INTERFACE, ACC_PUBLIC, ACC_SUPER,
};

const ACC_ABSTRACT: u16 = 0x0400;

/// Build the bytes of a unit with the given shape. `annotation_types` are
/// dotted annotation type names attached as runtime-visible annotations
/// with no members.
pub fn class_bytes(
    name: &str,
    super_name: &str,
    interfaces: &[&str],
    annotation_types: &[&str],
    is_interface: bool,
) -> Vec<u8> {
    let mut pool = ConstPool::new();
    let this_class = pool.add_class(name);
    let super_class = pool.add_class(super_name);
    let interfaces: Vec<u16> = interfaces.iter().map(|i| pool.add_class(i)).collect();

    let mut attributes = Vec::new();
    if !annotation_types.is_empty() {
        let mut table = AnnotationsAttribute::default();
        for annotation_type in annotation_types {
            table.annotations.push(Annotation::of_type(&mut pool, annotation_type));
        }
        let data = table.to_bytes();
        let name_index = pool.add_utf8(RUNTIME_VISIBLE_ANNOTATIONS);
        attributes.push(AttributeEntry { name_index, data });
    }

    let access_flags = if is_interface {
        ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT
    } else {
        ACC_PUBLIC | ACC_SUPER
    };

    let mut body = Vec::new();
    body.extend_from_slice(&0u16.to_be_bytes()); // fields_count
    body.extend_from_slice(&0u16.to_be_bytes()); // methods_count

    let class = ClassFile {
        minor_version: 0,
        major_version: 52,
        const_pool: pool,
        access_flags,
        this_class,
        super_class,
        interfaces,
        body,
        attributes,
    };
    class.to_bytes()
}

/// A non-interface unit carrying one binding marker annotation and
/// declaring the given interfaces.
pub fn marked_class(name: &str, interfaces: &[&str]) -> Vec<u8> {
    class_bytes(
        name,
        "java.lang.Object",
        interfaces,
        &["javax.xml.bind.annotation.XmlRootElement"],
        false,
    )
}

/// A plain interface unit.
pub fn interface_class(name: &str) -> Vec<u8> {
    class_bytes(name, "java.lang.Object", &[], &[], true)
}

/// Write units into a directory tree using the conventional
/// package-as-path layout, returning the written paths.
pub fn write_class_dir(root: &Path, units: &[(&str, &[u8])]) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for (name, bytes) in units {
        let path = root.join(format!("{}.class", internal_form(name)));
        fs::create_dir_all(path.parent().expect("class parent dir")).expect("create package dir");
        fs::write(&path, bytes).expect("write class file");
        paths.push(path);
    }
    paths
}

/// Write units into a fresh archive at `path`, one member per unit.
pub fn write_archive(path: &Path, units: &[(&str, &[u8])]) {
    let file = fs::File::create(path).expect("create archive");
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, bytes) in units {
        let member = format!("{}.class", internal_form(name));
        writer.start_file(member, options).expect("start member");
        writer.write_all(bytes).expect("write member");
    }
    writer.finish().expect("finish archive");
}
