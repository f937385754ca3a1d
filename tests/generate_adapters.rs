mod common;

use classbind::classfile::ClassFile;
use classbind::generate::{
    package_name, signature_type_arguments, simple_name, AdapterGenerator, AdapterNameTemplate,
    GenerateError, UNIVERSAL_ADAPTER_BASE,
};
use classbind::pool::UnitPool;
use classbind::scan::{ScanLocation, Scanner};

#[test]
fn default_template_renders_the_conventional_adapter_name() {
    let template = AdapterNameTemplate::default();
    let name = template
        .render("com.acme", "com.acme.Person", "com.acme.PersonImpl")
        .expect("render");
    assert_eq!(name, "com.acme.PersonToPersonImplAdapter");
}

#[test]
fn template_uses_simple_names_for_both_sides() {
    let template = AdapterNameTemplate::default();
    let name = template
        .render("com.acme.gen", "com.acme.model.Person", "com.acme.impl.PersonImpl")
        .expect("render");
    assert_eq!(name, "com.acme.gen.PersonToPersonImplAdapter");
}

#[test]
fn default_package_drops_the_leading_dot() {
    let template = AdapterNameTemplate::default();
    let name = template.render("", "Person", "PersonImpl").expect("render");
    assert_eq!(name, "PersonToPersonImplAdapter");
}

#[test]
fn custom_templates_are_honored() {
    let template = AdapterNameTemplate::new("{package}.adapters.{implementation}Binding");
    let name = template
        .render("com.acme", "com.acme.Person", "com.acme.PersonImpl")
        .expect("render");
    assert_eq!(name, "com.acme.adapters.PersonImplBinding");
}

#[test]
fn empty_pair_names_are_invalid_arguments() {
    let template = AdapterNameTemplate::default();
    assert!(matches!(
        template.render("com.acme", "", "com.acme.PersonImpl"),
        Err(GenerateError::InvalidArgument("interface_name"))
    ));
    assert!(matches!(
        template.render("com.acme", "com.acme.Person", ""),
        Err(GenerateError::InvalidArgument("implementation_name"))
    ));
}

#[test]
fn name_helpers_split_dotted_names() {
    assert_eq!(simple_name("com.acme.Person"), "Person");
    assert_eq!(simple_name("Person"), "Person");
    assert_eq!(package_name("com.acme.Person"), "com.acme");
    assert_eq!(package_name("Person"), "");
}

#[test]
fn generated_unit_extends_the_adapter_base() {
    let bytes = AdapterGenerator::new()
        .generate(
            "com.acme.PersonToPersonImplAdapter",
            "com.acme.Person",
            "com.acme.PersonImpl",
        )
        .expect("generate");

    let class = ClassFile::parse(&bytes).expect("parse");
    assert_eq!(class.name().expect("name"), "com.acme.PersonToPersonImplAdapter");
    assert_eq!(class.super_name().expect("super"), Some(UNIVERSAL_ADAPTER_BASE.to_string()));
    assert!(!class.is_interface());
}

#[test]
fn generated_signature_recovers_the_type_arguments() {
    let bytes = AdapterGenerator::new()
        .generate(
            "com.acme.PersonToPersonImplAdapter",
            "com.acme.Person",
            "com.acme.PersonImpl",
        )
        .expect("generate");

    let class = ClassFile::parse(&bytes).expect("parse");
    let signature = class.signature().expect("signature attribute").expect("signature value");
    let (interface, implementation) =
        signature_type_arguments(&signature).expect("type arguments");
    assert_eq!(interface, "com.acme.Person");
    assert_eq!(implementation, "com.acme.PersonImpl");
}

#[test]
fn generation_is_deterministic() {
    let generator = AdapterGenerator::new();
    let a = generator
        .generate("com.acme.PersonToPersonImplAdapter", "com.acme.Person", "com.acme.PersonImpl")
        .expect("first");
    let b = generator
        .generate("com.acme.PersonToPersonImplAdapter", "com.acme.Person", "com.acme.PersonImpl")
        .expect("second");
    assert_eq!(a, b);
}

#[test]
fn custom_base_classes_flow_into_the_signature() {
    let bytes = AdapterGenerator::new()
        .with_base_class("com.acme.runtime.Bridge")
        .generate("com.acme.PersonAdapter", "com.acme.Person", "com.acme.PersonImpl")
        .expect("generate");

    let class = ClassFile::parse(&bytes).expect("parse");
    assert_eq!(class.super_name().expect("super"), Some("com.acme.runtime.Bridge".to_string()));
    let signature = class.signature().expect("signature attribute").expect("signature value");
    assert!(signature.starts_with("Lcom/acme/runtime/Bridge<"));
}

#[test]
fn checked_generation_rejects_provably_incompatible_pairs() {
    let dir = tempfile::tempdir().expect("tempdir");
    common::write_class_dir(
        dir.path(),
        &[
            ("com.acme.Person", &common::interface_class("com.acme.Person")),
            (
                "com.acme.Stranger",
                &common::class_bytes("com.acme.Stranger", "java.lang.Object", &[], &[], false),
            ),
        ],
    );

    let pool = UnitPool::new();
    Scanner::default()
        .scan(&[ScanLocation::Dir(dir.path().to_path_buf())], &pool, |_| Ok(()))
        .expect("scan");

    let result = AdapterGenerator::new().generate_checked(
        &pool,
        "com.acme.StrangerAdapter",
        "com.acme.Person",
        "com.acme.Stranger",
    );
    assert!(matches!(
        result,
        Err(GenerateError::NotAssignable { interface, implementation })
            if interface == "com.acme.Person" && implementation == "com.acme.Stranger"
    ));
}

#[test]
fn checked_generation_accepts_provable_and_unknown_pairs() {
    let dir = tempfile::tempdir().expect("tempdir");
    common::write_class_dir(
        dir.path(),
        &[
            ("com.acme.Person", &common::interface_class("com.acme.Person")),
            (
                "com.acme.PersonImpl",
                &common::marked_class("com.acme.PersonImpl", &["com.acme.Person"]),
            ),
        ],
    );

    let pool = UnitPool::new();
    Scanner::default()
        .scan(&[ScanLocation::Dir(dir.path().to_path_buf())], &pool, |_| Ok(()))
        .expect("scan");

    let generator = AdapterGenerator::new();
    // Both endpoints scanned: provable, accepted.
    generator
        .generate_checked(&pool, "com.acme.A", "com.acme.Person", "com.acme.PersonImpl")
        .expect("provable pair");
    // Unknown implementation: the check is skipped, not failed.
    generator
        .generate_checked(&pool, "com.acme.B", "com.acme.Person", "com.acme.Elsewhere")
        .expect("unknown pair");
}
