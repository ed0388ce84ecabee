use std::fs;
use std::io::Cursor;
use std::path::Path;

use binrw::BinWrite;
use classfile_desugar::attribute_info::{AttributeInfo, CodeAttribute};
use classfile_desugar::code_attribute::{encode_code, Instruction};
use classfile_desugar::member_info::{MethodAccessFlags, MethodInfo};
use classfile_desugar::{
    discover_classes, ClassAccessFlags, ClassFile, ClassUnit, DesugarConfig, DesugarError,
    Desugarer, SymbolResolver,
};

// --- Helpers ---

/// A class with one static method `make()` whose body is `code`, built by
/// `pool_setup` against the class's constant pool.
fn build_class(name: &str, pool_setup: impl FnOnce(&mut ClassFile) -> Vec<Instruction>) -> Vec<u8> {
    let mut class_file = ClassFile {
        minor_version: 0,
        major_version: 52,
        const_pool_size: 1,
        const_pool: Vec::new(),
        access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        this_class: 0,
        super_class: 0,
        interfaces_count: 0,
        interfaces: Vec::new(),
        fields_count: 0,
        fields: Vec::new(),
        methods_count: 0,
        methods: Vec::new(),
        attributes_count: 0,
        attributes: Vec::new(),
    };
    class_file.this_class = class_file.get_or_add_class(name);
    class_file.super_class = class_file.get_or_add_class("java/lang/Object");
    let code = pool_setup(&mut class_file);

    let mut code_attr = CodeAttribute {
        max_stack: 4,
        max_locals: 0,
        code_length: 0,
        code: encode_code(&code).unwrap(),
        exception_table_length: 0,
        exception_table: Vec::new(),
        attributes_count: 0,
        attributes: Vec::new(),
    };
    code_attr.sync_counts();
    let code_name = class_file.get_or_add_utf8("Code");
    let method = MethodInfo {
        access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        name_index: class_file.get_or_add_utf8("make"),
        descriptor_index: class_file.get_or_add_utf8("()Ljava/util/List;"),
        attributes_count: 1,
        attributes: vec![AttributeInfo::from_body(code_name, &code_attr).unwrap()],
    };
    class_file.methods.push(method);
    class_file.sync_counts();

    let mut out = Cursor::new(Vec::new());
    class_file.write(&mut out).unwrap();
    out.into_inner()
}

fn list_of_caller(name: &str) -> Vec<u8> {
    build_class(name, |cf| {
        let of2 = cf.get_or_add_method_ref(
            "java/util/List",
            "of",
            "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/util/List;",
            true,
        );
        vec![
            Instruction::Aconstnull,
            Instruction::Aconstnull,
            Instruction::Invokestatic(of2),
            Instruction::Areturn,
        ]
    })
}

fn plain(name: &str) -> Vec<u8> {
    build_class(name, |_| vec![Instruction::Aconstnull, Instruction::Areturn])
}

fn write_class(root: &Path, name: &str, bytes: &[u8]) {
    let path = root.join(format!("{name}.class"));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

// --- Tests ---

#[test]
fn test_every_input_is_emitted_once() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    for i in 0..12 {
        let name = format!("p{}/C{i}", i % 3);
        let bytes = if i % 2 == 0 { list_of_caller(&name) } else { plain(&name) };
        write_class(input.path(), &name, &bytes);
    }

    let inputs = discover_classes(input.path()).unwrap();
    assert_eq!(inputs.len(), 12);
    let mut desugarer = Desugarer::new(DesugarConfig::default());
    desugarer.append_path(input.path());
    let report = desugarer.run(&inputs, output.path()).unwrap();

    assert_eq!(report.emitted.len(), 12);
    assert_eq!(report.rewrite_count(), 6);
    assert_eq!(discover_classes(output.path()).unwrap(), inputs);
}

#[test]
fn test_siblings_are_untouched() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_class(input.path(), "a/Caller", &list_of_caller("a/Caller"));
    write_class(input.path(), "a/Plain", &plain("a/Plain"));

    let mut desugarer = Desugarer::new(DesugarConfig::default());
    desugarer.append_path(input.path());
    desugarer
        .run(&["a.Caller".into(), "a.Plain".into()], output.path())
        .unwrap();

    assert_eq!(
        fs::read(output.path().join("a/Plain.class")).unwrap(),
        plain("a/Plain")
    );
    let rewritten = ClassUnit::from_bytes(fs::read(output.path().join("a/Caller.class")).unwrap())
        .unwrap();
    let body = rewritten.methods()[0].body.as_ref().unwrap();
    assert_eq!(body.max_locals, 2);
    assert!(body
        .code
        .iter()
        .all(|n| !matches!(n.instruction, Instruction::Invokeinterface { .. })));
}

#[test]
fn test_missing_resolution_paths_degrade() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_class(input.path(), "a/Plain", &plain("a/Plain"));

    let mut resolver = SymbolResolver::new();
    assert!(!resolver.append_path(input.path().join("missing.jar")));
    assert!(resolver.append_path(input.path()));
    let desugarer = Desugarer::with_resolver(DesugarConfig::default(), resolver);
    assert_eq!(desugarer.config(), &DesugarConfig::default());
    let paths: Vec<&Path> = desugarer.resolver().paths().collect();
    assert_eq!(paths, vec![input.path()]);
    let report = desugarer.run(&["a.Plain".into()], output.path()).unwrap();
    assert_eq!(report.emitted.len(), 1);
}

#[test]
fn test_no_resolution_paths_is_fatal() {
    let output = tempfile::tempdir().unwrap();
    let desugarer = Desugarer::new(DesugarConfig::default());
    let err = desugarer.run(&["a.Plain".into()], output.path()).unwrap_err();
    assert!(matches!(err, DesugarError::NoResolutionPaths));
}

#[test]
fn test_custom_target_method() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let bytes = build_class("a/Custom", |cf| {
        let factory =
            cf.get_or_add_method_ref("com/acme/Lists", "listOf", "()Ljava/util/List;", false);
        vec![Instruction::Invokestatic(factory), Instruction::Areturn]
    });
    write_class(input.path(), "a/Custom", &bytes);
    write_class(input.path(), "a/Caller", &list_of_caller("a/Caller"));

    let config = DesugarConfig {
        target_class_name: "com.acme.Lists".into(),
        target_method_name: "listOf".into(),
        ..DesugarConfig::default()
    };
    let mut desugarer = Desugarer::new(config);
    desugarer.append_path(input.path());
    let report = desugarer
        .run(&["a.Custom".into(), "a.Caller".into()], output.path())
        .unwrap();
    assert_eq!(report.emitted[0].rewrites.len(), 1);
    assert!(report.emitted[1].rewrites.is_empty());
    assert_eq!(
        fs::read(output.path().join("a/Caller.class")).unwrap(),
        list_of_caller("a/Caller")
    );
}
