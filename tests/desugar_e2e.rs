use std::fs;
use std::path::Path;
use std::process::Command;

use classfile_desugar::{
    CallSiteScanner, ClassUnit, DesugarConfig, Desugarer, RunReport, TemplateKind,
};

// --- Helpers ---

fn java_available() -> bool {
    Command::new("javac")
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
        && Command::new("java")
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
}

/// Compile `sources` (file name, contents) with debug info into `classes`.
fn javac(dir: &Path, classes: &Path, sources: &[(&str, &str)]) {
    fs::create_dir_all(classes).unwrap();
    let mut cmd = Command::new("javac");
    cmd.arg("-g").arg("-d").arg(classes);
    for (name, contents) in sources {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        cmd.arg(path);
    }
    let out = cmd.output().expect("failed to run javac");
    assert!(
        out.status.success(),
        "javac failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
}

fn java(classes: &Path, main_class: &str) -> String {
    let out = Command::new("java")
        .arg("-cp")
        .arg(classes)
        .arg(main_class)
        .output()
        .expect("failed to run java");
    assert!(
        out.status.success(),
        "java failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8(out.stdout).unwrap()
}

fn desugar(classes: &Path, output: &Path) -> RunReport {
    let inputs = classfile_desugar::discover_classes(classes).unwrap();
    let mut desugarer = Desugarer::new(DesugarConfig::default());
    assert!(desugarer.append_path(classes));
    let report = desugarer.run(&inputs, output).unwrap();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.emitted.len(), inputs.len());
    report
}

const SAMPLE: &str = r#"
import java.util.Collections;
import java.util.List;

public class Sample {
    static List<?>[] lists() {
        List<String> empty = List.of();
        List<String> two = List.of("a", "b");
        List<Integer> eleven = List.of(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11);
        return new List<?>[] { empty, two, eleven };
    }

    static List<String> ternary(boolean flag) {
        return flag ? List.of("x") : List.of("y", "z");
    }

    static int guarded(String s) {
        try {
            return List.of(s, s.trim()).size();
        } catch (NullPointerException e) {
            return -1;
        }
    }

    static int loop(int n) {
        int total = 0;
        for (int i = 0; i < n; i++) {
            total += List.of(i, i + 1, i + 2).size();
        }
        return total;
    }

    static List<Object> spread(Object[] items) {
        return List.of(items);
    }

    @SuppressWarnings("unchecked")
    static boolean rejects(List<?> list) {
        try {
            ((List<Object>) list).add("x");
            return false;
        } catch (UnsupportedOperationException e) {
            return true;
        }
    }

    public static void main(String[] args) {
        StringBuilder out = new StringBuilder();
        List<?>[] all = lists();
        for (List<?> list : all) {
            out.append(list.size()).append(' ').append(rejects(list)).append(' ')
                .append(list.getClass().getName()).append('\n');
        }
        out.append(all[1]).append('\n');
        out.append(all[2]).append('\n');
        out.append(ternary(true)).append(ternary(false)).append('\n');
        out.append(guarded(" q ")).append(' ').append(guarded(null)).append('\n');
        out.append(loop(4)).append('\n');
        out.append(spread(new Object[] { "p", "q" })).append(' ')
            .append(rejects(spread(new Object[] { "r" }))).append('\n');
        out.append(List.of() == Collections.emptyList()).append('\n');
        System.out.print(out);
    }
}
"#;

const HELPER: &str = r#"
public class Helper {
    static int twice(int x) {
        return x * 2;
    }

    static final class Nested {
        String name() {
            return "nested";
        }
    }
}
"#;

// --- Tests ---

#[test]
fn test_e2e_sample_runs_after_desugaring() {
    if !java_available() {
        eprintln!("Skipping: javac/java not available");
        return;
    }
    let work = tempfile::tempdir().unwrap();
    let classes = work.path().join("classes");
    let output = work.path().join("out");
    javac(work.path(), &classes, &[("Sample.java", SAMPLE), ("Helper.java", HELPER)]);

    let report = desugar(&classes, &output);
    let sample = report.emitted.iter().find(|c| c.name == "Sample").unwrap();
    assert!(!sample.passed_through);

    let in_lists: Vec<(TemplateKind, u16)> = sample
        .rewrites
        .iter()
        .filter(|r| r.method == "lists")
        .map(|r| (r.kind, r.arg_count))
        .collect();
    assert_eq!(
        in_lists,
        vec![
            (TemplateKind::ZeroArity, 0),
            (TemplateKind::FixedArity, 2),
            (TemplateKind::VariableArity, 1),
        ]
    );
    assert!(sample.rewrites.iter().all(|r| r.line.is_some()));
    // lists: 3, ternary: 2, guarded: 1, loop: 1, spread: 1, main: 1
    assert_eq!(sample.rewrites.len(), 9);

    let rewritten = ClassUnit::from_bytes(fs::read(&sample.path).unwrap()).unwrap();
    let scanner = CallSiteScanner::new("java.util.List", "of");
    assert_eq!(scanner.scan(&rewritten).count(), 0);

    let expected = "\
0 true java.util.Collections$EmptyList
2 true java.util.Collections$UnmodifiableRandomAccessList
11 true java.util.Collections$UnmodifiableRandomAccessList
[a, b]
[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]
[x][y, z]
2 -1
12
[p, q] true
true
";
    assert_eq!(java(&output, "Sample"), expected);
}

#[test]
fn test_e2e_classes_without_matches_are_byte_identical() {
    if !java_available() {
        eprintln!("Skipping: javac/java not available");
        return;
    }
    let work = tempfile::tempdir().unwrap();
    let classes = work.path().join("classes");
    let output = work.path().join("out");
    javac(work.path(), &classes, &[("Sample.java", SAMPLE), ("Helper.java", HELPER)]);

    let report = desugar(&classes, &output);
    let mut names: Vec<&str> = report.emitted.iter().map(|c| c.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["Helper", "Helper$Nested", "Sample"]);

    for name in ["Helper.class", "Helper$Nested.class"] {
        assert_eq!(
            fs::read(output.join(name)).unwrap(),
            fs::read(classes.join(name)).unwrap(),
            "{name} changed"
        );
    }
    assert_ne!(
        fs::read(output.join("Sample.class")).unwrap(),
        fs::read(classes.join("Sample.class")).unwrap()
    );
}

#[test]
fn test_e2e_packages_map_to_output_directories() {
    if !java_available() {
        eprintln!("Skipping: javac/java not available");
        return;
    }
    let work = tempfile::tempdir().unwrap();
    let classes = work.path().join("classes");
    let output = work.path().join("out");
    let source = r#"
package com.example.app;

import java.util.List;

public class Main {
    public static void main(String[] args) {
        List<String> names = List.of(args.length == 0 ? "none" : args[0], "tail");
        System.out.println(names + " " + names.getClass().getSimpleName());
    }
}
"#;
    javac(work.path(), &classes, &[("Main.java", source)]);

    let report = desugar(&classes, &output);
    assert_eq!(report.rewrite_count(), 1);
    assert!(output.join("com/example/app/Main.class").is_file());
    assert_eq!(
        java(&output, "com.example.app.Main"),
        "[none, tail] UnmodifiableRandomAccessList\n"
    );
}

#[test]
fn test_e2e_many_sites_in_one_method() {
    if !java_available() {
        eprintln!("Skipping: javac/java not available");
        return;
    }
    let work = tempfile::tempdir().unwrap();
    let classes = work.path().join("classes");
    let output = work.path().join("out");

    let mut body = String::new();
    let mut expected = String::new();
    for n in 0..=10 {
        let args: Vec<String> = (0..n).map(|i| format!("e{i}")).collect();
        let quoted: Vec<String> = args.iter().map(|a| format!("\"{a}\"")).collect();
        body.push_str(&format!("        show(out, List.of({}));\n", quoted.join(", ")));
        expected.push_str(&format!("[{}] true\n", args.join(", ")));
    }
    let source = format!(
        r#"
import java.util.List;

public class Arities {{
    @SuppressWarnings("unchecked")
    static void show(StringBuilder out, List<?> list) {{
        boolean rejects;
        try {{
            ((List<Object>) list).add("x");
            rejects = false;
        }} catch (UnsupportedOperationException e) {{
            rejects = true;
        }}
        out.append(list).append(' ').append(rejects).append('\n');
    }}

    public static void main(String[] args) {{
        StringBuilder out = new StringBuilder();
{body}        System.out.print(out);
    }}
}}
"#
    );
    javac(work.path(), &classes, &[("Arities.java", source.as_str())]);

    let report = desugar(&classes, &output);
    assert_eq!(report.rewrite_count(), 11);
    assert_eq!(java(&output, "Arities"), expected);
}
