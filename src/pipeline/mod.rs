//! Drives a whole run: load, scan, rewrite and emit every input class.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::emit;
use crate::error::{DesugarError, DesugarResult};
use crate::loader::{lock, ClassLoader, LoadFailure};
use crate::patch;
use crate::resolver::SymbolResolver;
use crate::scanner::{CallSite, CallSiteScanner, TargetOverloads};
use crate::template::{materialize_for, TemplateKind};
use crate::unit::ClassUnit;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesugarConfig {
    /// Class whose static factory calls are rewritten, dotted or internal.
    pub target_class_name: String,
    pub target_method_name: String,
    /// Largest fixed-arity overload; wider calls only exist as varargs.
    pub max_fixed_arity: usize,
}

impl Default for DesugarConfig {
    fn default() -> Self {
        DesugarConfig {
            target_class_name: "java.util.List".into(),
            target_method_name: "of".into(),
            max_fixed_arity: 10,
        }
    }
}

/// One replaced call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewriteRecord {
    pub method: String,
    pub line: Option<u16>,
    /// Offset of the call in the loaded class.
    pub offset: u32,
    pub kind: TemplateKind,
    pub arg_count: u16,
}

#[derive(Clone, Debug)]
pub struct EmittedClass {
    pub name: String,
    pub path: PathBuf,
    pub rewrites: Vec<RewriteRecord>,
    /// A rewrite failed and the class was written out unchanged.
    pub passed_through: bool,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub emitted: Vec<EmittedClass>,
    pub failures: Vec<(String, DesugarError)>,
}

impl RunReport {
    pub fn rewrite_count(&self) -> usize {
        self.emitted.iter().map(|c| c.rewrites.len()).sum()
    }
}

pub struct Desugarer {
    config: DesugarConfig,
    resolver: SymbolResolver,
}

impl Desugarer {
    pub fn new(config: DesugarConfig) -> Self {
        Self::with_resolver(config, SymbolResolver::new())
    }

    pub fn with_resolver(config: DesugarConfig, resolver: SymbolResolver) -> Self {
        Desugarer { config, resolver }
    }

    pub fn config(&self) -> &DesugarConfig {
        &self.config
    }

    pub fn resolver(&self) -> &SymbolResolver {
        &self.resolver
    }

    /// See [`SymbolResolver::append_path`].
    pub fn append_path(&mut self, path: impl AsRef<Path>) -> bool {
        self.resolver.append_path(path)
    }

    /// Process every input class and write one output file per class.
    ///
    /// Failures stay with their class: a missing input is reported in the
    /// returned [`RunReport`], a class whose rewrite fails is emitted
    /// unchanged. Write failures and an empty resolver are run-level errors.
    pub fn run(&self, inputs: &[String], output_root: &Path) -> DesugarResult<RunReport> {
        if !inputs.is_empty() && self.resolver.is_empty() {
            return Err(DesugarError::NoResolutionPaths);
        }

        let loader = ClassLoader::new(&self.resolver);
        let mut scanner = CallSiteScanner::new(
            &self.config.target_class_name,
            &self.config.target_method_name,
        );
        if let Some(overloads) = self.target_overloads(&loader) {
            scanner = scanner.with_overloads(overloads);
        }

        let outcomes: Vec<_> = inputs
            .par_iter()
            .map(|name| {
                let outcome = self.process_class(&loader, &scanner, name, output_root);
                loader.release(name);
                (name, outcome)
            })
            .collect();

        let mut report = RunReport::default();
        let mut run_error = None;
        for (name, outcome) in outcomes {
            match outcome {
                Ok(emitted) => report.emitted.push(emitted),
                Err(e) if !e.is_class_local() && run_error.is_none() => run_error = Some(e),
                Err(e) => {
                    warn!("{name}: {e}");
                    report.failures.push((name.clone(), e));
                }
            }
        }
        match run_error {
            Some(e) => Err(e),
            None => {
                info!(
                    "{} classes emitted, {} call sites rewritten",
                    report.emitted.len(),
                    report.rewrite_count()
                );
                Ok(report)
            }
        }
    }

    /// Declared overloads of the target method, if the target class can be
    /// found on the resolution paths.
    fn target_overloads(&self, loader: &ClassLoader<'_>) -> Option<TargetOverloads> {
        let target = &self.config.target_class_name;
        let method = &self.config.target_method_name;
        match loader.load(target) {
            Ok(handle) => {
                let overloads = TargetOverloads::from_class(&lock(&handle), method);
                if overloads.declared.is_empty() {
                    debug!("{target} declares no {method}; matching by descriptor only");
                    return None;
                }
                debug!("{target} declares {} overloads", overloads.declared.len());
                Some(overloads)
            }
            Err(LoadFailure::NotFound) => {
                debug!("{target} is not on any resolution path; matching by descriptor only");
                None
            }
            Err(failure) => {
                warn!("{}; matching by descriptor only", failure.into_error(target));
                None
            }
        }
    }

    fn process_class(
        &self,
        loader: &ClassLoader<'_>,
        scanner: &CallSiteScanner,
        name: &str,
        output_root: &Path,
    ) -> DesugarResult<EmittedClass> {
        let handle = match loader.load(name) {
            Ok(handle) => handle,
            Err(LoadFailure::NotFound) => return Err(LoadFailure::NotFound.into_error(name)),
            Err(failure) => {
                warn!("{}; copying it through unchanged", failure.into_error(name));
                let bytes = loader.resolver().find_bytes(name)?;
                return Ok(EmittedClass {
                    name: name.to_string(),
                    path: emit::write_class_bytes(output_root, name, &bytes)?,
                    rewrites: Vec::new(),
                    passed_through: true,
                });
            }
        };

        let mut unit = lock(&handle);
        let (mut rewrites, mut passed_through) = match self.rewrite_class(&mut unit, scanner) {
            Ok(rewrites) => (rewrites, false),
            Err(e) => {
                warn!("{e}; emitting {} unchanged", unit.qualified_name());
                unit.revert();
                (Vec::new(), true)
            }
        };
        let path = match emit::emit(&unit, output_root) {
            Ok(path) => path,
            Err(e) if e.is_class_local() => {
                warn!("{e}; emitting {} unchanged", unit.qualified_name());
                unit.revert();
                rewrites.clear();
                passed_through = true;
                emit::emit(&unit, output_root)?
            }
            Err(e) => return Err(e),
        };
        Ok(EmittedClass {
            name: name.to_string(),
            path,
            rewrites,
            passed_through,
        })
    }

    /// Rewrite every supported match in `unit`. Any failure after the first
    /// mutation is returned and the caller reverts the class.
    fn rewrite_class(
        &self,
        unit: &mut ClassUnit,
        scanner: &CallSiteScanner,
    ) -> DesugarResult<Vec<RewriteRecord>> {
        let sites: Vec<CallSite> = scanner.scan(unit).collect();
        let mut records = Vec::with_capacity(sites.len());
        // Last site first: splicing only moves nodes after the splice point.
        for site in sites.iter().rev() {
            let location = format!(
                "{}:L{}",
                unit.qualified_name(),
                site.line.map_or(-1, i32::from)
            );
            let replacement = match materialize_for(site, self.config.max_fixed_arity) {
                Ok(replacement) => replacement,
                Err(e @ DesugarError::UnsupportedCallSite { .. }) => {
                    warn!("{location}: {e}; call left as is");
                    continue;
                }
                Err(e) => return Err(e),
            };
            debug!("{location}: {replacement}");
            patch::apply(unit, site, &replacement)?;

            let simple_name = site.target_class.rsplit('/').next().unwrap_or(&site.target_class);
            info!("{location}: {simple_name}.{}()", site.target_method);
            records.push(RewriteRecord {
                method: site.method_name.clone(),
                line: site.line,
                offset: site.offset,
                kind: replacement.kind,
                arg_count: replacement.arg_count,
            });
        }
        records.reverse();
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::Instruction;
    use crate::unit::testing::{add_method, empty_class, to_bytes, TestMethod};

    const LIST_OF_1: &str = "(Ljava/lang/Object;)Ljava/util/List;";
    const LIST_OF_N: &str = "([Ljava/lang/Object;)Ljava/util/List;";

    fn write(root: &Path, name: &str, bytes: &[u8]) {
        let path = root.join(format!("{name}.class"));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    fn caller(name: &str) -> Vec<u8> {
        let mut class_file = empty_class(name);
        let of1 = class_file.get_or_add_method_ref("java/util/List", "of", LIST_OF_1, true);
        let mut method = TestMethod::new(
            "one",
            "()Ljava/util/List;",
            vec![
                Instruction::Aconstnull,
                Instruction::Invokestatic(of1),
                Instruction::Areturn,
            ],
        );
        method.lines = vec![(0, 7)];
        add_method(&mut class_file, method);
        to_bytes(&class_file)
    }

    fn setup() -> (tempfile::TempDir, Vec<u8>) {
        let input = tempfile::tempdir().unwrap();
        write(input.path(), "app/Caller", &caller("app/Caller"));
        let plain = to_bytes(&empty_class("app/Plain"));
        write(input.path(), "app/Plain", &plain);
        (input, plain)
    }

    #[test]
    fn empty_resolver_is_fatal_only_with_inputs() {
        let out = tempfile::tempdir().unwrap();
        let desugarer = Desugarer::new(DesugarConfig::default());
        assert!(desugarer.run(&[], out.path()).unwrap().emitted.is_empty());
        assert!(matches!(
            desugarer.run(&["a.B".to_string()], out.path()),
            Err(DesugarError::NoResolutionPaths)
        ));
    }

    #[test]
    fn rewrites_matches_and_copies_everything_else() {
        let (input, plain) = setup();
        let out = tempfile::tempdir().unwrap();
        let mut desugarer = Desugarer::new(DesugarConfig::default());
        assert!(desugarer.append_path(input.path()));

        let inputs = vec!["app.Caller".to_string(), "app.Plain".to_string()];
        let report = desugarer.run(&inputs, out.path()).unwrap();
        assert_eq!(report.emitted.len(), 2);
        assert!(report.failures.is_empty());
        assert_eq!(report.rewrite_count(), 1);

        let caller = &report.emitted[0];
        assert_eq!(
            caller.rewrites,
            vec![RewriteRecord {
                method: "one".into(),
                line: Some(7),
                offset: 1,
                kind: TemplateKind::FixedArity,
                arg_count: 1,
            }]
        );
        assert!(!caller.passed_through);
        let rewritten = ClassUnit::from_bytes(std::fs::read(&caller.path).unwrap()).unwrap();
        let scanner = CallSiteScanner::new("java.util.List", "of");
        assert_eq!(scanner.scan(&rewritten).count(), 0);

        assert_eq!(std::fs::read(out.path().join("app/Plain.class")).unwrap(), plain);
    }

    #[test]
    fn missing_inputs_are_reported_per_class() {
        let (input, _) = setup();
        let out = tempfile::tempdir().unwrap();
        let mut desugarer = Desugarer::new(DesugarConfig::default());
        desugarer.append_path(input.path());

        let inputs = vec!["app.Gone".to_string(), "app.Plain".to_string()];
        let report = desugarer.run(&inputs, out.path()).unwrap();
        assert_eq!(report.emitted.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "app.Gone");
        assert!(matches!(report.failures[0].1, DesugarError::ClassNotFound { .. }));
    }

    #[test]
    fn undecodable_inputs_are_copied_through() {
        let (input, _) = setup();
        write(input.path(), "app/Broken", b"\xca\xfe\xba\xbe\x00");
        let out = tempfile::tempdir().unwrap();
        let mut desugarer = Desugarer::new(DesugarConfig::default());
        desugarer.append_path(input.path());

        let report = desugarer.run(&["app.Broken".to_string()], out.path()).unwrap();
        assert!(report.emitted[0].passed_through);
        assert_eq!(
            std::fs::read(out.path().join("app/Broken.class")).unwrap(),
            b"\xca\xfe\xba\xbe\x00"
        );
    }

    #[test]
    fn inverted_tableswitch_is_copied_without_stopping_the_run() {
        let (input, _) = setup();
        let mut class_file = empty_class("app/Switch");
        let of1 = class_file.get_or_add_method_ref("java/util/List", "of", LIST_OF_1, true);
        add_method(
            &mut class_file,
            TestMethod::new(
                "pick",
                "()Ljava/util/List;",
                vec![
                    Instruction::Aconstnull,
                    Instruction::Invokestatic(of1),
                    Instruction::Pop,
                    Instruction::Iconst0,
                    Instruction::Tableswitch {
                        default: 0,
                        low: 5,
                        high: 3,
                        offsets: Vec::new(),
                    },
                    Instruction::Aconstnull,
                    Instruction::Areturn,
                ],
            ),
        );
        let switch_bytes = to_bytes(&class_file);
        write(input.path(), "app/Switch", &switch_bytes);

        let out = tempfile::tempdir().unwrap();
        let mut desugarer = Desugarer::new(DesugarConfig::default());
        desugarer.append_path(input.path());
        let inputs = vec!["app.Switch".to_string(), "app.Caller".to_string()];
        let report = desugarer.run(&inputs, out.path()).unwrap();

        assert!(report.failures.is_empty());
        assert_eq!(report.emitted.len(), 2);
        assert!(report.emitted[0].passed_through);
        assert_eq!(
            std::fs::read(out.path().join("app/Switch.class")).unwrap(),
            switch_bytes
        );
        assert_eq!(report.emitted[1].rewrites.len(), 1);
    }

    #[test]
    fn array_calls_use_variable_arity_with_or_without_the_target_class() {
        let input = tempfile::tempdir().unwrap();
        let mut class_file = empty_class("app/Spread");
        let of_n = class_file.get_or_add_method_ref("java/util/List", "of", LIST_OF_N, true);
        add_method(
            &mut class_file,
            TestMethod::new(
                "spread",
                "([Ljava/lang/Object;)Ljava/util/List;",
                vec![
                    Instruction::Aload0,
                    Instruction::Invokestatic(of_n),
                    Instruction::Areturn,
                ],
            ),
        );
        write(input.path(), "app/Spread", &to_bytes(&class_file));

        // The builder declares `of` without ACC_VARARGS.
        let mut list = empty_class("java/util/List");
        add_method(
            &mut list,
            TestMethod::new("of", LIST_OF_N, vec![Instruction::Aconstnull, Instruction::Areturn]),
        );
        let boot = tempfile::tempdir().unwrap();
        write(boot.path(), "java/util/List", &to_bytes(&list));

        let mut kinds = Vec::new();
        for with_target in [false, true] {
            let out = tempfile::tempdir().unwrap();
            let mut desugarer = Desugarer::new(DesugarConfig::default());
            desugarer.append_path(input.path());
            if with_target {
                desugarer.append_path(boot.path());
            }
            let report = desugarer.run(&["app.Spread".to_string()], out.path()).unwrap();
            kinds.push(report.emitted[0].rewrites[0].kind);
        }
        assert_eq!(kinds, vec![TemplateKind::VariableArity; 2]);
    }

    #[test]
    fn undeclared_overloads_are_left_alone() {
        let (input, _) = setup();
        // A target class that only declares the varargs overload.
        let mut list = empty_class("java/util/List");
        add_method(
            &mut list,
            TestMethod::new(
                "of",
                "([Ljava/lang/Object;)Ljava/util/List;",
                vec![Instruction::Aconstnull, Instruction::Areturn],
            ),
        );
        let boot = tempfile::tempdir().unwrap();
        write(boot.path(), "java/util/List", &to_bytes(&list));

        let out = tempfile::tempdir().unwrap();
        let mut desugarer = Desugarer::new(DesugarConfig::default());
        desugarer.append_path(input.path());
        desugarer.append_path(boot.path());
        let report = desugarer.run(&["app.Caller".to_string()], out.path()).unwrap();
        assert_eq!(report.rewrite_count(), 0);
        assert_eq!(
            std::fs::read(out.path().join("app/Caller.class")).unwrap(),
            caller("app/Caller")
        );
    }

    #[test]
    fn arity_limit_leaves_wide_calls_in_place() {
        let (input, _) = setup();
        let out = tempfile::tempdir().unwrap();
        let config = DesugarConfig {
            max_fixed_arity: 0,
            ..DesugarConfig::default()
        };
        let mut desugarer = Desugarer::new(config);
        desugarer.append_path(input.path());
        let report = desugarer.run(&["app.Caller".to_string()], out.path()).unwrap();
        assert_eq!(report.rewrite_count(), 0);
        assert!(!report.emitted[0].passed_through);
    }
}
