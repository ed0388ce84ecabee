use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{debug, error};

use classfile_desugar::{discover_classes, DesugarConfig, Desugarer};

/// Rewrite factory calls in compiled classes into forms older runtimes
/// understand.
#[derive(Parser, Debug)]
#[command(name = "classfile-desugar", version, about)]
struct Cli {
    /// Directory of compiled classes to transform; also searched for symbols
    #[arg(long = "input", required = true)]
    inputs: Vec<PathBuf>,

    /// Extra directory or archive for resolving referenced classes
    #[arg(long = "classpath")]
    classpath: Vec<PathBuf>,

    /// Platform library archive (e.g. the target runtime's rt.jar)
    #[arg(long = "boot-classpath")]
    boot_classpath: Vec<PathBuf>,

    /// Output root; one class file is written per input class
    #[arg(long)]
    output: PathBuf,

    #[arg(long, default_value = "java.util.List")]
    target_class: String,

    #[arg(long, default_value = "of")]
    target_method: String,

    #[arg(long, default_value_t = 10)]
    max_fixed_arity: usize,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_module("classfile_desugar", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let config = DesugarConfig {
        target_class_name: cli.target_class,
        target_method_name: cli.target_method,
        max_fixed_arity: cli.max_fixed_arity,
    };
    let mut desugarer = Desugarer::new(config);

    let mut classes = Vec::new();
    for dir in &cli.inputs {
        match discover_classes(dir) {
            Ok(found) => classes.extend(found),
            Err(e) => {
                error!("{e}");
                return ExitCode::FAILURE;
            }
        }
        desugarer.append_path(dir);
    }
    for path in cli.classpath.iter().chain(&cli.boot_classpath) {
        desugarer.append_path(path);
    }
    let config = desugarer.config();
    debug!(
        "rewriting {}.{} with up to {} fixed arguments",
        config.target_class_name, config.target_method_name, config.max_fixed_arity
    );

    match desugarer.run(&classes, &cli.output) {
        Ok(report) if report.failures.is_empty() => ExitCode::SUCCESS,
        Ok(report) => {
            error!("{} input classes could not be processed", report.failures.len());
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
