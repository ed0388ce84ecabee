//! Build-time desugaring of [Java class files](https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html).
//!
//! Calls to a factory method missing from an older runtime (by default
//! `java.util.List.of`) are rewritten in place into an equivalent sequence
//! built from older APIs. Every input class is written out, rewritten or not.
//!
//! ```no_run
//! use classfile_desugar::{DesugarConfig, Desugarer};
//!
//! let mut desugarer = Desugarer::new(DesugarConfig::default());
//! desugarer.append_path("build/classes");
//! let report = desugarer
//!     .run(&["com.example.Sample".to_string()], "build/desugared".as_ref())
//!     .expect("run failed");
//! println!("{} call sites rewritten", report.rewrite_count());
//! ```

#[macro_use]
extern crate bitflags;

pub mod attribute_info;
pub mod code_attribute;
pub mod constant_info;
pub mod descriptor;
pub mod emit;
pub mod error;
pub mod inputs;
pub mod loader;
pub mod member_info;
pub mod patch;
pub mod pipeline;
pub mod resolver;
pub mod scanner;
pub mod template;
pub mod types;
pub mod unit;

pub use error::{DesugarError, DesugarResult};
pub use inputs::discover_classes;
pub use loader::{ClassHandle, ClassLoader, LoadFailure};
pub use pipeline::{DesugarConfig, Desugarer, EmittedClass, RewriteRecord, RunReport};
pub use resolver::SymbolResolver;
pub use scanner::{CallSite, CallSiteScanner};
pub use template::{select, RewriteTemplate, TemplateKind};
pub use types::*;
pub use unit::{ClassUnit, MethodUnit};

use std::io::Cursor;

use binrw::BinRead;

/// Decode a class file from memory.
///
/// ```rust
/// let result = classfile_desugar::parse_class_bytes(b"this_will_be_parsed_as_classfile");
/// assert!(result.is_err());
/// ```
pub fn parse_class_bytes(bytes: &[u8]) -> binrw::BinResult<ClassFile> {
    ClassFile::read(&mut Cursor::new(bytes))
}
