//! Mutable in-memory view of one class: the decoded class file plus a
//! decoded body for every method that has code.

mod body;

pub use self::body::*;

use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use crate::attribute_info::{AttributeInfo, CodeAttribute};
use crate::descriptor::internal_to_source_name;
use crate::error::{DesugarError, DesugarResult};
use crate::member_info::MethodAccessFlags;
use crate::ClassFile;

#[derive(Clone, Debug)]
pub struct MethodUnit {
    pub name: String,
    pub descriptor: String,
    pub access_flags: MethodAccessFlags,
    /// Position of the `Code` attribute in the method's attribute list.
    code_index: Option<usize>,
    pub body: Option<MethodBody>,
    modified: bool,
}

impl MethodUnit {
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Install a rewritten body. The body must already encode cleanly.
    pub fn replace_body(&mut self, body: MethodBody) {
        self.body = Some(body);
        self.modified = true;
    }
}

#[derive(Debug)]
pub struct ClassUnit {
    name: String,
    class_file: ClassFile,
    methods: Vec<MethodUnit>,
    original: Vec<u8>,
    dirty: bool,
}

impl ClassUnit {
    pub fn from_bytes(bytes: Vec<u8>) -> DesugarResult<Self> {
        let (class_file, methods) = decode(&bytes).map_err(|reason| DesugarError::MalformedClass {
            name: "<unknown>".into(),
            reason,
        })?;
        let name = class_file
            .this_class_name()
            .ok_or_else(|| DesugarError::MalformedClass {
                name: "<unknown>".into(),
                reason: "this_class does not name a class".into(),
            })?
            .to_string();
        Ok(ClassUnit {
            name,
            class_file,
            methods,
            original: bytes,
            dirty: false,
        })
    }

    /// Internal name, e.g. `com/example/Sample`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted name, e.g. `com.example.Sample`.
    pub fn qualified_name(&self) -> String {
        internal_to_source_name(&self.name)
    }

    pub fn class_file(&self) -> &ClassFile {
        &self.class_file
    }

    pub fn methods(&self) -> &[MethodUnit] {
        &self.methods
    }

    /// The constant pool and one method, borrowed together for patching.
    pub fn method_mut(&mut self, index: usize) -> Option<(&mut ClassFile, &mut MethodUnit)> {
        let method = self.methods.get_mut(index)?;
        Some((&mut self.class_file, method))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Drop every mutation and go back to the loaded state.
    pub fn revert(&mut self) {
        if !self.dirty {
            return;
        }
        // The original bytes decoded once already.
        if let Ok((class_file, methods)) = decode(&self.original) {
            self.class_file = class_file;
            self.methods = methods;
        }
        self.dirty = false;
    }

    /// Serialize the class. An untouched class yields its original bytes.
    pub fn to_bytes(&self) -> DesugarResult<Vec<u8>> {
        if !self.dirty {
            return Ok(self.original.clone());
        }
        let mut class_file = self.class_file.clone();
        for (info, method) in class_file.methods.iter_mut().zip(&self.methods) {
            let (Some(code_index), Some(body), true) =
                (method.code_index, &method.body, method.modified)
            else {
                continue;
            };
            let code = body
                .encode()
                .map_err(|e| DesugarError::MalformedReplacement {
                    class: self.qualified_name(),
                    method: method.name.clone(),
                    reason: e.to_string(),
                })?;
            let name_index = info.attributes[code_index].attribute_name_index;
            info.attributes[code_index] = AttributeInfo::from_body(name_index, &code)?;
        }
        class_file.sync_counts();
        let mut out = Cursor::new(Vec::with_capacity(self.original.len() + 256));
        class_file.write(&mut out)?;
        Ok(out.into_inner())
    }
}

fn decode(bytes: &[u8]) -> Result<(ClassFile, Vec<MethodUnit>), String> {
    let class_file = ClassFile::read(&mut Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let mut methods = Vec::with_capacity(class_file.methods.len());
    for info in &class_file.methods {
        let name = info
            .name(&class_file)
            .ok_or("method name is not a Utf8 constant")?
            .to_string();
        let descriptor = info
            .descriptor(&class_file)
            .ok_or("method descriptor is not a Utf8 constant")?
            .to_string();
        let code_index = info.attribute_position(&class_file, "Code");
        let body = match code_index {
            Some(i) => {
                let code: CodeAttribute = info.attributes[i]
                    .parse_body()
                    .map_err(|e| format!("{name}{descriptor}: {e}"))?;
                Some(
                    MethodBody::decode(&class_file, &code)
                        .map_err(|e| format!("{name}{descriptor}: {e}"))?,
                )
            }
            None => None,
        };
        methods.push(MethodUnit {
            name,
            descriptor,
            access_flags: info.access_flags,
            code_index,
            body,
            modified: false,
        });
    }
    Ok((class_file, methods))
}
