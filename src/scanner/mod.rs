//! Finds call instructions that target the configured factory method.

use std::collections::HashSet;
use std::fmt;

use log::{debug, warn};

use crate::code_attribute::Instruction;
use crate::descriptor::{parse_method_descriptor, to_internal_name, JvmType};
use crate::unit::{ClassUnit, MethodBody};
use crate::ClassFile;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    Static,
    Virtual,
    Special,
    Interface,
}

impl fmt::Display for InvokeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InvokeKind::Static => "invokestatic",
            InvokeKind::Virtual => "invokevirtual",
            InvokeKind::Special => "invokespecial",
            InvokeKind::Interface => "invokeinterface",
        })
    }
}

/// Resolved signature of a matched call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallSignature {
    pub params: Vec<JvmType>,
    pub return_type: JvmType,
}

impl CallSignature {
    pub fn arg_count(&self) -> usize {
        self.params.len()
    }
}

/// One matched call. Valid until the method it points into is next mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallSite {
    pub method_index: usize,
    pub method_name: String,
    /// Index of the call node in the method's instruction sequence.
    pub position: usize,
    /// Byte offset of the call in the loaded class.
    pub offset: u32,
    pub kind: InvokeKind,
    pub ref_index: u16,
    pub target_class: String,
    pub target_method: String,
    pub descriptor: String,
    pub signature: CallSignature,
    pub line: Option<u16>,
}

/// Every call instruction of a body, in stream order:
/// `(position, offset, kind, pool index)`.
pub fn call_expressions(
    body: &MethodBody,
) -> impl Iterator<Item = (usize, Option<u32>, InvokeKind, u16)> + '_ {
    body.code
        .iter()
        .enumerate()
        .filter_map(|(position, node)| {
            let (kind, index) = match node.instruction {
                Instruction::Invokestatic(i) => (InvokeKind::Static, i),
                Instruction::Invokevirtual(i) => (InvokeKind::Virtual, i),
                Instruction::Invokespecial(i) => (InvokeKind::Special, i),
                Instruction::Invokeinterface { index, .. } => (InvokeKind::Interface, index),
                _ => return None,
            };
            Some((position, node.origin, kind, index))
        })
}

/// Descriptors of the target method's declared overloads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TargetOverloads {
    pub declared: HashSet<String>,
}

impl TargetOverloads {
    pub fn from_class(unit: &ClassUnit, method_name: &str) -> Self {
        let class_file = unit.class_file();
        let declared = class_file
            .methods
            .iter()
            .filter(|m| m.name(class_file) == Some(method_name))
            .filter_map(|m| m.descriptor(class_file).map(str::to_string))
            .collect();
        TargetOverloads { declared }
    }
}

#[derive(Clone, Debug)]
pub struct CallSiteScanner {
    target_class: String,
    target_method: String,
    overloads: Option<TargetOverloads>,
}

impl CallSiteScanner {
    /// `target_class` may be dotted or internal.
    pub fn new(target_class: &str, target_method: &str) -> Self {
        CallSiteScanner {
            target_class: to_internal_name(target_class),
            target_method: target_method.to_string(),
            overloads: None,
        }
    }

    /// Restrict matching to overloads the target class actually declares.
    pub fn with_overloads(mut self, overloads: TargetOverloads) -> Self {
        self.overloads = Some(overloads);
        self
    }

    /// Matched calls of `unit`, method by method in declaration order.
    pub fn scan<'a>(&'a self, unit: &'a ClassUnit) -> impl Iterator<Item = CallSite> + 'a {
        let class_file = unit.class_file();
        unit.methods()
            .iter()
            .enumerate()
            .filter_map(|(index, method)| method.body.as_ref().map(|body| (index, method, body)))
            .flat_map(move |(method_index, method, body)| {
                call_expressions(body).filter_map(move |(position, origin, kind, ref_index)| {
                    let site = self.classify(class_file, body, origin?, kind, ref_index)?;
                    Some(CallSite {
                        method_index,
                        method_name: method.name.clone(),
                        position,
                        ..site
                    })
                })
            })
    }

    fn classify(
        &self,
        class_file: &ClassFile,
        body: &MethodBody,
        offset: u32,
        kind: InvokeKind,
        ref_index: u16,
    ) -> Option<CallSite> {
        let member = class_file.resolve_ref(ref_index)?;
        if member.class_name != self.target_class || member.name != self.target_method {
            return None;
        }
        if let Some(overloads) = &self.overloads {
            if !overloads.declared.contains(member.descriptor) {
                debug!(
                    "{}.{}{} is not declared by the target class; leaving it alone",
                    member.class_name, member.name, member.descriptor
                );
                return None;
            }
        }
        let Some((params, return_type)) = parse_method_descriptor(member.descriptor) else {
            warn!(
                "unparseable descriptor {} on call to {}.{}",
                member.descriptor, member.class_name, member.name
            );
            return None;
        };
        Some(CallSite {
            method_index: 0,
            method_name: String::new(),
            position: 0,
            offset,
            kind,
            ref_index,
            target_class: member.class_name.to_string(),
            target_method: member.name.to_string(),
            descriptor: member.descriptor.to_string(),
            signature: CallSignature { params, return_type },
            line: body.line_number_at(offset),
        })
    }
}
