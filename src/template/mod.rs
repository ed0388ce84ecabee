//! Replacement sequences for factory calls, expressed as structured
//! instruction source that the patcher compiles against a constant pool.

use std::fmt;

use crate::descriptor::{parse_method_descriptor, JvmType};
use crate::error::{DesugarError, DesugarResult};
use crate::scanner::{CallSignature, CallSite, InvokeKind};

const ARRAY_LIST: &str = "java/util/ArrayList";
const ARRAYS: &str = "java/util/Arrays";
const COLLECTIONS: &str = "java/util/Collections";

/// A method reference a template calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MethodTarget {
    pub kind: InvokeKind,
    pub owner: &'static str,
    pub name: &'static str,
    pub descriptor: &'static str,
}

const ARRAY_LIST_INIT: MethodTarget = MethodTarget {
    kind: InvokeKind::Special,
    owner: ARRAY_LIST,
    name: "<init>",
    descriptor: "()V",
};
const ARRAY_LIST_INIT_SIZED: MethodTarget = MethodTarget {
    kind: InvokeKind::Special,
    owner: ARRAY_LIST,
    name: "<init>",
    descriptor: "(I)V",
};
const ARRAY_LIST_ADD: MethodTarget = MethodTarget {
    kind: InvokeKind::Virtual,
    owner: ARRAY_LIST,
    name: "add",
    descriptor: "(Ljava/lang/Object;)Z",
};
const ARRAY_LIST_ADD_ALL: MethodTarget = MethodTarget {
    kind: InvokeKind::Virtual,
    owner: ARRAY_LIST,
    name: "addAll",
    descriptor: "(Ljava/util/Collection;)Z",
};
const ARRAYS_AS_LIST: MethodTarget = MethodTarget {
    kind: InvokeKind::Static,
    owner: ARRAYS,
    name: "asList",
    descriptor: "([Ljava/lang/Object;)Ljava/util/List;",
};
const EMPTY_LIST: MethodTarget = MethodTarget {
    kind: InvokeKind::Static,
    owner: COLLECTIONS,
    name: "emptyList",
    descriptor: "()Ljava/util/List;",
};
const UNMODIFIABLE_LIST: MethodTarget = MethodTarget {
    kind: InvokeKind::Static,
    owner: COLLECTIONS,
    name: "unmodifiableList",
    descriptor: "(Ljava/util/List;)Ljava/util/List;",
};

/// One step of a replacement. Argument numbers are 1-based, in call order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateOp {
    New(&'static str),
    Dup,
    Pop,
    PushInt(i32),
    Invoke(MethodTarget),
    /// Pop the top of stack into the slot reserved for argument `n`.
    StoreArg(u16),
    LoadArg(u16),
}

impl fmt::Display for TemplateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateOp::New(class) => write!(f, "new {class}"),
            TemplateOp::Dup => f.write_str("dup"),
            TemplateOp::Pop => f.write_str("pop"),
            TemplateOp::PushInt(v) => write!(f, "push {v}"),
            TemplateOp::Invoke(t) => write!(f, "{} {}.{}{}", t.kind, t.owner, t.name, t.descriptor),
            TemplateOp::StoreArg(n) => write!(f, "store ${n}"),
            TemplateOp::LoadArg(n) => write!(f, "load ${n}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    FixedArity,
    ZeroArity,
    VariableArity,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TemplateKind::FixedArity => "fixed-arity",
            TemplateKind::ZeroArity => "zero-arity",
            TemplateKind::VariableArity => "variable-arity",
        })
    }
}

/// A template: its kind and the generator producing its source for a given
/// argument count.
#[derive(Clone, Copy)]
pub struct RewriteTemplate {
    pub kind: TemplateKind,
    generator: fn(u16) -> Vec<TemplateOp>,
}

impl fmt::Debug for RewriteTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RewriteTemplate").field("kind", &self.kind).finish()
    }
}

impl PartialEq for RewriteTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

pub const FIXED_ARITY: RewriteTemplate = RewriteTemplate {
    kind: TemplateKind::FixedArity,
    generator: fixed_arity,
};

pub const ZERO_ARITY: RewriteTemplate = RewriteTemplate {
    kind: TemplateKind::ZeroArity,
    generator: zero_arity,
};

pub const VARIABLE_ARITY: RewriteTemplate = RewriteTemplate {
    kind: TemplateKind::VariableArity,
    generator: variable_arity,
};

// Arguments arrive on the stack with the last one on top, so they are
// stored in reverse.
fn fixed_arity(arg_count: u16) -> Vec<TemplateOp> {
    let mut ops: Vec<TemplateOp> = (1..=arg_count).rev().map(TemplateOp::StoreArg).collect();
    ops.extend([
        TemplateOp::New(ARRAY_LIST),
        TemplateOp::Dup,
        TemplateOp::PushInt(i32::from(arg_count)),
        TemplateOp::Invoke(ARRAY_LIST_INIT_SIZED),
    ]);
    for n in 1..=arg_count {
        ops.extend([
            TemplateOp::Dup,
            TemplateOp::LoadArg(n),
            TemplateOp::Invoke(ARRAY_LIST_ADD),
            TemplateOp::Pop,
        ]);
    }
    ops.push(TemplateOp::Invoke(UNMODIFIABLE_LIST));
    ops
}

fn zero_arity(_: u16) -> Vec<TemplateOp> {
    vec![TemplateOp::Invoke(EMPTY_LIST)]
}

fn variable_arity(_: u16) -> Vec<TemplateOp> {
    vec![
        TemplateOp::StoreArg(1),
        TemplateOp::New(ARRAY_LIST),
        TemplateOp::Dup,
        TemplateOp::Invoke(ARRAY_LIST_INIT),
        TemplateOp::Dup,
        TemplateOp::LoadArg(1),
        TemplateOp::Invoke(ARRAYS_AS_LIST),
        TemplateOp::Invoke(ARRAY_LIST_ADD_ALL),
        TemplateOp::Pop,
        TemplateOp::Invoke(UNMODIFIABLE_LIST),
    ]
}

impl RewriteTemplate {
    pub fn materialize(&self, arg_count: u16) -> Replacement {
        Replacement {
            kind: self.kind,
            arg_count,
            ops: (self.generator)(arg_count),
        }
    }
}

/// Operand stack use of a replacement, in slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackProfile {
    pub peak: u16,
    pub end: u16,
}

/// A materialized template for one call site.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Replacement {
    pub kind: TemplateKind,
    /// Slots the call consumed from the operand stack.
    pub arg_count: u16,
    pub ops: Vec<TemplateOp>,
}

impl Replacement {
    /// Type the sequence leaves on the stack, taken from its final call.
    pub fn result_type(&self) -> Option<JvmType> {
        match self.ops.last()? {
            TemplateOp::Invoke(target) => {
                parse_method_descriptor(target.descriptor).map(|(_, ret)| ret)
            }
            _ => None,
        }
    }

    /// Local slots needed for stored arguments.
    pub fn arg_slots(&self) -> u16 {
        self.ops
            .iter()
            .filter_map(|op| match op {
                TemplateOp::StoreArg(n) | TemplateOp::LoadArg(n) => Some(*n),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Walk the ops starting with the call's arguments on the stack. Fails if
    /// an op would pop below them or the walk does not end with exactly the
    /// one result the call produced.
    pub fn stack_profile(&self) -> Result<StackProfile, String> {
        let mut depth = i32::from(self.arg_count);
        let mut peak = depth;
        for op in &self.ops {
            let (pops, pushes) = match op {
                TemplateOp::New(_) | TemplateOp::PushInt(_) | TemplateOp::LoadArg(_) => (0, 1),
                TemplateOp::Dup => (1, 2),
                TemplateOp::Pop | TemplateOp::StoreArg(_) => (1, 0),
                TemplateOp::Invoke(target) => {
                    let (params, ret) = parse_method_descriptor(target.descriptor)
                        .ok_or_else(|| format!("bad descriptor in `{op}`"))?;
                    let receiver = i32::from(target.kind != InvokeKind::Static);
                    let args: usize = params.iter().map(|p| p.slot_size()).sum();
                    (args as i32 + receiver, ret.slot_size() as i32)
                }
            };
            if depth < pops {
                return Err(format!("`{op}` underflows the operand stack"));
            }
            depth += pushes - pops;
            peak = peak.max(depth);
        }
        if depth != 1 {
            return Err(format!("sequence leaves {depth} values instead of 1"));
        }
        Ok(StackProfile {
            peak: peak as u16,
            end: depth as u16,
        })
    }
}

impl fmt::Display for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}]", self.kind, self.arg_count)?;
        for op in &self.ops {
            write!(f, " {op};")?;
        }
        Ok(())
    }
}

/// Pick the template for a call signature. A single `Object[]` parameter
/// is the variable-arity overload; any other single parameter is one
/// element.
pub fn select(
    signature: &CallSignature,
    max_fixed_arity: usize,
) -> DesugarResult<RewriteTemplate> {
    let unsupported = |reason: String| Err(DesugarError::UnsupportedCallSite { reason });

    if !signature.return_type.is_reference() {
        return unsupported(format!(
            "returns {}, not a reference",
            signature.return_type.source_name()
        ));
    }
    if let Some((i, ty)) = signature
        .params
        .iter()
        .enumerate()
        .find(|(_, ty)| !ty.is_reference())
    {
        return unsupported(format!("parameter {} is {}", i + 1, ty.source_name()));
    }

    match signature.arg_count() {
        1 if signature.params[0].is_object_array() => Ok(VARIABLE_ARITY),
        0 => Ok(ZERO_ARITY),
        n if n <= max_fixed_arity => Ok(FIXED_ARITY),
        n => unsupported(format!(
            "{n} parameters exceed the fixed-arity limit of {max_fixed_arity}"
        )),
    }
}

/// Select and materialize the replacement for a matched call.
pub fn materialize_for(site: &CallSite, max_fixed_arity: usize) -> DesugarResult<Replacement> {
    if site.kind != InvokeKind::Static {
        return Err(DesugarError::UnsupportedCallSite {
            reason: format!("{} call shape is not a static factory call", site.kind),
        });
    }
    let template = select(&site.signature, max_fixed_arity)?;
    let replacement = template.materialize(site.signature.arg_count() as u16);
    if replacement.result_type().as_ref() != Some(&site.signature.return_type) {
        return Err(DesugarError::UnsupportedCallSite {
            reason: format!(
                "call returns {} but the {} replacement does not",
                site.signature.return_type.source_name(),
                replacement.kind
            ),
        });
    }
    Ok(replacement)
}
