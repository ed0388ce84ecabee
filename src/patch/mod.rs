//! Compiles a replacement against a class's constant pool and splices it
//! over the matched call.

use crate::code_attribute::Instruction;
use crate::error::{DesugarError, DesugarResult};
use crate::scanner::{CallSite, InvokeKind};
use crate::template::{Replacement, TemplateOp};
use crate::unit::ClassUnit;
use crate::ClassFile;

/// Pool entries one replacement can add at most.
const POOL_ENTRIES_PER_REPLACEMENT: usize = 32;

/// Lower template ops to instructions. Argument `n` lives in local slot
/// `scratch_base + n - 1`.
pub fn compile(
    class_file: &mut ClassFile,
    replacement: &Replacement,
    scratch_base: u16,
) -> Result<Vec<Instruction>, String> {
    if class_file.pool_headroom() < POOL_ENTRIES_PER_REPLACEMENT {
        return Err("constant pool is full".into());
    }
    let slot = |n: u16| {
        scratch_base
            .checked_add(n - 1)
            .ok_or_else(|| format!("argument slot {n} is beyond the local variable limit"))
    };

    let mut instructions = Vec::with_capacity(replacement.ops.len());
    for op in &replacement.ops {
        let instruction = match *op {
            TemplateOp::New(class) => Instruction::New(class_file.get_or_add_class(class)),
            TemplateOp::Dup => Instruction::Dup,
            TemplateOp::Pop => Instruction::Pop,
            TemplateOp::PushInt(v) => Instruction::push_int(v),
            TemplateOp::StoreArg(n) => Instruction::astore(slot(n)?),
            TemplateOp::LoadArg(n) => Instruction::aload(slot(n)?),
            TemplateOp::Invoke(target) => {
                let interface = target.kind == InvokeKind::Interface;
                let index = class_file.get_or_add_method_ref(
                    target.owner,
                    target.name,
                    target.descriptor,
                    interface,
                );
                match target.kind {
                    InvokeKind::Static => Instruction::Invokestatic(index),
                    InvokeKind::Virtual => Instruction::Invokevirtual(index),
                    InvokeKind::Special => Instruction::Invokespecial(index),
                    InvokeKind::Interface => {
                        let (params, _) = crate::descriptor::parse_method_descriptor(
                            target.descriptor,
                        )
                        .ok_or_else(|| format!("bad descriptor {}", target.descriptor))?;
                        let count = 1 + params.iter().map(|p| p.slot_size()).sum::<usize>();
                        Instruction::Invokeinterface {
                            index,
                            count: count as u8,
                            filler: 0,
                        }
                    }
                }
            }
        };
        instructions.push(instruction);
    }
    Ok(instructions)
}

fn invoke_index(instruction: &Instruction) -> Option<u16> {
    match *instruction {
        Instruction::Invokestatic(i)
        | Instruction::Invokevirtual(i)
        | Instruction::Invokespecial(i) => Some(i),
        Instruction::Invokeinterface { index, .. } => Some(index),
        _ => None,
    }
}

/// Replace the call at `site` with `replacement` and mark the class dirty.
///
/// The spliced body is re-encoded before it is installed, so a replacement
/// that would break branch offsets or size limits leaves the method as it
/// was. The constant pool may still have grown; callers revert the class on
/// error.
pub fn apply(
    unit: &mut ClassUnit,
    site: &CallSite,
    replacement: &Replacement,
) -> DesugarResult<()> {
    let class = unit.qualified_name();
    let malformed = |reason: String| DesugarError::MalformedReplacement {
        class: class.clone(),
        method: site.method_name.clone(),
        reason,
    };
    let stale = DesugarError::StaleCallSite {
        offset: site.offset,
    };

    let Some((class_file, method)) = unit.method_mut(site.method_index) else {
        return Err(stale);
    };
    let Some(body) = method.body.as_ref() else {
        return Err(stale);
    };
    match body.code.get(site.position) {
        Some(node)
            if node.origin == Some(site.offset)
                && invoke_index(&node.instruction) == Some(site.ref_index) => {}
        _ => return Err(stale),
    }

    let profile = replacement.stack_profile().map_err(&malformed)?;
    let mut body = body.clone();
    let instructions = compile(class_file, replacement, body.scratch_base).map_err(&malformed)?;
    body.splice(site.position, instructions);

    // The call consumed its arguments and left one value, so whatever sat
    // below them is at most max_stack minus the larger of the two.
    let consumed = replacement.arg_count.max(1);
    let below = body.max_stack.saturating_sub(consumed);
    let max_stack = u32::from(below) + u32::from(profile.peak);
    body.max_stack = u16::try_from(max_stack)
        .map_err(|_| malformed(format!("operand stack depth {max_stack} exceeds 65535")))?
        .max(body.max_stack);
    let max_locals = u32::from(body.scratch_base) + u32::from(replacement.arg_slots());
    body.max_locals = u16::try_from(max_locals)
        .map_err(|_| malformed(format!("{max_locals} local slots exceed 65535")))?
        .max(body.max_locals);

    body.encode().map_err(|e| malformed(e.to_string()))?;
    method.replace_body(body);
    unit.mark_dirty();
    Ok(())
}
