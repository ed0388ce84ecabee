use std::collections::HashMap;
use std::fmt;

use binrw::BinResult;

use crate::attribute_info::{
    AttributeInfo, CodeAttribute, ExceptionEntry, LineNumberTableAttribute,
    StackMapTableAttribute, VerificationTypeInfo,
};
use crate::code_attribute::{
    decode_code, encode_code, Instruction, LocalVariableTableAttribute,
    LocalVariableTypeTableAttribute, RelocationError,
};
use crate::ClassFile;

/// Largest code array the class-file format allows.
const MAX_CODE_LENGTH: u32 = 65535;

/// One instruction of a method body. `origin` is the byte offset the
/// instruction had in the loaded class; inserted instructions have none.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeNode {
    pub origin: Option<u32>,
    pub instruction: Instruction,
}

/// Sub-attributes of `Code` that this crate keeps in step with the
/// instruction stream.
#[derive(Clone, Debug)]
pub enum CodeSubAttribute {
    LineNumberTable(LineNumberTableAttribute),
    LocalVariableTable(LocalVariableTableAttribute),
    LocalVariableTypeTable(LocalVariableTypeTableAttribute),
    StackMapTable(StackMapTableAttribute),
    /// Type annotations on code positions; dropped once offsets move.
    TypeAnnotations(AttributeInfo),
    Other(AttributeInfo),
}

#[derive(Clone, Debug)]
pub struct SubAttribute {
    pub name_index: u16,
    pub body: CodeSubAttribute,
}

#[derive(Debug)]
pub enum LayoutError {
    Relocation {
        offset: u32,
        error: RelocationError,
    },
    CodeTooLarge(u32),
    UnmappedOffset {
        table: &'static str,
        offset: u32,
    },
    Codec(binrw::Error),
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::Relocation { offset, error } => match error {
                RelocationError::UnmappedTarget { target } => write!(
                    f,
                    "branch at {offset} targets {target}, which is not an instruction boundary"
                ),
                RelocationError::Overflow { displacement } => write!(
                    f,
                    "branch at {offset} needs displacement {displacement}, which does not fit its operand"
                ),
            },
            LayoutError::CodeTooLarge(len) => {
                write!(f, "code length {len} exceeds {MAX_CODE_LENGTH} bytes")
            }
            LayoutError::UnmappedOffset { table, offset } => {
                write!(f, "{table} refers to offset {offset}, which no longer exists")
            }
            LayoutError::Codec(e) => write!(f, "encoding failed: {e}"),
        }
    }
}

impl From<binrw::Error> for LayoutError {
    fn from(e: binrw::Error) -> Self {
        LayoutError::Codec(e)
    }
}

/// A decoded `Code` attribute: instructions plus every table that points
/// into them.
#[derive(Clone, Debug)]
pub struct MethodBody {
    pub max_stack: u16,
    pub max_locals: u16,
    /// First local slot unused by the loaded code; argument slots of
    /// replacement sequences start here.
    pub scratch_base: u16,
    pub code: Vec<CodeNode>,
    pub original_length: u32,
    pub exception_table: Vec<ExceptionEntry>,
    pub attributes: Vec<SubAttribute>,
}

impl MethodBody {
    pub fn decode(class_file: &ClassFile, code: &CodeAttribute) -> BinResult<Self> {
        let nodes = decode_code(&code.code)?
            .into_iter()
            .map(|(offset, instruction)| CodeNode {
                origin: Some(offset),
                instruction,
            })
            .collect();

        let mut attributes = Vec::with_capacity(code.attributes.len());
        for attr in &code.attributes {
            let body = match class_file.get_utf8(attr.attribute_name_index) {
                Some("LineNumberTable") => CodeSubAttribute::LineNumberTable(attr.parse_body()?),
                Some("LocalVariableTable") => {
                    CodeSubAttribute::LocalVariableTable(attr.parse_body()?)
                }
                Some("LocalVariableTypeTable") => {
                    CodeSubAttribute::LocalVariableTypeTable(attr.parse_body()?)
                }
                Some("StackMapTable") => CodeSubAttribute::StackMapTable(attr.parse_body()?),
                Some("RuntimeVisibleTypeAnnotations" | "RuntimeInvisibleTypeAnnotations") => {
                    CodeSubAttribute::TypeAnnotations(attr.clone())
                }
                _ => CodeSubAttribute::Other(attr.clone()),
            };
            attributes.push(SubAttribute {
                name_index: attr.attribute_name_index,
                body,
            });
        }

        Ok(MethodBody {
            max_stack: code.max_stack,
            max_locals: code.max_locals,
            scratch_base: code.max_locals,
            code: nodes,
            original_length: code.code.len() as u32,
            exception_table: code.exception_table.clone(),
            attributes,
        })
    }

    /// Source line of the instruction loaded at `offset`, if the method
    /// carries a line number table.
    pub fn line_number_at(&self, offset: u32) -> Option<u16> {
        self.attributes
            .iter()
            .filter_map(|a| match &a.body {
                CodeSubAttribute::LineNumberTable(t) => Some(&t.line_number_table),
                _ => None,
            })
            .flatten()
            .filter(|e| u32::from(e.start_pc) <= offset)
            .max_by_key(|e| e.start_pc)
            .map(|e| e.line_number)
    }

    /// Replace the node at `position` with `replacement`. The first inserted
    /// node takes over the replaced node's origin so branches and tables
    /// that pointed at it land on the start of the new sequence.
    pub fn splice(&mut self, position: usize, replacement: Vec<Instruction>) {
        let origin = self.code[position].origin;
        let nodes = replacement
            .into_iter()
            .enumerate()
            .map(|(i, instruction)| CodeNode {
                origin: if i == 0 { origin } else { None },
                instruction,
            });
        self.code.splice(position..=position, nodes);
    }

    /// Lay the instructions out again and rebuild the `Code` attribute,
    /// remapping every offset-bearing table.
    pub fn encode(&self) -> Result<CodeAttribute, LayoutError> {
        let mut addresses = Vec::with_capacity(self.code.len());
        let mut address = 0u32;
        for node in &self.code {
            addresses.push(address);
            address += node.instruction.byte_size(address);
        }
        let code_length = address;
        if code_length > MAX_CODE_LENGTH {
            return Err(LayoutError::CodeTooLarge(code_length));
        }

        let mut offsets: HashMap<u32, u32> = self
            .code
            .iter()
            .zip(&addresses)
            .filter_map(|(node, &new)| node.origin.map(|old| (old, new)))
            .collect();
        offsets.insert(self.original_length, code_length);
        let moved = offsets.iter().any(|(old, new)| old != new);
        let map = |old: u32| offsets.get(&old).copied();
        let map16 = |table: &'static str, old: u16| -> Result<u16, LayoutError> {
            map(u32::from(old))
                .map(|new| new as u16)
                .ok_or(LayoutError::UnmappedOffset {
                    table,
                    offset: u32::from(old),
                })
        };

        let mut instructions = Vec::with_capacity(self.code.len());
        for (node, &new_address) in self.code.iter().zip(&addresses) {
            let mut instruction = node.instruction.clone();
            if let Some(origin) = node.origin {
                instruction
                    .relocate_branches(origin, new_address, &map)
                    .map_err(|error| LayoutError::Relocation {
                        offset: origin,
                        error,
                    })?;
            }
            instructions.push(instruction);
        }

        let mut exception_table = Vec::with_capacity(self.exception_table.len());
        for entry in &self.exception_table {
            exception_table.push(ExceptionEntry {
                start_pc: map16("exception table", entry.start_pc)?,
                end_pc: map16("exception table", entry.end_pc)?,
                handler_pc: map16("exception table", entry.handler_pc)?,
                catch_type: entry.catch_type,
            });
        }

        let mut attributes = Vec::with_capacity(self.attributes.len());
        for attr in &self.attributes {
            let info = match &attr.body {
                CodeSubAttribute::LineNumberTable(table) => {
                    let mut table = table.clone();
                    for entry in &mut table.line_number_table {
                        entry.start_pc = map16("LineNumberTable", entry.start_pc)?;
                    }
                    AttributeInfo::from_body(attr.name_index, &table)?
                }
                CodeSubAttribute::LocalVariableTable(table) => {
                    let mut table = table.clone();
                    for item in &mut table.items {
                        let (start, length) =
                            remap_range(&map16, "LocalVariableTable", item.start_pc, item.length)?;
                        item.start_pc = start;
                        item.length = length;
                    }
                    AttributeInfo::from_body(attr.name_index, &table)?
                }
                CodeSubAttribute::LocalVariableTypeTable(table) => {
                    let mut table = table.clone();
                    for item in &mut table.local_variable_type_table {
                        let (start, length) = remap_range(
                            &map16,
                            "LocalVariableTypeTable",
                            item.start_pc,
                            item.length,
                        )?;
                        item.start_pc = start;
                        item.length = length;
                    }
                    AttributeInfo::from_body(attr.name_index, &table)?
                }
                CodeSubAttribute::StackMapTable(table) => {
                    let table = remap_stack_map(table, &map)?;
                    AttributeInfo::from_body(attr.name_index, &table)?
                }
                CodeSubAttribute::TypeAnnotations(raw) => {
                    if moved {
                        continue;
                    }
                    raw.clone()
                }
                CodeSubAttribute::Other(raw) => raw.clone(),
            };
            attributes.push(info);
        }

        let mut code = CodeAttribute {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            code_length: 0,
            code: encode_code(&instructions)?,
            exception_table_length: 0,
            exception_table,
            attributes_count: 0,
            attributes,
        };
        code.sync_counts();
        Ok(code)
    }
}

fn remap_range<F>(
    map16: &F,
    table: &'static str,
    start_pc: u16,
    length: u16,
) -> Result<(u16, u16), LayoutError>
where
    F: Fn(&'static str, u16) -> Result<u16, LayoutError>,
{
    let end = u32::from(start_pc) + u32::from(length);
    let end = u16::try_from(end).map_err(|_| LayoutError::UnmappedOffset { table, offset: end })?;
    let new_start = map16(table, start_pc)?;
    let new_end = map16(table, end)?;
    Ok((new_start, new_end - new_start))
}

fn remap_stack_map<F>(
    table: &StackMapTableAttribute,
    map: &F,
) -> Result<StackMapTableAttribute, LayoutError>
where
    F: Fn(u32) -> Option<u32>,
{
    let mut entries = Vec::with_capacity(table.entries.len());
    let mut old_position: Option<u32> = None;
    let mut new_position: Option<u32> = None;
    for frame in &table.entries {
        let delta = u32::from(frame.offset_delta());
        let old = match old_position {
            None => delta,
            Some(prev) => prev + delta + 1,
        };
        let new = map(old).ok_or(LayoutError::UnmappedOffset {
            table: "StackMapTable",
            offset: old,
        })?;
        let new_delta = match new_position {
            None => new,
            Some(prev) => new - prev - 1,
        };

        let mut frame = frame.clone();
        frame.set_offset_delta(new_delta as u16);
        for ty in frame.verification_types_mut() {
            if let VerificationTypeInfo::Uninitialized { offset } = ty {
                *offset = map(u32::from(*offset)).ok_or(LayoutError::UnmappedOffset {
                    table: "StackMapTable",
                    offset: u32::from(*offset),
                })? as u16;
            }
        }
        entries.push(frame);
        old_position = Some(old);
        new_position = Some(new);
    }
    Ok(StackMapTableAttribute {
        number_of_entries: entries.len() as u16,
        entries,
    })
}
