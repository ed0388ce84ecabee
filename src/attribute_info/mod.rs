mod types;

pub use self::types::*;

use std::io::Cursor;

use binrw::meta::{ReadEndian, WriteEndian};
use binrw::{BinRead, BinResult, BinWrite};

impl AttributeInfo {
    /// Decode the attribute payload as `T`.
    pub fn parse_body<T>(&self) -> BinResult<T>
    where
        T: BinRead + ReadEndian,
        for<'a> T::Args<'a>: Default,
    {
        T::read(&mut Cursor::new(&self.info))
    }

    /// Build an attribute from a structured payload.
    pub fn from_body<T>(attribute_name_index: u16, body: &T) -> BinResult<Self>
    where
        T: BinWrite + WriteEndian,
        for<'a> T::Args<'a>: Default,
    {
        let mut buf = Cursor::new(Vec::new());
        body.write(&mut buf)?;
        let info = buf.into_inner();
        Ok(AttributeInfo {
            attribute_name_index,
            attribute_length: info.len() as u32,
            info,
        })
    }
}

impl CodeAttribute {
    pub fn sync_counts(&mut self) {
        self.code_length = self.code.len() as u32;
        self.exception_table_length = self.exception_table.len() as u16;
        self.attributes_count = self.attributes.len() as u16;
    }
}

impl StackMapFrame {
    /// The frame's `offset_delta`, whether it is stored explicitly or folded
    /// into the frame type.
    pub fn offset_delta(&self) -> u16 {
        match &self.inner {
            StackMapFrameInner::SameFrame => self.frame_type as u16,
            StackMapFrameInner::SameLocals1StackItemFrame { .. } => (self.frame_type - 64) as u16,
            StackMapFrameInner::SameLocals1StackItemFrameExtended { offset_delta, .. }
            | StackMapFrameInner::ChopFrame { offset_delta }
            | StackMapFrameInner::SameFrameExtended { offset_delta }
            | StackMapFrameInner::AppendFrame { offset_delta, .. }
            | StackMapFrameInner::FullFrame { offset_delta, .. } => *offset_delta,
        }
    }

    /// Re-encode the frame with a new delta, switching between the compact
    /// and extended shapes as the delta requires.
    pub fn set_offset_delta(&mut self, delta: u16) {
        let inner = std::mem::replace(&mut self.inner, StackMapFrameInner::SameFrame);
        let (frame_type, inner) = match inner {
            StackMapFrameInner::SameFrame | StackMapFrameInner::SameFrameExtended { .. } => {
                if delta <= 63 {
                    (delta as u8, StackMapFrameInner::SameFrame)
                } else {
                    (
                        251,
                        StackMapFrameInner::SameFrameExtended {
                            offset_delta: delta,
                        },
                    )
                }
            }
            StackMapFrameInner::SameLocals1StackItemFrame { stack }
            | StackMapFrameInner::SameLocals1StackItemFrameExtended { stack, .. } => {
                if delta <= 63 {
                    (
                        64 + delta as u8,
                        StackMapFrameInner::SameLocals1StackItemFrame { stack },
                    )
                } else {
                    (
                        247,
                        StackMapFrameInner::SameLocals1StackItemFrameExtended {
                            offset_delta: delta,
                            stack,
                        },
                    )
                }
            }
            StackMapFrameInner::ChopFrame { .. } => (
                self.frame_type,
                StackMapFrameInner::ChopFrame {
                    offset_delta: delta,
                },
            ),
            StackMapFrameInner::AppendFrame { locals, .. } => (
                self.frame_type,
                StackMapFrameInner::AppendFrame {
                    offset_delta: delta,
                    locals,
                },
            ),
            StackMapFrameInner::FullFrame {
                number_of_locals,
                locals,
                number_of_stack_items,
                stack,
                ..
            } => (
                255,
                StackMapFrameInner::FullFrame {
                    offset_delta: delta,
                    number_of_locals,
                    locals,
                    number_of_stack_items,
                    stack,
                },
            ),
        };
        self.frame_type = frame_type;
        self.inner = inner;
    }

    /// Every verification type carried by the frame.
    pub fn verification_types_mut(&mut self) -> Vec<&mut VerificationTypeInfo> {
        match &mut self.inner {
            StackMapFrameInner::SameFrame
            | StackMapFrameInner::ChopFrame { .. }
            | StackMapFrameInner::SameFrameExtended { .. } => Vec::new(),
            StackMapFrameInner::SameLocals1StackItemFrame { stack }
            | StackMapFrameInner::SameLocals1StackItemFrameExtended { stack, .. } => vec![stack],
            StackMapFrameInner::AppendFrame { locals, .. } => locals.iter_mut().collect(),
            StackMapFrameInner::FullFrame { locals, stack, .. } => {
                locals.iter_mut().chain(stack.iter_mut()).collect()
            }
        }
    }
}
