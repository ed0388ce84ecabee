use binrw::binrw;

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
#[brw(big)]
pub struct AttributeInfo {
    pub attribute_name_index: u16,
    pub attribute_length: u32,
    #[br(count = attribute_length)]
    pub info: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
#[brw(big)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

/// Body of a `Code` attribute. The bytecode stays raw here; see
/// [`crate::code_attribute::decode_code`] for the instruction view.
#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
#[brw(big)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_length: u32,
    #[br(count = code_length)]
    pub code: Vec<u8>,
    pub exception_table_length: u16,
    #[br(count = exception_table_length)]
    pub exception_table: Vec<ExceptionEntry>,
    pub attributes_count: u16,
    #[br(count = attributes_count)]
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
#[brw(big)]
pub struct LineNumberTableAttribute {
    pub line_number_table_length: u16,
    #[br(count = line_number_table_length)]
    pub line_number_table: Vec<LineNumberTableEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
#[brw(big)]
pub struct LineNumberTableEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
#[brw(big)]
pub enum VerificationTypeInfo {
    #[brw(magic = 0u8)]
    Top,
    #[brw(magic = 1u8)]
    Integer,
    #[brw(magic = 2u8)]
    Float,
    #[brw(magic = 3u8)]
    Double,
    #[brw(magic = 4u8)]
    Long,
    #[brw(magic = 5u8)]
    Null,
    #[brw(magic = 6u8)]
    UninitializedThis,
    #[brw(magic = 7u8)]
    Object {
        /// An index into the constant pool for the class of the object
        class: u16,
    },
    #[brw(magic = 8u8)]
    Uninitialized {
        /// Offset into associated code array of a new instruction
        /// that created the object being stored here.
        offset: u16,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
#[brw(big)]
pub struct StackMapFrame {
    pub frame_type: u8,
    #[br(args(frame_type))]
    pub inner: StackMapFrameInner,
}

/// Frame payload; which shape is present is decided by `frame_type`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
#[brw(big)]
#[br(import(frame_type: u8))]
pub enum StackMapFrameInner {
    #[br(pre_assert(frame_type <= 63))]
    SameFrame,
    #[br(pre_assert((64..=127).contains(&frame_type)))]
    SameLocals1StackItemFrame { stack: VerificationTypeInfo },
    #[br(pre_assert(frame_type == 247))]
    SameLocals1StackItemFrameExtended {
        offset_delta: u16,
        stack: VerificationTypeInfo,
    },
    #[br(pre_assert((248..=250).contains(&frame_type)))]
    ChopFrame { offset_delta: u16 },
    #[br(pre_assert(frame_type == 251))]
    SameFrameExtended { offset_delta: u16 },
    #[br(pre_assert((252..=254).contains(&frame_type)))]
    AppendFrame {
        offset_delta: u16,
        #[br(count = frame_type - 251)]
        locals: Vec<VerificationTypeInfo>,
    },
    #[br(pre_assert(frame_type == 255))]
    FullFrame {
        offset_delta: u16,
        number_of_locals: u16,
        #[br(count = number_of_locals)]
        locals: Vec<VerificationTypeInfo>,
        number_of_stack_items: u16,
        #[br(count = number_of_stack_items)]
        stack: Vec<VerificationTypeInfo>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
#[brw(big)]
pub struct StackMapTableAttribute {
    pub number_of_entries: u16,
    #[br(count = number_of_entries)]
    pub entries: Vec<StackMapFrame>,
}
