use binrw::binrw;

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub enum ConstantInfo {
    #[brw(magic = 1u8)]
    Utf8(Utf8Constant),
    #[brw(magic = 3u8)]
    Integer(IntegerConstant),
    #[brw(magic = 4u8)]
    Float(FloatConstant),
    #[brw(magic = 5u8)]
    Long(LongConstant),
    #[brw(magic = 6u8)]
    Double(DoubleConstant),
    #[brw(magic = 7u8)]
    Class(ClassConstant),
    #[brw(magic = 8u8)]
    String(StringConstant),
    #[brw(magic = 9u8)]
    FieldRef(FieldRefConstant),
    #[brw(magic = 10u8)]
    MethodRef(MethodRefConstant),
    #[brw(magic = 11u8)]
    InterfaceMethodRef(InterfaceMethodRefConstant),
    #[brw(magic = 12u8)]
    NameAndType(NameAndTypeConstant),
    #[brw(magic = 15u8)]
    MethodHandle(MethodHandleConstant),
    #[brw(magic = 16u8)]
    MethodType(MethodTypeConstant),
    #[brw(magic = 17u8)]
    Dynamic(DynamicConstant),
    #[brw(magic = 18u8)]
    InvokeDynamic(InvokeDynamicConstant),
    #[brw(magic = 19u8)]
    Module(ModuleConstant),
    #[brw(magic = 20u8)]
    Package(PackageConstant),
    // Second slot of a Long or Double. The pool codec never reads or writes it.
    #[brw(magic = 0u8)]
    Unusable,
}

impl ConstantInfo {
    /// Long and Double entries take up two pool indices.
    pub fn is_wide(&self) -> bool {
        matches!(self, ConstantInfo::Long(_) | ConstantInfo::Double(_))
    }
}

/// Modified UTF-8 payload, kept as raw bytes so the pool re-serializes exactly.
#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
#[brw(big)]
pub struct Utf8Constant {
    pub length: u16,
    #[br(count = length)]
    pub bytes: Vec<u8>,
}

impl Utf8Constant {
    pub fn new(value: &str) -> Self {
        let bytes = value.as_bytes().to_vec();
        Utf8Constant {
            length: bytes.len() as u16,
            bytes,
        }
    }

    /// The value as a `str`, when the modified UTF-8 is also plain UTF-8
    /// (always the case for class, member and descriptor names without NULs
    /// or supplementary characters).
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct IntegerConstant {
    pub value: i32,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct FloatConstant {
    pub value: f32,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct LongConstant {
    pub value: i64,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct DoubleConstant {
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct ClassConstant {
    pub name_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct StringConstant {
    pub string_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct FieldRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct MethodRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct InterfaceMethodRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct NameAndTypeConstant {
    pub name_index: u16,
    pub descriptor_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct MethodHandleConstant {
    pub reference_kind: u8,
    pub reference_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct MethodTypeConstant {
    pub descriptor_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct DynamicConstant {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct InvokeDynamicConstant {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct ModuleConstant {
    pub name_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct PackageConstant {
    pub name_index: u16,
}
