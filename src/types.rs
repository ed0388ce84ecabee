use crate::attribute_info::AttributeInfo;
use crate::constant_info::{
    pool_parser, pool_writer, ClassConstant, ConstantInfo, InterfaceMethodRefConstant,
    MethodRefConstant, NameAndTypeConstant, Utf8Constant,
};
use crate::member_info::{FieldInfo, MethodInfo};

use binrw::binrw;

#[derive(Clone, Debug)]
#[binrw]
#[brw(big, magic = b"\xca\xfe\xba\xbe")]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub const_pool_size: u16,
    #[br(parse_with = pool_parser, args(const_pool_size))]
    #[bw(write_with = pool_writer)]
    pub const_pool: Vec<ConstantInfo>,
    pub access_flags: ClassAccessFlags,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces_count: u16,
    #[br(count = interfaces_count)]
    pub interfaces: Vec<u16>,
    pub fields_count: u16,
    #[br(count = fields_count)]
    pub fields: Vec<FieldInfo>,
    pub methods_count: u16,
    #[br(count = methods_count)]
    pub methods: Vec<MethodInfo>,
    pub attributes_count: u16,
    #[br(count = attributes_count)]
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[binrw]
#[brw(big)]
pub struct ClassAccessFlags(u16);

bitflags! {
    impl ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;     //	Declared public; may be accessed from outside its package.
        const FINAL = 0x0010;      //	Declared final; no subclasses allowed.
        const SUPER = 0x0020;      //	Treat superclass methods specially when invoked by the invokespecial instruction.
        const INTERFACE = 0x0200;  //	Is an interface, not a class.
        const ABSTRACT = 0x0400;   //	Declared abstract; must not be instantiated.
        const SYNTHETIC = 0x1000;  //	Declared synthetic; not present in the source code.
        const ANNOTATION = 0x2000; //	Declared as an annotation type.
        const ENUM = 0x4000;       //	Declared as an enum type.
        const MODULE = 0x8000;     //	Declared as a module type.
    }
}

/// A resolved `Methodref`/`InterfaceMethodref`/`Fieldref`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub class_name: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub interface: bool,
}

impl ClassFile {
    /// Recompute every count field from the vectors it describes.
    pub fn sync_counts(&mut self) {
        self.const_pool_size = (self.const_pool.len() + 1) as u16;
        self.interfaces_count = self.interfaces.len() as u16;
        self.fields_count = self.fields.len() as u16;
        self.methods_count = self.methods.len() as u16;
        self.attributes_count = self.attributes.len() as u16;
        for method in &mut self.methods {
            method.attributes_count = method.attributes.len() as u16;
        }
        for field in &mut self.fields {
            field.attributes_count = field.attributes.len() as u16;
        }
    }

    /// Look up a constant pool entry by its 1-based index.
    pub fn constant(&self, index: u16) -> Option<&ConstantInfo> {
        self.const_pool.get((index as usize).checked_sub(1)?)
    }

    pub fn get_utf8(&self, index: u16) -> Option<&str> {
        match self.constant(index)? {
            ConstantInfo::Utf8(u) => u.as_str(),
            _ => None,
        }
    }

    pub fn find_utf8_index(&self, value: &str) -> Option<u16> {
        self.const_pool
            .iter()
            .position(|c| matches!(c, ConstantInfo::Utf8(u) if u.bytes == value.as_bytes()))
            .map(|i| (i + 1) as u16)
    }

    /// Resolve a Class constant to its internal name.
    pub fn get_class_name(&self, class_index: u16) -> Option<&str> {
        match self.constant(class_index)? {
            ConstantInfo::Class(c) => self.get_utf8(c.name_index),
            _ => None,
        }
    }

    /// Internal name of the class this file defines.
    pub fn this_class_name(&self) -> Option<&str> {
        self.get_class_name(self.this_class)
    }

    /// Resolve a NameAndType constant to (name, descriptor).
    pub fn get_name_and_type(&self, nat_index: u16) -> Option<(&str, &str)> {
        match self.constant(nat_index)? {
            ConstantInfo::NameAndType(nat) => Some((
                self.get_utf8(nat.name_index)?,
                self.get_utf8(nat.descriptor_index)?,
            )),
            _ => None,
        }
    }

    /// Resolve a FieldRef, MethodRef, or InterfaceMethodRef.
    pub fn resolve_ref(&self, index: u16) -> Option<MemberRef<'_>> {
        let (class_index, nat_index, interface) = match self.constant(index)? {
            ConstantInfo::FieldRef(r) => (r.class_index, r.name_and_type_index, false),
            ConstantInfo::MethodRef(r) => (r.class_index, r.name_and_type_index, false),
            ConstantInfo::InterfaceMethodRef(r) => (r.class_index, r.name_and_type_index, true),
            _ => return None,
        };
        let class_name = self.get_class_name(class_index)?;
        let (name, descriptor) = self.get_name_and_type(nat_index)?;
        Some(MemberRef {
            class_name,
            name,
            descriptor,
            interface,
        })
    }

    /// Slots still available before the pool hits its 16-bit limit.
    pub fn pool_headroom(&self) -> usize {
        (u16::MAX as usize).saturating_sub(self.const_pool.len() + 1)
    }

    fn push_constant(&mut self, constant: ConstantInfo) -> u16 {
        self.const_pool.push(constant);
        self.const_pool_size = (self.const_pool.len() + 1) as u16;
        self.const_pool.len() as u16
    }

    pub fn add_utf8(&mut self, value: &str) -> u16 {
        self.push_constant(ConstantInfo::Utf8(Utf8Constant::new(value)))
    }

    pub fn get_or_add_utf8(&mut self, value: &str) -> u16 {
        match self.find_utf8_index(value) {
            Some(idx) => idx,
            None => self.add_utf8(value),
        }
    }

    pub fn get_or_add_class(&mut self, internal_name: &str) -> u16 {
        let name_index = self.get_or_add_utf8(internal_name);
        let existing = self.const_pool.iter().position(
            |c| matches!(c, ConstantInfo::Class(cc) if cc.name_index == name_index),
        );
        match existing {
            Some(i) => (i + 1) as u16,
            None => self.push_constant(ConstantInfo::Class(ClassConstant { name_index })),
        }
    }

    pub fn get_or_add_name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.get_or_add_utf8(name);
        let descriptor_index = self.get_or_add_utf8(descriptor);
        let existing = self.const_pool.iter().position(|c| {
            matches!(c, ConstantInfo::NameAndType(nat)
                if nat.name_index == name_index && nat.descriptor_index == descriptor_index)
        });
        match existing {
            Some(i) => (i + 1) as u16,
            None => self.push_constant(ConstantInfo::NameAndType(NameAndTypeConstant {
                name_index,
                descriptor_index,
            })),
        }
    }

    /// Find or create a `Methodref` (or `InterfaceMethodref` when
    /// `interface` is set) for `owner.name descriptor`.
    pub fn get_or_add_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> u16 {
        let class_index = self.get_or_add_class(owner);
        let name_and_type_index = self.get_or_add_name_and_type(name, descriptor);
        let existing = self.const_pool.iter().position(|c| match c {
            ConstantInfo::MethodRef(r) if !interface => {
                r.class_index == class_index && r.name_and_type_index == name_and_type_index
            }
            ConstantInfo::InterfaceMethodRef(r) if interface => {
                r.class_index == class_index && r.name_and_type_index == name_and_type_index
            }
            _ => false,
        });
        if let Some(i) = existing {
            return (i + 1) as u16;
        }
        let constant = if interface {
            ConstantInfo::InterfaceMethodRef(InterfaceMethodRefConstant {
                class_index,
                name_and_type_index,
            })
        } else {
            ConstantInfo::MethodRef(MethodRefConstant {
                class_index,
                name_and_type_index,
            })
        };
        self.push_constant(constant)
    }
}
