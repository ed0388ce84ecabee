//! Field and method entries of a class file.

mod types;

pub use self::types::*;

use crate::ClassFile;

impl MethodInfo {
    pub fn name<'a>(&self, class_file: &'a ClassFile) -> Option<&'a str> {
        class_file.get_utf8(self.name_index)
    }

    pub fn descriptor<'a>(&self, class_file: &'a ClassFile) -> Option<&'a str> {
        class_file.get_utf8(self.descriptor_index)
    }

    /// Position of the first attribute called `name`.
    pub fn attribute_position(&self, class_file: &ClassFile, name: &str) -> Option<usize> {
        self.attributes
            .iter()
            .position(|a| class_file.get_utf8(a.attribute_name_index) == Some(name))
    }
}
