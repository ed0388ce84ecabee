//! JVM field and method descriptor parsing.

/// Represents a JVM type from a descriptor string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JvmType {
    Int,
    Long,
    Float,
    Double,
    Byte,
    Char,
    Short,
    Boolean,
    Void,
    Reference(String),
    Array(Box<JvmType>),
}

impl JvmType {
    /// Operand stack slots taken by a value of this type.
    pub fn slot_size(&self) -> usize {
        match self {
            JvmType::Void => 0,
            JvmType::Long | JvmType::Double => 2,
            _ => 1,
        }
    }

    /// True for class, interface and array types.
    pub fn is_reference(&self) -> bool {
        matches!(self, JvmType::Reference(_) | JvmType::Array(_))
    }

    /// True for `java.lang.Object[]`, the shape of a variable-arity parameter
    /// after erasure.
    pub fn is_object_array(&self) -> bool {
        matches!(self, JvmType::Array(inner)
            if matches!(inner.as_ref(), JvmType::Reference(name) if name == "java/lang/Object"))
    }

    /// Source-style name, e.g. `java.lang.Object[]`.
    pub fn source_name(&self) -> String {
        match self {
            JvmType::Int => "int".into(),
            JvmType::Long => "long".into(),
            JvmType::Float => "float".into(),
            JvmType::Double => "double".into(),
            JvmType::Byte => "byte".into(),
            JvmType::Char => "char".into(),
            JvmType::Short => "short".into(),
            JvmType::Boolean => "boolean".into(),
            JvmType::Void => "void".into(),
            JvmType::Reference(name) => internal_to_source_name(name),
            JvmType::Array(inner) => format!("{}[]", inner.source_name()),
        }
    }
}

/// Parse a single type descriptor starting at position `pos` in `desc`.
/// Returns (JvmType, next_position).
pub fn parse_type_at(desc: &str, pos: usize) -> Option<(JvmType, usize)> {
    let bytes = desc.as_bytes();
    match *bytes.get(pos)? {
        b'B' => Some((JvmType::Byte, pos + 1)),
        b'C' => Some((JvmType::Char, pos + 1)),
        b'D' => Some((JvmType::Double, pos + 1)),
        b'F' => Some((JvmType::Float, pos + 1)),
        b'I' => Some((JvmType::Int, pos + 1)),
        b'J' => Some((JvmType::Long, pos + 1)),
        b'S' => Some((JvmType::Short, pos + 1)),
        b'Z' => Some((JvmType::Boolean, pos + 1)),
        b'V' => Some((JvmType::Void, pos + 1)),
        b'L' => {
            let semi = desc[pos + 1..].find(';')?;
            let class_name = &desc[pos + 1..pos + 1 + semi];
            Some((JvmType::Reference(class_name.to_string()), pos + 1 + semi + 1))
        }
        b'[' => {
            let (inner, next) = parse_type_at(desc, pos + 1)?;
            Some((JvmType::Array(Box::new(inner)), next))
        }
        _ => None,
    }
}

/// Parse a method descriptor, e.g. "(II)V" -> ([Int, Int], Void)
pub fn parse_method_descriptor(desc: &str) -> Option<(Vec<JvmType>, JvmType)> {
    if !desc.starts_with('(') {
        return None;
    }
    let close = desc.find(')')?;
    let mut params = Vec::new();
    let mut pos = 1;
    while pos < close {
        let (ty, next) = parse_type_at(desc, pos)?;
        params.push(ty);
        pos = next;
    }
    let (ret, end) = parse_type_at(desc, close + 1)?;
    if end != desc.len() {
        return None;
    }
    Some((params, ret))
}

/// Convert internal class name to source name.
pub fn internal_to_source_name(name: &str) -> String {
    name.replace('/', ".")
}

/// Convert a source (dotted) or internal class name to internal form.
pub fn to_internal_name(name: &str) -> String {
    name.replace('.', "/")
}
