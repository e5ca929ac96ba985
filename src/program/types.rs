//! Object types of the interpreted language
//!
//! Sizes are fixed and platform-independent:
//! - `bool`, `char`: 1 byte
//! - `int`: 4 bytes
//! - `double`: 8 bytes
//! - pointer: 8 bytes (regardless of pointee type)
//! - array: `len * sizeof(elem)`
//! - class: base subobject followed by members, no padding

use super::FunctionId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

pub const POINTER_SIZE: usize = 8;

/// A complete object type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectType {
    Bool,
    Char,
    Int,
    Double,
    Pointer(Box<ObjectType>),
    Array { elem: Box<ObjectType>, len: usize },
    Class(Rc<ClassType>),
}

impl ObjectType {
    pub fn pointer_to(ty: ObjectType) -> Self {
        ObjectType::Pointer(Box::new(ty))
    }

    pub fn array_of(elem: ObjectType, len: usize) -> Self {
        ObjectType::Array {
            elem: Box::new(elem),
            len,
        }
    }

    /// Size of the type in bytes
    pub fn size(&self) -> usize {
        match self {
            ObjectType::Bool | ObjectType::Char => 1,
            ObjectType::Int => 4,
            ObjectType::Double => 8,
            ObjectType::Pointer(_) => POINTER_SIZE,
            ObjectType::Array { elem, len } => elem.size() * len,
            ObjectType::Class(class) => class.size(),
        }
    }

    /// Scalars are stored directly in bytes and carry their own validity flag
    pub fn is_atomic(&self) -> bool {
        !matches!(self, ObjectType::Array { .. } | ObjectType::Class(_))
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, ObjectType::Bool | ObjectType::Char | ObjectType::Int)
    }

    pub fn is_arithmetic(&self) -> bool {
        self.is_integral() || matches!(self, ObjectType::Double)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, ObjectType::Pointer(_))
    }

    pub fn pointee(&self) -> Option<&ObjectType> {
        match self {
            ObjectType::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn array_element(&self) -> Option<(&ObjectType, usize)> {
        match self {
            ObjectType::Array { elem, len } => Some((elem, *len)),
            _ => None,
        }
    }

    pub fn class(&self) -> Option<&Rc<ClassType>> {
        match self {
            ObjectType::Class(class) => Some(class),
            _ => None,
        }
    }

    /// Whether an object of this type may be used where `requested` is expected:
    /// the same type, or a class derived from the requested class.
    pub fn is_compatible_with(&self, requested: &ObjectType) -> bool {
        if self == requested {
            return true;
        }
        match (self, requested) {
            (ObjectType::Class(actual), ObjectType::Class(wanted)) => actual.is_derived_from(wanted),
            _ => false,
        }
    }

    /// Whether destroying an object of this type requires running code
    /// (a destructor somewhere in the object or its elements/members).
    pub fn needs_destruction(&self) -> bool {
        match self {
            ObjectType::Array { elem, .. } => elem.needs_destruction(),
            ObjectType::Class(class) => class.needs_destruction(),
            _ => false,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectType::Bool => write!(f, "bool"),
            ObjectType::Char => write!(f, "char"),
            ObjectType::Int => write!(f, "int"),
            ObjectType::Double => write!(f, "double"),
            ObjectType::Pointer(inner) => write!(f, "{}*", inner),
            ObjectType::Array { elem, len } => write!(f, "{}[{}]", elem, len),
            ObjectType::Class(class) => write!(f, "{}", class.name),
        }
    }
}

/// A non-static data member of a class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberVariable {
    pub name: String,
    pub ty: ObjectType,
}

/// A class with single inheritance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassType {
    pub name: String,
    pub base: Option<Rc<ClassType>>,
    pub members: Vec<MemberVariable>,
    pub default_constructor: Option<FunctionId>,
    /// Constructor taking one reference to the same class
    pub copy_constructor: Option<FunctionId>,
    pub destructor: Option<FunctionId>,
}

// Classes are nominal.
impl PartialEq for ClassType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl ClassType {
    pub fn new(name: impl Into<String>, members: Vec<MemberVariable>) -> Self {
        ClassType {
            name: name.into(),
            base: None,
            members,
            default_constructor: None,
            copy_constructor: None,
            destructor: None,
        }
    }

    pub fn with_base(mut self, base: Rc<ClassType>) -> Self {
        self.base = Some(base);
        self
    }

    pub fn with_default_constructor(mut self, id: FunctionId) -> Self {
        self.default_constructor = Some(id);
        self
    }

    pub fn with_copy_constructor(mut self, id: FunctionId) -> Self {
        self.copy_constructor = Some(id);
        self
    }

    pub fn with_destructor(mut self, id: FunctionId) -> Self {
        self.destructor = Some(id);
        self
    }

    pub fn size(&self) -> usize {
        self.base_size() + self.members.iter().map(|m| m.ty.size()).sum::<usize>()
    }

    pub fn base_size(&self) -> usize {
        self.base.as_ref().map_or(0, |b| b.size())
    }

    /// Byte offset of each member, relative to the start of the object
    pub fn member_offsets(&self) -> Vec<usize> {
        let mut offset = self.base_size();
        self.members
            .iter()
            .map(|m| {
                let this = offset;
                offset += m.ty.size();
                this
            })
            .collect()
    }

    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }

    pub fn is_derived_from(&self, other: &ClassType) -> bool {
        let mut current = self.base.as_ref();
        while let Some(base) = current {
            if base.name == other.name {
                return true;
            }
            current = base.base.as_ref();
        }
        false
    }

    pub fn needs_destruction(&self) -> bool {
        self.destructor.is_some()
            || self.base.as_ref().is_some_and(|b| b.needs_destruction())
            || self.members.iter().any(|m| m.ty.needs_destruction())
    }
}

/// What a function hands back to its caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReturnType {
    Void,
    Value(ObjectType),
    Reference(ObjectType),
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnType::Void => write!(f, "void"),
            ReturnType::Value(ty) => write!(f, "{}", ty),
            ReturnType::Reference(ty) => write!(f, "{}&", ty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> Rc<ClassType> {
        Rc::new(ClassType::new(
            "Point",
            vec![
                MemberVariable { name: "x".into(), ty: ObjectType::Int },
                MemberVariable { name: "y".into(), ty: ObjectType::Double },
            ],
        ))
    }

    #[test]
    fn test_sizes() {
        assert_eq!(ObjectType::Int.size(), 4);
        assert_eq!(ObjectType::pointer_to(ObjectType::Char).size(), 8);
        assert_eq!(ObjectType::array_of(ObjectType::Int, 5).size(), 20);
        assert_eq!(ObjectType::Class(point()).size(), 12);
    }

    #[test]
    fn test_derived_class_layout_and_compatibility() {
        let base = point();
        let derived = Rc::new(
            ClassType::new("Point3", vec![MemberVariable { name: "z".into(), ty: ObjectType::Int }])
                .with_base(base.clone()),
        );
        assert_eq!(derived.size(), 16);
        assert_eq!(derived.member_offsets(), vec![12]);
        assert!(ObjectType::Class(derived.clone()).is_compatible_with(&ObjectType::Class(base.clone())));
        assert!(!ObjectType::Class(base).is_compatible_with(&ObjectType::Class(derived)));
    }

    #[test]
    fn test_display() {
        let ty = ObjectType::pointer_to(ObjectType::array_of(ObjectType::Int, 3));
        assert_eq!(ty.to_string(), "int[3]*");
    }
}
