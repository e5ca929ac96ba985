//! Typed storage units
//!
//! Every object (complete objects, array elements, class members, base-class
//! subobjects and the placeholder returned for a bad dereference) lives in an
//! arena owned by [`Memory`](super::Memory) and is referred to by [`ObjectId`].
//! Subobjects are views over a slice of their parent's bytes; they are created
//! together with the parent and share its lifetime.

use super::value::{Address, Provenance};
use crate::program::types::ObjectType;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjectId(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ObjectKind {
    Static,
    StringLiteral,
    Automatic { function: String },
    Temporary,
    Dynamic,
    ArrayElement { array: ObjectId, index: usize },
    Member { parent: ObjectId, name: String },
    BaseClass { parent: ObjectId },
    /// Stand-in for a dereference that found no compatible live object
    Invalid,
}

#[derive(Debug, Clone)]
pub struct CppObject {
    pub id: ObjectId,
    pub address: Address,
    pub ty: ObjectType,
    pub name: Option<String>,
    pub kind: ObjectKind,
    pub subobjects: Vec<ObjectId>,
    /// Names of references currently bound to this object (non-owning)
    pub referenced_by: Vec<String>,
    pub(crate) alive: bool,
    pub(crate) valid: bool,
    pub(crate) provenance: Option<Provenance>,
    pub(crate) leaked: bool,
    pub(crate) generation: u64,
}

impl CppObject {
    pub(crate) fn new(id: ObjectId, address: Address, ty: ObjectType, name: Option<String>, kind: ObjectKind) -> Self {
        CppObject {
            id,
            address,
            ty,
            name,
            kind,
            subobjects: Vec::new(),
            referenced_by: Vec::new(),
            alive: false,
            valid: false,
            provenance: None,
            leaked: false,
            generation: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.ty.size()
    }

    pub fn end_address(&self) -> Address {
        self.address + self.size() as Address
    }

    pub fn contains(&self, address: Address) -> bool {
        address >= self.address && address < self.end_address()
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn is_leaked(&self) -> bool {
        self.leaked
    }

    pub fn is_invalid_object(&self) -> bool {
        matches!(self.kind, ObjectKind::Invalid)
    }

    /// The complete object this one is part of (itself for complete objects)
    pub fn parent(&self) -> Option<ObjectId> {
        match &self.kind {
            ObjectKind::ArrayElement { array, .. } => Some(*array),
            ObjectKind::Member { parent, .. } | ObjectKind::BaseClass { parent } => Some(*parent),
            _ => None,
        }
    }

    /// Label for display: the variable name, or a description of the slot
    pub fn describe(&self) -> String {
        match (&self.name, &self.kind) {
            (Some(name), _) => name.clone(),
            (None, ObjectKind::ArrayElement { index, .. }) => format!("[{}]", index),
            (None, ObjectKind::Member { name, .. }) => format!(".{}", name),
            (None, ObjectKind::BaseClass { .. }) => format!("<{}>", self.ty),
            (None, ObjectKind::Dynamic) => format!("new {}", self.ty),
            (None, ObjectKind::Temporary) => "temporary".to_string(),
            (None, ObjectKind::StringLiteral) => "string literal".to_string(),
            (None, ObjectKind::Invalid) => format!("invalid {} @0x{:x}", self.ty, self.address),
            (None, _) => format!("0x{:x}", self.address),
        }
    }
}
