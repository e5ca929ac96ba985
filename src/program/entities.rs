//! Named storage descriptors the compiled tree binds identifiers to

use super::types::ObjectType;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_ENTITY_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of a declared entity, unique within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl EntityId {
    pub fn fresh() -> Self {
        EntityId(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A local variable or parameter. For references `ty` is the referred-to type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalEntity {
    pub id: EntityId,
    pub name: String,
    pub ty: ObjectType,
    pub is_reference: bool,
}

impl LocalEntity {
    pub fn object(name: impl Into<String>, ty: ObjectType) -> Rc<Self> {
        Rc::new(LocalEntity {
            id: EntityId::fresh(),
            name: name.into(),
            ty,
            is_reference: false,
        })
    }

    pub fn reference(name: impl Into<String>, ty: ObjectType) -> Rc<Self> {
        Rc::new(LocalEntity {
            id: EntityId::fresh(),
            name: name.into(),
            ty,
            is_reference: true,
        })
    }
}

/// A namespace-scope variable with static storage duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalEntity {
    pub id: EntityId,
    pub name: String,
    pub ty: ObjectType,
}

impl GlobalEntity {
    pub fn new(name: impl Into<String>, ty: ObjectType) -> Rc<Self> {
        Rc::new(GlobalEntity {
            id: EntityId::fresh(),
            name: name.into(),
            ty,
        })
    }
}

/// What an identifier expression resolves to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityRef {
    Local(Rc<LocalEntity>),
    Global(Rc<GlobalEntity>),
}

impl EntityRef {
    pub fn name(&self) -> &str {
        match self {
            EntityRef::Local(e) => &e.name,
            EntityRef::Global(e) => &e.name,
        }
    }

    pub fn ty(&self) -> &ObjectType {
        match self {
            EntityRef::Local(e) => &e.ty,
            EntityRef::Global(e) => &e.ty,
        }
    }
}
