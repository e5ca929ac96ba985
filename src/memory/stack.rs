//! Call stack bookkeeping
//!
//! This module provides the stack region of the address space:
//! - [`MemoryStack`]: the stack top pointer and the list of active frames
//! - [`MemoryFrame`]: one function activation and the objects laid out for it
//!
//! # Frame Layout
//!
//! A frame holds storage for every local object of the *whole* function,
//! laid out contiguously when the frame is pushed. Names are block-scoped but
//! storage is not: an object in an inner block exists (dead) for the entire
//! activation and comes alive when its declaration runs.
//!
//! References are not objects. A frame only records which object each
//! reference entity is bound to.

use super::object::ObjectId;
use super::value::Address;
use crate::program::entities::EntityId;
use rustc_hash::FxHashMap;

/// Stack frame for a function activation
#[derive(Debug, Clone)]
pub struct MemoryFrame {
    pub function_name: String,
    pub start: Address,
    pub size: usize,
    objects: Vec<ObjectId>,
    local_objects: FxHashMap<EntityId, ObjectId>,
    references: Vec<(EntityId, String, ObjectId)>,
}

impl MemoryFrame {
    pub(crate) fn new(function_name: String, start: Address) -> Self {
        MemoryFrame {
            function_name,
            start,
            size: 0,
            objects: Vec::new(),
            local_objects: FxHashMap::default(),
            references: Vec::new(),
        }
    }

    pub(crate) fn add_object(&mut self, entity: EntityId, object: ObjectId, size: usize) {
        self.objects.push(object);
        self.local_objects.insert(entity, object);
        self.size += size;
    }

    pub(crate) fn bind_reference(&mut self, entity: EntityId, name: String, object: ObjectId) {
        self.references.retain(|(e, _, _)| *e != entity);
        self.references.push((entity, name, object));
    }

    pub(crate) fn unbind_reference(&mut self, entity: EntityId) -> Option<(String, ObjectId)> {
        let pos = self.references.iter().position(|(e, _, _)| *e == entity)?;
        let (_, name, object) = self.references.remove(pos);
        Some((name, object))
    }

    /// Objects in declaration order
    pub fn objects(&self) -> &[ObjectId] {
        &self.objects
    }

    pub fn local_object(&self, entity: EntityId) -> Option<ObjectId> {
        self.local_objects.get(&entity).copied()
    }

    pub fn local_reference(&self, entity: EntityId) -> Option<ObjectId> {
        self.references
            .iter()
            .find(|(e, _, _)| *e == entity)
            .map(|(_, _, obj)| *obj)
    }

    /// Bound references as `(name, object)` pairs, in binding order
    pub fn references(&self) -> impl Iterator<Item = (&str, ObjectId)> {
        self.references.iter().map(|(_, name, obj)| (name.as_str(), *obj))
    }

    pub fn end(&self) -> Address {
        self.start + self.size as Address
    }
}

/// The stack region
#[derive(Debug, Clone)]
pub struct MemoryStack {
    start: Address,
    end: Address,
    top: Address,
    frames: Vec<MemoryFrame>,
}

impl MemoryStack {
    pub fn new(start: Address, end: Address) -> Self {
        MemoryStack {
            start,
            end,
            top: start,
            frames: Vec::new(),
        }
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn end(&self) -> Address {
        self.end
    }

    /// First free address above the top frame
    pub fn top(&self) -> Address {
        self.top
    }

    pub fn has_room_for(&self, size: usize) -> bool {
        self.top + size as Address <= self.end
    }

    pub(crate) fn push_frame(&mut self, frame: MemoryFrame) -> usize {
        self.top = frame.end();
        self.frames.push(frame);
        self.frames.len() - 1
    }

    /// Pop the top frame and rewind the stack top to where it started
    pub(crate) fn pop_frame(&mut self) -> Option<MemoryFrame> {
        let frame = self.frames.pop()?;
        self.top = frame.start;
        Some(frame)
    }

    pub fn frames(&self) -> &[MemoryFrame] {
        &self.frames
    }

    pub fn frame(&self, index: usize) -> &MemoryFrame {
        &self.frames[index]
    }

    pub(crate) fn frame_mut(&mut self, index: usize) -> &mut MemoryFrame {
        &mut self.frames[index]
    }

    pub fn top_frame(&self) -> Option<&MemoryFrame> {
        self.frames.last()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_pop_rewind_top() {
        let mut stack = MemoryStack::new(100, 200);
        let mut frame = MemoryFrame::new("main".to_string(), stack.top());
        frame.add_object(EntityId(1), ObjectId(0), 4);
        frame.add_object(EntityId(2), ObjectId(1), 8);
        let index = stack.push_frame(frame);

        assert_eq!(index, 0);
        assert_eq!(stack.top(), 112);
        assert_eq!(stack.frame(0).local_object(EntityId(2)), Some(ObjectId(1)));
        assert!(stack.has_room_for(88));
        assert!(!stack.has_room_for(89));

        let popped = stack.pop_frame().expect("frame should exist");
        assert_eq!(popped.function_name, "main");
        assert_eq!(stack.top(), 100);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_rebinding_reference_replaces_old_binding() {
        let mut frame = MemoryFrame::new("f".to_string(), 0);
        frame.bind_reference(EntityId(3), "r".into(), ObjectId(4));
        frame.bind_reference(EntityId(3), "r".into(), ObjectId(5));
        assert_eq!(frame.local_reference(EntityId(3)), Some(ObjectId(5)));
        assert_eq!(frame.references().count(), 1);
    }
}
