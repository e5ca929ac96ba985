//! Memory model for the simulation
//!
//! This module provides the core memory abstractions:
//! - [`value`]: Runtime value representation (type, raw bits, validity, provenance)
//! - [`object`]: Typed, addressed objects and their subobjects
//! - [`stack`]: Call stack with frames laid out per function activation
//! - [`heap`]: Heap region for `new`/`delete`
//! - [`constants`]: Default region sizes
//!
//! # Address Space
//!
//! One linear range is split, in order, into a static region (globals and
//! string literals), a stack region growing upward, and a heap region whose
//! objects are allocated downward from its end. Temporaries live in a
//! separate region after the heap, which grows as long as it needs to.
//!
//! ```text
//! 0          static_end          stack_end                 heap_end   temporary_start
//! | static   | stack →           |               ← heap    |   ...    | temporaries →
//! ```
//!
//! [`Memory`] never raises errors about the interpreted program. It exposes
//! liveness, validity and type information; the runtime decides what is
//! undefined behavior.

pub mod constants;
pub mod heap;
pub mod object;
pub mod stack;
pub mod value;

use crate::config::MemoryConfig;
use crate::events::{Event, EventLog};
use crate::program::entities::{EntityId, GlobalEntity, LocalEntity};
use crate::program::types::ObjectType;
use crate::program::FunctionDefinition;
use crate::runtime::InstanceId;
use crate::simulation::random::CppRandom;
use constants::{GARBAGE_BOUND, STATIC_RESERVED_BYTES};
use heap::MemoryHeap;
use object::{CppObject, ObjectId, ObjectKind};
use rustc_hash::FxHashMap;
use stack::{MemoryFrame, MemoryStack};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::debug;
use value::{Address, Provenance, Value};

/// Region boundaries. Only the end of the temporary region moves, when it grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    pub capacity: usize,
    pub static_start: Address,
    pub static_end: Address,
    pub stack_start: Address,
    pub stack_end: Address,
    pub heap_start: Address,
    pub heap_end: Address,
    pub temporary_start: Address,
    pub temporary_end: Address,
}

impl MemoryLayout {
    pub fn new(config: &MemoryConfig) -> Self {
        let capacity = config.capacity as Address;
        let static_size = capacity * config.static_percent as Address / 100;
        let stack_size = (capacity - static_size) / 2;
        let heap_end = capacity;
        let temporary_start = heap_end + config.temporary_offset;
        MemoryLayout {
            capacity: config.capacity,
            static_start: 0,
            static_end: static_size,
            stack_start: static_size,
            stack_end: static_size + stack_size,
            heap_start: static_size + stack_size,
            heap_end,
            temporary_start,
            temporary_end: temporary_start + config.temporary_capacity as Address,
        }
    }

    pub fn is_temporary(&self, address: Address) -> bool {
        address >= self.temporary_start && address < self.temporary_end
    }
}

#[derive(Debug)]
pub struct Memory {
    layout: MemoryLayout,
    bytes: Vec<u8>,
    temporary_bytes: Vec<u8>,
    objects: Vec<CppObject>,
    /// Complete objects indexed by start address. Entries may refer to dead
    /// objects until something new is allocated over them.
    by_address: BTreeMap<Address, ObjectId>,
    static_top: Address,
    statics: Vec<ObjectId>,
    static_entities: FxHashMap<EntityId, ObjectId>,
    string_literals: FxHashMap<String, ObjectId>,
    stack: MemoryStack,
    heap: MemoryHeap,
    temporary_top: Address,
    temporaries: Vec<ObjectId>,
    /// Source of garbage bytes when the temporary region grows
    garbage: CppRandom,
    /// Placeholders from failed dereferences, reused per address and type
    invalid_objects: FxHashMap<Address, Vec<ObjectId>>,
    pub events: EventLog,
}

impl Memory {
    /// Create a memory with pseudo-random initial contents drawn from `rng`
    pub fn new(config: &MemoryConfig, rng: &mut CppRandom, events: EventLog) -> Self {
        let layout = MemoryLayout::new(config);
        let bytes = (0..layout.heap_end)
            .map(|_| rng.next_in_range(0, GARBAGE_BOUND as i64) as u8)
            .collect();
        let temporary_bytes = (layout.temporary_start..layout.temporary_end)
            .map(|_| rng.next_in_range(0, GARBAGE_BOUND as i64) as u8)
            .collect();
        Memory {
            layout,
            bytes,
            temporary_bytes,
            objects: Vec::new(),
            by_address: BTreeMap::new(),
            static_top: layout.static_start + STATIC_RESERVED_BYTES,
            statics: Vec::new(),
            static_entities: FxHashMap::default(),
            string_literals: FxHashMap::default(),
            stack: MemoryStack::new(layout.stack_start, layout.stack_end),
            heap: MemoryHeap::new(layout.heap_start, layout.heap_end),
            temporary_top: layout.temporary_start,
            temporaries: Vec::new(),
            garbage: rng.clone(),
            invalid_objects: FxHashMap::default(),
            events,
        }
    }

    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    pub fn stack(&self) -> &MemoryStack {
        &self.stack
    }

    pub fn heap(&self) -> &MemoryHeap {
        &self.heap
    }

    // ---- bytes ----

    fn byte(&self, address: Address) -> u8 {
        if address < self.layout.heap_end {
            self.bytes[address as usize]
        } else if self.layout.is_temporary(address) {
            self.temporary_bytes[(address - self.layout.temporary_start) as usize]
        } else {
            0
        }
    }

    fn set_byte(&mut self, address: Address, byte: u8) {
        if address < self.layout.heap_end {
            self.bytes[address as usize] = byte;
        } else if self.layout.is_temporary(address) {
            let offset = (address - self.layout.temporary_start) as usize;
            self.temporary_bytes[offset] = byte;
        }
    }

    /// Raw bytes; addresses outside every region read as zero
    pub fn read_bytes(&self, address: Address, len: usize) -> Vec<u8> {
        (0..len as Address)
            .map(|i| self.byte(address.wrapping_add(i)))
            .collect()
    }

    /// Raw write; bytes outside every region are dropped
    pub fn write_bytes(&mut self, address: Address, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.set_byte(address.wrapping_add(i as Address), *b);
        }
    }

    // ---- objects ----

    pub fn object(&self, id: ObjectId) -> &CppObject {
        &self.objects[id.0]
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Create an object and its subobjects in the arena. The object is not
    /// yet registered at its address and its lifetime has not begun.
    fn create_object(
        &mut self,
        address: Address,
        ty: &ObjectType,
        name: Option<String>,
        kind: ObjectKind,
    ) -> ObjectId {
        let id = ObjectId(self.objects.len());
        self.objects
            .push(CppObject::new(id, address, ty.clone(), name, kind));
        let subobjects = match ty {
            ObjectType::Array { elem, len } => (0..*len)
                .map(|index| {
                    let elem_address = address + (index * elem.size()) as Address;
                    self.create_object(elem_address, elem, None, ObjectKind::ArrayElement { array: id, index })
                })
                .collect(),
            ObjectType::Class(class) => {
                let mut subs = Vec::new();
                if let Some(base) = &class.base {
                    let base_ty = ObjectType::Class(base.clone());
                    subs.push(self.create_object(address, &base_ty, None, ObjectKind::BaseClass { parent: id }));
                }
                for (member, offset) in class.members.iter().zip(class.member_offsets()) {
                    subs.push(self.create_object(
                        address + offset as Address,
                        &member.ty,
                        None,
                        ObjectKind::Member {
                            parent: id,
                            name: member.name.clone(),
                        },
                    ));
                }
                subs
            }
            _ => Vec::new(),
        };
        self.objects[id.0].subobjects = subobjects;
        id
    }

    /// Register an object at its address in the live object index
    pub fn allocate_object(&mut self, id: ObjectId) {
        let (start, end) = {
            let obj = &self.objects[id.0];
            (obj.address, obj.end_address().max(obj.address + 1))
        };
        let stale: Vec<Address> = self.by_address.range(start..end).map(|(a, _)| *a).collect();
        for address in stale {
            self.by_address.remove(&address);
        }
        self.by_address.insert(start, id);
        let obj = &self.objects[id.0];
        self.events.emit(Event::ObjectAllocated {
            object: id,
            address: obj.address,
            name: obj.name.clone(),
            ty: obj.ty.to_string(),
        });
    }

    fn for_each_in_tree(&mut self, id: ObjectId, f: &mut impl FnMut(&mut CppObject)) {
        f(&mut self.objects[id.0]);
        let subs = self.objects[id.0].subobjects.clone();
        for sub in subs {
            self.for_each_in_tree(sub, f);
        }
    }

    /// Start the lifetime of an object and all of its subobjects
    pub fn begin_lifetime(&mut self, id: ObjectId) {
        if self.is_part_of_invalid_object(id) {
            return;
        }
        self.for_each_in_tree(id, &mut |o| o.alive = true);
    }

    /// End the lifetime of an object. Killing a dead object does nothing.
    pub fn kill_object(&mut self, id: ObjectId, killer: Option<InstanceId>) {
        if !self.objects[id.0].alive {
            return;
        }
        self.for_each_in_tree(id, &mut |o| o.alive = false);
        self.events.emit(Event::ObjectKilled { object: id, killer });
    }

    pub fn is_alive(&self, id: ObjectId) -> bool {
        self.objects[id.0].alive
    }

    /// Whether every atomic part of the object holds a meaningful value
    pub fn is_valid(&self, id: ObjectId) -> bool {
        let obj = &self.objects[id.0];
        if obj.ty.is_atomic() {
            obj.valid
        } else {
            obj.subobjects.iter().all(|s| self.is_valid(*s))
        }
    }

    pub(crate) fn set_validity(&mut self, id: ObjectId, valid: bool) {
        self.for_each_in_tree(id, &mut |o| o.valid = valid);
    }

    // ---- values ----

    /// Current value of an atomic object without notifying observers
    pub fn peek_value(&self, id: ObjectId) -> Value {
        let obj = &self.objects[id.0];
        let bytes = self.read_bytes(obj.address, obj.size());
        let mut value = Value::decode(&obj.ty, &bytes, obj.valid);
        value.provenance = obj.provenance;
        value
    }

    pub fn read_value(&mut self, id: ObjectId) -> Value {
        let value = self.peek_value(id);
        self.events.emit(Event::ValueRead { object: id });
        value
    }

    pub fn write_value(&mut self, id: ObjectId, value: &Value) {
        let address = self.objects[id.0].address;
        self.write_bytes(address, &value.encode());
        let obj = &mut self.objects[id.0];
        obj.valid = value.valid;
        obj.provenance = value.provenance;
        self.events.emit(Event::ValueWritten {
            object: id,
            value: value.to_string(),
        });
    }

    /// Copy the bytes and per-slot validity of `from` into `to`
    pub fn copy_object(&mut self, from: ObjectId, to: ObjectId) {
        let (src, dst, size) = {
            let f = &self.objects[from.0];
            (f.address, self.objects[to.0].address, f.size())
        };
        let bytes = self.read_bytes(src, size);
        self.write_bytes(dst, &bytes);
        self.copy_slot_state(from, to);
        self.events.emit(Event::ValueWritten {
            object: to,
            value: format!("copy of #{}", from.0),
        });
    }

    fn copy_slot_state(&mut self, from: ObjectId, to: ObjectId) {
        let (valid, provenance) = {
            let f = &self.objects[from.0];
            (f.valid, f.provenance)
        };
        let dst = &mut self.objects[to.0];
        dst.valid = valid;
        dst.provenance = provenance;
        let pairs: Vec<(ObjectId, ObjectId)> = self.objects[from.0]
            .subobjects
            .iter()
            .copied()
            .zip(self.objects[to.0].subobjects.iter().copied())
            .collect();
        for (f, t) in pairs {
            self.copy_slot_state(f, t);
        }
    }

    /// Zero every byte of the object and mark it valid
    pub fn zero_initialize(&mut self, id: ObjectId) {
        let (address, size) = (self.objects[id.0].address, self.objects[id.0].size());
        self.write_bytes(address, &vec![0; size]);
        self.for_each_in_tree(id, &mut |o| {
            o.valid = true;
            o.provenance = None;
        });
        self.events.emit(Event::ValueWritten {
            object: id,
            value: "0".to_string(),
        });
    }

    /// Fill a char array with `contents` and a terminating NUL.
    /// Remaining elements are zeroed.
    pub fn write_string(&mut self, id: ObjectId, contents: &str) {
        let (address, size) = (self.objects[id.0].address, self.objects[id.0].size());
        let mut bytes = contents.as_bytes().to_vec();
        bytes.resize(size, 0);
        self.write_bytes(address, &bytes);
        self.set_validity(id, true);
        self.events.emit(Event::ValueWritten {
            object: id,
            value: format!("{:?}", contents),
        });
    }

    // ---- subobjects ----

    pub fn element(&self, array: ObjectId, index: usize) -> Option<ObjectId> {
        match &self.objects[array.0].ty {
            ObjectType::Array { .. } => self.objects[array.0].subobjects.get(index).copied(),
            _ => None,
        }
    }

    /// Member subobject by name, searching base classes
    pub fn member(&self, id: ObjectId, name: &str) -> Option<ObjectId> {
        let obj = &self.objects[id.0];
        let class = obj.ty.class()?;
        let skip = class.base.is_some() as usize;
        if let Some(index) = class.member_index(name) {
            return obj.subobjects.get(skip + index).copied();
        }
        self.base_subobject(id).and_then(|base| self.member(base, name))
    }

    pub fn base_subobject(&self, id: ObjectId) -> Option<ObjectId> {
        let obj = &self.objects[id.0];
        match obj.ty.class() {
            Some(class) if class.base.is_some() => obj.subobjects.first().copied(),
            _ => None,
        }
    }

    /// Atomic leaves of an object in address order
    pub fn atomic_leaves(&self, id: ObjectId) -> Vec<ObjectId> {
        let obj = &self.objects[id.0];
        if obj.ty.is_atomic() {
            vec![id]
        } else {
            obj.subobjects
                .iter()
                .flat_map(|s| self.atomic_leaves(*s))
                .collect()
        }
    }

    // ---- pointer resolution ----

    /// The live object a pointer value denotes, if there is one
    pub fn resolve_pointer(&self, ptr: &Value) -> Option<ObjectId> {
        let pointee = ptr.ty.pointee()?;
        let address = ptr.address();
        match ptr.provenance {
            Some(Provenance::Array(array)) => {
                let arr = &self.objects[array.0];
                let (elem, len) = arr.ty.array_element()?;
                let offset = address.checked_sub(arr.address)? as usize;
                let size = elem.size().max(1);
                if offset % size != 0 || offset / size >= len {
                    return None;
                }
                let target = arr.subobjects[offset / size];
                let obj = &self.objects[target.0];
                (obj.alive && obj.ty.is_compatible_with(pointee)).then_some(target)
            }
            Some(Provenance::Object(target))
                if self.objects[target.0].alive && self.objects[target.0].address == address =>
            {
                self.objects[target.0].ty.is_compatible_with(pointee).then_some(target)
            }
            _ => self
                .object_at(address, pointee)
                .filter(|id| self.objects[id.0].alive),
        }
    }

    /// Find the object (or subobject) starting at `address` whose type is
    /// compatible with `ty`
    pub fn object_at(&self, address: Address, ty: &ObjectType) -> Option<ObjectId> {
        let (_, candidate) = self.by_address.range(..=address).next_back()?;
        let obj = &self.objects[candidate.0];
        if address != obj.address && !obj.contains(address) {
            return None;
        }
        self.find_subobject(*candidate, address, ty)
    }

    fn find_subobject(&self, id: ObjectId, address: Address, ty: &ObjectType) -> Option<ObjectId> {
        let obj = &self.objects[id.0];
        if obj.address == address && obj.ty.is_compatible_with(ty) {
            return Some(id);
        }
        obj.subobjects
            .iter()
            .filter(|s| self.objects[s.0].contains(address))
            .find_map(|s| self.find_subobject(*s, address, ty))
    }

    /// Resolve a pointer to the object it denotes. When no compatible live
    /// object is there, an invalid object carrying the requested type and
    /// raw address is produced instead.
    pub fn dereference(&mut self, ptr: &Value) -> ObjectId {
        if let Some(id) = self.resolve_pointer(ptr) {
            return id;
        }
        let pointee = ptr
            .ty
            .pointee()
            .cloned()
            .unwrap_or_else(|| panic!("dereference of non-pointer value of type {}", ptr.ty));
        self.invalid_object(pointee, ptr.address())
    }

    /// Placeholder object of type `ty` at `address`. The same placeholder is
    /// handed out again for the same address and type, with its validity
    /// cleared.
    pub fn invalid_object(&mut self, ty: ObjectType, address: Address) -> ObjectId {
        let cached = self
            .invalid_objects
            .get(&address)
            .and_then(|ids| ids.iter().copied().find(|id| self.objects[id.0].ty == ty));
        if let Some(id) = cached {
            self.for_each_in_tree(id, &mut |o| {
                o.valid = false;
                o.provenance = None;
            });
            return id;
        }
        let id = self.create_object(address, &ty, None, ObjectKind::Invalid);
        self.invalid_objects.entry(address).or_default().push(id);
        id
    }

    /// Whether `id` is an invalid placeholder or a part of one
    pub fn is_part_of_invalid_object(&self, id: ObjectId) -> bool {
        let mut current = id;
        loop {
            let obj = &self.objects[current.0];
            if obj.is_invalid_object() {
                return true;
            }
            match obj.parent() {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    // ---- static region ----

    fn reserve_static(&mut self, size: usize) -> Option<Address> {
        let address = self.static_top;
        if address + size as Address > self.layout.static_end {
            return None;
        }
        self.static_top += size as Address;
        Some(address)
    }

    /// Allocate the object for a global variable. Returns `None` when the
    /// static region is full.
    pub fn allocate_static(&mut self, entity: &GlobalEntity) -> Option<ObjectId> {
        let address = self.reserve_static(entity.ty.size())?;
        let id = self.create_object(address, &entity.ty, Some(entity.name.clone()), ObjectKind::Static);
        self.statics.push(id);
        self.static_entities.insert(entity.id, id);
        self.allocate_object(id);
        Some(id)
    }

    /// Allocate a string literal. Identical contents share one object.
    pub fn allocate_string_literal(&mut self, contents: &str) -> Option<ObjectId> {
        if let Some(id) = self.string_literals.get(contents) {
            return Some(*id);
        }
        let ty = ObjectType::array_of(ObjectType::Char, contents.len() + 1);
        let address = self.reserve_static(ty.size())?;
        let id = self.create_object(address, &ty, None, ObjectKind::StringLiteral);
        self.string_literals.insert(contents.to_string(), id);
        self.allocate_object(id);
        self.begin_lifetime(id);
        self.write_string(id, contents);
        Some(id)
    }

    pub fn string_literal(&self, contents: &str) -> Option<ObjectId> {
        self.string_literals.get(contents).copied()
    }

    pub fn static_object(&self, entity: EntityId) -> Option<ObjectId> {
        self.static_entities.get(&entity).copied()
    }

    /// Globals in allocation order
    pub fn static_objects(&self) -> &[ObjectId] {
        &self.statics
    }

    pub fn static_bytes_used(&self) -> Address {
        self.static_top - self.layout.static_start
    }

    // ---- stack ----

    /// Lay out every local object of `function` in a new frame. Returns the
    /// frame index, or `None` if the stack region is full.
    pub fn push_frame(&mut self, function: &FunctionDefinition) -> Option<usize> {
        let size: usize = function
            .locals
            .iter()
            .filter(|l| !l.is_reference)
            .map(|l| l.ty.size())
            .sum();
        if !self.stack.has_room_for(size) {
            return None;
        }
        let mut frame = MemoryFrame::new(function.name.clone(), self.stack.top());
        for local in function.locals.iter().filter(|l| !l.is_reference) {
            let address = frame.end();
            let id = self.create_object(
                address,
                &local.ty,
                Some(local.name.clone()),
                ObjectKind::Automatic {
                    function: function.name.clone(),
                },
            );
            frame.add_object(local.id, id, local.ty.size());
            self.allocate_object(id);
        }
        let (start, size) = (frame.start, frame.size);
        let index = self.stack.push_frame(frame);
        debug!(function = %function.name, start, size, "frame pushed");
        self.events.emit(Event::FramePushed {
            function: function.name.clone(),
            start,
            size,
        });
        Some(index)
    }

    /// Remove the top frame. Its objects must already be dead.
    pub fn pop_frame(&mut self) -> MemoryFrame {
        let frame = self
            .stack
            .pop_frame()
            .unwrap_or_else(|| panic!("pop_frame on an empty stack"));
        for (name, object) in frame.references() {
            let refs = &mut self.objects[object.0].referenced_by;
            if let Some(pos) = refs.iter().rposition(|n| n == name) {
                refs.remove(pos);
            }
        }
        debug!(function = %frame.function_name, "frame popped");
        self.events.emit(Event::FramePopped {
            function: frame.function_name.clone(),
        });
        frame
    }

    pub fn frame(&self, index: usize) -> &MemoryFrame {
        self.stack.frame(index)
    }

    /// Record that a reference local in frame `frame` names `object`
    pub fn bind_local_reference(&mut self, frame: usize, entity: &LocalEntity, object: ObjectId) {
        self.stack
            .frame_mut(frame)
            .bind_reference(entity.id, entity.name.clone(), object);
        self.objects[object.0].referenced_by.push(entity.name.clone());
        self.events.emit(Event::ReferenceBound {
            name: entity.name.clone(),
            object,
        });
    }

    /// Forget the binding of a reference local whose scope ended
    pub fn unbind_local_reference(&mut self, frame: usize, entity: &LocalEntity) {
        if let Some((name, object)) = self.stack.frame_mut(frame).unbind_reference(entity.id) {
            let refs = &mut self.objects[object.0].referenced_by;
            if let Some(pos) = refs.iter().rposition(|n| *n == name) {
                refs.remove(pos);
            }
        }
    }

    // ---- heap ----

    /// Allocate a dynamic object. Returns `None` when the heap is exhausted.
    pub fn allocate_heap_object(&mut self, ty: &ObjectType) -> Option<ObjectId> {
        let address = self.heap.reserve(ty.size())?;
        let id = self.create_object(address, ty, None, ObjectKind::Dynamic);
        self.heap.insert(address, id);
        self.allocate_object(id);
        self.events.emit(Event::HeapObjectAllocated { object: id, address });
        Some(id)
    }

    /// Kill a dynamic object and forget it from the heap map
    pub fn delete_heap_object(&mut self, id: ObjectId, killer: Option<InstanceId>) {
        self.kill_object(id, killer);
        let address = self.objects[id.0].address;
        if self.heap.object_at(address) == Some(id) {
            self.heap.remove(address);
        }
        self.objects[id.0].leaked = false;
        self.events.emit(Event::HeapObjectDeleted { object: id });
    }

    pub fn heap_objects(&self) -> Vec<ObjectId> {
        self.heap.objects()
    }

    pub fn is_heap_object(&self, id: ObjectId) -> bool {
        let obj = &self.objects[id.0];
        matches!(obj.kind, ObjectKind::Dynamic) && self.heap.object_at(obj.address) == Some(id)
    }

    pub(crate) fn set_leaked(&mut self, id: ObjectId, leaked: bool) -> bool {
        let obj = &mut self.objects[id.0];
        let changed = obj.leaked != leaked;
        obj.leaked = leaked;
        changed
    }

    /// Mark an object visited in traversal `generation`; false if it already was
    pub(crate) fn visit(&mut self, id: ObjectId, generation: u64) -> bool {
        let obj = &mut self.objects[id.0];
        if obj.generation == generation {
            return false;
        }
        obj.generation = generation;
        true
    }

    pub(crate) fn generation_of(&self, id: ObjectId) -> u64 {
        self.objects[id.0].generation
    }

    // ---- temporaries ----

    /// Allocate a temporary, growing the temporary region when it is full
    pub fn allocate_temporary_object(&mut self, ty: &ObjectType, name: Option<String>) -> ObjectId {
        let address = self.temporary_top;
        self.temporary_top += ty.size().max(1) as Address;
        if self.temporary_top > self.layout.temporary_end {
            let extra = (self.temporary_top - self.layout.temporary_end) as usize;
            let garbage = &mut self.garbage;
            self.temporary_bytes
                .extend((0..extra).map(|_| garbage.next_in_range(0, GARBAGE_BOUND as i64) as u8));
            self.layout.temporary_end = self.temporary_top;
            debug!(end = self.layout.temporary_end, "temporary region grown");
        }
        let id = self.create_object(address, ty, name, ObjectKind::Temporary);
        self.temporaries.push(id);
        self.allocate_object(id);
        self.events.emit(Event::TemporaryObjectAllocated { object: id, address });
        id
    }

    /// Kill a temporary, then drop it from the lookups
    pub fn deallocate_temporary_object(&mut self, id: ObjectId, killer: Option<InstanceId>) {
        self.kill_object(id, killer);
        self.temporaries.retain(|t| *t != id);
        let address = self.objects[id.0].address;
        if self.by_address.get(&address) == Some(&id) {
            self.by_address.remove(&address);
        }
        self.temporary_top = self
            .temporaries
            .iter()
            .map(|t| self.objects[t.0].end_address())
            .max()
            .unwrap_or(self.layout.temporary_start);
        self.events.emit(Event::TemporaryObjectDeallocated { object: id });
    }

    pub fn temporary_objects(&self) -> &[ObjectId] {
        &self.temporaries
    }

    // ---- introspection ----

    /// Complete objects currently alive, in address order
    pub fn live_objects(&self) -> Vec<ObjectId> {
        self.by_address
            .values()
            .copied()
            .filter(|id| self.objects[id.0].alive)
            .collect()
    }

    /// Human-readable dump of every live object
    pub fn print_objects(&self) -> String {
        let mut out = String::new();
        for id in self.live_objects() {
            self.print_object(&mut out, id, 0);
        }
        out
    }

    fn print_object(&self, out: &mut String, id: ObjectId, depth: usize) {
        let obj = &self.objects[id.0];
        let value = if obj.ty.is_atomic() {
            self.peek_value(id).to_string()
        } else {
            String::new()
        };
        let _ = writeln!(
            out,
            "{}0x{:x} {} {} {}",
            "  ".repeat(depth),
            obj.address,
            obj.describe(),
            obj.ty,
            value
        );
        for sub in &obj.subobjects {
            self.print_object(out, *sub, depth + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::types::{ClassType, MemberVariable};
    use std::rc::Rc;

    fn memory() -> Memory {
        let mut rng = CppRandom::new(0);
        Memory::new(&MemoryConfig::default(), &mut rng, EventLog::new())
    }

    #[test]
    fn test_default_layout() {
        let layout = MemoryLayout::new(&MemoryConfig::default());
        assert_eq!(layout.static_end, 10_000);
        assert_eq!(layout.stack_start, 10_000);
        assert_eq!(layout.stack_end, 55_000);
        assert_eq!(layout.heap_start, 55_000);
        assert_eq!(layout.heap_end, 100_000);
        assert_eq!(layout.temporary_start, 100_100);
    }

    #[test]
    fn test_initial_bytes_are_deterministic() {
        let a = memory();
        let b = memory();
        assert_eq!(a.read_bytes(500, 32), b.read_bytes(500, 32));
        assert!(a.read_bytes(500, 32).iter().all(|b| *b < 100));
    }

    #[test]
    fn test_string_literals_are_deduplicated() {
        let mut mem = memory();
        let first = mem.allocate_string_literal("hi").expect("room for literal");
        let second = mem.allocate_string_literal("hi").expect("room for literal");
        let other = mem.allocate_string_literal("ho").expect("room for literal");
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(mem.read_bytes(mem.object(first).address, 3), b"hi\0".to_vec());
        assert!(mem.object(first).address >= STATIC_RESERVED_BYTES);
    }

    #[test]
    fn test_kill_is_idempotent() {
        let mut mem = memory();
        let g = GlobalEntity::new("g", ObjectType::Int);
        let id = mem.allocate_static(&g).expect("room for global");
        mem.begin_lifetime(id);
        mem.kill_object(id, None);
        mem.kill_object(id, None);
        let kills = mem
            .events
            .events()
            .iter()
            .filter(|e| matches!(e, Event::ObjectKilled { .. }))
            .count();
        assert_eq!(kills, 1);
    }

    #[test]
    fn test_dereference_falls_back_to_invalid_object() {
        let mut mem = memory();
        let g = GlobalEntity::new("g", ObjectType::Int);
        let id = mem.allocate_static(&g).expect("room for global");
        mem.begin_lifetime(id);
        let address = mem.object(id).address;

        let good = Value::pointer(ObjectType::Int, address, None);
        assert_eq!(mem.dereference(&good), id);

        let wrong_type = Value::pointer(ObjectType::Double, address, None);
        let invalid = mem.dereference(&wrong_type);
        assert!(mem.object(invalid).is_invalid_object());
        assert_eq!(mem.object(invalid).ty, ObjectType::Double);
        assert_eq!(mem.object(invalid).address, address);
        assert!(!mem.is_valid(invalid));
    }

    #[test]
    fn test_repeated_dangling_dereference_reuses_placeholder() {
        let mut mem = memory();
        let class = Rc::new(ClassType::new(
            "Point",
            vec![MemberVariable {
                name: "x".into(),
                ty: ObjectType::Int,
            }],
        ));
        let ty = ObjectType::Class(class);
        let dangling = Value::pointer(ty.clone(), 60_000, None);

        let first = mem.dereference(&dangling);
        let count = mem.object_count();
        let member = mem.object(first).subobjects[0];
        assert!(mem.is_part_of_invalid_object(member));

        let second = mem.dereference(&dangling);
        assert_eq!(first, second);
        assert_eq!(mem.object_count(), count);

        // A different type at the same address gets its own placeholder
        let as_int = mem.dereference(&Value::pointer(ObjectType::Int, 60_000, None));
        assert_ne!(as_int, first);
    }

    #[test]
    fn test_array_provenance_resolves_elements() {
        let mut mem = memory();
        let g = GlobalEntity::new("arr", ObjectType::array_of(ObjectType::Int, 3));
        let arr = mem.allocate_static(&g).expect("room for array");
        mem.begin_lifetime(arr);
        let base = mem.object(arr).address;

        let p = Value::pointer(ObjectType::Int, base + 8, Some(Provenance::Array(arr)));
        assert_eq!(mem.resolve_pointer(&p), mem.element(arr, 2));

        let past_end = Value::pointer(ObjectType::Int, base + 12, Some(Provenance::Array(arr)));
        assert_eq!(mem.resolve_pointer(&past_end), None);
    }

    #[test]
    fn test_member_lookup_through_base() {
        let mut mem = memory();
        let base = Rc::new(ClassType::new(
            "A",
            vec![MemberVariable { name: "a".into(), ty: ObjectType::Int }],
        ));
        let derived = Rc::new(
            ClassType::new("B", vec![MemberVariable { name: "b".into(), ty: ObjectType::Char }])
                .with_base(base),
        );
        let g = GlobalEntity::new("obj", ObjectType::Class(derived));
        let id = mem.allocate_static(&g).expect("room for object");
        let a = mem.member(id, "a").expect("inherited member");
        let b = mem.member(id, "b").expect("own member");
        assert_eq!(mem.object(a).address, mem.object(id).address);
        assert_eq!(mem.object(b).address, mem.object(id).address + 4);
    }

    #[test]
    fn test_heap_allocates_downward_and_delete_forgets() {
        let mut mem = memory();
        let first = mem.allocate_heap_object(&ObjectType::Int).expect("heap room");
        let second = mem.allocate_heap_object(&ObjectType::Int).expect("heap room");
        assert_eq!(mem.object(first).address, 100_000 - 4);
        assert_eq!(mem.object(second).address, 100_000 - 8);
        mem.begin_lifetime(first);
        mem.delete_heap_object(first, None);
        assert!(!mem.is_alive(first));
        assert_eq!(mem.heap_objects(), vec![second]);
    }

    #[test]
    fn test_temporary_kill_precedes_removal() {
        let mut mem = memory();
        let t = mem.allocate_temporary_object(&ObjectType::Int, None);
        mem.begin_lifetime(t);
        mem.deallocate_temporary_object(t, None);
        let tail: Vec<&Event> = mem.events.events().iter().rev().take(2).collect();
        assert!(matches!(tail[0], Event::TemporaryObjectDeallocated { .. }));
        assert!(matches!(tail[1], Event::ObjectKilled { .. }));
        assert!(mem.temporary_objects().is_empty());
    }
}
