//! Heap leak detection
//!
//! A mark pass starting from everything the program can still name: globals,
//! frame objects and references, temporaries, and values held by
//! instances on the execution stack. Pointers are followed to the objects
//! they resolve to. Heap objects the pass never reaches are leaked.

use super::Simulation;
use crate::events::Event;
use crate::memory::object::ObjectId;
use crate::memory::value::{Provenance, Value};
use crate::runtime::{ConstructState, EvalResult};
use std::collections::VecDeque;
use tracing::debug;

impl Simulation {
    fn leak_roots(&self) -> Vec<ObjectId> {
        let mut roots: Vec<ObjectId> = self.memory.static_objects().to_vec();
        for frame in self.memory.stack().frames() {
            roots.extend(frame.objects().iter().copied());
            roots.extend(frame.references().map(|(_, object)| object));
        }
        roots.extend(self.memory.temporary_objects().iter().copied());

        let mut held_values: Vec<Value> = Vec::new();
        let mut held = |result: Option<&EvalResult>, roots: &mut Vec<ObjectId>| match result {
            Some(EvalResult::Object(object)) => roots.push(*object),
            Some(EvalResult::Value(value)) if value.ty.is_pointer() => held_values.push(value.clone()),
            _ => {}
        };
        for id in &self.stack {
            match &self.instances[id.0].state {
                ConstructState::Expression(s) => {
                    held(s.result.as_ref(), &mut roots);
                    roots.extend(s.allocated);
                    // Finished operands waiting to be used
                    for child in s.children() {
                        if let ConstructState::Expression(c) = &self.instances[child.0].state {
                            held(c.result.as_ref(), &mut roots);
                        }
                    }
                }
                ConstructState::Call(s) => roots.extend(s.receiver),
                _ => {}
            }
        }
        for value in held_values {
            roots.extend(self.pointer_targets(&value));
        }
        roots
    }

    fn pointer_targets(&self, value: &Value) -> Vec<ObjectId> {
        let mut targets: Vec<ObjectId> = self.memory.resolve_pointer(value).into_iter().collect();
        if let Some(Provenance::Array(array)) = value.provenance {
            targets.push(array);
        }
        targets
    }

    /// Mark reachable objects, then flag every unreached heap object as leaked
    pub(crate) fn check_for_leaks(&mut self) {
        self.leak_generation += 1;
        let generation = self.leak_generation;
        let mut frontier: VecDeque<ObjectId> = self.leak_roots().into();

        while let Some(object) = frontier.pop_front() {
            if !self.memory.visit(object, generation) {
                continue;
            }
            let obj = self.memory.object(object);
            frontier.extend(obj.subobjects.iter().copied());
            frontier.extend(obj.parent());
            if obj.ty.is_pointer() && obj.is_alive() && obj.valid {
                let value = self.memory.peek_value(object);
                frontier.extend(self.pointer_targets(&value));
            }
        }

        for object in self.memory.heap_objects() {
            let leaked = self.memory.generation_of(object) != generation;
            if self.memory.set_leaked(object, leaked) && leaked {
                debug!(object = object.0, "memory leaked");
                self.memory.events.emit(Event::MemoryLeaked { object });
            }
        }
    }

    /// Heap objects currently flagged as leaked
    pub fn leaked_objects(&self) -> Vec<ObjectId> {
        self.memory
            .heap_objects()
            .into_iter()
            .filter(|id| self.memory.object(*id).is_leaked())
            .collect()
    }
}
