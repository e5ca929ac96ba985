//! Reverse-order destruction
//!
//! A deallocator ends the lifetime of a list of objects, last one first.
//! Objects of class type with a destructor get a destructor call before they
//! die; arrays and classes whose parts need destruction get a nested
//! deallocator over their parts. Everything else is killed directly.
//!
//! The same construct serves block locals, function parameters, members in
//! a destructor, globals at program exit and the target of `delete`.

use super::{ConstructState, InstanceId, StackType};
use crate::memory::object::ObjectId;
use crate::program::entities::LocalEntity;
use crate::simulation::Simulation;
use std::rc::Rc;
use tracing::trace;

#[derive(Debug)]
pub(crate) struct DeallocatorState {
    objects: Vec<ObjectId>,
    references: Vec<Rc<LocalEntity>>,
    frame: Option<usize>,
    /// `None` until the first step; then the number of objects not yet visited
    index: Option<usize>,
    /// Object whose destructor (or nested cleanup) is running
    current: Option<ObjectId>,
}

impl Simulation {
    pub(crate) fn create_deallocator(
        &mut self,
        parent: InstanceId,
        objects: Vec<ObjectId>,
        references: Vec<Rc<LocalEntity>>,
        frame: Option<usize>,
        what: String,
    ) -> InstanceId {
        let state = ConstructState::Deallocator(DeallocatorState {
            objects,
            references,
            frame,
            index: None,
            current: None,
        });
        self.create_instance(Some(parent), StackType::Cleanup, format!("destroy {}", what), state)
    }

    /// Deallocator for globals, run when `main`'s call finishes
    pub(crate) fn create_static_deallocator(&mut self, main_call: InstanceId) -> InstanceId {
        let statics = self.memory.static_objects().to_vec();
        self.create_deallocator(main_call, statics, Vec::new(), None, "globals".into())
    }

    pub(crate) fn deallocator_step_forward(&mut self, _id: InstanceId, s: &mut DeallocatorState) {
        if s.index.is_none() {
            s.index = Some(s.objects.len());
        }
    }

    pub(crate) fn deallocator_up_next(&mut self, id: InstanceId, s: &mut DeallocatorState) {
        let Some(mut index) = s.index else {
            return;
        };
        if let Some(current) = s.current.take() {
            self.memory.kill_object(current, Some(id));
        }
        while index > 0 {
            index -= 1;
            let object = s.objects[index];
            if !self.memory.is_alive(object) {
                continue;
            }
            let ty = self.memory.object(object).ty.clone();
            if !ty.needs_destruction() {
                self.memory.kill_object(object, Some(id));
                continue;
            }
            s.index = Some(index);
            s.current = Some(object);
            let child = match ty.class().and_then(|c| c.destructor) {
                Some(destructor) => {
                    trace!(object = object.0, "calling destructor");
                    self.create_call(destructor, Some(object), Vec::new(), id)
                }
                None => {
                    let parts = self.memory.object(object).subobjects.clone();
                    self.create_deallocator(id, parts, Vec::new(), None, self.memory.object(object).describe())
                }
            };
            self.push(child);
            return;
        }
        s.index = Some(0);
        if let Some(frame) = s.frame {
            for reference in &s.references {
                self.memory.unbind_local_reference(frame, reference);
            }
        }
        self.start_cleanup(id);
    }
}
