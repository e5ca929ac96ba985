//! Initialization of objects and binding of references

use super::{ConstructState, EvalResult, InstanceId, StackType};
use crate::memory::object::ObjectId;
use crate::program::ast::{Expression, Initializer};
use crate::program::entities::LocalEntity;
use crate::program::types::ObjectType;
use crate::program::FunctionId;
use crate::simulation::Simulation;
use std::rc::Rc;

/// What an initializer initializes
#[derive(Debug, Clone)]
pub(crate) enum InitTarget {
    Object(ObjectId),
    /// A reference local (or parameter) in a frame
    Reference { frame: usize, entity: Rc<LocalEntity> },
    /// The result of a function returning by reference
    ReturnReference { function: InstanceId },
    /// Evaluate and throw the result away
    Discard,
}

const START: u8 = 0;
const RUNNING: u8 = 1;

#[derive(Debug)]
pub(crate) struct InitializerState {
    target: InitTarget,
    model: Initializer,
    phase: u8,
    children: Vec<InstanceId>,
}

/// Whether default-initializing `ty` runs a constructor somewhere
fn needs_construction(ty: &ObjectType) -> bool {
    match ty {
        ObjectType::Array { elem, .. } => needs_construction(elem),
        ObjectType::Class(class) => {
            class.default_constructor.is_some()
                || class
                    .base
                    .as_ref()
                    .is_some_and(|b| needs_construction(&ObjectType::Class(b.clone())))
                || class.members.iter().any(|m| needs_construction(&m.ty))
        }
        _ => false,
    }
}

impl Simulation {
    pub(crate) fn create_initializer(
        &mut self,
        target: InitTarget,
        model: Initializer,
        name: String,
        parent: InstanceId,
    ) -> InstanceId {
        let label = match &model {
            Initializer::Default => format!("{} (default)", name),
            Initializer::Value => format!("{} = {{}}", name),
            Initializer::Direct(e) => format!("{} = {}", name, e),
            Initializer::Constructor { .. } => format!("{}(...)", name),
            Initializer::List(_) => format!("{} = {{...}}", name),
        };
        let state = ConstructState::Initializer(InitializerState {
            target,
            model,
            phase: START,
            children: Vec::new(),
        });
        self.create_instance(Some(parent), StackType::Initializer, label, state)
    }

    fn push_children(&mut self, children: Vec<InstanceId>) {
        for child in children.iter().rev() {
            self.push(*child);
        }
    }

    pub(crate) fn initializer_up_next(&mut self, id: InstanceId, s: &mut InitializerState) {
        if s.phase == RUNNING {
            // Direct and value initialization finish with a step of their own
            let stepped = matches!(s.model, Initializer::Direct(_) | Initializer::Value);
            if !stepped && !s.children.is_empty() {
                self.start_cleanup(id);
            }
            return;
        }
        s.phase = RUNNING;
        let copy = match (&s.model, &s.target) {
            (Initializer::Direct(expr), InitTarget::Object(object)) => self
                .copy_constructor_for(*object, expr)
                .map(|constructor| Initializer::Constructor {
                    constructor,
                    args: vec![expr.clone()],
                }),
            _ => None,
        };
        if let Some(copy) = copy {
            s.model = copy;
        }
        match (s.model.clone(), s.target.clone()) {
            (Initializer::Default, InitTarget::Object(object)) => {
                self.memory.begin_lifetime(object);
                s.children = self.default_construction(object, id);
                self.push_children(s.children.clone());
            }
            (Initializer::Direct(expr), _) => {
                let child = self.create_expression(&expr, id);
                s.children.push(child);
                self.push(child);
            }
            (Initializer::Constructor { constructor, args }, InitTarget::Object(object)) => {
                self.memory.begin_lifetime(object);
                let call = self.create_call(constructor, Some(object), args, id);
                s.children.push(call);
                self.push(call);
            }
            (Initializer::List(items), InitTarget::Object(object)) => {
                self.memory.begin_lifetime(object);
                s.children = self.list_elements(object, &items, id);
                self.push_children(s.children.clone());
            }
            _ => {}
        }
    }

    pub(crate) fn initializer_step_forward(&mut self, id: InstanceId, s: &mut InitializerState) {
        if s.phase != RUNNING {
            return;
        }
        match (&s.model, &s.target) {
            (Initializer::Value, InitTarget::Object(object)) => {
                self.memory.begin_lifetime(*object);
                self.memory.zero_initialize(*object);
            }
            (Initializer::Direct(_), target) => {
                let arg = s.children[0];
                let result = self.expression_result(arg).clone();
                self.apply_direct(target, result);
            }
            _ => {}
        }
        self.start_cleanup(id);
    }

    /// Copy constructor to run when `object` is initialized from a class object
    fn copy_constructor_for(&self, object: ObjectId, source: &Expression) -> Option<FunctionId> {
        let target = self.memory.object(object).ty.class()?;
        source.ty.as_ref()?.class()?;
        target.copy_constructor
    }

    /// Initializers for the parts of `object` that run constructors
    fn default_construction(&mut self, object: ObjectId, parent: InstanceId) -> Vec<InstanceId> {
        let ty = self.memory.object(object).ty.clone();
        if !needs_construction(&ty) {
            return Vec::new();
        }
        if let Some(ctor) = ty.class().and_then(|c| c.default_constructor) {
            return vec![self.create_call(ctor, Some(object), Vec::new(), parent)];
        }
        let parts: Vec<ObjectId> = self
            .memory
            .object(object)
            .subobjects
            .iter()
            .copied()
            .filter(|part| needs_construction(&self.memory.object(*part).ty))
            .collect();
        parts
            .into_iter()
            .map(|part| {
                let name = self.memory.object(part).describe();
                self.create_initializer(InitTarget::Object(part), Initializer::Default, name, parent)
            })
            .collect()
    }

    fn list_elements(&mut self, array: ObjectId, items: &[Rc<Expression>], parent: InstanceId) -> Vec<InstanceId> {
        let elements = self.memory.object(array).subobjects.clone();
        elements
            .into_iter()
            .enumerate()
            .map(|(i, element)| {
                let model = match items.get(i) {
                    Some(item) => Initializer::Direct(item.clone()),
                    None => Initializer::Value,
                };
                self.create_initializer(InitTarget::Object(element), model, format!("[{}]", i), parent)
            })
            .collect()
    }

    fn apply_direct(&mut self, target: &InitTarget, result: EvalResult) {
        match (target, result) {
            (InitTarget::Discard, _) => {}
            (InitTarget::Reference { frame, entity }, EvalResult::Object(object)) => {
                self.memory.bind_local_reference(*frame, entity, object);
            }
            (InitTarget::ReturnReference { function }, EvalResult::Object(object)) => {
                self.function_state_mut(*function).return_reference = Some(object);
            }
            (InitTarget::Object(object), EvalResult::Value(value)) => {
                self.memory.begin_lifetime(*object);
                self.memory.write_value(*object, &value);
            }
            (InitTarget::Object(object), EvalResult::Object(source)) => {
                self.memory.begin_lifetime(*object);
                let (target_size, source_size) = (
                    self.memory.object(*object).size(),
                    self.memory.object(source).size(),
                );
                if target_size == source_size {
                    self.memory.copy_object(source, *object);
                } else {
                    // char array from a shorter string literal
                    let address = self.memory.object(source).address;
                    let bytes = self.memory.read_bytes(address, source_size);
                    let text: String = bytes
                        .iter()
                        .take_while(|b| **b != 0)
                        .map(|b| *b as char)
                        .collect();
                    self.memory.write_string(*object, &text);
                }
            }
            (target, result) => panic!("cannot initialize {:?} from {:?}", target, result),
        }
    }
}
