//! Function calls and function activations
//!
//! A call runs in four phases:
//! 1. **Push**: one step lays out the callee's frame
//! 2. **Arguments**: parameter initializers run, last argument pushed first
//! 3. **Call**: one step hands control to the callee's activation
//! 4. **Return**: the call ends once the activation is gone
//!
//! The activation itself runs constructor member initializers (for
//! constructors) and then the body. A final step pops its frame.

use super::initializers::InitTarget;
use super::{ConstructState, EvalResult, InstanceId, StackType};
use crate::events::UndefinedBehavior;
use crate::memory::object::ObjectId;
use crate::program::ast::{Expression, Initializer, Statement};
use crate::program::types::ReturnType;
use crate::program::{FunctionDefinition, FunctionId, FunctionKind};
use crate::simulation::Simulation;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallPhase {
    Push,
    Arguments,
    Call,
    Return,
}

#[derive(Debug)]
pub(crate) struct CallState {
    function: Rc<FunctionDefinition>,
    args: Vec<Rc<Expression>>,
    pub(crate) receiver: Option<ObjectId>,
    pub(crate) runtime_function: Option<InstanceId>,
    phase: CallPhase,
}

#[derive(Debug)]
pub(crate) struct FunctionState {
    pub(crate) function: Rc<FunctionDefinition>,
    pub(crate) receiver: Option<ObjectId>,
    pub(crate) return_object: Option<ObjectId>,
    pub(crate) return_reference: Option<ObjectId>,
    pub(crate) returned: bool,
    members_initialized: bool,
    body: Option<InstanceId>,
}

impl Simulation {
    /// Create a call to `function`. A by-value return gets a temporary
    /// return object owned by the enclosing full-expression.
    pub(crate) fn create_call(
        &mut self,
        function_id: FunctionId,
        receiver: Option<ObjectId>,
        args: Vec<Rc<Expression>>,
        parent: InstanceId,
    ) -> InstanceId {
        self.create_call_instance(function_id, receiver, args, Some(parent))
    }

    pub(crate) fn create_call_instance(
        &mut self,
        function_id: FunctionId,
        receiver: Option<ObjectId>,
        args: Vec<Rc<Expression>>,
        parent: Option<InstanceId>,
    ) -> InstanceId {
        let function = self.program.function(function_id).clone();
        let call = self.create_instance(
            parent,
            StackType::Call,
            format!("call {}", function.name),
            ConstructState::Call(CallState {
                function: function.clone(),
                args,
                receiver,
                runtime_function: None,
                phase: CallPhase::Push,
            }),
        );

        let return_object = match &function.return_type {
            ReturnType::Value(ty) => {
                Some(self.allocate_temporary(call, ty, Some(format!("{} return", function.name))))
            }
            _ => None,
        };
        let activation = self.create_instance(
            Some(call),
            StackType::Function,
            format!("{}()", function.name),
            ConstructState::Function(FunctionState {
                function: function.clone(),
                receiver,
                return_object,
                return_reference: None,
                returned: false,
                members_initialized: false,
                body: None,
            }),
        );
        if let (true, Some(receiver)) = (function.is_destructor(), receiver) {
            let parts = self.memory.object(receiver).subobjects.clone();
            if !parts.is_empty() {
                let cleanup = self.create_deallocator(activation, parts, Vec::new(), None, "members".into());
                self.set_cleanup_construct(activation, cleanup);
            }
        }
        if let ConstructState::Call(state) = &mut self.rt_mut(call).state {
            state.runtime_function = Some(activation);
        }
        call
    }

    pub(crate) fn call_state(&self, id: InstanceId) -> &CallState {
        match &self.rt(id).state {
            ConstructState::Call(s) => s,
            _ => panic!("instance {:?} is not a function call", id),
        }
    }

    pub(crate) fn function_state(&self, id: InstanceId) -> &FunctionState {
        match &self.rt(id).state {
            ConstructState::Function(s) => s,
            _ => panic!("instance {:?} is not a function activation", id),
        }
    }

    pub(crate) fn function_state_mut(&mut self, id: InstanceId) -> &mut FunctionState {
        match &mut self.rt_mut(id).state {
            ConstructState::Function(s) => s,
            _ => panic!("instance {:?} is not a function activation", id),
        }
    }

    fn activation_of(s: &CallState) -> InstanceId {
        s.runtime_function
            .unwrap_or_else(|| panic!("call to {} has no activation", s.function.name))
    }

    pub(crate) fn call_step_forward(&mut self, _id: InstanceId, s: &mut CallState) {
        let activation = Self::activation_of(s);
        match s.phase {
            CallPhase::Push => match self.memory.push_frame(&s.function) {
                Some(frame) => {
                    self.rt_mut(activation).frame = Some(frame);
                    s.phase = CallPhase::Arguments;
                }
                None => {
                    self.report_ub(
                        UndefinedBehavior::StackOverflow,
                        None,
                        format!("no room on the stack for a frame of {}", s.function.name),
                    );
                    self.abort();
                }
            },
            CallPhase::Call => {
                debug!(function = %s.function.name, "calling");
                s.phase = CallPhase::Return;
                self.push(activation);
            }
            CallPhase::Arguments | CallPhase::Return => {}
        }
    }

    pub(crate) fn call_up_next(&mut self, id: InstanceId, s: &mut CallState) {
        match s.phase {
            CallPhase::Arguments => {
                s.phase = CallPhase::Call;
                let activation = Self::activation_of(s);
                let frame = self
                    .rt(activation)
                    .frame
                    .unwrap_or_else(|| panic!("arguments evaluated before the frame was pushed"));
                let mut initializers = Vec::new();
                for (param, arg) in s.function.params.clone().iter().zip(s.args.clone()) {
                    let target = if param.is_reference {
                        InitTarget::Reference {
                            frame,
                            entity: param.clone(),
                        }
                    } else {
                        let object = self
                            .memory
                            .frame(frame)
                            .local_object(param.id)
                            .unwrap_or_else(|| panic!("parameter {} has no storage", param.name));
                        InitTarget::Object(object)
                    };
                    initializers.push(self.create_initializer(
                        target,
                        Initializer::Direct(arg),
                        param.name.clone(),
                        id,
                    ));
                }
                for init in initializers.into_iter().rev() {
                    self.push(init);
                }
            }
            CallPhase::Return => {
                if self.main_call == Some(id) {
                    self.capture_main_return(Self::activation_of(s));
                }
                self.start_cleanup(id);
            }
            CallPhase::Push | CallPhase::Call => {}
        }
    }

    /// Result of a finished call as seen by the calling expression
    pub(crate) fn call_result(&mut self, call: InstanceId) -> EvalResult {
        let activation = Self::activation_of(self.call_state(call));
        let state = self.function_state(activation);
        match (&state.function.return_type, state.return_object, state.return_reference) {
            (ReturnType::Void, _, _) => EvalResult::Void,
            (ReturnType::Reference(_), _, Some(object)) => EvalResult::Object(object),
            (ReturnType::Value(ty), Some(object), _) if ty.is_atomic() => {
                EvalResult::Value(self.read_checked(object))
            }
            (ReturnType::Value(_), Some(object), _) => EvalResult::Object(object),
            _ => panic!("call to {} produced no result", state.function.name),
        }
    }

    pub(crate) fn function_up_next(&mut self, id: InstanceId, s: &mut FunctionState) {
        if !s.members_initialized {
            s.members_initialized = true;
            let initializers = self.member_initializers(id, s);
            if !initializers.is_empty() {
                for init in initializers.into_iter().rev() {
                    self.push(init);
                }
                return;
            }
        }
        if s.body.is_none() {
            let body = self.create_function_body(id, &s.function);
            s.body = Some(body);
            self.push(body);
        }
    }

    /// Initializers for the base and members of the object under construction
    fn member_initializers(&mut self, id: InstanceId, s: &FunctionState) -> Vec<InstanceId> {
        let (FunctionKind::Constructor { member_initializers }, Some(receiver)) = (&s.function.kind, s.receiver)
        else {
            return Vec::new();
        };
        let Some(class) = self.memory.object(receiver).ty.class().cloned() else {
            return Vec::new();
        };
        let mut initializers = Vec::new();
        if let Some(base) = self.memory.base_subobject(receiver) {
            let name = format!("<{}>", self.memory.object(base).ty);
            initializers.push(self.create_initializer(InitTarget::Object(base), Initializer::Default, name, id));
        }
        for member in &class.members {
            let object = self
                .memory
                .member(receiver, &member.name)
                .unwrap_or_else(|| panic!("{} has no member {}", class.name, member.name));
            let model = member_initializers
                .iter()
                .find(|m| m.member == member.name)
                .map(|m| m.initializer.clone())
                .unwrap_or(Initializer::Default);
            initializers.push(self.create_initializer(InitTarget::Object(object), model, member.name.clone(), id));
        }
        initializers
    }

    /// The body block; its cleanup also ends the lifetime of the parameters
    fn create_function_body(&mut self, id: InstanceId, function: &Rc<FunctionDefinition>) -> InstanceId {
        let body = self.create_statement(&Statement::Block(function.body.clone()), id);
        if !function.params.is_empty() {
            let frame = self.frame_of(id);
            let mut locals = function.params.clone();
            locals.extend(function.body.locals.iter().cloned());
            let (objects, references) = self.local_targets(frame, &locals);
            let cleanup = self.create_deallocator(body, objects, references, Some(frame), "locals".into());
            self.set_cleanup_construct(body, cleanup);
        }
        body
    }

    pub(crate) fn function_step_forward(&mut self, id: InstanceId, s: &mut FunctionState) {
        let non_void = !matches!(s.function.return_type, ReturnType::Void);
        if !s.returned && non_void {
            if s.function.name == "main" {
                if let Some(object) = s.return_object {
                    self.memory.begin_lifetime(object);
                    self.memory.write_value(object, &crate::memory::value::Value::int(0));
                }
            } else {
                self.report_ub(
                    UndefinedBehavior::MissingReturn,
                    s.return_object,
                    format!("{} ended without returning a value", s.function.name),
                );
            }
        }
        self.memory.pop_frame();
        self.rt_mut(id).frame = None;
        self.start_cleanup(id);
    }

    fn capture_main_return(&mut self, activation: InstanceId) {
        if let Some(object) = self.function_state(activation).return_object {
            self.main_return = Some(self.memory.peek_value(object));
        }
    }
}
