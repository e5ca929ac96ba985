//! Expression evaluation
//!
//! Most expressions follow one shape: push every operand (the last one is
//! pushed first so they run left to right), wait for them to finish, then
//! compute the result in a single step. Expressions that only evaluate some
//! of their operands or that start calls, allocations or destructors have
//! extra phases.

use super::{ConstructState, EvalResult, InstanceId, StackType};
use crate::events::{Event, UndefinedBehavior};
use crate::memory::object::{ObjectId, ObjectKind};
use crate::memory::value::{Address, Provenance, Value};
use crate::program::ast::{
    BinaryOp, ConversionKind, Expression, ExpressionKind, IncrementOp, Initializer, Literal, LogicalOp,
    OutputItem, UnaryOp,
};
use crate::program::entities::EntityRef;
use crate::program::types::ObjectType;
use crate::runtime::initializers::InitTarget;
use crate::simulation::Simulation;
use std::rc::Rc;
use tracing::debug;

const START: u8 = 0;
const OPERANDS_DONE: u8 = 1;
const SECOND_STAGE: u8 = 2;
const FINISH: u8 = 3;

/// Longest C string `cout` will read before giving up on a terminator
const MAX_C_STRING: usize = 10_000;

#[derive(Debug)]
pub(crate) struct ExpressionState {
    pub(crate) model: Rc<Expression>,
    phase: u8,
    operands: Vec<InstanceId>,
    /// Child pushed after the operands: the chosen branch, the right side of
    /// `&&`/`||`/`,`, a call, an initializer or a deallocator
    stage: Option<InstanceId>,
    /// Heap object created by `new` and not yet handed out
    pub(crate) allocated: Option<ObjectId>,
    short_circuited: bool,
    pub(crate) result: Option<EvalResult>,
}

impl ExpressionState {
    /// Operand and second-stage instances created so far
    pub(crate) fn children(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.operands.iter().copied().chain(self.stage)
    }
}

impl Simulation {
    pub(crate) fn create_expression(&mut self, expr: &Rc<Expression>, parent: InstanceId) -> InstanceId {
        let state = ConstructState::Expression(ExpressionState {
            model: expr.clone(),
            phase: START,
            operands: Vec::new(),
            stage: None,
            allocated: None,
            short_circuited: false,
            result: None,
        });
        self.create_instance(Some(parent), StackType::Expression, expr.to_string(), state)
    }

    /// Result of a finished expression instance
    pub fn expression_result(&self, id: InstanceId) -> &EvalResult {
        match &self.rt(id).state {
            ConstructState::Expression(s) => s
                .result
                .as_ref()
                .unwrap_or_else(|| panic!("expression {:?} has not been evaluated", id)),
            _ => panic!("instance {:?} is not an expression", id),
        }
    }

    fn operand(&self, s: &ExpressionState, index: usize) -> EvalResult {
        self.expression_result(s.operands[index]).clone()
    }

    fn operand_value(&self, s: &ExpressionState, index: usize) -> Value {
        self.expression_result(s.operands[index]).value().clone()
    }

    fn operand_object(&self, s: &ExpressionState, index: usize) -> ObjectId {
        self.expression_result(s.operands[index]).object()
    }

    fn push_operands(&mut self, id: InstanceId, s: &mut ExpressionState) {
        s.operands = s
            .model
            .operands()
            .iter()
            .map(|operand| self.create_expression(operand, id))
            .collect();
        for operand in s.operands.clone().into_iter().rev() {
            self.push(operand);
        }
    }

    fn push_stage(&mut self, id: InstanceId, s: &mut ExpressionState, expr: &Rc<Expression>) {
        let child = self.create_expression(expr, id);
        s.stage = Some(child);
        self.push(child);
    }

    pub(crate) fn expression_up_next(&mut self, id: InstanceId, s: &mut ExpressionState) {
        match s.phase {
            START => {
                self.push_operands(id, s);
                s.phase = OPERANDS_DONE;
                if let ExpressionKind::Call { .. } = &s.model.kind {
                    if s.operands.is_empty() {
                        self.expression_up_next(id, s);
                    }
                }
            }
            OPERANDS_DONE => {
                let model = s.model.clone();
                match &model.kind {
                    ExpressionKind::Logical { op, right, .. } => {
                        let left = self.operand_value(s, 0).as_bool();
                        s.short_circuited = match op {
                            LogicalOp::And => !left,
                            LogicalOp::Or => left,
                        };
                        s.phase = FINISH;
                        if !s.short_circuited {
                            self.push_stage(id, s, right);
                        }
                    }
                    ExpressionKind::Comma { right, .. } => {
                        s.phase = FINISH;
                        self.push_stage(id, s, right);
                    }
                    ExpressionKind::Conditional {
                        then_value, otherwise, ..
                    } => {
                        s.phase = FINISH;
                        let chosen = if self.operand_value(s, 0).as_bool() {
                            then_value
                        } else {
                            otherwise
                        };
                        self.push_stage(id, s, chosen);
                    }
                    ExpressionKind::Call { function, args, .. } => {
                        let receiver = (!s.operands.is_empty()).then(|| self.operand_object(s, 0));
                        let call = self.create_call(*function, receiver, args.clone(), id);
                        s.stage = Some(call);
                        s.phase = FINISH;
                        self.push(call);
                    }
                    _ => {}
                }
            }
            SECOND_STAGE => {
                s.phase = FINISH;
                if let Some(stage) = s.stage {
                    self.push(stage);
                }
            }
            _ => {
                if let (ExpressionKind::Delete { .. }, Some(_)) = (&s.model.kind, s.stage) {
                    self.finish_delete(id, s);
                }
            }
        }
    }

    pub(crate) fn expression_step_forward(&mut self, id: InstanceId, s: &mut ExpressionState) {
        let model = s.model.clone();
        match (&model.kind, s.phase) {
            (ExpressionKind::New { allocated, initializer }, OPERANDS_DONE) => {
                self.begin_new(id, s, allocated.clone(), initializer.clone());
                return;
            }
            (ExpressionKind::NewArray { element, .. }, OPERANDS_DONE) => {
                let length = self.operand_value(s, 0).as_i64().max(0) as usize;
                let ty = ObjectType::array_of(element.clone(), length);
                self.begin_new(id, s, ty, Initializer::Default);
                return;
            }
            (ExpressionKind::Delete { .. }, OPERANDS_DONE) => {
                self.begin_delete(id, s);
                return;
            }
            _ => {}
        }
        let result = self.evaluate(id, s);
        s.result = Some(result);
        self.start_cleanup(id);
    }

    fn evaluate(&mut self, id: InstanceId, s: &mut ExpressionState) -> EvalResult {
        let model = s.model.clone();
        match &model.kind {
            ExpressionKind::Literal(lit) => EvalResult::Value(match lit {
                Literal::Bool(b) => Value::boolean(*b),
                Literal::Char(c) => Value::character(*c),
                Literal::Int(n) => Value::from_i64(model.ty.clone().unwrap_or(ObjectType::Int), *n),
                Literal::Double(d) => Value::double(*d),
            }),
            ExpressionKind::StringLiteral(text) => {
                let object = self
                    .memory
                    .string_literal(text)
                    .unwrap_or_else(|| panic!("string literal {:?} was never allocated", text));
                EvalResult::Object(object)
            }
            ExpressionKind::NullPointer => EvalResult::Value(Value::null(pointee_of(&model))),
            ExpressionKind::Identifier(entity) => EvalResult::Object(self.lookup_entity(id, entity)),
            ExpressionKind::This => {
                let function = self
                    .rt(id)
                    .containing_function
                    .unwrap_or_else(|| panic!("this outside of a member function"));
                let receiver = self
                    .function_state(function)
                    .receiver
                    .unwrap_or_else(|| panic!("this in a function without a receiver"));
                let address = self.memory.object(receiver).address;
                EvalResult::Value(Value::pointer(
                    pointee_of(&model),
                    address,
                    Some(Provenance::Object(receiver)),
                ))
            }
            ExpressionKind::Conversion { kind, .. } => self.convert(s, *kind, &model),
            ExpressionKind::Unary { op, .. } => {
                let v = self.operand_value(s, 0);
                let result = match op {
                    UnaryOp::Plus => v.clone(),
                    UnaryOp::Neg => match v.ty {
                        ObjectType::Double => Value::double(-v.as_f64()),
                        _ => Value::from_i64(v.ty.clone(), v.as_i64().wrapping_neg()),
                    },
                    UnaryOp::Not => Value::boolean(!v.as_bool()),
                };
                EvalResult::Value(result.with_validity(v.valid))
            }
            ExpressionKind::Binary { op, .. } => {
                let (a, b) = (self.operand_value(s, 0), self.operand_value(s, 1));
                EvalResult::Value(self.binary(*op, &a, &b))
            }
            ExpressionKind::PointerOffset { subtract, .. } => {
                let ptr = self.operand_value(s, 0);
                let offset = self.operand_value(s, 1).as_i64();
                let delta = if *subtract { -offset } else { offset };
                EvalResult::Value(self.offset_pointer(&ptr, delta))
            }
            ExpressionKind::PointerDifference { .. } => {
                let (a, b) = (self.operand_value(s, 0), self.operand_value(s, 1));
                let size = a.ty.pointee().map_or(1, |p| p.size().max(1)) as i64;
                let diff = (a.address() as i64 - b.address() as i64) / size;
                EvalResult::Value(Value::int(diff).with_validity(a.valid && b.valid))
            }
            ExpressionKind::Logical { .. } => {
                let result = if s.short_circuited {
                    self.operand_value(s, 0)
                } else {
                    self.stage_result(s).value().clone()
                };
                EvalResult::Value(Value::boolean(result.as_bool()).with_validity(result.valid))
            }
            ExpressionKind::Comma { .. } | ExpressionKind::Conditional { .. } => self.stage_result(s),
            ExpressionKind::Assignment { .. } => {
                let target = self.operand_object(s, 0);
                self.check_writable(target);
                match self.operand(s, 1) {
                    EvalResult::Object(source) => self.memory.copy_object(source, target),
                    EvalResult::Value(v) => self.memory.write_value(target, &v),
                    EvalResult::Void => panic!("assignment from a void expression"),
                }
                EvalResult::Object(target)
            }
            ExpressionKind::CompoundAssignment { op, .. } => {
                let target = self.operand_object(s, 0);
                let current = self.read_checked(target);
                let rhs = self.operand_value(s, 1);
                let updated = if current.ty.is_pointer() {
                    let delta = match op {
                        BinaryOp::Sub => -rhs.as_i64(),
                        _ => rhs.as_i64(),
                    };
                    self.offset_pointer(&current, delta)
                } else {
                    let ty = current.ty.clone();
                    convert_arithmetic(&self.binary(*op, &current, &rhs), &ty)
                };
                self.check_writable(target);
                self.memory.write_value(target, &updated);
                EvalResult::Object(target)
            }
            ExpressionKind::Increment { op, .. } => {
                let target = self.operand_object(s, 0);
                let old = self.read_checked(target);
                let delta = match op {
                    IncrementOp::PreInc | IncrementOp::PostInc => 1,
                    IncrementOp::PreDec | IncrementOp::PostDec => -1,
                };
                let updated = match &old.ty {
                    ObjectType::Pointer(_) => self.offset_pointer(&old, delta),
                    ObjectType::Double => Value::double(old.as_f64() + delta as f64).with_validity(old.valid),
                    ty => Value::from_i64(ty.clone(), old.as_i64().wrapping_add(delta)).with_validity(old.valid),
                };
                self.check_writable(target);
                self.memory.write_value(target, &updated);
                match op {
                    IncrementOp::PreInc | IncrementOp::PreDec => EvalResult::Object(target),
                    IncrementOp::PostInc | IncrementOp::PostDec => EvalResult::Value(old),
                }
            }
            ExpressionKind::Dereference(_) => {
                let ptr = self.operand_value(s, 0);
                EvalResult::Object(self.dereference_checked(&ptr))
            }
            ExpressionKind::AddressOf(_) => {
                let object = self.operand_object(s, 0);
                EvalResult::Value(self.address_of(object))
            }
            ExpressionKind::Subscript { .. } => {
                let ptr = self.operand_value(s, 0);
                let index = self.operand_value(s, 1).as_i64();
                let element = self.offset_pointer(&ptr, index);
                EvalResult::Object(self.dereference_checked(&element))
            }
            ExpressionKind::Dot { member, .. } => {
                let object = self.operand_object(s, 0);
                EvalResult::Object(self.member_of(object, member))
            }
            ExpressionKind::Arrow { member, .. } => {
                let ptr = self.operand_value(s, 0);
                let object = self.dereference_checked(&ptr);
                EvalResult::Object(self.member_of(object, member))
            }
            ExpressionKind::Call { .. } => {
                let call = s.stage.unwrap_or_else(|| panic!("call expression finished without a call"));
                self.call_result(call)
            }
            ExpressionKind::New { .. } | ExpressionKind::NewArray { .. } => {
                let object = s
                    .allocated
                    .take()
                    .unwrap_or_else(|| panic!("new expression finished without an allocation"));
                let obj = self.memory.object(object);
                let value = match obj.ty.array_element() {
                    Some((elem, _)) => Value::pointer(elem.clone(), obj.address, Some(Provenance::Array(object))),
                    None => Value::pointer(obj.ty.clone(), obj.address, Some(Provenance::Object(object))),
                };
                EvalResult::Value(value)
            }
            ExpressionKind::Delete { .. } => EvalResult::Void,
            ExpressionKind::Output { stream, item } => {
                let text = match item {
                    OutputItem::Endl => "\n".to_string(),
                    OutputItem::Value(_) => {
                        let value = self.operand_value(s, stream.iter().count());
                        self.output_text(&value)
                    }
                };
                self.console.write(&text);
                self.memory.events.emit(Event::Output { text });
                EvalResult::Void
            }
            ExpressionKind::Input { stream, .. } => {
                let target = self.operand_object(s, stream.iter().count());
                self.extract_into(target);
                EvalResult::Void
            }
            ExpressionKind::Rand => EvalResult::Value(Value::int(self.rng.next_rand())),
        }
    }

    fn stage_result(&self, s: &ExpressionState) -> EvalResult {
        let stage = s.stage.unwrap_or_else(|| panic!("expression has no second stage"));
        self.expression_result(stage).clone()
    }

    pub(crate) fn lookup_entity(&self, id: InstanceId, entity: &EntityRef) -> ObjectId {
        match entity {
            EntityRef::Local(local) => {
                let frame = self.memory.frame(self.frame_of(id));
                let found = if local.is_reference {
                    frame.local_reference(local.id)
                } else {
                    frame.local_object(local.id)
                };
                found.unwrap_or_else(|| panic!("{} is not bound in the current frame", local.name))
            }
            EntityRef::Global(global) => self
                .memory
                .static_object(global.id)
                .unwrap_or_else(|| panic!("global {} was never allocated", global.name)),
        }
    }

    fn convert(&mut self, s: &ExpressionState, kind: ConversionKind, model: &Expression) -> EvalResult {
        let target_ty = model.ty.clone().unwrap_or(ObjectType::Int);
        let value = match kind {
            ConversionKind::LvalueToRvalue => {
                let object = self.operand_object(s, 0);
                self.read_checked(object)
            }
            ConversionKind::ArrayToPointer => {
                let array = self.operand_object(s, 0);
                let obj = self.memory.object(array);
                let elem = obj
                    .ty
                    .array_element()
                    .map(|(e, _)| e.clone())
                    .unwrap_or_else(|| pointee_of(model));
                Value::pointer(elem, obj.address, Some(Provenance::Array(array)))
            }
            ConversionKind::Integral => {
                let v = self.operand_value(s, 0);
                Value::from_i64(target_ty, v.as_i64()).with_validity(v.valid)
            }
            ConversionKind::IntegralToFloating => {
                let v = self.operand_value(s, 0);
                Value::double(v.as_i64() as f64).with_validity(v.valid)
            }
            ConversionKind::FloatingToIntegral => {
                let v = self.operand_value(s, 0);
                Value::from_i64(target_ty, v.as_f64().trunc() as i64).with_validity(v.valid)
            }
            ConversionKind::ToBool => {
                let v = self.operand_value(s, 0);
                Value::boolean(v.as_bool()).with_validity(v.valid)
            }
            ConversionKind::NullPointer => Value::null(pointee_of(model)),
        };
        EvalResult::Value(value)
    }

    fn binary(&mut self, op: BinaryOp, a: &Value, b: &Value) -> Value {
        let valid = a.valid && b.valid;
        if op.is_comparison() {
            let ordering = if matches!(a.ty, ObjectType::Double) || matches!(b.ty, ObjectType::Double) {
                a.as_f64().partial_cmp(&b.as_f64())
            } else if a.ty.is_pointer() {
                Some(a.address().cmp(&b.address()))
            } else {
                Some(a.as_i64().cmp(&b.as_i64()))
            };
            let holds = match ordering {
                None => op == BinaryOp::Ne,
                Some(o) => match op {
                    BinaryOp::Eq => o.is_eq(),
                    BinaryOp::Ne => o.is_ne(),
                    BinaryOp::Lt => o.is_lt(),
                    BinaryOp::Le => o.is_le(),
                    BinaryOp::Gt => o.is_gt(),
                    _ => o.is_ge(),
                },
            };
            return Value::boolean(holds).with_validity(valid);
        }
        if matches!(a.ty, ObjectType::Double) || matches!(b.ty, ObjectType::Double) {
            let (x, y) = (a.as_f64(), b.as_f64());
            let r = match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                BinaryOp::Mul => x * y,
                BinaryOp::Div => x / y,
                _ => x % y,
            };
            return Value::double(r).with_validity(valid);
        }
        let (x, y) = (a.as_i64(), b.as_i64());
        if matches!(op, BinaryOp::Div | BinaryOp::Mod) && y == 0 {
            self.report_ub(
                UndefinedBehavior::DivisionByZero,
                None,
                format!("integer {} by zero", if op == BinaryOp::Div { "division" } else { "remainder" }),
            );
            return Value::int(0).with_validity(false);
        }
        let r = match op {
            BinaryOp::Add => x.wrapping_add(y),
            BinaryOp::Sub => x.wrapping_sub(y),
            BinaryOp::Mul => x.wrapping_mul(y),
            BinaryOp::Div => x.wrapping_div(y),
            _ => x.wrapping_rem(y),
        };
        Value::from_i64(ObjectType::Int, r).with_validity(valid)
    }

    /// `ptr + delta` elements. Leaving the array the pointer came from is flagged.
    fn offset_pointer(&mut self, ptr: &Value, delta: i64) -> Value {
        let pointee = ptr.ty.pointee().cloned().unwrap_or(ObjectType::Char);
        let size = pointee.size().max(1) as i64;
        let address = (ptr.address() as i64).wrapping_add(delta.wrapping_mul(size)) as Address;
        if let Some(Provenance::Array(array)) = ptr.provenance {
            let obj = self.memory.object(array);
            if address < obj.address || address > obj.end_address() {
                let label = obj.describe();
                self.report_ub(
                    UndefinedBehavior::OutOfBounds,
                    Some(array),
                    format!("pointer arithmetic leaves the bounds of {}", label),
                );
            }
        }
        Value::pointer(pointee, address, ptr.provenance).with_validity(ptr.valid)
    }

    /// Dereference, flagging null, dangling and out-of-range pointers
    pub(crate) fn dereference_checked(&mut self, ptr: &Value) -> ObjectId {
        if ptr.is_null_pointer() {
            let pointee = ptr.ty.pointee().cloned().unwrap_or(ObjectType::Int);
            self.report_ub(UndefinedBehavior::NullDereference, None, "dereference of a null pointer".into());
            return self.memory.invalid_object(pointee, 0);
        }
        let object = self.memory.dereference(ptr);
        if self.memory.object(object).is_invalid_object() {
            let kind = match ptr.provenance {
                Some(Provenance::Array(_)) => UndefinedBehavior::OutOfBounds,
                _ => UndefinedBehavior::InvalidDereference,
            };
            let message = format!("no live {} at 0x{:x}", self.memory.object(object).ty, ptr.address());
            self.report_ub(kind, Some(object), message);
        }
        object
    }

    pub(crate) fn address_of(&self, object: ObjectId) -> Value {
        let obj = self.memory.object(object);
        let provenance = match obj.kind {
            ObjectKind::ArrayElement { array, .. } => Provenance::Array(array),
            _ => Provenance::Object(object),
        };
        Value::pointer(obj.ty.clone(), obj.address, Some(provenance))
    }

    fn member_of(&self, object: ObjectId, member: &str) -> ObjectId {
        self.memory
            .member(object, member)
            .unwrap_or_else(|| panic!("{} has no member {}", self.memory.object(object).ty, member))
    }

    fn output_text(&self, value: &Value) -> String {
        match value.ty.pointee() {
            Some(ObjectType::Char) => self.read_c_string(value.address()),
            _ => value.output_text(),
        }
    }

    fn read_c_string(&self, address: Address) -> String {
        let mut bytes = Vec::new();
        for offset in 0..MAX_C_STRING as Address {
            let byte = self.memory.read_bytes(address + offset, 1)[0];
            if byte == 0 {
                break;
            }
            bytes.push(byte);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn extract_into(&mut self, target: ObjectId) {
        self.check_writable(target);
        let ty = self.memory.object(target).ty.clone();
        match &ty {
            ObjectType::Array { elem, len } if **elem == ObjectType::Char => {
                if let Some(word) = self.cin.extract_word() {
                    let mut word = word;
                    word.truncate(len.saturating_sub(1));
                    self.memory.write_string(target, &word);
                }
            }
            _ if ty.is_atomic() => {
                if let Some(value) = self.cin.extract(&ty) {
                    self.memory.write_value(target, &value);
                }
            }
            _ => panic!("cannot read a value of type {} from cin", ty),
        }
    }

    fn begin_new(&mut self, id: InstanceId, s: &mut ExpressionState, ty: ObjectType, initializer: Initializer) {
        let Some(object) = self.memory.allocate_heap_object(&ty) else {
            self.report_ub(
                UndefinedBehavior::HeapExhausted,
                None,
                format!("no room on the heap for {}", ty),
            );
            s.result = Some(EvalResult::Value(Value::null(pointee_of(&s.model))));
            self.start_cleanup(id);
            return;
        };
        debug!(object = object.0, %ty, "heap allocation");
        s.allocated = Some(object);
        let init = self.create_initializer(InitTarget::Object(object), initializer, format!("new {}", ty), id);
        s.stage = Some(init);
        s.phase = SECOND_STAGE;
    }

    fn begin_delete(&mut self, id: InstanceId, s: &mut ExpressionState) {
        let ExpressionKind::Delete { array, .. } = &s.model.kind else {
            unreachable!()
        };
        let array = *array;
        let ptr = self.operand_value(s, 0);
        s.result = Some(EvalResult::Void);
        if ptr.is_null_pointer() {
            self.start_cleanup(id);
            return;
        }
        let target = self.memory.heap().object_at(ptr.address()).filter(|obj| {
            let o = self.memory.object(*obj);
            o.is_alive() && o.ty.array_element().is_some() == array
        });
        let Some(target) = target else {
            self.report_ub(
                UndefinedBehavior::InvalidDelete,
                None,
                format!("delete{} of 0x{:x}, which is not a live object from new{}",
                    if array { "[]" } else { "" },
                    ptr.address(),
                    if array { "[]" } else { "" }),
            );
            self.start_cleanup(id);
            return;
        };
        if self.memory.object(target).ty.needs_destruction() {
            let dealloc = self.create_deallocator(id, vec![target], Vec::new(), None, "delete".into());
            s.stage = Some(dealloc);
            s.allocated = Some(target);
            s.phase = FINISH;
            self.push(dealloc);
        } else {
            self.memory.delete_heap_object(target, Some(id));
            self.start_cleanup(id);
        }
    }

    fn finish_delete(&mut self, id: InstanceId, s: &mut ExpressionState) {
        if let Some(target) = s.allocated.take() {
            self.memory.delete_heap_object(target, Some(id));
        }
        self.start_cleanup(id);
    }
}

fn pointee_of(model: &Expression) -> ObjectType {
    model
        .ty
        .as_ref()
        .and_then(|t| t.pointee())
        .cloned()
        .unwrap_or(ObjectType::Int)
}

fn convert_arithmetic(value: &Value, ty: &ObjectType) -> Value {
    let converted = match ty {
        ObjectType::Double => Value::double(value.as_f64()),
        _ if matches!(value.ty, ObjectType::Double) => Value::from_i64(ty.clone(), value.as_f64().trunc() as i64),
        _ => Value::from_i64(ty.clone(), value.as_i64()),
    };
    converted.with_validity(value.valid)
}
