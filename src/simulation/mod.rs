//! Simulation orchestration
//!
//! This module provides the driver that owns the whole execution state:
//! - [`Simulation`]: the execution stack, memory, streams and action log
//! - [`console`]: `cout` capture and the `cin` buffer
//! - [`leak`]: reachability-based leak detection
//! - [`random`]: the deterministic generator behind `rand()` and garbage bytes
//!
//! # Stepping
//!
//! A step forward asks the top instance to do one unit of work, then lets
//! instances push children or clean up until the top instance stops
//! changing. Stepping backward resets and replays the recorded actions, which
//! is exact because every source of nondeterminism is seeded.

pub mod console;
pub mod leak;
pub mod random;

use crate::config::SimulationConfig;
use crate::error::{Error, Result};
use crate::events::{Event, EventLog, UndefinedBehavior};
use crate::memory::object::ObjectId;
use crate::memory::value::Value;
use crate::memory::Memory;
use crate::program::Program;
use crate::runtime::statements::StaticInitializerState;
use crate::runtime::{ConstructState, InstanceId, RuntimeConstruct, StackType, Status};
use console::{Console, InputStream};
use random::CppRandom;
use std::rc::Rc;
use tracing::{debug, info, trace};

/// Something the user did to the simulation, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    StepForward,
    CinInput(String),
}

/// Which instance `pop_until` stops after
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopQuery {
    Instance(InstanceId),
    Kind(StackType),
}

pub struct Simulation {
    pub(crate) program: Rc<Program>,
    config: SimulationConfig,
    pub(crate) memory: Memory,
    pub(crate) instances: Vec<RuntimeConstruct>,
    pub(crate) stack: Vec<InstanceId>,
    pub(crate) console: Console,
    pub(crate) cin: InputStream,
    pub(crate) rng: CppRandom,
    actions: Vec<Action>,
    steps_taken: usize,
    at_end: bool,
    pub(crate) main_call: Option<InstanceId>,
    pub(crate) main_return: Option<Value>,
    pub(crate) leak_generation: u64,
}

impl Simulation {
    /// Create a simulation and start it: literals and globals are allocated
    /// and global initialization is ready to run
    pub fn new(program: Program, config: SimulationConfig) -> Result<Self> {
        config.memory.validate()?;
        if program.main().is_none() {
            return Err(Error::NoMainFunction);
        }
        let mut sim = Simulation {
            program: Rc::new(program),
            memory: Self::fresh_memory(&config, EventLog::new()),
            console: Console::new(),
            cin: InputStream::new(&config.stdin),
            rng: CppRandom::new(config.random_seed),
            config,
            instances: Vec::new(),
            stack: Vec::new(),
            actions: Vec::new(),
            steps_taken: 0,
            at_end: false,
            main_call: None,
            main_return: None,
            leak_generation: 0,
        };
        sim.check_static_room()?;
        sim.start();
        Ok(sim)
    }

    fn fresh_memory(config: &SimulationConfig, events: EventLog) -> Memory {
        let mut garbage = CppRandom::new(config.random_seed);
        Memory::new(&config.memory, &mut garbage, events)
    }

    fn check_static_room(&self) -> Result<()> {
        let literals: usize = self
            .program
            .string_literals()
            .iter()
            .map(|s| s.len() + 1)
            .sum();
        let globals: usize = self.program.globals.iter().map(|g| g.entity.ty.size()).sum();
        let layout = self.memory.layout();
        let available = (layout.static_end - layout.static_start) as usize;
        let needed = literals + globals + crate::memory::constants::STATIC_RESERVED_BYTES as usize;
        if needed > available {
            return Err(Error::InvalidLayout(format!(
                "static region holds {} bytes but the program needs {}",
                available, needed
            )));
        }
        Ok(())
    }

    fn start(&mut self) {
        let program = self.program.clone();
        for literal in program.string_literals() {
            self.memory
                .allocate_string_literal(&literal)
                .unwrap_or_else(|| panic!("static region overflow after size check"));
        }
        for global in &program.globals {
            self.memory
                .allocate_static(&global.entity)
                .unwrap_or_else(|| panic!("static region overflow after size check"));
        }
        let main = program
            .main()
            .unwrap_or_else(|| panic!("main disappeared after construction"));

        let main_call = self.create_call_instance(main, None, Vec::new(), None);
        self.main_call = Some(main_call);
        if !program.globals.is_empty() {
            let cleanup = self.create_static_deallocator(main_call);
            self.set_cleanup_construct(main_call, cleanup);
        }
        self.push(main_call);
        if !program.globals.is_empty() {
            let init = self.create_instance(
                None,
                StackType::Startup,
                "static initialization".into(),
                ConstructState::StaticInitializer(StaticInitializerState::new(program.globals.clone())),
            );
            self.push(init);
        }
        info!(globals = program.globals.len(), "simulation started");
        self.memory.events.emit(Event::Started);
        self.up_next();
    }

    // ---- execution stack ----

    pub fn push(&mut self, id: InstanceId) {
        if let Some(top) = self.peek() {
            self.rt_mut(top).status = Status::Waiting;
        }
        self.stack.push(id);
        self.rt_mut(id).status = Status::UpNext;
        let label = self.rt(id).label.clone();
        trace!(instance = id.0, %label, "push");
        self.memory.events.emit(Event::Pushed { instance: id, label });
    }

    /// Pop the top instance, ending the temporaries it owns
    pub fn pop(&mut self) -> InstanceId {
        let id = self
            .stack
            .pop()
            .unwrap_or_else(|| panic!("pop on an empty execution stack"));
        self.rt_mut(id).status = Status::Done;
        trace!(instance = id.0, "pop");
        let temporaries = std::mem::take(&mut self.rt_mut(id).temporaries);
        for temporary in temporaries.into_iter().rev() {
            self.memory.deallocate_temporary_object(temporary, Some(id));
        }
        self.memory.events.emit(Event::Popped { instance: id });
        if matches!(self.rt(id).stack_type, StackType::Statement | StackType::Function) {
            self.check_for_leaks();
        }
        id
    }

    /// Pop instances until one matching `query` has been popped
    pub fn pop_until(&mut self, query: PopQuery) -> Option<InstanceId> {
        while !self.stack.is_empty() {
            let popped = self.pop();
            let matched = match query {
                PopQuery::Instance(id) => popped == id,
                PopQuery::Kind(kind) => self.rt(popped).stack_type == kind,
            };
            if matched {
                return Some(popped);
            }
        }
        None
    }

    pub fn peek(&self) -> Option<InstanceId> {
        self.stack.last().copied()
    }

    /// Start cleanup of every instance above `id`, bottom first
    pub fn start_cleanup_until(&mut self, id: InstanceId) {
        let Some(position) = self.stack.iter().position(|i| *i == id) else {
            return;
        };
        let above: Vec<InstanceId> = self.stack[position + 1..].to_vec();
        for instance in above {
            self.start_cleanup(instance);
        }
    }

    /// Let instances push children or finish until the top one settles
    fn up_next(&mut self) {
        loop {
            let Some(top) = self.peek() else {
                if !self.at_end {
                    self.at_end = true;
                    info!(steps = self.steps_taken, "program finished");
                    self.memory.events.emit(Event::Finished);
                }
                return;
            };
            self.instance_up_next(top);
            if self.peek() == Some(top) {
                return;
            }
        }
    }

    /// End the program right away after a fatal condition
    pub(crate) fn abort(&mut self) {
        while let Some(id) = self.stack.pop() {
            self.rt_mut(id).status = Status::Done;
        }
        self.up_next();
    }

    // ---- stepping ----

    fn step_once(&mut self) -> bool {
        if self.at_end || self.is_blocking_until_cin() {
            return false;
        }
        let Some(top) = self.peek() else {
            return false;
        };
        self.steps_taken += 1;
        self.actions.push(Action::StepForward);
        self.instance_step_forward(top);
        self.up_next();
        true
    }

    /// Take up to `n` steps; stops early at the end or when waiting for input
    pub fn step_forward(&mut self, n: usize) {
        let mut taken = 0;
        while taken < n && self.step_once() {
            taken += 1;
        }
        if taken > 0 && !self.at_end {
            self.memory.events.emit(Event::Paused);
        }
    }

    /// Run until the program ends, blocks on input or hits the step limit
    pub fn step_to_end(&mut self) {
        let remaining = self.config.max_steps.saturating_sub(self.steps_taken);
        self.step_forward(remaining);
    }

    /// Undo `n` steps by replaying the action log from a fresh start
    pub fn step_backward(&mut self, n: usize) {
        let target = self.steps_taken.saturating_sub(n);
        let actions = std::mem::take(&mut self.actions);
        debug!(from = self.steps_taken, to = target, "replaying");
        self.memory.events.set_muted(true);
        self.reset();
        for action in actions {
            match action {
                Action::StepForward => {
                    if self.steps_taken == target {
                        break;
                    }
                    self.step_once();
                }
                Action::CinInput(text) => self.cin_input(&text),
            }
        }
        self.memory.events.set_muted(false);
        self.memory.events.emit(Event::Paused);
    }

    /// Return to the state right after construction
    pub fn reset(&mut self) {
        let mut events = std::mem::take(&mut self.memory.events);
        events.clear();
        self.memory = Self::fresh_memory(&self.config, events);
        self.instances.clear();
        self.stack.clear();
        self.console.clear();
        self.cin = InputStream::new(&self.config.stdin);
        self.rng.set_seed(self.config.random_seed);
        self.actions.clear();
        self.steps_taken = 0;
        self.at_end = false;
        self.main_call = None;
        self.main_return = None;
        self.memory.events.emit(Event::Reset);
        self.start();
    }

    /// Queue text for `cin`; recorded so replay sees it at the same point
    pub fn cin_input(&mut self, text: &str) {
        self.cin.add_to_buffer(text);
        self.actions.push(Action::CinInput(text.to_string()));
    }

    /// Whether the next step would extract from an empty `cin`
    pub fn is_blocking_until_cin(&self) -> bool {
        let Some(top) = self.peek() else {
            return false;
        };
        match &self.rt(top).state {
            ConstructState::Expression(s) => {
                matches!(s.model.kind, crate::program::ast::ExpressionKind::Input { .. })
                    && !self.cin.is_failed()
                    && !self.cin.has_token()
            }
            _ => false,
        }
    }

    // ---- accessors ----

    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    pub fn at_end(&self) -> bool {
        self.at_end
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn cin(&self) -> &InputStream {
        &self.cin
    }

    pub fn events(&self) -> &EventLog {
        &self.memory.events
    }

    /// Register an observer for events emitted from now on (not during replay)
    pub fn subscribe(&mut self, observer: impl FnMut(&Event) + 'static) {
        self.memory.events.subscribe(observer);
    }

    /// Instances on the execution stack, bottom first
    pub fn execution_stack(&self) -> Vec<&RuntimeConstruct> {
        self.stack.iter().map(|id| self.rt(*id)).collect()
    }

    pub fn ub_count(&self, kind: UndefinedBehavior) -> usize {
        self.memory.events.ub_count(kind)
    }

    pub fn total_ub(&self) -> usize {
        self.memory.events.total_ub()
    }

    /// Value `main` returned, once it has
    pub fn main_return_value(&self) -> Option<i64> {
        self.main_return.as_ref().map(|v| v.as_i64())
    }

    /// Object named `name` in the innermost frame that has one, else a global
    pub fn find_variable(&self, name: &str) -> Option<ObjectId> {
        let stack = self.memory.stack();
        for frame in stack.frames().iter().rev() {
            if let Some(object) = frame
                .objects()
                .iter()
                .rev()
                .find(|o| self.memory.object(**o).name.as_deref() == Some(name))
            {
                return Some(*object);
            }
        }
        self.memory
            .static_objects()
            .iter()
            .find(|o| self.memory.object(**o).name.as_deref() == Some(name))
            .copied()
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("steps_taken", &self.steps_taken)
            .field("at_end", &self.at_end)
            .field("stack_depth", &self.stack.len())
            .field("instances", &self.instances.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::demos;

    fn sim_inside_main() -> Simulation {
        let mut sim = Simulation::new(demos::countdown(), SimulationConfig::default()).unwrap();
        while !sim.stack.iter().any(|id| sim.rt(*id).stack_type == StackType::Function) {
            sim.step_forward(1);
        }
        sim.step_forward(3);
        sim
    }

    #[test]
    fn test_new_starts_with_main_call() {
        let sim = Simulation::new(demos::countdown(), SimulationConfig::default()).unwrap();
        let bottom = sim.execution_stack()[0];
        assert_eq!(bottom.stack_type, StackType::Call);
        assert_eq!(sim.steps_taken(), 0);
        assert!(!sim.at_end());
    }

    #[test]
    fn test_peek_is_top_of_stack() {
        let sim = sim_inside_main();
        assert_eq!(sim.peek(), sim.stack.last().copied());
        let top = sim.peek().unwrap();
        assert_eq!(sim.rt(top).status, Status::UpNext);
    }

    #[test]
    fn test_pop_until_kind_stops_after_match() {
        let mut sim = sim_inside_main();
        let function = sim
            .stack
            .iter()
            .copied()
            .find(|id| sim.rt(*id).stack_type == StackType::Function)
            .unwrap();
        assert_ne!(sim.peek(), Some(function));

        let popped = sim.pop_until(PopQuery::Kind(StackType::Function));
        assert_eq!(popped, Some(function));
        assert_eq!(sim.rt(function).status, Status::Done);
        let top = sim.peek().unwrap();
        assert_eq!(sim.rt(top).stack_type, StackType::Call);
    }

    #[test]
    fn test_pop_until_missing_instance_empties_stack() {
        let mut sim = sim_inside_main();
        let unknown = InstanceId(usize::MAX);
        assert_eq!(sim.pop_until(PopQuery::Instance(unknown)), None);
        assert!(sim.peek().is_none());
    }

    #[test]
    fn test_program_without_main_is_rejected() {
        let program = crate::program::builder::ProgramBuilder::new().build();
        assert!(matches!(
            Simulation::new(program, SimulationConfig::default()),
            Err(Error::NoMainFunction)
        ));
    }
}
