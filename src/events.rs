//! Observable events
//!
//! The memory model and the simulation report everything a viewer needs to
//! redraw through [`Event`]s. An [`EventLog`] records them in order and
//! forwards them to any subscribed observers.
//!
//! Undefined behavior in the interpreted program is an event too: execution
//! continues after it, producing whatever garbage the memory holds.

use crate::memory::object::ObjectId;
use crate::memory::value::Address;
use crate::runtime::InstanceId;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::fmt;

/// Kinds of undefined behavior the engine detects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UndefinedBehavior {
    /// Reading an object whose value was never set
    InvalidRead,
    /// Reading or writing an object whose lifetime has ended
    DeadObjectAccess,
    /// Dereferencing a pointer that does not point to a compatible live object
    InvalidDereference,
    NullDereference,
    /// Indexing or pointer arithmetic outside of an array
    OutOfBounds,
    DivisionByZero,
    /// `delete` on something that is not a live heap object from `new`
    InvalidDelete,
    /// Control reached the end of a non-void function
    MissingReturn,
    StackOverflow,
    HeapExhausted,
}

impl fmt::Display for UndefinedBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UndefinedBehavior::InvalidRead => "read of an uninitialized value",
            UndefinedBehavior::DeadObjectAccess => "access to an object whose lifetime has ended",
            UndefinedBehavior::InvalidDereference => "dereference of an invalid pointer",
            UndefinedBehavior::NullDereference => "dereference of a null pointer",
            UndefinedBehavior::OutOfBounds => "array access out of bounds",
            UndefinedBehavior::DivisionByZero => "division by zero",
            UndefinedBehavior::InvalidDelete => "delete of an object not created by new",
            UndefinedBehavior::MissingReturn => "missing return in a non-void function",
            UndefinedBehavior::StackOverflow => "stack overflow",
            UndefinedBehavior::HeapExhausted => "heap exhausted",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Event {
    ObjectAllocated {
        object: ObjectId,
        address: Address,
        name: Option<String>,
        ty: String,
    },
    ObjectKilled {
        object: ObjectId,
        killer: Option<InstanceId>,
    },
    FramePushed {
        function: String,
        start: Address,
        size: usize,
    },
    FramePopped {
        function: String,
    },
    HeapObjectAllocated {
        object: ObjectId,
        address: Address,
    },
    HeapObjectDeleted {
        object: ObjectId,
    },
    TemporaryObjectAllocated {
        object: ObjectId,
        address: Address,
    },
    TemporaryObjectDeallocated {
        object: ObjectId,
    },
    ReferenceBound {
        name: String,
        object: ObjectId,
    },
    ValueRead {
        object: ObjectId,
    },
    ValueWritten {
        object: ObjectId,
        value: String,
    },
    UndefinedBehavior {
        kind: UndefinedBehavior,
        object: Option<ObjectId>,
        message: String,
    },
    MemoryLeaked {
        object: ObjectId,
    },
    Pushed {
        instance: InstanceId,
        label: String,
    },
    Popped {
        instance: InstanceId,
    },
    Output {
        text: String,
    },
    Started,
    Paused,
    Finished,
    Reset,
}

type Observer = Box<dyn FnMut(&Event)>;

/// Ordered record of events with observer fan-out
#[derive(Default)]
pub struct EventLog {
    events: Vec<Event>,
    observers: Vec<Observer>,
    muted: bool,
    ub_counts: FxHashMap<UndefinedBehavior, usize>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: Event) {
        if let Event::UndefinedBehavior { kind, .. } = &event {
            *self.ub_counts.entry(*kind).or_insert(0) += 1;
        }
        if !self.muted {
            for observer in &mut self.observers {
                observer(&event);
            }
        }
        self.events.push(event);
    }

    /// Register an observer that sees every event emitted while unmuted
    pub fn subscribe(&mut self, observer: impl FnMut(&Event) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// While muted, events are still recorded but observers are not notified
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn ub_count(&self, kind: UndefinedBehavior) -> usize {
        self.ub_counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_ub(&self) -> usize {
        self.ub_counts.values().sum()
    }

    /// Forget recorded events, keeping observers
    pub fn clear(&mut self) {
        self.events.clear();
        self.ub_counts.clear();
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("events", &self.events.len())
            .field("observers", &self.observers.len())
            .field("muted", &self.muted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_observers_skip_muted_events() {
        let seen = Rc::new(RefCell::new(0));
        let counter = seen.clone();
        let mut log = EventLog::new();
        log.subscribe(move |_| *counter.borrow_mut() += 1);

        log.emit(Event::Started);
        log.set_muted(true);
        log.emit(Event::Paused);
        log.set_muted(false);
        log.emit(Event::Finished);

        assert_eq!(*seen.borrow(), 2);
        assert_eq!(log.events().len(), 3);
    }

    #[test]
    fn test_ub_counts() {
        let mut log = EventLog::new();
        log.emit(Event::UndefinedBehavior {
            kind: UndefinedBehavior::InvalidRead,
            object: None,
            message: "x".into(),
        });
        assert_eq!(log.ub_count(UndefinedBehavior::InvalidRead), 1);
        assert_eq!(log.ub_count(UndefinedBehavior::OutOfBounds), 0);
        log.clear();
        assert_eq!(log.total_ub(), 0);
    }
}
