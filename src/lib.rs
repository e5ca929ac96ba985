//! # Introduction
//!
//! cppstep executes a compiled subset of C++ one small step at a time,
//! exposing the whole state of the abstract machine between steps: every
//! object in static, stack, heap and temporary memory, the stack of runtime
//! constructs that are mid-evaluation, and everything written to `cout`.
//! Stepping backward replays the recorded history from a fresh start.
//!
//! ## Execution pipeline
//!
//! ```text
//! Program (JSON or builder) → Simulation → Runtime constructs → Memory → Events → TUI
//! ```
//!
//! 1. [`program`]: the already type-checked construct tree, plus a builder
//!    and a handful of demo programs.
//! 2. [`simulation`]: owns memory, the execution stack, the console and
//!    `cin`; steps forward, replays backward, detects leaks.
//! 3. [`runtime`]: suspend/resume instances for statements, expressions,
//!    initializers, calls and object cleanup.
//! 4. [`memory`]: byte-addressed memory with an object graph on top; each
//!    object tracks its validity and lifetime.
//! 5. [`events`]: everything observable, including undefined behavior.
//! 6. [`ui`]: ratatui step viewer; not part of the stable library API.
//!
//! ## Supported C++ subset
//!
//! Types: `bool`, `char`, `int`, `double`, pointers, fixed-size arrays,
//! classes with single inheritance, constructors and destructors.
//! Control flow: `if/else`, `while`, `do-while`, `for`, `break`, `continue`,
//! `return`, recursion.
//! Built-ins: `new`, `delete`, `new[]`, `delete[]`, `cout`, `cin`, `rand`.

pub mod config;
pub mod error;
pub mod events;
pub mod memory;
pub mod program;
pub mod runtime;
pub mod simulation;
pub mod ui;

pub use config::SimulationConfig;
pub use error::{Error, Result};
pub use simulation::Simulation;
