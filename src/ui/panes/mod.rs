//! TUI pane rendering modules
//!
//! # Pane Modules
//!
//! - [`stack`]: runtime constructs mid-evaluation and the stack frames with their locals
//! - [`heap`]: globals, heap objects and temporaries with validity, lifetime and leak flags
//! - [`terminal`]: everything written to `cout`, plus pending `cin` input
//! - [`status`]: status bar with keybindings and execution state
//! - `utils`: object rendering and scrolling shared by the panes
//!
//! Each pane module exports a `render_*` function taking the simulation it draws.

mod utils;

pub mod heap;
pub mod stack;
pub mod status;
pub mod terminal;

pub use heap::render_memory_pane;
pub use stack::render_stack_pane;
pub use status::{StatusRenderData, render_status_bar};
pub use terminal::render_terminal_pane;
