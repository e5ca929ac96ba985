//! Colors for the step viewer
//!
//! Object lines are colored by state: a live valid value, an indeterminate
//! value, a dead object or a leaked heap object.

use ratatui::style::Color;

pub struct Theme {
    pub fg: Color,
    pub primary: Color,
    pub secondary: Color,
    pub comment: Color,
    pub success: Color,
    pub error: Color,
    pub border_focused: Color,
    pub border_normal: Color,
    pub status_bg: Color,
    /// Construct about to step, and function names
    pub active: Color,
    /// Constructs paused under a child
    pub waiting: Color,
    pub type_name: Color,
    pub value: Color,
    /// Values whose validity flag is unset
    pub indeterminate: Color,
    pub reference: Color,
    pub dead: Color,
    pub leaked: Color,
}

pub const DEFAULT_THEME: Theme = Theme {
    fg: Color::Rgb(205, 214, 244),
    primary: Color::Rgb(137, 180, 250),
    secondary: Color::Rgb(250, 179, 135),
    comment: Color::Rgb(108, 112, 134),
    success: Color::Rgb(166, 227, 161),
    error: Color::Rgb(243, 139, 168),
    border_focused: Color::Rgb(249, 226, 175),
    border_normal: Color::Rgb(108, 112, 134),
    status_bg: Color::Rgb(50, 50, 70),
    active: Color::Rgb(249, 226, 175),
    waiting: Color::Rgb(180, 165, 120),
    type_name: Color::Rgb(148, 226, 213),
    value: Color::Rgb(250, 179, 135),
    indeterminate: Color::Rgb(235, 160, 172),
    reference: Color::Rgb(203, 166, 247),
    dead: Color::Rgb(88, 91, 112),
    leaked: Color::Rgb(243, 139, 168),
};
