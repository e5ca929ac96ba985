//! Shared utility functions for pane rendering
//!
//! - **Borders**: focused and unfocused pane blocks
//! - **Objects**: one line per object with address, name, type, value and
//!   flags, recursing into array elements and members
//! - **Scrolling**: clamp an offset and cut the visible window

use crate::memory::Memory;
use crate::memory::object::ObjectId;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, ListItem},
};

/// Bordered block for a pane, highlighted when focused
pub(super) fn pane_block(title: &str, is_focused: bool) -> Block<'static> {
    let border_style = if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    };
    Block::default()
        .title(format!(" {} ", title))
        .borders(Borders::ALL)
        .border_style(border_style)
}

pub(super) fn section_header(title: &str) -> ListItem<'static> {
    ListItem::new(Line::from(vec![
        Span::styled("▸ ", Style::default().fg(DEFAULT_THEME.secondary)),
        Span::styled(
            title.to_string(),
            Style::default()
                .fg(DEFAULT_THEME.primary)
                .add_modifier(Modifier::BOLD),
        ),
    ]))
}

pub(super) fn placeholder(text: &str) -> ListItem<'static> {
    ListItem::new(format!("  {}", text)).style(Style::default().fg(DEFAULT_THEME.comment))
}

/// Render an object and its subobjects, one line each
pub(super) fn render_object(items: &mut Vec<ListItem<'static>>, memory: &Memory, id: ObjectId, indent_level: usize) {
    let obj = memory.object(id);
    let alive = obj.is_alive();
    let name_style = if alive {
        Style::default().fg(DEFAULT_THEME.fg)
    } else {
        Style::default()
            .fg(DEFAULT_THEME.dead)
            .add_modifier(Modifier::CROSSED_OUT)
    };

    let mut spans = vec![
        Span::styled(
            format!("0x{:04x} ", obj.address),
            Style::default().fg(DEFAULT_THEME.comment),
        ),
        Span::raw("  ".repeat(indent_level)),
        Span::styled(obj.describe(), name_style),
        Span::styled(": ", Style::default().fg(DEFAULT_THEME.comment)),
        Span::styled(obj.ty.to_string(), Style::default().fg(DEFAULT_THEME.type_name)),
    ];

    if obj.ty.is_atomic() {
        let (text, style) = if alive && memory.is_valid(id) {
            (memory.peek_value(id).to_string(), Style::default().fg(DEFAULT_THEME.value))
        } else {
            ("??".to_string(), Style::default().fg(DEFAULT_THEME.indeterminate))
        };
        spans.push(Span::styled(" = ", Style::default().fg(DEFAULT_THEME.comment)));
        spans.push(Span::styled(text, style));
    }
    if !obj.referenced_by.is_empty() {
        spans.push(Span::styled(
            format!(" (&{})", obj.referenced_by.join(", &")),
            Style::default().fg(DEFAULT_THEME.reference),
        ));
    }
    if obj.is_leaked() {
        spans.push(Span::styled(
            " LEAKED",
            Style::default()
                .fg(DEFAULT_THEME.leaked)
                .add_modifier(Modifier::BOLD),
        ));
    }
    items.push(ListItem::new(Line::from(spans)));

    for sub in &obj.subobjects {
        render_object(items, memory, *sub, indent_level + 1);
    }
}

/// Clamp `offset` to the content and return the visible window
pub(super) fn visible_window(items: Vec<ListItem<'static>>, area: Rect, offset: &mut usize) -> Vec<ListItem<'static>> {
    let total_items = items.len();
    let visible_height = area.height.saturating_sub(2).max(1) as usize;
    if total_items > visible_height {
        *offset = (*offset).min(total_items - visible_height);
    } else {
        *offset = 0;
    }
    items.into_iter().skip(*offset).take(visible_height).collect()
}
