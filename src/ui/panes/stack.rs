//! Stack pane rendering with runtime constructs and call frames
//!
//! The upper part lists the execution stack, innermost construct first: the
//! construct about to step is highlighted, the ones waiting on it are muted.
//! Below it every memory frame is shown with its locals and the references
//! bound in it.

use super::utils::{pane_block, placeholder, render_object, section_header, visible_window};
use crate::runtime::{StackType, Status};
use crate::simulation::Simulation;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    Frame,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem},
};

/// Render the stack pane
pub fn render_stack_pane(frame: &mut Frame, area: Rect, sim: &Simulation, is_focused: bool, scroll_offset: &mut usize) {
    let mut all_items: Vec<ListItem<'static>> = Vec::new();

    all_items.push(section_header("Execution stack"));
    let constructs = sim.execution_stack();
    if constructs.is_empty() {
        let text = if sim.at_end() { "(finished)" } else { "(empty)" };
        all_items.push(placeholder(text));
    }
    for (depth, rt) in constructs.iter().enumerate().rev() {
        let is_top = depth + 1 == constructs.len();
        let label_style = match (is_top, rt.status) {
            (true, _) => Style::default()
                .fg(DEFAULT_THEME.active)
                .add_modifier(Modifier::BOLD),
            (false, Status::Waiting) => Style::default().fg(DEFAULT_THEME.waiting),
            _ => Style::default().fg(DEFAULT_THEME.fg),
        };
        let marker = if is_top { "→ " } else { "  " };
        let mut spans = vec![
            Span::styled(marker, Style::default().fg(DEFAULT_THEME.secondary)),
            Span::styled(format!("{:<11}", kind_label(rt.stack_type)), Style::default().fg(DEFAULT_THEME.comment)),
            Span::styled(rt.label.clone(), label_style),
        ];
        if rt.cleanup_started {
            spans.push(Span::styled(" (cleanup)", Style::default().fg(DEFAULT_THEME.comment)));
        }
        all_items.push(ListItem::new(Line::from(spans)));
    }

    let memory = sim.memory();
    let frames = memory.stack().frames();
    all_items.push(ListItem::new(""));
    all_items.push(section_header("Frames"));
    if frames.is_empty() {
        all_items.push(placeholder("(no frames)"));
    }
    for (depth, stack_frame) in frames.iter().enumerate().rev() {
        let frame_header = Line::from(vec![
            Span::styled(format!("Frame {} ", depth), Style::default().fg(DEFAULT_THEME.comment)),
            Span::styled("│ ", Style::default().fg(DEFAULT_THEME.comment)),
            Span::styled(
                format!("{}()", stack_frame.function_name),
                Style::default()
                    .fg(DEFAULT_THEME.active)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("  0x{:04x}..0x{:04x}", stack_frame.start, stack_frame.end()),
                Style::default().fg(DEFAULT_THEME.comment),
            ),
        ]);
        all_items.push(ListItem::new(frame_header));
        for object in stack_frame.objects() {
            render_object(&mut all_items, memory, *object, 1);
        }
        for (name, object) in stack_frame.references() {
            let target = memory.object(object);
            all_items.push(ListItem::new(Line::from(vec![
                Span::raw("        "),
                Span::styled(format!("{}&", name), Style::default().fg(DEFAULT_THEME.fg)),
                Span::styled(" → ", Style::default().fg(DEFAULT_THEME.comment)),
                Span::styled(
                    format!("{} @0x{:04x}", target.describe(), target.address),
                    Style::default().fg(DEFAULT_THEME.reference),
                ),
            ])));
        }
    }

    let visible_items = visible_window(all_items, area, scroll_offset);
    frame.render_widget(List::new(visible_items).block(pane_block("Stack", is_focused)), area);
}

fn kind_label(kind: StackType) -> &'static str {
    match kind {
        StackType::Statement => "statement",
        StackType::Expression => "expression",
        StackType::Initializer => "initialize",
        StackType::Call => "call",
        StackType::Function => "function",
        StackType::Cleanup => "cleanup",
        StackType::Startup => "startup",
    }
}
