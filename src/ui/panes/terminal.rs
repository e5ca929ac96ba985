//! Console pane rendering: `cout` output and `cin` input

use super::utils::{pane_block, visible_window};
use crate::simulation::Simulation;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    Frame,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem, Padding, Paragraph},
};

/// Render the console pane. `input` is the line being typed, if in input mode.
pub fn render_terminal_pane(
    frame: &mut Frame,
    area: Rect,
    sim: &Simulation,
    input: Option<&str>,
    is_focused: bool,
    scroll_offset: &mut usize,
) {
    let block = pane_block("Console", is_focused);
    let mut lines = sim.console().lines();
    let waiting = sim.is_blocking_until_cin();

    if lines.is_empty() && input.is_none() && !waiting {
        let paragraph = Paragraph::new("(no output)")
            .block(block)
            .style(Style::default().fg(DEFAULT_THEME.comment));
        frame.render_widget(paragraph, area);
        return;
    }

    let block = block.padding(Padding::new(1, 0, 0, 0));
    // A prompt without a newline shares its line with the input
    let unfinished = if sim.console().output().ends_with('\n') {
        String::new()
    } else {
        lines.pop().unwrap_or_default()
    };

    let mut all_items: Vec<ListItem<'static>> = lines
        .into_iter()
        .map(|line| ListItem::new(line).style(Style::default().fg(DEFAULT_THEME.fg)))
        .collect();

    let mut last = vec![Span::styled(unfinished, Style::default().fg(DEFAULT_THEME.fg))];
    match input {
        Some(text) => {
            last.push(Span::styled(
                text.to_string(),
                Style::default()
                    .fg(DEFAULT_THEME.secondary)
                    .add_modifier(Modifier::BOLD),
            ));
            last.push(Span::styled("▏", Style::default().fg(DEFAULT_THEME.secondary)));
        }
        None if waiting => last.push(Span::styled(
            "(waiting for cin, press i)",
            Style::default().fg(DEFAULT_THEME.comment),
        )),
        None => {}
    }
    all_items.push(ListItem::new(Line::from(last)));

    let visible_items = visible_window(all_items, area, scroll_offset);
    frame.render_widget(List::new(visible_items).block(block), area);
}
