//! Memory pane rendering: globals, heap and temporaries
//!
//! Deleted heap objects disappear from the list; leaked ones stay and are
//! flagged.

use super::utils::{pane_block, placeholder, render_object, section_header, visible_window};
use crate::simulation::Simulation;
use ratatui::{
    Frame,
    layout::Rect,
    widgets::{List, ListItem},
};

/// Render the memory pane
pub fn render_memory_pane(frame: &mut Frame, area: Rect, sim: &Simulation, is_focused: bool, scroll_offset: &mut usize) {
    let memory = sim.memory();
    let mut all_items: Vec<ListItem<'static>> = Vec::new();

    let sections = [
        ("Static", memory.static_objects().to_vec(), "(no globals)"),
        ("Heap", memory.heap_objects(), "(no allocations)"),
        ("Temporaries", memory.temporary_objects().to_vec(), "(none)"),
    ];
    for (i, (title, objects, empty)) in sections.into_iter().enumerate() {
        if i > 0 {
            all_items.push(ListItem::new(""));
        }
        let title = match title {
            "Heap" if !objects.is_empty() => format!(
                "Heap ({} bytes free)",
                memory.heap().bottom() - memory.heap().start()
            ),
            _ => title.to_string(),
        };
        all_items.push(section_header(&title));
        if objects.is_empty() {
            all_items.push(placeholder(empty));
        }
        for object in objects {
            render_object(&mut all_items, memory, object, 1);
        }
    }

    let visible_items = visible_window(all_items, area, scroll_offset);
    frame.render_widget(List::new(visible_items).block(pane_block("Memory", is_focused)), area);
}
