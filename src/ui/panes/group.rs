//! Scene group pane rendering
//!
//! Variables, call stack and heap all render the same way: one row per
//! [`SceneEntry`], label and value side by side, styled by group.

use crate::scene::{GroupKind, SceneEntry};
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

/// Scroll state for a group pane
#[derive(Debug, Default)]
pub struct GroupScrollState {
    pub offset: usize,
    pub prev_item_count: usize,
}

fn label_style(kind: GroupKind) -> Style {
    match kind {
        GroupKind::Stack => Style::default().fg(DEFAULT_THEME.function),
        GroupKind::Heap => Style::default().fg(DEFAULT_THEME.heap_id),
        GroupKind::Errors => Style::default().fg(DEFAULT_THEME.error),
        _ => Style::default().fg(DEFAULT_THEME.type_name),
    }
}

fn separator(kind: GroupKind) -> &'static str {
    match kind {
        GroupKind::Stack => "  ",
        GroupKind::Heap => ": ",
        _ => " = ",
    }
}

fn entry_line(kind: GroupKind, entry: &SceneEntry, is_active: bool) -> Line<'_> {
    let mut label = label_style(kind);
    if is_active {
        label = label.add_modifier(Modifier::BOLD);
    }
    let marker = if is_active { "▶ " } else { "  " };
    Line::from(vec![
        Span::styled(marker, Style::default().fg(DEFAULT_THEME.secondary)),
        Span::styled(entry.label.as_str(), label),
        Span::styled(separator(kind), Style::default().fg(DEFAULT_THEME.comment)),
        Span::styled(entry.value.as_str(), Style::default().fg(DEFAULT_THEME.fg)),
    ])
}

/// Render one scene group.
///
/// The stack marks its last entry, the executing frame.
pub fn render_group_pane(
    frame: &mut Frame,
    area: Rect,
    kind: GroupKind,
    entries: &[SceneEntry],
    is_focused: bool,
    scroll_state: &mut GroupScrollState,
) {
    let border_style = if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    };

    let block = Block::default()
        .title(format!(" {} ", kind.title()))
        .borders(Borders::ALL)
        .border_style(border_style);

    if entries.is_empty() {
        let placeholder = match kind {
            GroupKind::Stack => "(no frames)",
            GroupKind::Heap => "(no heap objects)",
            _ => "(none)",
        };
        let paragraph = Paragraph::new(placeholder)
            .block(block)
            .style(Style::default().fg(DEFAULT_THEME.comment));
        frame.render_widget(paragraph, area);
        scroll_state.offset = 0;
        scroll_state.prev_item_count = 0;
        return;
    }

    let total_items = entries.len();
    let visible_height = area.height.saturating_sub(2).max(1) as usize; // borders

    // Follow new entries, otherwise keep the user's position
    if total_items > scroll_state.prev_item_count && total_items > visible_height {
        scroll_state.offset = total_items - visible_height;
    } else if total_items > visible_height {
        scroll_state.offset = scroll_state.offset.min(total_items - visible_height);
    } else {
        scroll_state.offset = 0;
    }
    scroll_state.prev_item_count = total_items;

    let items: Vec<ListItem> = entries
        .iter()
        .enumerate()
        .skip(scroll_state.offset)
        .take(visible_height)
        .map(|(idx, entry)| {
            let is_active = kind == GroupKind::Stack && idx + 1 == total_items;
            ListItem::new(entry_line(kind, entry, is_active))
        })
        .collect();

    frame.render_widget(List::new(items).block(block), area);
}
