//! Terminal output pane rendering

use crate::scene::SceneEntry;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    widgets::{Block, Borders, List, ListItem, Padding, Paragraph},
    Frame,
};

/// Render the terminal output pane: stdout lines, then errors
pub fn render_terminal_pane(
    frame: &mut Frame,
    area: Rect,
    stdout: &[SceneEntry],
    errors: &[SceneEntry],
    is_focused: bool,
    scroll_offset: &mut usize,
) {
    let border_style = if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    };

    let title = if errors.is_empty() {
        " Terminal Output ".to_string()
    } else {
        format!(" Terminal Output ({} errors) ", errors.len())
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border_style);

    if stdout.is_empty() && errors.is_empty() {
        let paragraph = Paragraph::new("(no output)")
            .block(block)
            .style(Style::default().fg(DEFAULT_THEME.comment));
        frame.render_widget(paragraph, area);
        return;
    }

    let block = block.padding(Padding::new(1, 0, 0, 0));
    let all_items: Vec<ListItem> = stdout
        .iter()
        .map(|entry| ListItem::new(entry.value.as_str()).style(Style::default().fg(DEFAULT_THEME.fg)))
        .chain(errors.iter().map(|entry| {
            ListItem::new(format!("error: {}", entry.value))
                .style(Style::default().fg(DEFAULT_THEME.error))
        }))
        .collect();

    let total_items = all_items.len();
    let visible_height = area.height.saturating_sub(2).max(1) as usize; // borders

    if total_items > visible_height {
        let max_scroll = total_items - visible_height;
        *scroll_offset = (*scroll_offset).min(max_scroll);
    } else {
        *scroll_offset = 0;
    }

    let visible_items: Vec<ListItem> = all_items
        .into_iter()
        .skip(*scroll_offset)
        .take(visible_height)
        .collect();

    frame.render_widget(List::new(visible_items).block(block), area);
}
