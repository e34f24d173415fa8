//! Source code pane rendering with syntax highlighting
//!
//! Displays the analyzed file with line numbers, a keyword highlighter that
//! knows the request languages, and the current step's line highlighted.
//! The step's control-flow marker (branch, loop iteration, calls) is shown in
//! the bottom border.

use crate::analyzer::Language;
use crate::scene::SceneEntry;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

/// Simple syntax highlighting for C-family and Python code
fn highlight_source_code(line: &str, language: Language) -> Line<'_> {
    let mut spans = Vec::new();
    let mut current_word = String::new();

    let chars: Vec<(usize, char)> = line.char_indices().collect();
    let mut i = 0;

    while i < chars.len() {
        let (byte, c) = chars[i];
        let next = chars.get(i + 1).map(|&(_, n)| n);

        let starts_comment = match language {
            Language::Python => c == '#',
            Language::Pseudo => c == '#' || (c == '/' && next == Some('/')),
            _ => c == '/' && next == Some('/'),
        };
        if starts_comment {
            if !current_word.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_word)));
            }
            spans.push(Span::styled(
                line[byte..].to_string(),
                Style::default().fg(DEFAULT_THEME.comment),
            ));
            return Line::from(spans);
        }

        // Strings, either quote style
        if c == '"' || c == '\'' || (c == '`' && language.is_js_family()) {
            if !current_word.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_word)));
            }
            let mut end = i + 1;
            while end < chars.len() && chars[end].1 != c {
                end += if chars[end].1 == '\\' { 2 } else { 1 };
            }
            end = (end + 1).min(chars.len());
            let end_byte = chars.get(end).map_or(line.len(), |&(b, _)| b);
            spans.push(Span::styled(
                line[byte..end_byte].to_string(),
                Style::default().fg(DEFAULT_THEME.string),
            ));
            i = end;
            continue;
        }

        if !c.is_alphanumeric() && c != '_' {
            if !current_word.is_empty() {
                let style = get_keyword_style(&current_word, c == '(', language);
                spans.push(Span::styled(std::mem::take(&mut current_word), style));
            }

            let style = match c {
                '{' | '}' | '(' | ')' | '[' | ']' => Style::default().fg(DEFAULT_THEME.primary),
                _ => Style::default().fg(DEFAULT_THEME.fg),
            };
            spans.push(Span::styled(c.to_string(), style));
            i += 1;
            continue;
        }

        current_word.push(c);
        i += 1;
    }

    if !current_word.is_empty() {
        let style = get_keyword_style(&current_word, false, language);
        spans.push(Span::styled(current_word, style));
    }

    Line::from(spans)
}

fn is_type_name(word: &str, language: Language) -> bool {
    match language {
        Language::C => matches!(
            word,
            "int" | "char" | "void" | "bool" | "float" | "double" | "long" | "short"
                | "unsigned" | "signed" | "struct"
        ),
        Language::Java => matches!(
            word,
            "int" | "char" | "void" | "boolean" | "float" | "double" | "long" | "short"
                | "byte" | "String"
        ),
        Language::TypeScript => {
            matches!(word, "number" | "string" | "boolean" | "void" | "any" | "unknown")
        }
        _ => false,
    }
}

fn is_keyword(word: &str, language: Language) -> bool {
    let shared = matches!(
        word,
        "if" | "else" | "while" | "for" | "return" | "break" | "continue"
    );
    shared
        || match language {
            Language::C => matches!(
                word,
                "do" | "switch" | "case" | "default" | "goto" | "sizeof" | "typedef"
            ),
            Language::Java => matches!(
                word,
                "do" | "switch" | "case" | "default" | "new" | "class" | "public" | "private"
                    | "static" | "final" | "this" | "try" | "catch" | "throw"
            ),
            Language::JavaScript | Language::TypeScript => matches!(
                word,
                "do" | "switch" | "case" | "default" | "new" | "function" | "let" | "const"
                    | "var" | "class" | "of" | "in" | "this" | "try" | "catch" | "throw"
                    | "async" | "await" | "interface" | "type"
            ),
            Language::Python => matches!(
                word,
                "def" | "elif" | "in" | "not" | "and" | "or" | "is" | "lambda" | "class"
                    | "import" | "from" | "pass" | "try" | "except" | "raise" | "with" | "yield"
            ),
            Language::Pseudo => matches!(
                word,
                "then" | "end" | "do" | "function" | "procedure" | "to" | "repeat" | "until"
            ),
        }
}

fn get_keyword_style(word: &str, is_function: bool, language: Language) -> Style {
    if is_type_name(word, language) {
        Style::default().fg(DEFAULT_THEME.type_name)
    } else if is_keyword(word, language) {
        Style::default()
            .fg(DEFAULT_THEME.keyword)
            .add_modifier(Modifier::BOLD)
    } else if matches!(
        word,
        "NULL" | "null" | "undefined" | "None" | "true" | "false" | "True" | "False"
    ) || word.chars().next().is_some_and(|c| c.is_ascii_digit())
    {
        Style::default().fg(DEFAULT_THEME.number)
    } else if is_function {
        Style::default().fg(DEFAULT_THEME.function)
    } else {
        Style::default().fg(DEFAULT_THEME.fg)
    }
}

/// 1-based line to highlight.
///
/// Uses the step's `line` when it is inside the file, otherwise the first line
/// whose text matches the step's `code`.
pub fn resolve_current_line(source: &str, line: Option<u32>, code: Option<&str>) -> Option<usize> {
    let total = source.lines().count();
    if let Some(line) = line.map(|l| l as usize) {
        if line >= 1 && line <= total {
            return Some(line);
        }
    }
    let code = code.map(str::trim).filter(|c| !c.is_empty())?;
    source
        .lines()
        .position(|l| l.trim() == code)
        .map(|idx| idx + 1)
}

/// Scroll state for the source pane
#[derive(Debug, Default)]
pub struct SourceScrollState {
    pub offset: usize,
    /// Visual row the current line is pinned to; `None` until first render
    pub target_line_row: Option<usize>,
}

/// Render the source code pane
#[allow(clippy::too_many_arguments)]
pub fn render_source_pane(
    frame: &mut Frame,
    area: Rect,
    source_code: &str,
    language: Language,
    current_line: Option<usize>,
    marker: &[SceneEntry],
    is_focused: bool,
    scroll_state: &mut SourceScrollState,
) {
    let border_style = if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    };

    let mut block = Block::default()
        .title(format!(" Source Code ({}) ", language))
        .borders(Borders::ALL)
        .border_style(border_style);

    // Line and code are already visible in the pane body
    let flow: Vec<String> = marker
        .iter()
        .filter(|entry| entry.label != "line" && entry.label != "code")
        .map(|entry| format!("{} {}", entry.label, entry.value))
        .collect();
    if !flow.is_empty() {
        block = block.title_bottom(Line::from(Span::styled(
            format!(" {} ", flow.join(" · ")),
            Style::default().fg(DEFAULT_THEME.secondary),
        )));
    }

    let lines: Vec<&str> = source_code.lines().collect();
    let total_lines = lines.len();

    let visible_height = area.height.saturating_sub(2).max(1) as usize; // borders

    let target_row = scroll_state
        .target_line_row
        .unwrap_or(visible_height / 2)
        .min(visible_height.saturating_sub(1));
    scroll_state.target_line_row = Some(target_row);

    // Keep the current line at the target visual row
    if let Some(current) = current_line {
        scroll_state.offset = current.saturating_sub(1).saturating_sub(target_row);
    }
    if total_lines > visible_height {
        scroll_state.offset = scroll_state.offset.min(total_lines - visible_height);
    } else {
        scroll_state.offset = 0;
    }

    let visible_lines: Vec<Line> = lines
        .iter()
        .enumerate()
        .skip(scroll_state.offset)
        .take(visible_height)
        .map(|(idx, line)| {
            let line_num = idx + 1;
            let is_current = current_line == Some(line_num);

            let num_style = if is_current {
                Style::default()
                    .fg(DEFAULT_THEME.secondary)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(DEFAULT_THEME.comment)
            };

            let mut content_line = highlight_source_code(line, language);
            if is_current {
                let current_bg = Style::default().bg(DEFAULT_THEME.current_line_bg);
                for span in &mut content_line.spans {
                    span.style = span.style.patch(current_bg);
                }
            }

            let mut spans = vec![Span::styled(format!("{:4} ", line_num), num_style)];
            spans.extend(content_line.spans);
            Line::from(spans)
        })
        .collect();

    let paragraph = Paragraph::new(visible_lines).block(block);
    frame.render_widget(paragraph, area);
}
