//! Minimal markdown rendering for chat text.
//!
//! Handles the subset agents actually produce: `**bold**`, `` `code` ``,
//! `#` headings, bullet and numbered lists, and fenced code blocks. Output is
//! pre-wrapped to the target width so the message list knows exact heights.

use ratatui::{
    style::{Modifier, Style},
    text::{Line, Span},
};

use crate::theme::Palette;

/// Parse **bold** and `code` spans of a single line
fn parse_inline(text: &str, base: Style, palette: &Palette) -> Vec<Span<'static>> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut bold_text = String::new();
                let mut found_close = false;
                while let Some(c) = chars.next() {
                    if c == '*' && chars.peek() == Some(&'*') {
                        chars.next();
                        found_close = true;
                        break;
                    }
                    bold_text.push(c);
                }

                if found_close && !bold_text.is_empty() {
                    if !current_text.is_empty() {
                        spans.push(Span::styled(std::mem::take(&mut current_text), base));
                    }
                    spans.push(Span::styled(bold_text, base.add_modifier(Modifier::BOLD)));
                } else {
                    // No closing **, treat as literal
                    current_text.push_str("**");
                    current_text.push_str(&bold_text);
                }
            }
            '`' => {
                let mut code_text = String::new();
                let mut found_close = false;
                for c in chars.by_ref() {
                    if c == '`' {
                        found_close = true;
                        break;
                    }
                    code_text.push(c);
                }

                if found_close && !code_text.is_empty() {
                    if !current_text.is_empty() {
                        spans.push(Span::styled(std::mem::take(&mut current_text), base));
                    }
                    spans.push(Span::styled(code_text, palette.code()));
                } else {
                    current_text.push('`');
                    current_text.push_str(&code_text);
                    if found_close {
                        current_text.push('`');
                    }
                }
            }
            _ => current_text.push(c),
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::styled(current_text, base));
    }
    spans
}

struct Word {
    text: String,
    style: Style,
    /// Continues the previous word without a space (e.g. `**bold**,`).
    glued: bool,
}

fn split_words(spans: &[Span<'static>]) -> Vec<Word> {
    fn push(words: &mut Vec<Word>, text: String, style: Style, pending_space: &mut bool) {
        let glued = !*pending_space && !words.is_empty();
        words.push(Word { text, style, glued });
        *pending_space = false;
    }

    let mut words: Vec<Word> = Vec::new();
    let mut pending_space = false;

    for span in spans {
        let mut current = String::new();
        for c in span.content.chars() {
            if c.is_whitespace() {
                if !current.is_empty() {
                    push(&mut words, std::mem::take(&mut current), span.style, &mut pending_space);
                }
                pending_space = true;
            } else {
                current.push(c);
            }
        }
        if !current.is_empty() {
            push(&mut words, current, span.style, &mut pending_space);
        }
    }
    words
}

/// Greedy word wrap of styled spans. The first line starts with `prefix`;
/// continuation lines are indented by `hang` columns.
pub fn wrap_spans(
    spans: &[Span<'static>],
    width: usize,
    prefix: Vec<Span<'static>>,
    hang: usize,
) -> Vec<Line<'static>> {
    let width = width.max(hang + 1);
    let prefix_len: usize = prefix.iter().map(|s| s.content.chars().count()).sum();

    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current: Vec<Span<'static>> = prefix;
    let mut current_len = prefix_len;
    let mut line_start = prefix_len;

    for word in split_words(spans) {
        let word_len = word.text.chars().count();
        let at_start = current_len == line_start;
        let sep = if word.glued || at_start { 0 } else { 1 };

        if !at_start && current_len + sep + word_len > width {
            lines.push(Line::from(std::mem::take(&mut current)));
            current.push(Span::raw(" ".repeat(hang)));
            current_len = hang;
            line_start = hang;
        } else if sep == 1 {
            current.push(Span::styled(" ", word.style));
            current_len += 1;
        }

        // Hard split words that cannot fit on any line
        let mut rest: Vec<char> = word.text.chars().collect();
        while current_len + rest.len() > width {
            let room = width - current_len;
            if room == 0 {
                lines.push(Line::from(std::mem::take(&mut current)));
                current.push(Span::raw(" ".repeat(hang)));
                current_len = hang;
                line_start = hang;
                continue;
            }
            let head: String = rest.drain(..room).collect();
            current.push(Span::styled(head, word.style));
            lines.push(Line::from(std::mem::take(&mut current)));
            current.push(Span::raw(" ".repeat(hang)));
            current_len = hang;
            line_start = hang;
        }
        if !rest.is_empty() {
            current_len += rest.len();
            current.push(Span::styled(rest.into_iter().collect::<String>(), word.style));
        }
    }

    if current_len > line_start || lines.is_empty() {
        lines.push(Line::from(current));
    }
    lines
}

fn bullet_item(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    ["- ", "* ", "+ "]
        .iter()
        .find_map(|marker| trimmed.strip_prefix(marker))
}

fn numbered_item(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = trimmed[digits..].strip_prefix(". ")?;
    Some((&trimmed[..digits], rest))
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if (1..=6).contains(&level) {
        line[level..].strip_prefix(' ').map(|rest| (level, rest))
    } else {
        None
    }
}

/// Renders `text` into lines no wider than `width` columns.
pub fn render_markdown(text: &str, width: usize, base: Style, palette: &Palette) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut in_code = false;

    for raw in text.lines() {
        if raw.trim_start().starts_with("```") {
            in_code = !in_code;
            continue;
        }

        if in_code {
            let chars: Vec<char> = raw.chars().collect();
            if chars.is_empty() {
                lines.push(Line::from(Span::styled(" ", palette.code())));
            }
            for chunk in chars.chunks(width.max(1)) {
                lines.push(Line::from(Span::styled(
                    chunk.iter().collect::<String>(),
                    palette.code(),
                )));
            }
            continue;
        }

        if raw.trim().is_empty() {
            lines.push(Line::default());
        } else if let Some((level, title)) = heading(raw) {
            let style = if level == 1 {
                base.fg(palette.accent).add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
            } else {
                base.fg(palette.accent).add_modifier(Modifier::BOLD)
            };
            lines.extend(wrap_spans(&parse_inline(title, style, palette), width, Vec::new(), 0));
        } else if let Some(item) = bullet_item(raw) {
            let bullet = vec![Span::styled("• ", base.fg(palette.accent))];
            lines.extend(wrap_spans(&parse_inline(item, base, palette), width, bullet, 2));
        } else if let Some((number, item)) = numbered_item(raw) {
            let marker = format!("{}. ", number);
            let hang = marker.chars().count();
            let prefix = vec![Span::styled(marker, base.fg(palette.accent))];
            lines.extend(wrap_spans(&parse_inline(item, base, palette), width, prefix, hang));
        } else {
            lines.extend(wrap_spans(&parse_inline(raw, base, palette), width, Vec::new(), 0));
        }
    }

    if lines.is_empty() {
        lines.push(Line::default());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use insight_core::Theme;

    fn palette() -> Palette {
        Palette::for_theme(Theme::Dark)
    }

    fn line_text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn parses_bold_and_code() {
        let p = palette();
        let spans = parse_inline("a **b** `c`", Style::default(), &p);
        let texts: Vec<&str> = spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(texts, vec!["a ", "b", " ", "c"]);
        assert!(spans[1].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(spans[3].style, p.code());
    }

    #[test]
    fn unclosed_bold_is_literal() {
        let spans = parse_inline("**oops", Style::default(), &palette());
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].content, "**oops");
    }

    #[test]
    fn wrapped_lines_fit_width() {
        let text = "The quick brown fox jumps over the lazy dog and keeps running far away";
        let lines = render_markdown(text, 20, Style::default(), &palette());
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(line_text(line).chars().count() <= 20, "{:?}", line_text(line));
        }
    }

    #[test]
    fn long_words_are_split() {
        let lines = render_markdown(&"x".repeat(25), 10, Style::default(), &palette());
        let texts: Vec<String> = lines.iter().map(line_text).collect();
        assert_eq!(texts, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn punctuation_stays_attached_to_bold() {
        let lines = render_markdown("see **this**, ok", 40, Style::default(), &palette());
        assert_eq!(line_text(&lines[0]), "see this, ok");
    }

    #[test]
    fn bullets_hang_indent() {
        let lines = render_markdown("- alpha beta gamma delta", 12, Style::default(), &palette());
        assert_eq!(line_text(&lines[0]), "• alpha beta");
        assert!(line_text(&lines[1]).starts_with("  "));
    }

    #[test]
    fn code_fence_lines_are_styled_verbatim() {
        let p = palette();
        let lines = render_markdown("```sql\nSELECT *  FROM t\n```\nafter", 40, Style::default(), &p);
        assert_eq!(line_text(&lines[0]), "SELECT *  FROM t");
        assert_eq!(lines[0].spans[0].style, p.code());
        assert_eq!(line_text(&lines[1]), "after");
    }

    #[test]
    fn headings_drop_hashes() {
        let lines = render_markdown("## Summary", 40, Style::default(), &palette());
        assert_eq!(line_text(&lines[0]), "Summary");
    }
}
