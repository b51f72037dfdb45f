//! Rendering primitives for CLI output.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::{ASCII_MARKDOWN, UTF8_FULL};
use comfy_table::{ContentArrangement, Table as ComfyTable};

use super::context::UiContext;
use super::theme::{styled, styles, Badge};

/// Render a badge with optional message.
pub fn badge(ctx: &UiContext, kind: Badge, message: &str) -> String {
    let badge_text = styled(kind.display(ctx.unicode), kind.style(), ctx.color);
    if message.is_empty() {
        badge_text
    } else {
        format!("{} {}", badge_text, message)
    }
}

/// Render a key-value pair.
///
/// Pretty mode: "Key: value" with dim key
/// Plain mode: "key=value"
pub fn kv(ctx: &UiContext, key: &str, value: &str) -> String {
    if ctx.mode.is_pretty() {
        let styled_key = styled(&format!("{}:", key), styles::dim(), ctx.color);
        format!("{} {}", styled_key, value)
    } else {
        format!("{}={}", key.to_lowercase().replace(' ', "_"), value)
    }
}

/// Render a hint line.
pub fn hint(ctx: &UiContext, text: &str) -> String {
    let text = text.trim_start_matches("Hint: ");
    if ctx.mode.is_pretty() {
        format!("{} {}", styled("Hint:", styles::dim(), ctx.color), text)
    } else {
        format!("hint={}", text)
    }
}

/// Render a receipt (summary block after an action).
///
/// Pretty mode: badge + indented key-value pairs
/// Plain mode: status=ok + key=value lines
pub fn receipt(ctx: &UiContext, title: &str, items: &[(&str, &str)]) -> String {
    let mut lines = Vec::new();
    if ctx.mode.is_pretty() {
        lines.push(badge(ctx, Badge::Ok, title));
        for (key, value) in items {
            lines.push(format!("  {}", kv(ctx, key, value)));
        }
    } else {
        lines.push("status=ok".to_string());
        for (key, value) in items {
            lines.push(kv(ctx, key, value));
        }
    }
    lines.join("\n")
}

/// Column definition for table rendering.
#[derive(Debug, Clone)]
pub struct Column {
    pub header: &'static str,
}

impl Column {
    pub const fn new(header: &'static str) -> Self {
        Self { header }
    }
}

/// Render a table.
///
/// Pretty mode: bordered table
/// Plain mode: space-separated values, no header
pub fn table(ctx: &UiContext, columns: &[Column], rows: &[Vec<String>]) -> String {
    if !ctx.mode.is_pretty() {
        return rows
            .iter()
            .map(|row| row.join(" "))
            .collect::<Vec<_>>()
            .join("\n");
    }

    let mut table = ComfyTable::new();
    if ctx.unicode {
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS);
    } else {
        table.load_preset(ASCII_MARKDOWN);
    }
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_width(ctx.width.min(u16::MAX as usize) as u16);
    table.set_header(columns.iter().map(|c| c.header).collect::<Vec<_>>());
    for row in rows {
        table.add_row(row);
    }
    table.to_string()
}

/// Print a message to stdout unless in JSON mode.
pub fn print(ctx: &UiContext, message: &str) {
    if !ctx.mode.is_json() {
        println!("{}", message);
    }
}

/// Format an error message with optional hint.
pub fn error_message(ctx: &UiContext, message: &str, error_hint: Option<&str>) -> String {
    let mut lines = Vec::new();
    if ctx.mode.is_pretty() {
        lines.push(badge(ctx, Badge::Err, message));
        if let Some(h) = error_hint {
            lines.push(hint(ctx, h));
        }
    } else {
        lines.push(format!("error={}", message));
        if let Some(h) = error_hint {
            lines.push(hint(ctx, h));
        }
    }
    lines.join("\n")
}

/// Print an error message to stderr with optional hint.
pub fn print_error(ctx: &UiContext, message: &str, error_hint: Option<&str>) {
    eprintln!("{}", error_message(ctx, message, error_hint));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::OutputMode;

    fn ctx(mode: OutputMode) -> UiContext {
        UiContext {
            is_tty: mode == OutputMode::Pretty,
            color: false,
            unicode: false,
            width: 80,
            mode,
        }
    }

    #[test]
    fn test_kv_modes() {
        assert_eq!(kv(&ctx(OutputMode::Plain), "Locked At", "x"), "locked_at=x");
        assert_eq!(kv(&ctx(OutputMode::Pretty), "Path", "a.md"), "Path: a.md");
    }

    #[test]
    fn test_receipt_plain() {
        let out = receipt(&ctx(OutputMode::Plain), "Locked", &[("Document", "a.md")]);
        assert_eq!(out, "status=ok\ndocument=a.md");
    }

    #[test]
    fn test_receipt_pretty() {
        let out = receipt(&ctx(OutputMode::Pretty), "Locked", &[("Document", "a.md")]);
        assert!(out.starts_with("[OK] Locked"));
        assert!(out.contains("  Document: a.md"));
    }

    #[test]
    fn test_table_plain_has_no_header() {
        let rows = vec![vec!["a.md".to_string(), "encrypted".to_string()]];
        let out = table(&ctx(OutputMode::Plain), &[Column::new("PATH"), Column::new("STATE")], &rows);
        assert_eq!(out, "a.md encrypted");
    }

    #[test]
    fn test_table_pretty_has_header() {
        let rows = vec![vec!["a.md".to_string()]];
        let out = table(&ctx(OutputMode::Pretty), &[Column::new("PATH")], &rows);
        assert!(out.contains("PATH"));
        assert!(out.contains("a.md"));
    }

    #[test]
    fn test_error_message_plain() {
        let out = error_message(&ctx(OutputMode::Plain), "Incorrect password", Some("Hint: retry"));
        assert_eq!(out, "error=Incorrect password\nhint=retry");
    }
}
