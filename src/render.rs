//! Terminal rendering for parsed profiles.
//!
//! Non-interactive views over the parser's public surface: a summary
//! header, the ranked hot-list, and a per-entry caller/callee detail
//! block. Color scheme keeps the hot end loud and the metadata muted:
//! - share of the hottest entry: red >= 50%, yellow >= 10%, default below
//! - symbols bright, objects dimmed

use owo_colors::{OwoColorize, Style};

use crate::model::{Entry, Profile, Summary};

/// Apply `style` when color is enabled, pass through otherwise.
fn paint(text: &str, style: Style, use_color: bool) -> String {
    if use_color {
        text.style(style).to_string()
    } else {
        text.to_string()
    }
}

fn share_style(percent: u64) -> Style {
    if percent >= 50 {
        Style::new().bright_red().bold()
    } else if percent >= 10 {
        Style::new().yellow()
    } else {
        Style::new()
    }
}

/// `Entries: N; Unique positions: M; Lines: L`
pub fn render_summary(summary: &Summary, use_color: bool) -> String {
    let label = Style::new().bold();
    format!(
        "{} {}; {} {}; {} {}\n",
        paint("Entries:", label, use_color),
        summary.n_entries,
        paint("Unique positions:", label, use_color),
        summary.n_unique_positions,
        paint("Lines:", label, use_color),
        summary.n_lines,
    )
}

/// The ranked hot-list: share of the hottest entry, first-event total,
/// `object::symbol`. At most `top` rows; `with_calls` adds the
/// caller/callee arrows under each row.
pub fn render_hot_list(profile: &Profile, top: usize, use_color: bool, with_calls: bool) -> String {
    let entries = profile.entries();
    if entries.is_empty() {
        return "No entries parsed.\n".to_string();
    }

    let n_events = profile.events().len();
    let max_cost = entries[0].total_cost(n_events).first().copied().unwrap_or(0);

    let mut out = String::new();
    for entry in entries.iter().take(top) {
        let cost = entry.total_cost(n_events).first().copied().unwrap_or(0);
        let percent = if max_cost > 0 { cost * 100 / max_cost } else { 0 };
        let position = profile.position(entry.position);

        out.push_str(&format!(
            "{:>4} {:>12}  {}{}{}\n",
            paint(&format!("{percent}%"), share_style(percent), use_color),
            cost,
            paint(&position.object, Style::new().dimmed(), use_color),
            paint("::", Style::new().dimmed(), use_color),
            paint(&position.symbol, Style::new().bright_white().bold(), use_color),
        ));
        if with_calls {
            out.push_str(&render_entry_detail(profile, entry, use_color));
        }
    }
    out
}

/// Caller/callee detail for one entry:
///
/// ```text
/// -> calls: callee() x3 (30)
/// <- called by: caller()
/// ```
///
/// Unresolved callees (never observed as top-level entries) are printed
/// from their recorded position and marked external.
pub fn render_entry_detail(profile: &Profile, entry: &Entry, use_color: bool) -> String {
    let n_events = profile.events().len();
    let arrow = Style::new().dimmed();
    let mut out = String::new();

    for call in &entry.calls {
        let target = profile.position(call.target_position);
        let cost = call.total_cost(n_events).first().copied().unwrap_or(0);
        let external = if call.target.is_none() {
            paint(" [external]", Style::new().dimmed(), use_color)
        } else {
            String::new()
        };
        out.push_str(&format!(
            "  {} {}() x{} ({}){}\n",
            paint("-> calls:", arrow, use_color),
            paint(&target.symbol, Style::new().green(), use_color),
            call.ncalls,
            cost,
            external,
        ));
    }

    for caller in &entry.callers {
        let position = profile.position(profile.entry(*caller).position);
        out.push_str(&format!(
            "  {} {}()\n",
            paint("<- called by:", arrow, use_color),
            paint(&position.symbol, Style::new().cyan(), use_color),
        ));
    }

    out
}
