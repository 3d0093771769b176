//! # Rendering
//!
//! Plain string building with `console` styles. Layout math (widths, truncation,
//! padding) is Unicode-aware via `unicode-width`; `console` drops the escape
//! codes on its own when stdout is not a terminal.
//!
//! A listing line looks like:
//!
//! ```text
//!  01. ● ▒ holiday_photo.jpg                      1.2 MiB    3 minutes ago
//! ```
//!
//! `●` marks a selected file and `▒` a spoiler. Taken files are listed without
//! an index, muted, with the target that holds them.

use chrono::{DateTime, Utc};
use console::Style;
use replystageapp::commands::{CmdMessage, CmdResult, MessageLevel, StagedFile};
use replystageapp::enumerate::{Attachable, AttachmentSnapshot, FileAttachable};
use replystageapp::probe::ExifFinding;
use unicode_width::UnicodeWidthStr;

pub const LINE_WIDTH: usize = 100;
pub const SIZE_WIDTH: usize = 10;
pub const TIME_WIDTH: usize = 16;
pub const SELECTED_MARKER: &str = "●";
pub const SPOILER_MARKER: &str = "▒";

struct Styles {
    index: Style,
    selected: Style,
    spoiler: Style,
    muted: Style,
    time: Style,
    info: Style,
    success: Style,
    warning: Style,
    error: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            index: Style::new().yellow(),
            selected: Style::new().green(),
            spoiler: Style::new().magenta(),
            muted: Style::new().dim(),
            time: Style::new().color256(247).italic(),
            info: Style::new(),
            success: Style::new().green(),
            warning: Style::new().yellow(),
            error: Style::new().red().bold(),
        }
    }
}

/// Renders the listed files and, if present, the snapshot checks.
pub fn render_result(result: &CmdResult) -> String {
    let mut out = render_file_list(&result.listed_files);
    if let Some(snapshot) = &result.snapshot {
        out.push_str(&render_snapshot(snapshot));
    }
    for path in &result.paths {
        out.push_str(&format!("  -> {}\n", path.display()));
    }
    out
}

pub fn render_file_list(files: &[StagedFile]) -> String {
    let styles = Styles::new();
    let mut out = String::new();

    for file in files {
        let idx = match file.index {
            Some(n) => format!("{:02}. ", n),
            None => "--. ".to_string(),
        };
        let selected = if file.selected { SELECTED_MARKER } else { " " };
        let spoiler = if file.spoiler { SPOILER_MARKER } else { " " };
        let holder = file
            .taken_by
            .as_ref()
            .map(|t| format!(" [taken by {}]", t))
            .unwrap_or_default();

        let fixed = 1 + idx.width() + 4 + SIZE_WIDTH + TIME_WIDTH + 2;
        let available = LINE_WIDTH.saturating_sub(fixed);
        let name = truncate_to_width(&format!("{}{}", file.file_name, holder), available);
        let padding = " ".repeat(available.saturating_sub(name.width()));
        let size = format!("{:>width$}", format_size(file.size), width = SIZE_WIDTH);
        let time = format!(
            "{:>width$}",
            format_time_ago(file.added_on),
            width = TIME_WIDTH
        );

        if file.is_taken() {
            let line = format!(" {}    {}{}{}  {}", idx, name, padding, size, time);
            out.push_str(&format!("{}\n", styles.muted.apply_to(line)));
            continue;
        }

        out.push_str(&format!(
            " {}{} {} {}{}{}  {}\n",
            styles.index.apply_to(idx),
            styles.selected.apply_to(selected),
            styles.spoiler.apply_to(spoiler),
            name,
            padding,
            size,
            styles.time.apply_to(time)
        ));
    }

    out
}

pub fn render_snapshot(snapshot: &AttachmentSnapshot) -> String {
    let styles = Styles::new();
    let mut out = String::new();

    let limit = match snapshot.max_allowed_attachables_per_post {
        0 => "unknown".to_string(),
        n => n.to_string(),
    };
    out.push_str(&format!(
        "\n{}\n",
        styles.muted.apply_to(format!("Files per post: {}", limit))
    ));

    for attachable in &snapshot.attachables {
        match attachable {
            Attachable::File(file) => {
                let notes = file_notes(file);
                if notes.is_empty() {
                    continue;
                }
                let style = if file.violations.any() {
                    &styles.warning
                } else {
                    &styles.info
                };
                out.push_str(&format!(
                    "  {}: {}\n",
                    file.file_name,
                    style.apply_to(notes.join(", "))
                ));
            }
            Attachable::Overflow { total } => {
                out.push_str(&format!(
                    "  {}\n",
                    styles
                        .muted
                        .apply_to(format!("... and more ({} files in total)", total))
                ));
            }
        }
    }

    out
}

fn file_notes(file: &FileAttachable) -> Vec<String> {
    let mut notes = Vec::new();
    let v = &file.violations;
    if v.file_max_size_exceeded {
        notes.push("file too large".to_string());
    }
    if v.total_file_size_exceeded {
        notes.push("selection too large".to_string());
    }
    if v.max_attached_files_count_exceeded {
        notes.push("too many files selected".to_string());
    }
    if v.marked_as_spoiler_on_non_spoiler_board {
        notes.push("board has no spoilers".to_string());
    }
    for finding in &file.exif {
        notes.push(match finding {
            ExifFinding::Orientation { label } => format!("exif {}", label),
            ExifFinding::Gps { .. } => "exif gps location".to_string(),
        });
    }
    notes
}

pub fn render_messages(messages: &[CmdMessage]) -> String {
    let styles = Styles::new();
    messages
        .iter()
        .map(|msg| {
            let style = match msg.level {
                MessageLevel::Info => &styles.info,
                MessageLevel::Success => &styles.success,
                MessageLevel::Warning => &styles.warning,
                MessageLevel::Error => &styles.error,
            };
            format!("{}\n", style.apply_to(&msg.content))
        })
        .collect()
}

pub fn print_messages(messages: &[CmdMessage]) {
    let output = render_messages(messages);
    if !output.is_empty() {
        print!("{}", output);
    }
}

fn truncate_to_width(s: &str, max_width: usize) -> String {
    use unicode_width::UnicodeWidthChar;

    if s.width() <= max_width {
        return s.to_string();
    }

    let mut result = String::new();
    let mut current_width = 0;
    let limit = max_width.saturating_sub(1);
    for c in s.chars() {
        let char_width = c.width().unwrap_or(0);
        if current_width + char_width > limit {
            break;
        }
        result.push(c);
        current_width += char_width;
    }
    result.push('…');
    result
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

fn format_time_ago(timestamp: DateTime<Utc>) -> String {
    let duration = Utc::now().signed_duration_since(timestamp);
    timeago::Formatter::new().convert(duration.to_std().unwrap_or_default())
}
