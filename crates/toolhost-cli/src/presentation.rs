//! Formatting helpers for command output.

use chrono::{DateTime, Local, Utc};
use toolhost_core::{ContentBlock, McpServerStatus};

/// Truncate to `max_chars` characters, ending in "..." when shortened.
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Print a horizontal separator line.
pub fn print_separator(width: usize) {
    println!("{}", "-".repeat(width));
}

/// One-line rendering of a content block.
///
/// Images are summarized by MIME type and decoded size.
pub fn describe_block(block: &ContentBlock) -> String {
    match block {
        ContentBlock::Text { text } => text.clone(),
        ContentBlock::Image { mime_type, .. } => match block.image_bytes() {
            Some(Ok(bytes)) => format!("[image {mime_type}, {} bytes]", bytes.len()),
            Some(Err(_)) | None => format!("[image {mime_type}, undecodable data]"),
        },
    }
}

pub fn status_label(status: &McpServerStatus) -> String {
    match status {
        McpServerStatus::Stopped => "stopped".to_string(),
        McpServerStatus::Starting => "starting".to_string(),
        McpServerStatus::Running => "running".to_string(),
        McpServerStatus::Failed(reason) => format!("failed: {reason}"),
    }
}

pub fn format_started_at(started_at: Option<DateTime<Utc>>) -> String {
    started_at.map_or_else(
        || "--".to_string(),
        |at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}
