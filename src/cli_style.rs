/*!
 * relayctl CLI Style System
 *
 * Styling helpers shared by the one-shot commands and the console: themed
 * text, status icons, and tables.
 */

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::{style, StyledObject};

use crate::orchestrator::ScheduleReceipt;
use crate::queue::ScheduledJob;
use crate::time;

// ============================================================================
// THEME COLORS
// ============================================================================

/// Brand colors for consistent styling
pub struct Theme;

impl Theme {
    /// Primary accent color (cyan/blue)
    pub fn primary<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).cyan()
    }

    /// Success color (green)
    pub fn success<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).green()
    }

    /// Warning color (yellow)
    pub fn warning<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).yellow()
    }

    /// Error color (red)
    pub fn error<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).red()
    }

    /// Muted/secondary text (dim)
    pub fn muted<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).dim()
    }

    /// Header style (bold cyan)
    pub fn header<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).cyan().bold()
    }

    /// Value highlight (bold white)
    pub fn value<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).white().bold()
    }
}

// ============================================================================
// ICONS
// ============================================================================

/// Unicode icons for visual feedback
pub struct Icons;

impl Icons {
    pub const SUCCESS: &'static str = "✓";
    pub const ERROR: &'static str = "✗";
    pub const WARNING: &'static str = "⚠";
    pub const INFO: &'static str = "ℹ";
    pub const LIVE: &'static str = "●";
    pub const OFFLINE: &'static str = "○";
    pub const FILE: &'static str = "📄";
    pub const ARROW_RIGHT: &'static str = "→";
}

/// Draw a section header with a line
pub fn section_header(title: &str) {
    let line_len = 50 - title.len().min(40);
    println!(
        "\n{} {}",
        Theme::header(title),
        Theme::muted("─".repeat(line_len))
    );
}

// ============================================================================
// TABLES
// ============================================================================

/// Create a styled data table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

/// Pending jobs, operator-local time first
pub fn jobs_table(jobs: &[ScheduledJob]) -> Table {
    let mut table = create_table();
    table.set_header(vec![
        header_cell("Job"),
        header_cell("Scheduled (local)"),
        header_cell("Host time"),
        header_cell("Media"),
    ]);

    for job in jobs {
        let media = match job.media_name {
            Some(ref name) => Cell::new(name),
            None => Cell::new(job.media_display()).fg(Color::DarkGrey),
        };
        table.add_row(vec![
            Cell::new(job.id.as_str())
                .fg(Color::White)
                .add_attribute(Attribute::Bold),
            Cell::new(time::listing_display(&job.local_time)),
            Cell::new(time::host_display(&job.host_time)).fg(Color::DarkGrey),
            media,
        ]);
    }

    table
}

/// Uploaded media file names
pub fn media_table(names: &[String]) -> Table {
    let mut table = create_table();
    table.set_header(vec![header_cell("Uploaded media")]);
    for name in names {
        table.add_row(vec![Cell::new(format!("{} {}", Icons::FILE, name))]);
    }
    table
}

/// One-line summary of a registered job
pub fn receipt_line(receipt: &ScheduleReceipt) -> String {
    format!(
        "Job {} scheduled for {} (host: {} {})",
        receipt.job_id, receipt.local_display, receipt.host_expr, receipt.host_zone
    )
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Format bytes into human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let base = 1024.0_f64;
    let exp = (bytes_f.ln() / base.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);

    let value = bytes_f / base.powi(exp as i32);

    if exp == 0 {
        format!("{} {}", bytes, UNITS[exp])
    } else {
        format!("{:.2} {}", value, UNITS[exp])
    }
}

/// Print a styled error message with optional suggestion
pub fn print_error(message: &str, suggestion: Option<&str>) {
    eprintln!(
        "{} {}",
        Theme::error(format!("{} Error:", Icons::ERROR)),
        message
    );

    if let Some(hint) = suggestion {
        eprintln!(
            "  {} {}",
            Theme::muted(Icons::ARROW_RIGHT),
            Theme::muted(hint)
        );
    }
}

/// Print a styled warning message
pub fn print_warning(message: &str) {
    eprintln!(
        "{} {}",
        Theme::warning(Icons::WARNING.to_string()),
        Theme::warning(message)
    );
}

/// Print a styled success message
pub fn print_success(message: &str) {
    println!(
        "{} {}",
        Theme::success(Icons::SUCCESS.to_string()),
        Theme::success(message)
    );
}

/// Print a styled info message
pub fn print_info(message: &str) {
    println!("{} {}", Theme::primary(Icons::INFO.to_string()), message);
}

/// Print the relay's live state
pub fn print_live_status(live: bool) {
    if live {
        println!(
            "{} {}",
            Theme::success(Icons::LIVE),
            Theme::value("Stream is LIVE")
        );
    } else {
        println!(
            "{} {}",
            Theme::muted(Icons::OFFLINE),
            Theme::muted("Stream is offline")
        );
    }
}

/// Print the relayctl banner
pub fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");

    println!();
    println!(
        "  {} {}",
        Theme::header("relayctl"),
        Theme::muted(format!("v{}", version))
    );
    println!(
        "  {}",
        Theme::muted("Live stream scheduling over SSH")
    );
    println!();
}

// ============================================================================
// TESTS
// ============================================================================
