//! Colored output helpers for CLI
//!
//! Provides consistent, colored terminal output for the ares-research CLI.
//! Everything here prints to stderr except the report itself, so a report
//! piped from stdout stays clean.

use crate::progress::{ProgressEvent, ProgressKind, TaskCounts};
use owo_colors::OwoColorize;

/// Output style configuration
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    /// Create a new output helper with colors enabled
    pub fn new() -> Self {
        Self { colored: true }
    }

    /// Create a new output helper with colors disabled
    pub fn no_color() -> Self {
        Self { colored: false }
    }

    /// Print the banner
    pub fn banner(&self) {
        if self.colored {
            eprintln!(
                "\n   {} {}\n   {}\n",
                "A.R.E.S Research".bright_cyan().bold(),
                format!("v{}", env!("CARGO_PKG_VERSION")).dimmed(),
                "recursive and multi-agent research orchestration".bright_white()
            );
        } else {
            eprintln!(
                "\n   A.R.E.S Research v{}\n   recursive and multi-agent research orchestration\n",
                env!("CARGO_PKG_VERSION")
            );
        }
    }

    /// Print a success message with a checkmark
    pub fn success(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✓".green().bold(), message.green());
        } else {
            eprintln!("  [OK] {}", message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "•".blue(), message);
        } else {
            eprintln!("  [INFO] {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "⚠".yellow().bold(), message.yellow());
        } else {
            eprintln!("  [WARN] {}", message);
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✗".red().bold(), message.red());
        } else {
            eprintln!("  [ERROR] {}", message);
        }
    }

    /// Print a file creation message
    pub fn created(&self, file_type: &str, path: &str) {
        if self.colored {
            eprintln!(
                "  {} {} {}",
                "✓".green().bold(),
                file_type.dimmed(),
                path.bright_white()
            );
        } else {
            eprintln!("  [CREATED] {} {}", file_type, path);
        }
    }

    /// Print a file skipped message
    pub fn skipped(&self, path: &str, reason: &str) {
        if self.colored {
            eprintln!(
                "  {} {} {}",
                "○".yellow(),
                path.dimmed(),
                format!("({})", reason).yellow()
            );
        } else {
            eprintln!("  [SKIPPED] {} ({})", path, reason);
        }
    }

    /// Print a directory creation message
    pub fn created_dir(&self, path: &str) {
        self.created("directory", path);
    }

    /// Print a header for a section
    pub fn header(&self, title: &str) {
        if self.colored {
            eprintln!("\n  {}", title.bright_white().bold().underline());
        } else {
            eprintln!("\n  === {} ===", title);
        }
    }

    /// Print a key-value pair
    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            eprintln!("    {}: {}", key.dimmed(), value.bright_white());
        } else {
            eprintln!("    {}: {}", key, value);
        }
    }

    /// Print a list item
    pub fn list_item(&self, item: &str) {
        if self.colored {
            eprintln!("    {} {}", "•".blue(), item);
        } else {
            eprintln!("    - {}", item);
        }
    }

    /// Print a hint/tip message
    pub fn hint(&self, message: &str) {
        if self.colored {
            eprintln!("\n  {} {}", "💡".dimmed(), message.dimmed().italic());
        } else {
            eprintln!("\n  [TIP] {}", message);
        }
    }

    /// Print a command suggestion
    pub fn command(&self, cmd: &str) {
        if self.colored {
            eprintln!("     {}", format!("$ {}", cmd).bright_cyan());
        } else {
            eprintln!("     $ {}", cmd);
        }
    }

    /// Print completion message with next steps
    pub fn complete(&self, message: &str) {
        if self.colored {
            eprintln!("\n  {} {}", "🚀".green(), message.bright_green().bold());
        } else {
            eprintln!("\n  [DONE] {}", message);
        }
    }

    /// Print one progress event as a status line
    pub fn event(&self, event: &ProgressEvent) {
        let line = event_line(event);
        if !self.colored {
            eprintln!("  {}", line);
            return;
        }
        match &event.kind {
            ProgressKind::TaskStarted { .. } => eprintln!("  {} {}", "→".blue(), line.dimmed()),
            ProgressKind::SectionCompleted {
                low_confidence: true,
                ..
            } => eprintln!("  {} {}", "◐".yellow(), line.yellow()),
            ProgressKind::SectionCompleted { .. } => eprintln!("  {} {}", "✓".green(), line),
            ProgressKind::TaskFailed { .. } => eprintln!("  {} {}", "✗".red(), line.red()),
            ProgressKind::RunCompleted { .. } => {
                eprintln!("  {} {}", "■".bright_white(), line.bold())
            }
        }
    }
}

/// Plain-text status line for a progress event
pub fn event_line(event: &ProgressEvent) -> String {
    match &event.kind {
        ProgressKind::TaskStarted {
            query,
            depth,
            breadth_index,
        } => format!(
            "[{}] researching \"{}\" (depth {}, #{})",
            event.seq, query, depth, breadth_index
        ),
        ProgressKind::SectionCompleted {
            header,
            low_confidence,
            counts,
        } => {
            let suffix = if *low_confidence { " (low confidence)" } else { "" };
            format!(
                "[{}] {} section ready: {}{}",
                event.seq,
                tally(counts),
                header,
                suffix
            )
        }
        ProgressKind::TaskFailed { reason, counts } => match counts {
            Some(counts) => format!("[{}] {} failed: {}", event.seq, tally(counts), reason),
            None => format!("[{}] failed: {}", event.seq, reason),
        },
        ProgressKind::RunCompleted {
            sections,
            failed,
            incomplete,
            usage,
        } => {
            let state = if *incomplete { "incomplete" } else { "complete" };
            let mut line = format!(
                "[{}] run {}: {} section(s), {} unavailable",
                event.seq, state, sections, failed
            );
            if usage.total_tokens > 0 {
                line.push_str(&format!(", {} tokens", usage.total_tokens));
            }
            line
        }
    }
}

fn tally(counts: &TaskCounts) -> String {
    format!("({}/{})", counts.finished, counts.planned)
}
