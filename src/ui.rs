use crate::aggregate::CollectReport;
use crate::changeset::{FileDiff, FileError, FileStatus};
use crate::constants::MAX_FILES_TO_SHOW;
use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use num_format::{Locale, ToFormattedString};
use serde::Serialize;
use std::fmt::Display;
use std::io::{self, IsTerminal, Write};
use std::path::Path;
use std::time::Duration;

#[macro_export]
macro_rules! warning {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        $crate::ui::write_stderr(format!($($arg)*).yellow());
    }};
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        $crate::ui::write_stderr(format!($($arg)*).red());
    }};
}

#[macro_export]
macro_rules! status {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        $crate::ui::write_stdout(format!($($arg)*).green());
    }};
}

#[macro_export]
macro_rules! info {
    () => {
        $crate::ui::write_stdout("")
    };
    ($($arg:tt)*) => {
        $crate::ui::write_stdout(format!($($arg)*))
    };
}

pub fn write_stdout(line: impl Display) {
    let _ = writeln!(io::stdout(), "{line}");
}

pub fn write_stderr(line: impl Display) {
    let _ = writeln!(io::stderr(), "{line}");
}

/// disable colour for piped output and machine-readable output
pub fn configure_color(plain: bool) {
    if plain || !io::stdout().is_terminal() {
        colored::control::set_override(false);
    }
}

/// spinner on stderr, only when stderr is a terminal
pub fn spinner(enabled: bool, message: &'static str) -> Option<ProgressBar> {
    if !enabled || !io::stderr().is_terminal() {
        return None;
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    Some(spinner)
}

/// "3 files, 12,345 bytes of diff on main"
pub fn print_summary(report: &CollectReport, branch: Option<&str>) {
    let count = report.changes.len();
    let file_word = if count == 1 { "file" } else { "files" };
    let bytes = report.changes.diff_bytes().to_formatted_string(&Locale::en);
    match branch {
        Some(branch) => status!("{count} staged {file_word}, {bytes} bytes of diff on {branch}"),
        None => status!("{count} staged {file_word}, {bytes} bytes of diff"),
    }
}

/// one-line description of a staged file
pub fn file_line(file: &FileDiff) -> String {
    let mut line = match &file.renamed_from {
        // show renames as "old_path → new_path"
        Some(old_path) => format!("{} {} → {}", file.status.as_char(), old_path, file.path),
        None => format!("{} {}", file.status.as_char(), file.path),
    };
    match file.status {
        FileStatus::Binary => line.push_str(" (binary)"),
        FileStatus::Unreadable => line.push_str(" (unreadable)"),
        _ => {}
    }
    if file.truncated {
        line.push_str(" (truncated)");
    }
    line
}

/// print a file header followed by its diff, optionally cut to `preview` chars
pub fn print_file_diff(file: &FileDiff, preview: Option<usize>) {
    info!();
    status!("{}", file_line(file));

    if file.diff_text.is_empty() {
        return;
    }

    match preview {
        Some(limit) => {
            let cut: String = file.diff_text.chars().take(limit).collect();
            let more = cut.len() < file.diff_text.len();
            for line in cut.lines() {
                print_diff_line(line);
            }
            if more {
                info!("{}", "...".dimmed());
            }
        }
        None => {
            for line in file.diff_text.lines() {
                print_diff_line(line);
            }
        }
    }
}

fn print_diff_line(line: &str) {
    if line.starts_with("+++") || line.starts_with("---") || line.starts_with("diff ") {
        info!("{}", line.bold());
    } else if line.starts_with('+') {
        info!("{}", line.green());
    } else if line.starts_with('-') {
        info!("{}", line.red());
    } else if line.starts_with("@@") {
        info!("{}", line.cyan());
    } else {
        info!("{line}");
    }
}

/// file names only, capped at MAX_FILES_TO_SHOW
pub fn print_file_list(files: &[FileDiff]) {
    for file in files.iter().take(MAX_FILES_TO_SHOW) {
        info!("{}", file_line(file));
    }

    // show count of remaining files if there are more than MAX_FILES_TO_SHOW
    if files.len() > MAX_FILES_TO_SHOW {
        info!("(+{} more)", files.len() - MAX_FILES_TO_SHOW);
    }
}

pub fn print_errors(errors: &[FileError]) {
    for failure in errors {
        warning!("could not read {}: {}", failure.path, failure.reason);
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    repository: &'a Path,
    branch: Option<&'a str>,
    files: &'a [FileDiff],
    errors: &'a [FileError],
}

pub fn print_json(report: &CollectReport, branch: Option<&str>) -> Result<()> {
    let json = serde_json::to_string_pretty(&JsonReport {
        repository: report.changes.repository_path(),
        branch,
        files: report.changes.files(),
        errors: &report.errors,
    })?;
    info!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(status: FileStatus) -> FileDiff {
        FileDiff::new(
            "src/lib.rs".to_string(),
            status,
            String::new(),
            Some("src/old.rs".to_string()),
            None,
        )
    }

    #[test]
    fn test_file_line_for_rename() {
        assert_eq!(file_line(&file(FileStatus::Renamed)), "R src/old.rs → src/lib.rs");
    }

    #[test]
    fn test_file_line_markers() {
        assert_eq!(file_line(&file(FileStatus::Binary)), "B src/lib.rs (binary)");

        let truncated = FileDiff::new(
            "big.txt".to_string(),
            FileStatus::Modified,
            "x".repeat(10),
            None,
            Some(4),
        );
        assert_eq!(file_line(&truncated), "M big.txt (truncated)");
        assert_eq!(
            file_line(&FileDiff::unreadable("gone.txt".to_string())),
            "? gone.txt (unreadable)"
        );
    }
}
