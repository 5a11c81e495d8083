//! Progress feedback for CLI commands
//!
//! All progress output is suppressed when --quiet flag is set.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

fn styled(template: &str, fallback: ProgressStyle) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or(fallback)
}

/// Create a spinner with a message
pub fn spinner(message: &str, quiet: bool) -> Option<ProgressBar> {
    if quiet {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        styled("{spinner:.cyan} {msg}", ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

/// Create a progress bar over extension phases.
///
/// The total is unknown until the first progress callback arrives.
pub fn phase_bar(message: &str, quiet: bool) -> Option<ProgressBar> {
    if quiet {
        return None;
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        styled(
            "{msg} [{bar:40.cyan/blue}] {pos}/{len} phases",
            ProgressStyle::default_bar(),
        )
        .progress_chars("█▓░"),
    );
    pb.set_message(message.to_string());
    Some(pb)
}

/// Report `(current, total)` on a phase bar
pub fn update(pb: &Option<ProgressBar>, current: usize, total: usize) {
    if let Some(pb) = pb {
        pb.set_length(total as u64);
        pb.set_position(current as u64);
    }
}

/// Finish a spinner or bar with a success message
pub fn finish_spinner(pb: Option<ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.set_style(styled("{prefix:.green} {msg}", ProgressStyle::default_spinner()));
        pb.set_prefix("✓");
        pb.finish_with_message(message.to_string());
    }
}

/// Finish a spinner or bar with a warning message
pub fn finish_spinner_warn(pb: Option<ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.set_style(styled("{prefix:.yellow} {msg}", ProgressStyle::default_spinner()));
        pb.set_prefix("!");
        pb.finish_with_message(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_returns_none() {
        assert!(spinner("test", true).is_none());
        assert!(phase_bar("test", true).is_none());
    }

    #[test]
    fn test_phase_bar_tracks_callback() {
        let pb = phase_bar("test", false);
        update(&pb, 3, 4);
        let bar = pb.as_ref().unwrap();
        assert_eq!(bar.length(), Some(4));
        assert_eq!(bar.position(), 3);
        finish_spinner(pb, "done");
    }

    #[test]
    fn test_finish_handles_none() {
        // Should not panic
        finish_spinner(None, "done");
        finish_spinner_warn(None, "warning");
        update(&None, 1, 2);
    }
}
