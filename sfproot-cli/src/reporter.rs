//! Terminal rendering of sequence progress.

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use sfproot::Reporter;

/// Prints sequence messages to stderr and draws the transfer bar.
pub(crate) struct ConsoleReporter {
    quiet: bool,
    fancy: bool,
    bar: Option<ProgressBar>,
}

impl ConsoleReporter {
    pub(crate) fn new(quiet: bool, fancy: bool) -> Self {
        Self {
            quiet,
            fancy,
            bar: None,
        }
    }

    fn new_bar(&self) -> ProgressBar {
        if self.quiet || !self.fancy {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(100);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(ProgressDrawTarget::stderr());
        pb.set_message("Sending image");
        pb
    }

    fn finish_bar(&mut self) {
        if let Some(pb) = self
            .bar
            .take()
        {
            pb.finish_and_clear();
        }
    }
}

/// Percentage of `total` done, 100 for an empty transfer.
fn percent(done: usize, total: usize) -> u64 {
    if total == 0 {
        return 100;
    }
    (done.min(total) as u64 * 100) / total as u64
}

impl Reporter for ConsoleReporter {
    fn message(&mut self, text: &str) {
        self.finish_bar();
        if !self.quiet {
            eprintln!("{} {text}", style("•").cyan());
        }
    }

    fn error(&mut self, text: &str) {
        self.finish_bar();
        eprintln!("{}", style(text).red().bold());
    }

    fn progress(&mut self, sent: usize, total: usize) {
        if self
            .bar
            .is_none()
        {
            self.bar = Some(self.new_bar());
        }
        if let Some(pb) = &self.bar {
            pb.set_position(percent(sent, total));
        }
    }
}

impl Drop for ConsoleReporter {
    fn drop(&mut self) {
        self.finish_bar();
    }
}
