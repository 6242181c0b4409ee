use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

const TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>4}/{len:4} {msg}";

/// Terminal progress bar fed by the converter's per-chapter callback.
///
/// The bar only appears once the first chapter finishes, so nothing is drawn
/// when a run fails during parsing or preflight.
#[derive(Default)]
pub struct ProgressReporter {
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, current: usize, total: usize, title: &str) {
        let bar = self.bar.get_or_insert_with(|| new_bar(total as u64));
        bar.set_length(total as u64);
        bar.set_position(current as u64);
        bar.set_message(title.to_string());
    }

    #[cfg(test)]
    pub fn position(&self) -> Option<u64> {
        self.bar.as_ref().map(ProgressBar::position)
    }

    pub fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_with_message("done");
        }
    }

    /// Stop drawing and leave the bar where it was.
    pub fn abandon(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.abandon();
        }
    }
}

fn new_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    match ProgressStyle::default_bar().template(TEMPLATE) {
        Ok(style) => bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏  ")),
        Err(err) => warn!("Invalid progress template: {err}"),
    }
    bar
}
