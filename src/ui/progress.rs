use std::time::Instant;

use crate::constants::{
    INFO_PAGES,
    INFO_PAGE_INTERVAL_SECS,
};

use super::Ui;

/// A `(start, end)` sub-range of the global progress bar. Stages hand
/// narrower windows down to their sub-operations, which only ever
/// report local fractions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub start: f64,
    pub end: f64,
}

impl Window {
    pub fn new(start: f64, end: f64) -> Self {
        Window { start, end }
    }

    /// Narrows this window to the `(lo, hi)` slice of itself.
    pub fn sub(&self, lo: f64, hi: f64) -> Window {
        Window {
            start: self.global(lo),
            end: self.global(hi),
        }
    }

    /// Maps a local completion fraction onto the global bar.
    pub fn global(&self, local: f64) -> f64 {
        let local = local.clamp(0.0, 1.0);

        self.start + local * (self.end - self.start)
    }
}

/// Forwards composed progress to the UI and keeps the bar monotonic
/// within a run. Long pauses near the end of a window cycle through
/// the informational pages, at most one every 15 seconds.
pub struct Progress<'a> {
    ui: &'a mut dyn Ui,
    last_global: f64,
    page_index: usize,
    last_page_at: Option<Instant>,
}

impl<'a> Progress<'a> {
    pub fn new(ui: &'a mut dyn Ui) -> Self {
        Progress {
            ui,
            last_global: 0.0,
            page_index: 0,
            last_page_at: None,
        }
    }

    /// Access to the underlying bridge for prompts and messages.
    pub fn ui(&mut self) -> &mut dyn Ui {
        &mut *self.ui
    }

    pub fn update(&mut self, window: &Window, local: f64, text: &str) {
        let global = window.global(local).max(self.last_global);
        self.last_global = global;

        self.ui.progress(global, text);

        if local > 0.9 {
            self.maybe_show_info_page();
        }
    }

    /// Resets the bar, e.g. before teardown reporting.
    pub fn reset(&mut self) {
        self.last_global = 0.0;
        self.ui.progress(0.0, "");
    }

    fn maybe_show_info_page(&mut self) {
        let due = match self.last_page_at {
            None => true,
            Some(at) => at.elapsed().as_secs() >= INFO_PAGE_INTERVAL_SECS,
        };

        if !due {
            return;
        }

        self.last_page_at = Some(Instant::now());
        self.ui.display_html(INFO_PAGES[self.page_index]);
        self.page_index = (self.page_index + 1) % INFO_PAGES.len();
    }
}
