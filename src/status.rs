use indicatif::{ProgressBar, ProgressStyle};

/// Terminal volume meter; a no-op when running headless.
pub struct StatusLine {
    bar: Option<ProgressBar>,
}

impl StatusLine {
    pub fn new(headless: bool) -> Self {
        if headless {
            return Self { bar: None };
        }

        let bar = ProgressBar::new(100);
        match ProgressStyle::with_template("volume [{bar:30.cyan/blue}] {pos:>3}% {msg}") {
            Ok(style) => bar.set_style(style.progress_chars("=>-")),
            Err(err) => log::warn!("invalid status template: {err}"),
        }
        Self { bar: Some(bar) }
    }

    pub fn update(&self, percentage: u8, hand: &str, finger: &str, fps: f64) {
        if let Some(bar) = &self.bar {
            bar.set_position(percentage as u64);
            bar.set_message(format!("{hand:<8} {finger:<18} {fps:>6.2} fps"));
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.abandon();
        }
    }
}
