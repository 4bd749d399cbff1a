use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// "█▉▊▋▌▍▎▏  ·"
const PROGRESS_CHARS: &str =
    "\u{2588}\u{2589}\u{258a}\u{258b}\u{258c}\u{258d}\u{258e}\u{258f}  \u{b7}";

const PROGRESS_CHARS_SPINNER: &[&str] = &[
    "\u{2801}", "\u{2802}", "\u{2804}", "\u{2840}", "\u{2880}", "\u{2820}", "\u{2810}", "\u{2808}",
    "",
];

/// Progress of the bytes written to the stream, a no-op when quiet.
#[derive(Default, Debug)]
pub struct Bar {
    pub progress: Option<ProgressBar>,
}

impl Bar {
    /// Bar for an input of known size
    #[must_use]
    pub fn new(total: u64, quiet: bool) -> Self {
        if quiet {
            return Self::default();
        }

        let pb = ProgressBar::new(total);

        let style = match ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:50.green/blue} {bytes}/{total_bytes} ({bytes_per_sec} - {eta})")
        {
            Ok(style) => style,
            Err(err) => {
                eprintln!("Error creating progress bar style: {err}");
                return Self::default();
            }
        };

        pb.set_style(style.progress_chars(PROGRESS_CHARS));

        Self { progress: Some(pb) }
    }

    /// Spinner for STDIN, the total is unknown
    #[must_use]
    pub fn new_spinner_stream(quiet: bool) -> Self {
        if quiet {
            return Self::default();
        }

        let pb = ProgressBar::new_spinner();

        pb.enable_steady_tick(Duration::from_millis(200));

        let style = match ProgressStyle::default_spinner()
            .tick_strings(PROGRESS_CHARS_SPINNER)
            .template("[{elapsed_precise}] {bytes} ({bytes_per_sec}) {spinner:.green}")
        {
            Ok(s) => s,
            Err(err) => {
                eprintln!("Error creating spinner style: {err}");
                return Self::default();
            }
        };

        pb.set_style(style);

        Self { progress: Some(pb) }
    }

    pub fn inc(&self, delta: u64) {
        if let Some(pb) = &self.progress {
            pb.inc(delta);
        }
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.progress {
            pb.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet() {
        let bar = Bar::new(100, true);
        assert!(bar.progress.is_none());
        bar.inc(10);
        bar.finish();

        assert!(Bar::new_spinner_stream(true).progress.is_none());
    }

    #[test]
    fn test_bar() {
        let bar = Bar::new(100, false);
        bar.inc(40);
        assert_eq!(bar.progress.as_ref().map(ProgressBar::position), Some(40));
        bar.finish();
    }
}
