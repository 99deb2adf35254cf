use regex::Regex;

use crate::errors::ProviError;
use crate::utils::fs::file_exists;
use crate::utils::shell::{
    self,
    LineHandled,
};
use crate::ui::progress::{
    Progress,
    Window,
};

/// Extracts progress fractions from the output lines of an external
/// tool. Implementations are stateful so they can count lines against
/// an expected total.
pub trait ProgressMatcher {
    /// Local completion fraction for `line`, or `None` when the line
    /// carries no progress information.
    fn match_line(&mut self, line: &str) -> Option<f64>;
}

/// Matches the trailing percentage of an unsquashfs progress bar, e.g.
/// `[=====/    ]  12345/67890  42%`.
pub struct UnsquashfsMatcher {
    re: Regex,
}

impl UnsquashfsMatcher {
    pub fn new() -> Self {
        UnsquashfsMatcher {
            re: Regex::new(r"(\d+)%\s*$").expect("static regex must compile"),
        }
    }
}

impl Default for UnsquashfsMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressMatcher for UnsquashfsMatcher {
    fn match_line(&mut self, line: &str) -> Option<f64> {
        let caps = self.re.captures(line)?;
        let percent: f64 = caps[1].parse().ok()?;

        Some((percent / 100.0).clamp(0.0, 1.0))
    }
}

/// Counts `Setting up <package>` lines from `dpkg --configure` against
/// the expected package total.
pub struct DpkgConfigureMatcher {
    total: usize,
    seen: usize,
}

impl DpkgConfigureMatcher {
    pub fn new(total: usize) -> Self {
        DpkgConfigureMatcher { total, seen: 0 }
    }
}

impl ProgressMatcher for DpkgConfigureMatcher {
    fn match_line(&mut self, line: &str) -> Option<f64> {
        if !line.starts_with("Setting up ") {
            return None;
        }

        self.seen += 1;
        if self.total == 0 {
            return Some(1.0);
        }

        Some((self.seen as f64 / self.total as f64).min(1.0))
    }
}

/// Runs `cmd`, mapping its output through `matcher` onto the given
/// progress window. The UI event pump runs on every line so graphical
/// front-ends stay responsive during the longest stages.
pub fn run_with_progress(
    cmd: &str,
    args: &[&str],
    matcher: &mut dyn ProgressMatcher,
    progress: &mut Progress,
    window: &Window,
    text: &str,
) -> Result<(), ProviError> {
    shell::exec_streamed(cmd, args, |line| {
        if let Some(frac) = matcher.match_line(line) {
            progress.update(window, frac, text);
        }
        progress.ui().process_events();

        LineHandled::Continue
    })
}

/// Unpacks the squashfs base image onto the mounted target filesystem.
pub fn extract_base_image(
    image: &str,
    target: &str,
    progress: &mut Progress,
    window: &Window,
) -> Result<(), ProviError> {
    if !file_exists(image) {
        return Err(ProviError::NoSuchFile(
            std::io::Error::from(std::io::ErrorKind::NotFound),
            image.to_string(),
        ));
    }

    progress.update(window, 0.0, "extracting base system");

    run_with_progress(
        "unsquashfs",
        &["-f", "-dest", target, "-i", image],
        &mut UnsquashfsMatcher::new(),
        progress,
        window,
        "extracting base system",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsquashfs_matcher() {
        struct Test<'a> {
            line: &'a str,
            expected: Option<f64>,
        }

        let tests = vec![
            Test {
                line: "[=====/         ]  12345/67890  42%",
                expected: Some(0.42),
            },
            Test {
                line: "[===============| 67890/67890 100%",
                expected: Some(1.0),
            },
            Test {
                line: "created 4213 files",
                expected: None,
            },
            Test {
                line: "",
                expected: None,
            },
        ];

        let mut matcher = UnsquashfsMatcher::new();
        for test in tests {
            assert_eq!(
                test.expected,
                matcher.match_line(test.line),
                "{}",
                test.line
            );
        }
    }

    #[test]
    fn test_dpkg_matcher_counts_packages() {
        let mut matcher = DpkgConfigureMatcher::new(4);

        assert_eq!(None, matcher.match_line("Preparing to unpack ..."));
        assert_eq!(
            Some(0.25),
            matcher.match_line("Setting up libfoo2 (2.1-3) ...")
        );
        assert_eq!(Some(0.5), matcher.match_line("Setting up bar (0.9) ..."));

        // Never reports beyond 1.0, even if the estimate was low
        let mut matcher = DpkgConfigureMatcher::new(1);
        matcher.match_line("Setting up a (1) ...");
        assert_eq!(Some(1.0), matcher.match_line("Setting up b (1) ..."));
    }
}
