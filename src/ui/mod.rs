pub mod progress;

use std::io::{
    self,
    BufRead,
    Write,
};

use colored::Colorize;

/// The front-end contract. One backend is picked at startup and
/// injected into the orchestrator; the core never knows whether it is
/// talking to a terminal or a graphical shell.
pub trait Ui {
    fn message(&mut self, text: &str);

    fn error(&mut self, text: &str);

    /// Blocking yes/no confirmation. `false` means the user declined.
    fn prompt(&mut self, text: &str) -> bool;

    /// `frac` is the global completion ratio in [0, 1].
    fn progress(&mut self, frac: f64, text: &str);

    /// Shows a named informational page. Purely cosmetic; failures are
    /// ignored by callers.
    fn display_html(&mut self, page: &str);

    fn finished(&mut self, success: bool, text: &str);

    /// Pumps any pending front-end work without blocking. Called while
    /// waiting on external command output so graphical backends can
    /// redraw.
    fn process_events(&mut self) {}
}

/// Headless backend writing to stdout/stderr; prompts read y/n from
/// stdin unless `assume_yes` answers them for unattended runs.
pub struct StdioUi {
    pub assume_yes: bool,
    last_percent: i64,
}

impl StdioUi {
    pub fn new(assume_yes: bool) -> Self {
        StdioUi {
            assume_yes,
            last_percent: -1,
        }
    }
}

impl Ui for StdioUi {
    fn message(&mut self, text: &str) {
        println!("{text}");
    }

    fn error(&mut self, text: &str) {
        eprintln!("{}", format!("ERROR: {text}").red());
    }

    fn prompt(&mut self, text: &str) -> bool {
        if self.assume_yes {
            println!("{text} [y/N] y (assumed)");
            return true;
        }

        print!("{text} [y/N] ");
        let _ = io::stdout().flush();

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }

        matches!(answer.trim(), "y" | "Y" | "yes")
    }

    fn progress(&mut self, frac: f64, text: &str) {
        // Only print whole-percent changes to keep logs readable
        let percent = (frac * 100.0) as i64;
        if percent == self.last_percent {
            return;
        }

        self.last_percent = percent;
        println!("[{percent:3}%] {text}");
    }

    fn display_html(&mut self, page: &str) {
        println!("{}", format!("--- {page} ---").dimmed());
    }

    fn finished(&mut self, success: bool, text: &str) {
        if success {
            println!("{}", text.green());
        } else {
            eprintln!("{}", text.red());
        }
    }
}

#[cfg(test)]
pub mod test_ui {
    use super::Ui;

    /// Records every bridge call; prompt answers are scripted.
    #[derive(Default)]
    pub struct RecordingUi {
        pub messages: Vec<String>,
        pub errors: Vec<String>,
        pub prompts: Vec<String>,
        pub progress: Vec<(f64, String)>,
        pub pages: Vec<String>,
        pub prompt_answers: Vec<bool>,
    }

    impl RecordingUi {
        pub fn answering(answers: &[bool]) -> Self {
            RecordingUi {
                // Popped from the back
                prompt_answers: answers.iter().rev().copied().collect(),
                ..Default::default()
            }
        }
    }

    impl Ui for RecordingUi {
        fn message(&mut self, text: &str) {
            self.messages.push(text.to_string());
        }

        fn error(&mut self, text: &str) {
            self.errors.push(text.to_string());
        }

        fn prompt(&mut self, text: &str) -> bool {
            self.prompts.push(text.to_string());
            self.prompt_answers.pop().unwrap_or(false)
        }

        fn progress(&mut self, frac: f64, text: &str) {
            self.progress.push((frac, text.to_string()));
        }

        fn display_html(&mut self, page: &str) {
            self.pages.push(page.to_string());
        }

        fn finished(&mut self, _success: bool, _text: &str) {}
    }
}
