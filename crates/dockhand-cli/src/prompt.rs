//! Interactive yes/no confirmation on the terminal.

use std::io::{BufRead, Write};

use dockhand_common::confirm::Confirm;

/// Asks on stdout and reads the answer from stdin.
///
/// With `assume_yes` every question is echoed and answered yes. End of
/// input counts as no.
#[derive(Debug, Clone, Copy)]
pub struct TerminalConfirm {
    assume_yes: bool,
}

impl TerminalConfirm {
    /// Creates a prompt; `assume_yes` answers every question yes.
    pub const fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Confirm for TerminalConfirm {
    fn confirm(&self, question: &str) -> bool {
        let mut stdout = std::io::stdout().lock();
        if self.assume_yes {
            let _ = writeln!(stdout, "{question} [y/N] y");
            return true;
        }
        let _ = write!(stdout, "{question} [y/N] ");
        let _ = stdout.flush();
        drop(stdout);

        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => false,
            Ok(_) => is_yes(&line),
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
