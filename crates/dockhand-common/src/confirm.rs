//! Operator confirmation capability.
//!
//! Destructive steps never prompt inline. Components receive a
//! [`Confirm`] implementation and ask it before stopping the service,
//! deleting data, or overwriting live configuration.

use std::cell::RefCell;
use std::collections::VecDeque;

/// Answers yes/no questions on behalf of the operator.
pub trait Confirm {
    /// Returns `true` when the operator agrees to `question`.
    fn confirm(&self, question: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, question: &str) -> bool {
        self(question)
    }
}

/// Answers every question with the same fixed response.
#[derive(Debug, Clone, Copy)]
pub struct AlwaysAnswer(pub bool);

impl Confirm for AlwaysAnswer {
    fn confirm(&self, _question: &str) -> bool {
        self.0
    }
}

/// Replays a scripted sequence of answers, then answers `false`.
///
/// Records every question asked so tests can assert on the prompts.
#[derive(Debug, Default)]
pub struct ScriptedAnswers {
    answers: RefCell<VecDeque<bool>>,
    asked: RefCell<Vec<String>>,
}

impl ScriptedAnswers {
    /// Creates a script from the given answers, consumed in order.
    #[must_use]
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: RefCell::new(answers.into_iter().collect()),
            asked: RefCell::new(Vec::new()),
        }
    }

    /// Returns the questions asked so far.
    #[must_use]
    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }
}

impl Confirm for ScriptedAnswers {
    fn confirm(&self, question: &str) -> bool {
        self.asked.borrow_mut().push(question.to_string());
        self.answers.borrow_mut().pop_front().unwrap_or(false)
    }
}
