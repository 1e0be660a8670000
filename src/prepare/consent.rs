//! Consent Gate
//!
//! Decides whether a disruptive step may proceed. A forced run never
//! prompts; otherwise the operator is asked and end-of-input counts as a
//! refusal.

use crate::error::Result;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Stderr, Stdin, Write};
use std::sync::Arc;
use tracing::debug;

/// Source of operator answers
pub trait ConsentGate: Send + Sync {
    /// Ask the operator to confirm; `Ok(false)` when denied
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

pub type ConsentGateRef = Arc<dyn ConsentGate>;

/// Consent gate bound to the force flag of a request
#[derive(Clone)]
pub struct Consent {
    force: bool,
    gate: ConsentGateRef,
}

impl Consent {
    pub fn new(force: bool, gate: ConsentGateRef) -> Self {
        Self { force, gate }
    }

    /// Granted without I/O when forced, otherwise defer to the gate
    pub fn obtain(&self, prompt: &str) -> Result<bool> {
        if self.force {
            debug!("consent implied by force flag");
            return Ok(true);
        }
        self.gate.confirm(prompt)
    }
}

// =============================================================================
// Interactive Prompt
// =============================================================================

/// Prompts on a writer and reads yes/no answers from a reader
pub struct PromptConsent<R, W> {
    input: Mutex<R>,
    output: Mutex<W>,
}

impl<R: BufRead, W: Write> PromptConsent<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }
}

impl PromptConsent<BufReader<Stdin>, Stderr> {
    /// Prompt on stderr and read from stdin
    pub fn stdio() -> Self {
        Self::new(BufReader::new(std::io::stdin()), std::io::stderr())
    }
}

impl<R, W> ConsentGate for PromptConsent<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn confirm(&self, prompt: &str) -> Result<bool> {
        let mut input = self.input.lock();
        let mut output = self.output.lock();

        loop {
            write!(output, "{} (yes/no): ", prompt)?;
            output.flush()?;

            let mut answer = String::new();
            if input.read_line(&mut answer)? == 0 {
                // Nobody there to answer
                writeln!(output)?;
                return Ok(false);
            }

            match answer.trim().to_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => writeln!(output, "please answer yes or no")?,
            }
        }
    }
}

// =============================================================================
// Scripted Answers
// =============================================================================

/// Replays a fixed sequence of answers, then `default_answer` once exhausted
#[derive(Default)]
pub struct ScriptedConsent {
    answers: Mutex<VecDeque<bool>>,
    default_answer: bool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConsent {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            default_answer: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answer used after the scripted answers run out
    pub fn with_default_answer(mut self, answer: bool) -> Self {
        self.default_answer = answer;
        self
    }

    pub fn granting() -> Self {
        Self::new([]).with_default_answer(true)
    }

    pub fn denying() -> Self {
        Self::new([])
    }

    /// Prompts shown so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl ConsentGate for ScriptedConsent {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        self.prompts.lock().push(prompt.to_string());
        Ok(self
            .answers
            .lock()
            .pop_front()
            .unwrap_or(self.default_answer))
    }
}
