//! Diagnostics gathered during one SCM preparation run

use crate::error::{Error, Result};

/// Ordered, append-only collection of errors from a single run
#[derive(Debug, Default)]
pub struct DiagnosticSet {
    errors: Vec<Error>,
}

impl DiagnosticSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: Error) {
        self.errors.push(error);
    }

    /// Builder-style append
    pub fn with(mut self, error: Error) -> Self {
        self.push(error);
        self
    }

    /// Append every diagnostic of another set, preserving order
    pub fn merge(&mut self, other: DiagnosticSet) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.errors.iter()
    }

    /// Concatenate into a single error, `None` when nothing was collected
    pub fn into_error(mut self) -> Option<Error> {
        match self.errors.len() {
            0 => None,
            1 => self.errors.pop(),
            _ => Some(Error::Multiple(self.errors)),
        }
    }

    pub fn into_result(self) -> Result<()> {
        match self.into_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl From<Error> for DiagnosticSet {
    fn from(error: Error) -> Self {
        Self::new().with(error)
    }
}
