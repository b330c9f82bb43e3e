use crate::prelude::*;

/// Human-readable account of one attempt, in the order the lines were produced.
///
/// Each line is also logged, so the trace and the log never disagree.
#[must_use]
#[derive(Clone, Debug, Default)]
pub struct Trace(Vec<String>);

impl Trace {
    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!("{line}");
        self.0.push(line);
    }

    /// Visually separate the following lines in the written report.
    pub fn separate(&mut self) {
        if self.0.last().is_some_and(|line| !line.is_empty()) {
            self.0.push(String::new());
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.0.iter().any(|line| line.contains(needle))
    }
}
