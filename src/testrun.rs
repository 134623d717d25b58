//! Results handed back by an external test runner.
//!
//! The store never runs tests itself. A runner executes the command from
//! [`Settings::expand_command`] per test and reports each outcome here.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::model::TestRef;
use crate::settings::{OutputVerdict, Settings};

/// Outcome of a single test reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub test: TestRef,
    pub passed: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl TestOutcome {
    /// Judge captured runner output with the board's marker settings.
    /// Anything other than a clear pass counts as a failure.
    pub fn from_output(test: TestRef, output: String, elapsed_ms: u64, settings: &Settings) -> Self {
        let passed = settings.classify_output(&output) == OutputVerdict::Passed;
        Self {
            test,
            passed,
            output,
            elapsed_ms,
        }
    }
}

/// Aggregate over every test of one task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunReport {
    pub results: Vec<TestOutcome>,
    pub passed: bool,
}

impl TestRunReport {
    pub fn from_results(results: Vec<TestOutcome>) -> Self {
        let passed = !results.is_empty() && results.iter().all(|result| result.passed);
        Self { results, passed }
    }

    /// True only when the runner reported success, ran something, and no
    /// individual result failed.
    pub fn succeeded(&self) -> bool {
        self.passed && !self.results.is_empty() && self.results.iter().all(|result| result.passed)
    }

    pub fn passed_count(&self) -> u32 {
        self.results.iter().filter(|result| result.passed).count() as u32
    }

    pub fn total(&self) -> u32 {
        self.results.len() as u32
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.results.iter().map(|result| result.elapsed_ms).sum()
    }

    /// Output of every test, each under a `== file:function (PASS|FAIL)` line.
    pub fn combined_output(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            let verdict = if result.passed { "PASS" } else { "FAIL" };
            let _ = writeln!(out, "== {} ({verdict}, {}ms)", result.test, result.elapsed_ms);
            out.push_str(result.output.trim_end());
            out.push('\n');
        }
        out
    }
}
