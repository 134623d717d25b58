//! Document settings
//!
//! Settings live in the `---` delimited header at the top of the task file.
//! Every field is optional on disk; getters fall back to built-in defaults and
//! [`Settings::with_defaults`] materializes them for writing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::TestRef;

pub const DEFAULT_STALE_THRESHOLD_DAYS: u32 = 7;
pub const DEFAULT_TEST_COMMAND: &str = "cargo test {testFunc} -- --exact";
pub const DEFAULT_PASS_MARKER: &str = "test result: ok";
pub const DEFAULT_FAIL_MARKER: &str = "test result: FAILED";
pub const DEFAULT_NO_TESTS_MARKER: &str = "running 0 tests";

/// Placeholder replaced by the test function name.
pub const TEST_FUNC_PLACEHOLDER: &str = "{testFunc}";
/// Placeholder replaced by the test file path.
pub const TEST_PATH_PLACEHOLDER: &str = "{testPath}";

/// File-scoped settings embedded in the document header
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Days without an update before a task counts as stale
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_threshold_days: Option<u32>,

    /// Test runner parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_runner: Option<TestRunnerSettings>,

    /// Header keys this version does not know about, kept for re-saving
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Test runner parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestRunnerSettings {
    /// Command template with `{testFunc}` and `{testPath}` placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_marker: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_marker: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_tests_marker: Option<String>,
}

/// What a captured test output says about the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputVerdict {
    Passed,
    Failed,
    NoTests,
    Unknown,
}

impl Settings {
    /// Parse the YAML body of the header block (without the `---` lines).
    pub fn from_header(body: &str) -> crate::error::Result<Self> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(body)?)
    }

    /// Render the YAML body of the header block, defaults filled in.
    pub fn to_header(&self) -> crate::error::Result<String> {
        Ok(serde_yaml::to_string(&self.with_defaults())?)
    }

    pub fn stale_threshold_days(&self) -> u32 {
        self.stale_threshold_days
            .unwrap_or(DEFAULT_STALE_THRESHOLD_DAYS)
    }

    pub fn test_command(&self) -> &str {
        self.runner_field(|runner| runner.command.as_deref())
            .unwrap_or(DEFAULT_TEST_COMMAND)
    }

    pub fn pass_marker(&self) -> &str {
        self.runner_field(|runner| runner.pass_marker.as_deref())
            .unwrap_or(DEFAULT_PASS_MARKER)
    }

    pub fn fail_marker(&self) -> &str {
        self.runner_field(|runner| runner.fail_marker.as_deref())
            .unwrap_or(DEFAULT_FAIL_MARKER)
    }

    pub fn no_tests_marker(&self) -> &str {
        self.runner_field(|runner| runner.no_tests_marker.as_deref())
            .unwrap_or(DEFAULT_NO_TESTS_MARKER)
    }

    fn runner_field<'a>(
        &'a self,
        field: impl Fn(&'a TestRunnerSettings) -> Option<&'a str>,
    ) -> Option<&'a str> {
        self.test_runner.as_ref().and_then(field)
    }

    /// True when any field would currently come from a built-in default.
    pub fn missing_defaults(&self) -> bool {
        let Some(runner) = &self.test_runner else {
            return true;
        };
        self.stale_threshold_days.is_none()
            || runner.command.is_none()
            || runner.pass_marker.is_none()
            || runner.fail_marker.is_none()
            || runner.no_tests_marker.is_none()
    }

    /// Copy of these settings with every default written out explicitly.
    pub fn with_defaults(&self) -> Self {
        Self {
            stale_threshold_days: Some(self.stale_threshold_days()),
            test_runner: Some(TestRunnerSettings {
                command: Some(self.test_command().to_string()),
                pass_marker: Some(self.pass_marker().to_string()),
                fail_marker: Some(self.fail_marker().to_string()),
                no_tests_marker: Some(self.no_tests_marker().to_string()),
            }),
            extra: self.extra.clone(),
        }
    }

    /// Expand the command template for a single test.
    pub fn expand_command(&self, test: &TestRef) -> String {
        self.test_command()
            .replace(TEST_FUNC_PLACEHOLDER, &test.function)
            .replace(TEST_PATH_PLACEHOLDER, &test.file)
    }

    /// Classify captured runner output using the configured markers.
    pub fn classify_output(&self, output: &str) -> OutputVerdict {
        if output.contains(self.no_tests_marker()) {
            OutputVerdict::NoTests
        } else if output.contains(self.fail_marker()) {
            OutputVerdict::Failed
        } else if output.contains(self.pass_marker()) {
            OutputVerdict::Passed
        } else {
            OutputVerdict::Unknown
        }
    }
}
