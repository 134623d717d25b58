//! Settings commands

use crate::cli::Target;
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::settings::{Settings, TestRunnerSettings};

pub(crate) fn run_show(target: Target, output: OutputOptions) -> Result<()> {
    let ctx = target.open()?;
    let settings = ctx.store.settings().with_defaults();
    ctx.finish()?;

    let mut human = HumanOutput::new("Settings");
    push_settings_summary(&mut human, &settings);
    emit_success(output, "settings show", &settings, Some(&human))
}

pub(crate) fn run_set(target: Target, output: OutputOptions, key: &str, value: &str) -> Result<()> {
    let ctx = target.open()?;
    let mut settings = ctx.store.settings();
    apply_setting(&mut settings, key, value)?;
    let settings = ctx.store.update_settings(settings)?.with_defaults();
    ctx.finish()?;

    let mut human = HumanOutput::new("Setting updated");
    human.push_summary(key, value);
    emit_success(output, "settings set", &settings, Some(&human))
}

const RUNNER_FIELDS: [&str; 4] = ["command", "pass_marker", "fail_marker", "no_tests_marker"];

fn apply_setting(settings: &mut Settings, key: &str, value: &str) -> Result<()> {
    if key == "stale_threshold_days" {
        let days = value.trim().parse::<u32>().map_err(|_| {
            Error::InvalidArgument(format!(
                "stale_threshold_days must be a whole number of days, got '{value}'"
            ))
        })?;
        settings.stale_threshold_days = Some(days);
        return Ok(());
    }

    let field = key
        .strip_prefix("test_runner.")
        .filter(|field| RUNNER_FIELDS.contains(field))
        .ok_or_else(|| unknown_key(key))?;
    if value.trim().is_empty() {
        return Err(Error::InvalidArgument(format!("{key} cannot be empty")));
    }
    let runner = settings
        .test_runner
        .get_or_insert_with(TestRunnerSettings::default);
    let slot = match field {
        "command" => &mut runner.command,
        "pass_marker" => &mut runner.pass_marker,
        "fail_marker" => &mut runner.fail_marker,
        _ => &mut runner.no_tests_marker,
    };
    *slot = Some(value.to_string());
    Ok(())
}

fn unknown_key(key: &str) -> Error {
    Error::InvalidArgument(format!(
        "unknown setting '{key}' (expected stale_threshold_days or test_runner.<command|pass_marker|fail_marker|no_tests_marker>)"
    ))
}

fn push_settings_summary(human: &mut HumanOutput, settings: &Settings) {
    human.push_summary(
        "stale_threshold_days",
        settings.stale_threshold_days().to_string(),
    );
    human.push_summary("test_runner.command", settings.test_command());
    human.push_summary("test_runner.pass_marker", settings.pass_marker());
    human.push_summary("test_runner.fail_marker", settings.fail_marker());
    human.push_summary("test_runner.no_tests_marker", settings.no_tests_marker());
    for key in settings.extra.keys() {
        human.push_summary(key.clone(), "(preserved)");
    }
}
