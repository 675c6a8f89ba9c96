//! Human-readable error descriptions, exit codes and structured JSON output.

use eol_config::ValidationErrors;
use eol_core::{BuildError, EolError, ErrorCategory, TestResult, TestStatus};

pub const EXIT_PASS: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_ESTOP: i32 = 2;
pub const EXIT_EVALUATION: i32 = 3;
pub const EXIT_VALIDATION: i32 = 4;
pub const EXIT_CANCELLED: i32 = 5;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingDevice(name) => format!(
                "What happened: No {name} was provided to the orchestrator.\nLikely causes: The [hardware] section was not wired into the builder.\nHow to fix: Check the rig config; every device needs a kind of \"mock\" or \"real\"."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: The rig cannot be assembled ({msg}).\nLikely causes: A device is configured as real but its backend is unavailable.\nHow to fix: Edit the [hardware] section of the rig config, then rerun."
            ),
        };
    }

    if let Some(v) = err.downcast_ref::<ValidationErrors>() {
        return format!(
            "What happened: {v}.\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Correct the fields listed above and rerun."
        );
    }

    if let Some(e) = err.downcast_ref::<EolError>() {
        return describe(e.category(), &e.to_string());
    }

    // String-based heuristics for errors raised while reading files
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("read config") {
        return format!(
            "What happened: The rig config could not be read ({msg}).\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config with the path to the rig TOML."
        );
    }
    if lower.contains("parse config") {
        return format!(
            "What happened: The rig config is not valid TOML ({msg}).\nLikely causes: A typo, a wrong value type or an unknown section.\nHow to fix: Fix the reported line and rerun."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Explanation for a classified test failure.
pub fn describe(category: ErrorCategory, message: &str) -> String {
    let (causes, fix) = match category {
        ErrorCategory::Validation => (
            "The profile has missing or out-of-range values.",
            "Correct the listed fields in the profile TOML.",
        ),
        ErrorCategory::Configuration => (
            "The profile is missing or cannot be parsed.",
            "Check --profile and the [profiles] dir of the rig config.",
        ),
        ErrorCategory::Evaluation => (
            "The DUT force is outside the interpolated limits.",
            "Inspect the listed points; the unit under test is rejected.",
        ),
        ErrorCategory::Connection => (
            "A device is powered off, unplugged or on a different port or address.",
            "Check cabling and the [hardware] section, then run `eol self-check`.",
        ),
        ErrorCategory::Hardware => (
            "A device rejected a command or reported an alarm.",
            "Check the device front panel and the logs for the failing operation.",
        ),
        ErrorCategory::CommunicationTimeout => (
            "A device did not answer in time.",
            "Check the serial link and raise the response timeout if the device is slow.",
        ),
        ErrorCategory::Protocol => (
            "Corrupted frames or an unexpected answer on the serial link.",
            "Check baud rate, grounding and cable length.",
        ),
        ErrorCategory::State => (
            "Another test is running or the test was in the wrong state.",
            "Wait for the running test to finish.",
        ),
        ErrorCategory::Cancelled => (
            "The operator cancelled the test.",
            "Start a new test when ready.",
        ),
        ErrorCategory::MaxDuration => (
            "The measurement phase exceeded max_test_duration_s.",
            "Raise pass_criteria.max_test_duration_s or shorten the sequence.",
        ),
        ErrorCategory::Repository => (
            "The test record could not be stored.",
            "Check the result store.",
        ),
        ErrorCategory::EmergencyStop => (
            "The emergency stop is latched.",
            "Clear the cause, reset the emergency stop, then start a new test.",
        ),
        ErrorCategory::Unknown => (
            "See logs.",
            "Re-run with --log-level=debug or set RUST_LOG for more detail.",
        ),
    };
    format!("What happened: {message}.\nLikely causes: {causes}\nHow to fix: {fix}")
}

/// Exit code for errors raised before a test could run.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<ValidationErrors>().is_some() {
        return EXIT_VALIDATION;
    }
    match err.downcast_ref::<EolError>() {
        Some(e) => exit_code_for_category(e.category()),
        None => EXIT_ERROR,
    }
}

pub fn exit_code_for_result(result: &TestResult) -> i32 {
    match result.status {
        TestStatus::Completed if result.is_passed => EXIT_PASS,
        TestStatus::Failed => EXIT_EVALUATION,
        TestStatus::Cancelled => EXIT_CANCELLED,
        _ => result
            .error_category
            .map_or(EXIT_ERROR, exit_code_for_category),
    }
}

const fn exit_code_for_category(category: ErrorCategory) -> i32 {
    match category {
        ErrorCategory::Validation => EXIT_VALIDATION,
        ErrorCategory::Evaluation => EXIT_EVALUATION,
        ErrorCategory::EmergencyStop => EXIT_ESTOP,
        ErrorCategory::Cancelled => EXIT_CANCELLED,
        _ => EXIT_ERROR,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = match err.downcast_ref::<EolError>() {
        Some(e) => serde_json::to_value(e.category()).unwrap_or_else(|_| json!("unknown")),
        None if err.downcast_ref::<ValidationErrors>().is_some() => json!("validation"),
        None if err.downcast_ref::<BuildError>().is_some() => json!("configuration"),
        None => json!("error"),
    };
    json!({
        "reason": reason,
        "message": humanize(err),
        "exit_code": exit_code_for_error(err),
    })
    .to_string()
}
