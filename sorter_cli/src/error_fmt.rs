//! Human-readable error descriptions and structured JSON error formatting.

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use sorter_core::error::{BuildError, SorterError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingOutlets => {
                "What happened: The outlet table is empty.\nLikely causes: No [[outlets]] in the config and the outlet store holds nothing usable.\nHow to fix: Add [[outlets]] entries or remove the store file to fall back to the built-in table.".to_string()
            }
            BuildError::ChannelMismatch { bank, weights } => format!(
                "What happened: The sensor bank has {bank} channels but {weights} weights are configured.\nLikely causes: [pins] sensors and [scanner] weights (or the --weights CSV) disagree.\nHow to fix: List exactly one weight per sensor."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. `sorter show-config` prints what is in effect."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<SorterError>() {
        return match se {
            SorterError::Timeout => "What happened: The conveyor stopped moving.\nLikely causes: Conveyor halted, encoder unplugged, or encoder pins wrong.\nHow to fix: Check the conveyor and the encoder wiring in [pins], or raise --stall-ms.".to_string(),
            SorterError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
            SorterError::Hardware(msg) | SorterError::HardwareFault(msg) => format!(
                "What happened: A device failed ({msg}).\nLikely causes: Wiring, power, or GPIO permissions.\nHow to fix: Verify [pins] and that the process may access /dev/gpiomem, then rerun."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or file parsing
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("weights csv must have headers") {
        return "Invalid headers in weights CSV. Expected 'channel,weight'.".to_string();
    }

    if lower.contains("open sensor pins")
        || lower.contains("open outlet servo pins")
        || lower.contains("attach encoder interrupts")
    {
        return "What happened: Failed to initialize hardware pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO.".to_string();
    }

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read.\nHow to fix: Check the --config path. Original: {msg}"
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

/// Stable process exit codes.
///
/// 0 success, 2 usage (clap), 3 configuration, 4 conveyor stall, 5 hardware, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use sorter_core::error::{BuildError, SorterError};
    if err.downcast_ref::<BuildError>().is_some() {
        return 3;
    }
    match err.downcast_ref::<SorterError>() {
        Some(SorterError::Config(_)) => 3,
        Some(SorterError::Timeout) => 4,
        Some(SorterError::Hardware(_) | SorterError::HardwareFault(_)) => 5,
        _ => 1,
    }
}

/// Short stable name for the error class, used as `reason` in JSON output.
pub fn error_reason_name(err: &eyre::Report) -> &'static str {
    match exit_code_for_error(err) {
        3 => "Config",
        4 => "Stall",
        5 => "Hardware",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    json!({
        "reason": error_reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
