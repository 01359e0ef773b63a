//! Numeric guards shared by the per-frame hot path.

/// Replace NaN and infinities with zero
#[must_use]
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Parse a numeric form field, falling back to `default` when it is not a
/// finite positive number
///
/// Accepts a decimal comma (`"52,5"`) as typed on French keyboards.
#[must_use]
pub fn parse_positive_or(input: &str, default: f64) -> f64 {
    let normalized = input.trim().replace(',', ".");
    match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => value,
        _ => {
            log::debug!("Unparseable numeric input {input:?}, using default {default}");
            default
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
#[must_use]
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
