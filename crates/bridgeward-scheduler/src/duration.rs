//! Human duration strings such as `"1d 12h 30m"`.
//!
//! The input is a run of `<number><unit>` pairs. Whitespace between and
//! inside pairs is optional and units are case-insensitive. The pairs are
//! summed, so `"1h 1h"` is two hours.
//!
//! | Unit | Accepted spellings |
//! |------|--------------------|
//! | seconds | `s`, `sec`, `secs`, `second`, `seconds` |
//! | minutes | `m`, `min`, `mins`, `minute`, `minutes` |
//! | hours   | `h`, `hr`, `hrs`, `hour`, `hours` |
//! | days    | `d`, `day`, `days` |
//! | weeks   | `w`, `wk`, `wks`, `week`, `weeks` |
//!
//! An unknown unit is skipped with a warning. A string with no usable pair
//! at all is an error.

use std::time::Duration;

use crate::SchedulerError;

fn unit_seconds(unit: &str) -> Option<u64> {
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Some(1),
        "m" | "min" | "mins" | "minute" | "minutes" => Some(60),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(3_600),
        "d" | "day" | "days" => Some(86_400),
        "w" | "wk" | "wks" | "week" | "weeks" => Some(604_800),
        _ => None,
    }
}

/// Parses a duration string.
///
/// # Errors
/// [`SchedulerError::InvalidDuration`] when no `<number><unit>` pair with
/// a known unit is found, or the total overflows.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use bridgeward_scheduler::parse_duration;
///
/// assert_eq!(parse_duration("1d 12h").unwrap(), Duration::from_secs(129_600));
/// assert_eq!(parse_duration("90S").unwrap(), Duration::from_secs(90));
/// assert!(parse_duration("soon").is_err());
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, SchedulerError> {
    let invalid = || SchedulerError::InvalidDuration(input.to_string());
    let lowered = input.to_ascii_lowercase();
    let mut rest = lowered.as_str();
    let mut total: u64 = 0;
    let mut matched = false;

    loop {
        // Skip anything up to the next number.
        rest = rest.trim_start_matches(|c: char| !c.is_ascii_digit());
        if rest.is_empty() {
            break;
        }

        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (number, after) = rest.split_at(digits);
        let after = after.trim_start();
        let letters = after
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(after.len());
        let (unit, after) = after.split_at(letters);
        rest = after;

        // A bare number without a unit is not a pair.
        if unit.is_empty() {
            continue;
        }
        let Some(scale) = unit_seconds(unit) else {
            tracing::warn!(unit, input, "unknown duration unit skipped");
            continue;
        };
        let value: u64 = number.parse().map_err(|_| invalid())?;
        let seconds = value.checked_mul(scale).ok_or_else(invalid)?;
        total = total.checked_add(seconds).ok_or_else(invalid)?;
        matched = true;
    }

    if matched {
        Ok(Duration::from_secs(total))
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(input: &str) -> u64 {
        parse_duration(input).unwrap().as_secs()
    }

    #[test]
    fn test_parse_duration_compound() {
        assert_eq!(secs("1d 12h 30m"), 86_400 + 43_200 + 1_800);
    }

    #[test]
    fn test_parse_duration_long_forms_and_spacing() {
        assert_eq!(secs("2 weeks"), 1_209_600);
        assert_eq!(secs("5 minutes 10 seconds"), 310);
        assert_eq!(secs("3hrs"), 10_800);
    }

    #[test]
    fn test_parse_duration_is_case_insensitive() {
        assert_eq!(secs("90S"), 90);
        assert_eq!(secs("1H30M"), 5_400);
    }

    #[test]
    fn test_parse_duration_sums_repeated_units() {
        assert_eq!(secs("1h 1h"), 7_200);
    }

    #[test]
    fn test_parse_duration_skips_unknown_units() {
        assert_eq!(secs("1fortnight 2h"), 7_200);
    }

    #[test]
    fn test_parse_duration_zero_is_allowed() {
        assert_eq!(secs("0s"), 0);
    }

    #[test]
    fn test_parse_duration_rejects_empty_and_unitless() {
        assert!(matches!(
            parse_duration(""),
            Err(SchedulerError::InvalidDuration(_))
        ));
        assert!(parse_duration("42").is_err());
        assert!(parse_duration("forever").is_err());
        assert!(parse_duration("3 parsecs").is_err());
    }

    #[test]
    fn test_parse_duration_overflow_is_error() {
        assert!(parse_duration("99999999999999999999w").is_err());
        assert!(parse_duration("9999999999999999w").is_err());
    }
}
