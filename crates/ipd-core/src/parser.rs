//! Strict single-token action parsing with a bounded reprompt loop.

use crate::error::CoreError;
use crate::payoff::Action;

/// The fixed correction message appended to the original prompt on retry.
pub const CORRECTION_PROMPT: &str =
    "Your previous response was invalid. Please respond with ONLY a single character: C or D. No explanation, no punctuation, just C or D.";

/// Raised when a raw completion cannot be parsed to a valid action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid output: '{raw}'. expected 'C' or 'D'.")]
pub struct ParseError {
    /// The raw text that failed to parse.
    pub raw: String,
}

/// Record of one parse attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ParseAttempt {
    /// The raw completion text for this attempt.
    pub raw_output: String,
    /// The parsed action, if parsing succeeded.
    pub parsed_action: Option<Action>,
    /// Whether this attempt succeeded.
    pub success: bool,
    /// Error message, present iff `success` is false.
    pub error_message: Option<String>,
}

/// Parse `raw` after trimming whitespace and upper-casing. Valid iff the
/// result is exactly `"C"` or `"D"`.
pub fn parse_action(raw: &str) -> Result<Action, ParseError> {
    match raw.trim().to_uppercase().as_str() {
        "C" => Ok(Action::Cooperate),
        "D" => Ok(Action::Defect),
        _ => Err(ParseError { raw: raw.to_string() }),
    }
}

/// Parse `raw`, returning a [`ParseAttempt`] describing the outcome rather
/// than propagating an error.
#[must_use]
pub fn try_parse(raw: &str) -> ParseAttempt {
    match parse_action(raw) {
        Ok(action) => ParseAttempt {
            raw_output: raw.to_string(),
            parsed_action: Some(action),
            success: true,
            error_message: None,
        },
        Err(e) => ParseAttempt {
            raw_output: raw.to_string(),
            parsed_action: None,
            success: false,
            error_message: Some(e.to_string()),
        },
    }
}

/// Why [`parse_with_retry`] failed to produce an action.
#[derive(Debug)]
pub enum RetryError {
    /// Every attempt, including all retries, failed to parse. Recoverable:
    /// callers fall back to a default action and keep the attempt trail.
    Exhausted(Vec<ParseAttempt>),
    /// `retry` itself returned an error (the completion adapter failed).
    /// Fatal: callers must propagate this, not fold it into the retry trail.
    Fatal(CoreError),
}

/// Parse `initial_output`, retrying up to `max_retries` additional times via
/// `retry` when parsing fails. `retry` is handed [`CORRECTION_PROMPT`] and
/// returns the next raw completion, or a [`CoreError`] if the completion
/// adapter itself failed (which is fatal and propagates immediately, as
/// [`RetryError::Fatal`]).
///
/// Returns the full attempt trail alongside the parsed action, or
/// [`RetryError::Exhausted`] with the full attempt trail if every attempt
/// failed to parse.
pub fn parse_with_retry(
    initial_output: &str,
    max_retries: u32,
    mut retry: impl FnMut(&str) -> Result<String, CoreError>,
) -> Result<(Action, Vec<ParseAttempt>), RetryError> {
    let mut attempts = Vec::with_capacity(1 + max_retries as usize);

    let first = try_parse(initial_output);
    let first_succeeded = first.success;
    let first_action = first.parsed_action;
    attempts.push(first);
    if first_succeeded {
        return Ok((first_action.expect("success implies action"), attempts));
    }

    for _ in 0..max_retries {
        let raw = retry(CORRECTION_PROMPT).map_err(RetryError::Fatal)?;
        let attempt = try_parse(&raw);
        let succeeded = attempt.success;
        let action = attempt.parsed_action;
        attempts.push(attempt);
        if succeeded {
            return Ok((action.expect("success implies action"), attempts));
        }
    }

    Err(RetryError::Exhausted(attempts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trimmed_lowercase() {
        assert_eq!(parse_action("  c \n").unwrap(), Action::Cooperate);
        assert_eq!(parse_action("d").unwrap(), Action::Defect);
    }

    #[test]
    fn rejects_anything_else() {
        assert!(parse_action("maybe").is_err());
        assert!(parse_action("").is_err());
        assert!(parse_action("C.").is_err());
    }

    #[test]
    fn retry_succeeds_on_second_attempt() {
        let mut calls = 0;
        let result = parse_with_retry("maybe", 2, |_| {
            calls += 1;
            Ok("D".to_string())
        });
        let (action, attempts) = result.expect("should succeed");
        assert_eq!(action, Action::Defect);
        assert_eq!(attempts.len(), 2);
        assert_eq!(calls, 1);
    }

    #[test]
    fn exhausts_retries_and_returns_all_failed_attempts() {
        let result = parse_with_retry("maybe", 2, |_| Ok("maybe".to_string()));
        match result.expect_err("should exhaust retries") {
            RetryError::Exhausted(attempts) => {
                assert_eq!(attempts.len(), 3);
                assert!(attempts.iter().all(|a| !a.success));
            }
            RetryError::Fatal(e) => panic!("unexpected fatal error: {e}"),
        }
    }

    #[test]
    fn adapter_error_mid_retry_propagates_as_fatal() {
        let result = parse_with_retry("maybe", 2, |_| {
            Err(CoreError::Completion("connection reset".to_string()))
        });
        match result.expect_err("should be fatal") {
            RetryError::Fatal(_) => {}
            RetryError::Exhausted(attempts) => {
                panic!("expected fatal error, got exhausted attempts: {attempts:?}")
            }
        }
    }
}
