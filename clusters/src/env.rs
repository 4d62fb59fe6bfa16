use crate::error::{self, Result};
use snafu::ensure;
use std::env;

/// Read a required environment variable, failing with a `<VAR> is not set`
/// error when it is absent or empty.
pub fn require_env(var: &str) -> Result<String> {
    let value = env::var(var).unwrap_or_default();
    ensure!(!value.is_empty(), error::EnvNotSetSnafu { var });
    Ok(value)
}

#[cfg(test)]
mod test {
    use super::require_env;

    #[test]
    fn missing_variable_message_is_exact() {
        std::env::remove_var("SMOKE_TEST_ABSENT_VAR");
        let err = require_env("SMOKE_TEST_ABSENT_VAR").unwrap_err();
        assert_eq!(err.to_string(), "SMOKE_TEST_ABSENT_VAR is not set");
    }

    #[test]
    fn empty_variable_is_treated_as_missing() {
        std::env::set_var("SMOKE_TEST_EMPTY_VAR", "");
        let err = require_env("SMOKE_TEST_EMPTY_VAR").unwrap_err();
        assert_eq!(err.to_string(), "SMOKE_TEST_EMPTY_VAR is not set");
    }

    #[test]
    fn present_variable_is_returned() {
        std::env::set_var("SMOKE_TEST_PRESENT_VAR", "value");
        assert_eq!(require_env("SMOKE_TEST_PRESENT_VAR").unwrap(), "value");
    }
}
