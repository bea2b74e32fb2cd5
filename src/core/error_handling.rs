//! Generic error handling utilities
//!
//! Lets the binary report errors from any module with the right amount of
//! detail: operators get the specific message when they can act on it (a bad
//! configuration value, a port already in use), and a generic line otherwise.

/// Trait for errors that can distinguish between operator-actionable and system errors
///
/// When `is_user_actionable()` returns `true`, `user_message()` must return
/// `Some(message)`; otherwise it returns `None`.
pub trait ContextualError: std::error::Error {
    /// Returns true if the error carries a message an operator can act on
    fn is_user_actionable(&self) -> bool;

    /// The operator-facing message for actionable errors
    fn user_message(&self) -> Option<String>;
}

/// Log errors with appropriate detail level based on error specificity
///
/// # Examples
/// ```rust,no_run
/// # use storcomm::core::error_handling::log_error_with_context;
/// # use storcomm::communication::api::ConfigError;
/// let error = ConfigError::Invalid {
///     field: "mbus.max-pending-count",
///     reason: "must be greater than zero".to_string(),
/// };
/// log_error_with_context(&error, "Loading configuration");
/// // Logs: "FATAL: Invalid configuration value for mbus.max-pending-count: must be greater than zero"
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Display + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => log::error!("FATAL: {}", user_msg),
        _ => log::error!("FATAL: {}", operation_context),
    }
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}
