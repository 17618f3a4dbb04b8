//! Plain logging for the engine's own diagnostics (unmatched responses, channel errors,
//! reconnect attempts). Not a substitute for a handler's own logging — just the minimum the
//! engine itself needs when something unusual happens off the request/response path.

/// Writes `message` to stderr, and through `logwise::info_sync!` as well when the `logwise`
/// feature is enabled, so a host application that has wired up `logwise` still sees these.
pub fn log(message: &str) {
    eprintln!("{}", message);
    #[cfg(feature = "logwise")]
    {
        logwise::info_sync!("{message}", message = message);
    }
}

/// Like [`log`], but for conditions that indicate a real failure (channel errors, a closed
/// engine). Routed through `logwise::error_sync!` under the feature, at the matching severity.
pub fn log_error(message: &str) {
    eprintln!("{}", message);
    #[cfg(feature = "logwise")]
    {
        logwise::error_sync!("{message}", message = message);
    }
}
