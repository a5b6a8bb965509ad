//! Presentation callbacks the engine layer invokes without knowing the UI.

use tracing::{error, info};

/// UI-side callbacks injected into the channel and its backend.
///
/// `present_error` and `message_box` are driven by the channel. Engine-driven
/// `message_box` and `busy_cursor` calls need an in-process backend that keeps
/// the hooks from [`Backend::install_hooks`](crate::transport::Backend::install_hooks).
pub trait UiHooks: Send + Sync {
    /// Shows a blocking message and returns the index of the chosen button.
    fn message_box(&self, message: &str, buttons: &[String]) -> usize;
    fn busy_cursor(&self, busy: bool);
    fn present_error(&self, message: &str);
}

/// Headless hooks: everything goes to the log and message boxes pick the
/// first button.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHooks;

impl UiHooks for LoggingHooks {
    fn message_box(&self, message: &str, buttons: &[String]) -> usize {
        info!(buttons = ?buttons, "engine message: {message}");
        0
    }

    fn busy_cursor(&self, busy: bool) {
        tracing::trace!(busy, "busy cursor");
    }

    fn present_error(&self, message: &str) {
        error!("engine error: {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::capture_logs;

    #[test]
    fn logging_hooks_pick_the_first_button_and_log_everything() {
        let (logs, _guard) = capture_logs();
        let hooks = LoggingHooks;

        let choice = hooks.message_box("Save changes?", &["Yes".into(), "No".into()]);
        hooks.busy_cursor(true);
        hooks.present_error("disk full");

        assert_eq!(choice, 0);
        let text = logs.text();
        assert!(text.contains("engine message: Save changes?"), "{text}");
        assert!(text.contains("busy cursor"), "{text}");
        assert!(text.contains("engine error: disk full"), "{text}");
    }
}
