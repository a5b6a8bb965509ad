use super::*;
use crate::test_support::{capture_logs, RecordingBackend, RecordingHooks};
use serde_json::json;
use shared::domain::Address;

fn channel_with(
    backend: Arc<RecordingBackend>,
    hooks: Arc<RecordingHooks>,
    policy: ErrorPolicy,
) -> CommandChannel {
    let options = ChannelOptions {
        error_policy: policy,
        ..ChannelOptions::default()
    };
    CommandChannel::new(backend, hooks, options)
}

fn command(path: &str, args: Vec<Value>) -> Command {
    Command::bare(Address::parse(path).expect("address"), args)
}

#[tokio::test]
async fn sends_wire_form_and_decodes_permissive_response() {
    let backend = RecordingBackend::new();
    backend.respond("/minsky/canvas/item/portX", "{x: 12.5, tags: ['a',],}");
    let channel = channel_with(backend.clone(), RecordingHooks::new(), ErrorPolicy::Present);

    let value = channel
        .send(&command("/minsky/canvas/item/portX", vec![json!(0)]))
        .await
        .expect("send");

    assert_eq!(value, json!({"x": 12.5, "tags": ["a"]}));
    assert_eq!(backend.calls(), vec!["/minsky/canvas/item/portX 0"]);
}

#[tokio::test]
async fn unavailable_channel_fails_soft_with_empty_object() {
    let hooks = RecordingHooks::new();
    let channel = CommandChannel::from_startup(
        Err(anyhow::anyhow!("addon missing")),
        hooks.clone(),
        ChannelOptions::default(),
    );
    assert!(!channel.is_available());

    let value = channel
        .send(&command("/minsky/minskyVersion", vec![]))
        .await
        .expect("soft failure");
    assert_eq!(value, json!({}));
    assert!(hooks.errors().is_empty());
}

#[tokio::test]
async fn unavailable_channel_logs_each_dropped_command() {
    let (logs, _guard) = capture_logs();
    let channel = CommandChannel::unavailable(RecordingHooks::new(), ChannelOptions::default());

    channel
        .send(&command("/minsky/canvas/zoom", vec![json!(1), json!(1), json!(2)]))
        .await
        .expect("soft failure");

    let text = logs.text();
    assert!(text.contains("ERROR"), "{text}");
    assert!(text.contains("engine channel not ready"), "{text}");
    assert!(text.contains("/minsky/canvas/zoom"), "{text}");
}

#[tokio::test]
async fn unavailable_channel_propagates_under_test_policy() {
    let options = ChannelOptions {
        error_policy: ErrorPolicy::Propagate,
        ..ChannelOptions::default()
    };
    let channel = CommandChannel::unavailable(RecordingHooks::new(), options);
    let err = channel
        .send(&command("/minsky/minskyVersion", vec![]))
        .await
        .expect_err("propagated");
    assert_eq!(err, ChannelError::Unavailable);
}

#[tokio::test]
async fn backend_exception_is_presented_and_returned_as_message() {
    let backend = RecordingBackend::new();
    backend.fail("/minsky/load", "file not found");
    let hooks = RecordingHooks::new();
    let channel = channel_with(backend, hooks.clone(), ErrorPolicy::Present);

    let value = channel
        .send(&command("/minsky/load", vec![json!("missing.mky")]))
        .await
        .expect("soft failure");

    assert_eq!(value, json!("file not found"));
    assert_eq!(hooks.errors(), vec!["file not found"]);
}

#[tokio::test]
async fn import_failure_keeps_engine_message_without_dialog() {
    let backend = RecordingBackend::new();
    backend.fail(IMPORT_COMMAND, "bad column");
    let hooks = RecordingHooks::new();
    let channel = channel_with(backend, hooks.clone(), ErrorPolicy::Present);

    let value = channel
        .send(&command(IMPORT_COMMAND, vec![json!("data.csv")]))
        .await
        .expect("sentinel");

    assert_eq!(value, json!(format!("{IMPORT_ERROR_SENTINEL}: bad column")));
    assert!(hooks.errors().is_empty());
}

#[tokio::test]
async fn malformed_response_is_handled_like_an_exception() {
    let backend = RecordingBackend::new();
    backend.respond("/minsky/t", "{unterminated");
    let hooks = RecordingHooks::new();
    let channel = channel_with(backend, hooks.clone(), ErrorPolicy::Present);

    let value = channel
        .send(&command("/minsky/t", vec![]))
        .await
        .expect("soft failure");

    let Value::String(message) = value else {
        panic!("expected message, got {value:?}");
    };
    assert!(message.starts_with("malformed engine response"));
    assert_eq!(hooks.errors(), vec![message]);
}

#[tokio::test]
async fn propagate_policy_returns_backend_errors() {
    let backend = RecordingBackend::new();
    backend.fail("/minsky/step", "integration failed");
    let hooks = RecordingHooks::new();
    let channel = channel_with(backend, hooks.clone(), ErrorPolicy::Propagate);

    let err = channel
        .send(&command("/minsky/step", vec![]))
        .await
        .expect_err("propagated");

    assert_eq!(
        err,
        ChannelError::Backend {
            command: "/minsky/step".to_string(),
            message: "integration failed".to_string(),
        }
    );
    assert!(hooks.errors().is_empty());
}

#[tokio::test]
async fn root_command_is_rejected_without_reaching_backend() {
    let backend = RecordingBackend::new();
    let channel = channel_with(backend.clone(), RecordingHooks::new(), ErrorPolicy::Present);

    let value = channel
        .send(&Command::bare(Address::root(), vec![]))
        .await
        .expect("soft failure");

    assert_eq!(value, json!({}));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn matching_engine_version_is_silent() {
    let backend = RecordingBackend::new();
    backend.respond("/minsky/minskyVersion", "\"3.1.0\"");
    let hooks = RecordingHooks::new();
    let channel = channel_with(backend.clone(), hooks.clone(), ErrorPolicy::Present);

    assert!(channel.check_version("3.1.0").await.expect("check"));
    assert_eq!(backend.calls(), vec!["/minsky/minskyVersion"]);
    assert!(hooks.messages.lock().expect("messages lock").is_empty());
}

#[tokio::test]
async fn version_mismatch_warns_and_shows_a_message() {
    let (logs, _guard) = capture_logs();
    let backend = RecordingBackend::new();
    backend.respond("/minsky/minskyVersion", "'3.0.2'");
    let hooks = RecordingHooks::new();
    let channel = channel_with(backend, hooks.clone(), ErrorPolicy::Present);

    assert!(!channel.check_version("3.1.0").await.expect("check"));
    assert_eq!(
        *hooks.messages.lock().expect("messages lock"),
        vec![VERSION_MISMATCH.to_string()]
    );
    let text = logs.text();
    assert!(text.contains("WARN"), "{text}");
    assert!(text.contains(VERSION_MISMATCH), "{text}");
    assert!(text.contains("3.0.2"), "{text}");
}

#[tokio::test]
async fn version_check_on_unavailable_channel_shows_nothing() {
    let hooks = RecordingHooks::new();
    let channel = CommandChannel::unavailable(hooks.clone(), ChannelOptions::default());

    assert!(!channel.check_version("3.1.0").await.expect("soft failure"));
    assert!(hooks.messages.lock().expect("messages lock").is_empty());

    let strict = CommandChannel::unavailable(
        hooks,
        ChannelOptions {
            error_policy: ErrorPolicy::Propagate,
            ..ChannelOptions::default()
        },
    );
    assert_eq!(
        strict.check_version("3.1.0").await,
        Err(ChannelError::Unavailable)
    );
}

#[test]
fn hooks_are_installed_into_the_backend() {
    let backend = RecordingBackend::new();
    let hooks = RecordingHooks::new();
    let _channel = channel_with(backend.clone(), hooks.clone(), ErrorPolicy::Present);

    let installed = backend.installed_hooks().expect("hooks installed");
    installed.busy_cursor(true);
    assert_eq!(installed.message_box("Save changes?", &["No".into(), "Yes".into()]), 1);
    assert_eq!(*hooks.busy.lock().expect("busy lock"), vec![true]);
}

#[test]
fn parses_error_policy_names() {
    assert_eq!("present".parse::<ErrorPolicy>(), Ok(ErrorPolicy::Present));
    assert_eq!(" Propagate ".parse::<ErrorPolicy>(), Ok(ErrorPolicy::Propagate));
    assert!("loud".parse::<ErrorPolicy>().is_err());
}
