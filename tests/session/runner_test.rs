//! Command sessions against real child processes.

use stdio_bridge::bridge::{ChildProcessBridge, StreamKind};
use stdio_bridge::config::ProtocolConfig;
use stdio_bridge::display::{MemorySink, ResponseDecorator};
use stdio_bridge::session::{CommandSession, ResponsePayload, SessionOutcome, TerminalState};

use crate::sh;

fn session(protocol: ProtocolConfig) -> CommandSession<MemorySink> {
    CommandSession::new(protocol, ResponseDecorator::plain("(sh)"), MemorySink::new())
}

async fn drive(
    session: &mut CommandSession<MemorySink>,
    bridge: &mut ChildProcessBridge,
    command: &str,
) -> SessionOutcome<ResponsePayload> {
    session
        .drive::<ResponsePayload>(bridge.channels_mut(), command)
        .await
        .unwrap()
}

#[tokio::test]
async fn payload_is_acknowledged_and_terminator_left_unread() {
    let script = r#"read cmd; echo '{"kind":"ok"}'; echo "${cmd}_DONE"; read ack; echo "got $ack""#;
    let mut bridge = ChildProcessBridge::start(&sh(script)).unwrap();
    let mut session = session(ProtocolConfig::default());

    let outcome = drive(&mut session, &mut bridge, "BUILD").await;

    assert_eq!(outcome.state, TerminalState::Completed);
    assert_eq!(outcome.payload.unwrap().kind, "ok");
    assert!(session.sink().entries().is_empty());

    let channels = bridge.channels_mut();
    assert_eq!(channels.recv_output().await.as_deref(), Some("BUILD_DONE"));
    assert_eq!(channels.recv_output().await.as_deref(), Some("got END"));
    assert!(bridge.shutdown().await.unwrap().success());
}

#[tokio::test]
async fn log_lines_are_forwarded_in_order() {
    let script = r#"read cmd; echo one; echo two; echo three; echo '{"kind":"result","data":{}}'; read ack"#;
    let mut bridge = ChildProcessBridge::start(&sh(script)).unwrap();
    let mut session = session(ProtocolConfig::default());

    let outcome = drive(&mut session, &mut bridge, "BUILD").await;

    let payload = outcome.payload.unwrap();
    assert_eq!(payload.kind, "result");
    assert!(payload.data_is_empty());
    assert_eq!(outcome.stats.log_lines, 3);
    assert_eq!(
        session.sink().from_stream(StreamKind::Stdout).collect::<Vec<_>>(),
        vec!["(sh) stdout  one", "(sh) stdout  two", "(sh) stdout  three"]
    );
    assert!(bridge.shutdown().await.unwrap().success());
}

#[tokio::test]
async fn stderr_block_aborts_with_one_labelled_entry() {
    let script = r#"read cmd; printf 'Error: Oops!\n    at main (backend.js:8:3)\n' >&2; read ack; echo "ack $ack""#;
    let mut bridge = ChildProcessBridge::start(&sh(script)).unwrap();
    let mut session = session(ProtocolConfig::default());

    let outcome = drive(&mut session, &mut bridge, "BUILD").await;

    assert_eq!(outcome.state, TerminalState::Aborted);
    assert!(outcome.payload.is_none());
    assert_eq!(
        outcome.diagnostic.as_deref(),
        Some("Error: Oops!\n    at main (backend.js:8:3)")
    );

    let stderr: Vec<_> = session.sink().from_stream(StreamKind::Stderr).collect();
    assert_eq!(stderr.len(), 1);
    assert_eq!(stderr[0].matches("(sh) stderr").count(), 1);
    assert!(stderr[0].contains("at main (backend.js:8:3)"));

    assert_eq!(
        bridge.channels_mut().recv_output().await.as_deref(),
        Some("ack END_EARLY")
    );
}

#[tokio::test]
async fn terminator_alone_completes_the_session() {
    let mut bridge = ChildProcessBridge::start(&sh(r#"read cmd; echo "${cmd}_DONE""#)).unwrap();
    let mut session = session(ProtocolConfig::default());

    let outcome = drive(&mut session, &mut bridge, "REBUILD").await;

    assert!(outcome.is_completed());
    assert!(outcome.payload.is_none());
    assert!(outcome.diagnostic.is_none());
}

#[tokio::test]
async fn fixed_terminator_overrides_suffix() {
    let protocol = ProtocolConfig {
        terminator: Some("READY".to_string()),
        ..Default::default()
    };
    let script = r#"read cmd; echo "${cmd}_DONE"; echo READY"#;
    let mut bridge = ChildProcessBridge::start(&sh(script)).unwrap();
    let mut session = session(protocol);

    let outcome = drive(&mut session, &mut bridge, "BUILD").await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.stats.log_lines, 1);
    assert_eq!(
        session.sink().entries()[0],
        (StreamKind::Stdout, "(sh) stdout  BUILD_DONE".to_string())
    );
}

#[tokio::test]
async fn sequential_commands_share_one_child() {
    let script = r#"while read cmd; do echo "working on $cmd"; echo "{\"kind\":\"$cmd\"}"; read ack; done"#;
    let mut bridge = ChildProcessBridge::start(&sh(script)).unwrap();
    let pid = bridge.pid();
    let mut session = session(ProtocolConfig::default());

    let first = drive(&mut session, &mut bridge, "BUILD").await;
    let second = drive(&mut session, &mut bridge, "REBUILD").await;

    assert_eq!(first.payload.unwrap().kind, "BUILD");
    assert_eq!(second.payload.unwrap().kind, "REBUILD");
    assert_eq!(first.stats.log_lines, 1);
    assert_eq!(second.stats.log_lines, 1);
    assert_eq!(bridge.pid(), pid);
    assert_eq!(session.sink().entries().len(), 2);

    assert!(bridge.shutdown().await.unwrap().success());
}

#[tokio::test]
async fn repeated_command_sessions_are_independent() {
    let script = r#"while read cmd; do echo "{\"kind\":\"$cmd-$$\"}"; echo "${cmd}_DONE"; read ack; done"#;
    let mut bridge = ChildProcessBridge::start(&sh(script)).unwrap();
    let mut session = session(ProtocolConfig::default());

    let first = drive(&mut session, &mut bridge, "BUILD").await;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let second = drive(&mut session, &mut bridge, "BUILD").await;
    let third = drive(&mut session, &mut bridge, "BUILD").await;

    for outcome in [&first, &second, &third] {
        assert_eq!(outcome.state, TerminalState::Completed);
        let kind = &outcome.payload.as_ref().unwrap().kind;
        assert!(kind.starts_with("BUILD-"), "{kind}");
    }
    assert!(session.sink().entries().is_empty());
    assert!(bridge.shutdown().await.unwrap().success());
}

#[tokio::test]
async fn diagnostic_written_in_pieces_aborts_once() {
    let script = r#"read cmd; printf 'Error: boom\n' >&2; printf '    at main (backend.js:8:3)\n' >&2; read ack; while read cmd; do echo '{"kind":"recovered"}'; read ack; done"#;
    let mut bridge = ChildProcessBridge::start(&sh(script)).unwrap();
    let mut session = session(ProtocolConfig::default());

    let first = drive(&mut session, &mut bridge, "BUILD").await;
    let second = drive(&mut session, &mut bridge, "BUILD").await;

    assert_eq!(first.state, TerminalState::Aborted);
    assert_eq!(
        first.diagnostic.as_deref(),
        Some("Error: boom\n    at main (backend.js:8:3)")
    );
    assert_eq!(second.state, TerminalState::Completed);
    assert_eq!(second.payload.unwrap().kind, "recovered");
    assert_eq!(session.sink().from_stream(StreamKind::Stderr).count(), 1);
    assert!(bridge.shutdown().await.unwrap().success());
}

#[tokio::test]
async fn json_array_output_is_a_log_line() {
    let script = r#"read cmd; echo '[]'; echo '["ok"]'; echo "${cmd}_DONE""#;
    let mut bridge = ChildProcessBridge::start(&sh(script)).unwrap();
    let mut session = session(ProtocolConfig::default());

    let outcome = drive(&mut session, &mut bridge, "BUILD").await;

    assert!(outcome.is_completed());
    assert!(outcome.payload.is_none());
    assert_eq!(outcome.stats.log_lines, 2);
}

#[tokio::test]
async fn child_exiting_without_response_aborts_silently() {
    let mut bridge = ChildProcessBridge::start(&sh("read cmd; echo partial")).unwrap();
    let mut session = session(ProtocolConfig::default());

    let outcome = drive(&mut session, &mut bridge, "BUILD").await;

    assert_eq!(outcome.state, TerminalState::Aborted);
    assert!(outcome.diagnostic.is_none());
    assert_eq!(outcome.stats.log_lines, 1);
}

#[tokio::test]
async fn capitalised_payload_fields_decode() {
    let script = r#"read cmd; echo '{"Kind":"BUILD_DONE","Data":{"vendor":{"errors":[]}}}'; read ack"#;
    let mut bridge = ChildProcessBridge::start(&sh(script)).unwrap();
    let mut session = session(ProtocolConfig::default());

    let outcome = drive(&mut session, &mut bridge, "BUILD").await;

    let payload = outcome.payload.unwrap();
    assert_eq!(payload.kind, "BUILD_DONE");
    assert_eq!(payload.data["vendor"]["errors"], serde_json::json!([]));
}
