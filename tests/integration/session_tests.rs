//! End-to-end bridge sessions over loopback TCP with a real `/bin/sh`.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use shell_bridge::session::{Session, SessionState};
use shell_bridge::{AppError, BridgeConfig};

use super::test_helpers::{loopback_config, start_bridge, TestClient};

#[tokio::test]
async fn banner_then_command_output() {
    let bridge = start_bridge(loopback_config()).await;
    let mut client = TestClient::connect_greeted(bridge.addr).await;

    client.send(b"echo hello\n").await;
    assert_eq!(client.read_line().await, "hello\n");

    client.send(b"echo one; echo two\n").await;
    assert_eq!(client.read_line().await, "one\n");
    assert_eq!(client.read_line().await, "two\n");

    client.send(b"exit\n").await;
    let (result, state) = bridge.finish().await;
    let report = result.expect("session succeeds");
    assert_eq!(report.exit_code, Some(0));
    assert_eq!(state, SessionState::Closed);
}

#[tokio::test]
async fn exit_code_is_reported() {
    let bridge = start_bridge(loopback_config()).await;
    let mut client = TestClient::connect_greeted(bridge.addr).await;

    client.send(b"exit 7\n").await;

    let (result, _) = bridge.finish().await;
    let report = result.expect("session succeeds");
    assert_eq!(report.exit_code, Some(7));
    assert_eq!(report.exit_reason, "process exited with code 7");

    // The bridge has closed its side once the shell is gone.
    assert!(client.read_to_end().await.is_empty());
}

#[tokio::test]
async fn stderr_is_merged_into_output() {
    let bridge = start_bridge(loopback_config()).await;
    let mut client = TestClient::connect_greeted(bridge.addr).await;

    client.send(b"echo out; echo err 1>&2; echo out2\n").await;
    assert_eq!(client.read_line().await, "out\n");
    assert_eq!(client.read_line().await, "err\n");
    assert_eq!(client.read_line().await, "out2\n");

    client.send(b"exit 0\n").await;
    let (result, _) = bridge.finish().await;
    assert_eq!(result.expect("session succeeds").exit_code, Some(0));
}

#[tokio::test]
async fn half_close_keeps_output_flowing_until_shell_exits() {
    let bridge = start_bridge(loopback_config()).await;
    let mut client = TestClient::connect_greeted(bridge.addr).await;

    client.send(b"sleep 0.2; echo late\n").await;
    client.writer.shutdown().await.expect("half-close");

    assert_eq!(client.read_line().await, "late\n");
    assert!(client.read_to_end().await.is_empty());

    let (result, state) = bridge.finish().await;
    assert_eq!(result.expect("session succeeds").exit_code, Some(0));
    assert_eq!(state, SessionState::Closed);
}

#[tokio::test]
async fn client_disconnect_ends_shell_via_eof() {
    let bridge = start_bridge(loopback_config()).await;
    let client = TestClient::connect_greeted(bridge.addr).await;
    drop(client);

    let (result, state) = bridge.finish().await;
    assert_eq!(result.expect("session succeeds").exit_code, Some(0));
    assert_eq!(state, SessionState::Closed);
}

#[tokio::test]
async fn output_crossing_the_transfer_buffer_is_intact() {
    let bridge = start_bridge(loopback_config()).await;
    let mut client = TestClient::connect_greeted(bridge.addr).await;

    for width in [1024_usize, 1025, 4000] {
        client
            .send(format!("printf '%0{width}d\\n' 0\n").as_bytes())
            .await;
        let line = client.read_line().await;
        assert_eq!(line.len(), width + 1, "width {width}");
        assert!(line.trim_end().bytes().all(|b| b == b'0'));
    }

    client.send(b"exit 0\n").await;
    let (result, _) = bridge.finish().await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn input_crossing_the_transfer_buffer_is_intact() {
    let bridge = start_bridge(loopback_config()).await;
    let mut client = TestClient::connect_greeted(bridge.addr).await;

    // `echo ` plus the word plus `\n` makes a 1025-byte command line.
    let alphabet = b"abcdefghijklmnopqrstuvwxyz";
    let word: String = (0..1019_usize).map(|i| char::from(alphabet[i % 26])).collect();
    let command = format!("echo {word}\n");
    assert_eq!(command.len(), 1025);

    client.send(command.as_bytes()).await;
    assert_eq!(client.read_line().await, format!("{word}\n"));

    client.send(b"exit 0\n").await;
    let (result, _) = bridge.finish().await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn second_client_is_never_serviced() {
    let bridge = start_bridge(loopback_config()).await;
    let mut first = TestClient::connect_greeted(bridge.addr).await;

    // The kernel may complete the handshake, but no banner ever arrives.
    let mut second = TestClient::connect(bridge.addr).await;
    let mut buf = [0_u8; 64];
    match tokio::time::timeout(Duration::from_millis(300), second.reader.read(&mut buf)).await {
        Err(_elapsed) => {}
        Ok(Ok(0) | Err(_)) => {}
        Ok(Ok(n)) => panic!("second client received {n} bytes"),
    }

    first.send(b"echo still-first\n").await;
    assert_eq!(first.read_line().await, "still-first\n");

    first.send(b"exit 0\n").await;
    let (result, _) = bridge.finish().await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn sessions_run_back_to_back() {
    for code in [3, 4] {
        let bridge = start_bridge(loopback_config()).await;
        let mut client = TestClient::connect_greeted(bridge.addr).await;
        client.send(format!("exit {code}\n").as_bytes()).await;

        let (result, state) = bridge.finish().await;
        assert_eq!(result.expect("session succeeds").exit_code, Some(code));
        assert_eq!(state, SessionState::Closed);
    }
}

#[tokio::test]
async fn custom_banner_is_sent_first() {
    let config = BridgeConfig {
        banner: Some("remote shell ready".into()),
        ..loopback_config()
    };
    let bridge = start_bridge(config).await;
    let mut client = TestClient::connect(bridge.addr).await;

    assert_eq!(client.read_line().await, "remote shell ready\n");

    client.send(b"exit 0\n").await;
    let (result, _) = bridge.finish().await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn spawn_failure_aborts_session() {
    let config = BridgeConfig {
        shell: "/nonexistent/shell-bridge-test".into(),
        ..loopback_config()
    };
    let bridge = start_bridge(config).await;
    let mut client = TestClient::connect(bridge.addr).await;

    let (result, state) = bridge.finish().await;
    let err = result.expect_err("spawn must fail");
    assert!(matches!(err, AppError::Spawn(_)), "unexpected error: {err}");
    assert_eq!(state, SessionState::Connected);

    // No banner: the client only sees the connection close.
    let mut buf = Vec::new();
    let _ = client.reader.read_to_end(&mut buf).await;
    assert!(buf.is_empty());
}

#[tokio::test]
async fn bind_failure_is_fatal() {
    let occupied = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind blocker");
    let port = occupied.local_addr().expect("addr").port();

    let mut session = Session::new(BridgeConfig {
        port,
        ..loopback_config()
    });
    let err = session.run().await.expect_err("port is taken");

    assert!(matches!(err, AppError::Bind(_)), "unexpected error: {err}");
    assert_eq!(session.state(), SessionState::Idle);
}
