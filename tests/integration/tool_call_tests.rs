//! End-to-end tool calls against scripted `sh` helpers.

#![cfg(unix)]

use std::time::{Duration, Instant};

use serde_json::json;

use tool_gateway::AppError;

use super::test_helpers::{counted_gateway, handshake, script_config};

#[tokio::test]
async fn full_handshake_sends_expected_wire_messages() {
    // The helper echoes the three lines it received back as structured content.
    let script = format!(
        "{} printf '{{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{{\"structuredContent\":{{\"init\":%s,\"notif\":%s,\"call\":%s}}}}}}\\n' \"$init\" \"$notif\" \"$call\"",
        handshake()
    );
    let (gateway, launcher) = counted_gateway(script_config(&script, 5_000));

    let value = gateway
        .call_allowed_tool("audit_query", json!({ "limit": 5 }))
        .await
        .expect("call succeeds");

    assert_eq!(launcher.count(), 1);
    assert_eq!(value["init"]["method"], "initialize");
    assert_eq!(value["init"]["id"], 1);
    assert_eq!(value["init"]["params"]["protocolVersion"], "2025-06-18");
    assert_eq!(value["init"]["params"]["clientInfo"]["name"], "tool-gateway");
    assert_eq!(
        value["notif"],
        json!({ "jsonrpc": "2.0", "method": "notifications/initialized", "params": {} })
    );
    assert_eq!(
        value["call"],
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": { "name": "audit_query", "arguments": { "limit": 5 } }
        })
    );
}

#[tokio::test]
async fn structured_content_round_trips() {
    let script = format!(
        "{} printf '%s\\n' '{{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{{\"structuredContent\":{{\"a\":1}}}}}}'",
        handshake()
    );
    let (gateway, _) = counted_gateway(script_config(&script, 5_000));

    let value = gateway.call_tool("anything", json!({})).await.unwrap();
    assert_eq!(value, json!({ "a": 1 }));
}

#[tokio::test]
async fn text_content_that_is_not_json_is_wrapped() {
    let script = format!(
        "{} printf '%s\\n' '{{\"id\":2,\"result\":{{\"content\":[{{\"type\":\"text\",\"text\":\"not json\"}}]}}}}'",
        handshake()
    );
    let (gateway, _) = counted_gateway(script_config(&script, 5_000));

    let value = gateway.call_tool("anything", json!({})).await.unwrap();
    assert_eq!(value, json!({ "raw": "not json" }));
}

#[tokio::test]
async fn null_result_settles_without_waiting_for_deadline() {
    let script = format!(
        "{} printf '%s\\n' '{{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":null}}'; sleep 30",
        handshake()
    );
    let (gateway, _) = counted_gateway(script_config(&script, 10_000));

    let started = Instant::now();
    let value = gateway.call_tool("anything", json!({})).await.unwrap();

    assert_eq!(value, serde_json::Value::Null);
    assert!(started.elapsed() < Duration::from_secs(5), "must not wait for the deadline");
}

#[tokio::test]
async fn oversized_response_fails_fast() {
    let script = format!(
        "{} printf '{{\"id\":2,\"result\":{{\"structuredContent\":{{\"blob\":\"'; \
         head -c 1200000 /dev/zero | tr '\\000' a; \
         printf '\"}}}}}}\\n'; sleep 30",
        handshake()
    );
    let (gateway, _) = counted_gateway(script_config(&script, 10_000));

    let started = Instant::now();
    let err = gateway.call_tool("anything", json!({})).await.unwrap_err();

    assert_eq!(err, AppError::Io("response exceeded 1048576 bytes".into()));
    assert!(started.elapsed() < Duration::from_secs(5), "must not wait for the deadline");
}

#[tokio::test]
async fn response_split_across_writes_is_reassembled() {
    let script = "read -r init; \
                  printf '{\"jsonrpc'; sleep 0.1; printf '\":\"2.0\",\"id\":1,\"result\":{}}\\n'; \
                  read -r notif; read -r call; \
                  printf '{\"id\":2,\"result\":'; sleep 0.1; printf '{\"structuredContent\":{\"ok\":true}}}\\n'";
    let (gateway, _) = counted_gateway(script_config(script, 5_000));

    let value = gateway.call_tool("anything", json!({})).await.unwrap();
    assert_eq!(value, json!({ "ok": true }));
}

#[tokio::test]
async fn noise_on_stdout_is_ignored() {
    let script = format!(
        "echo 'kernel booting'; echo; {} echo '[1,2,3]'; printf '%s\\n' '{{\"id\":2,\"result\":{{\"version\":\"1.4.0\"}}}}'",
        handshake()
    );
    let (gateway, _) = counted_gateway(script_config(&script, 5_000));

    let value = gateway.call_tool("kernel_version", json!({})).await.unwrap();
    assert_eq!(value, json!({ "version": "1.4.0" }));
}

#[tokio::test]
async fn error_during_handshake_fails_fast_with_message() {
    let script = "read -r init; \
                  printf '%s\\n' '{\"jsonrpc\":\"2.0\",\"id\":1,\"error\":{\"code\":-32000,\"message\":\"boom\"}}'; \
                  sleep 30";
    let (gateway, _) = counted_gateway(script_config(script, 10_000));

    let started = Instant::now();
    let err = gateway.call_tool("anything", json!({})).await.unwrap_err();

    assert_eq!(err.kind(), "protocol");
    assert!(err.to_string().contains("boom"), "got: {err}");
    assert!(started.elapsed() < Duration::from_secs(5), "must not wait for the deadline");
}

#[tokio::test]
async fn error_for_tool_call_fails_with_message() {
    let script = format!(
        "{} printf '%s\\n' '{{\"id\":2,\"error\":{{\"message\":\"boom\"}}}}'",
        handshake()
    );
    let (gateway, _) = counted_gateway(script_config(&script, 5_000));

    let err = gateway.call_tool("anything", json!({})).await.unwrap_err();
    assert!(err.to_string().contains("boom"), "got: {err}");
}

#[tokio::test]
async fn silent_helper_times_out_and_is_terminated() {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let temp = tempfile::tempdir().unwrap();
    let pid_file = temp.path().join("helper.pid");
    let script = format!("echo $$ > '{}'; sleep 30", pid_file.display());
    let (gateway, _) = counted_gateway(script_config(&script, 300));

    let started = Instant::now();
    let err = gateway.call_tool("anything", json!({})).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, AppError::Timeout(_)), "got: {err:?}");
    assert!(elapsed >= Duration::from_millis(300), "settled early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "settled late: {elapsed:?}");

    let pid: i32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();

    // The reaper task collects the child shortly after the signal.
    let mut gone = false;
    for _ in 0..50 {
        if kill(Pid::from_raw(pid), None).is_err() {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(gone, "helper {pid} still running after timeout");
}

#[tokio::test]
async fn clean_exit_without_response_ends_in_timeout() {
    let (gateway, _) = counted_gateway(script_config("exit 0", 300));

    let err = gateway.call_tool("anything", json!({})).await.unwrap_err();
    assert_eq!(err.kind(), "timeout");
}

#[tokio::test]
async fn non_zero_exit_reports_code_and_stderr() {
    let script = "read -r init; echo 'policy file missing' >&2; exit 3";
    let (gateway, _) = counted_gateway(script_config(script, 5_000));

    match gateway.call_tool("anything", json!({})).await {
        Err(AppError::Exit { code, stderr }) => {
            assert_eq!(code, 3);
            assert_eq!(stderr.trim(), "policy file missing");
        }
        other => panic!("expected exit failure, got {other:?}"),
    }
}

#[tokio::test]
async fn response_written_before_non_zero_exit_still_wins() {
    let script = format!(
        "{} printf '%s\\n' '{{\"id\":2,\"result\":{{\"structuredContent\":{{\"done\":true}}}}}}'; exit 5",
        handshake()
    );
    let (gateway, _) = counted_gateway(script_config(&script, 5_000));

    let value = gateway.call_tool("anything", json!({})).await.unwrap();
    assert_eq!(value, json!({ "done": true }));
}

#[tokio::test]
async fn missing_executable_is_a_spawn_failure() {
    let mut config = script_config("", 5_000);
    config.executable = "/definitely/not/a/real/kernel-mcp".into();
    config.extra_args = String::new();
    let (gateway, launcher) = counted_gateway(config);

    let err = gateway.call_tool("anything", json!({})).await.unwrap_err();
    assert_eq!(err.kind(), "spawn");
    assert_eq!(launcher.count(), 1);
}

#[tokio::test]
async fn concurrent_calls_each_get_their_own_process() {
    let script = format!(
        "{} printf '{{\"id\":2,\"result\":{{\"structuredContent\":%s}}}}\\n' \"$call\"",
        handshake()
    );
    let (gateway, launcher) = counted_gateway(script_config(&script, 5_000));

    let calls = (0..5).map(|n| {
        let gateway = gateway.clone();
        async move { gateway.call_tool("anything", json!({ "n": n })).await }
    });
    let results = futures_util::future::join_all(calls).await;

    assert_eq!(launcher.count(), 5);
    for (n, result) in results.into_iter().enumerate() {
        let value = result.expect("concurrent call succeeds");
        assert_eq!(value["params"]["arguments"]["n"], n);
    }
}
