//! Unit tests for `AppError` display format and kind labels.

use tool_gateway::AppError;

#[test]
fn timeout_error_display_starts_with_timeout_prefix() {
    let err = AppError::Timeout("tool 'x' did not respond within 10 ms".into());
    assert!(err.to_string().starts_with("timeout:"));
}

#[test]
fn protocol_error_display_includes_message_and_code() {
    let err = AppError::Protocol {
        code: Some(-32601),
        message: "method not found".into(),
    };
    assert_eq!(err.to_string(), "protocol: method not found (code -32601)");
}

#[test]
fn protocol_error_without_code_omits_it() {
    let err = AppError::Protocol {
        code: None,
        message: "boom".into(),
    };
    assert_eq!(err.to_string(), "protocol: boom");
}

#[test]
fn exit_error_carries_code_and_stderr() {
    let err = AppError::Exit {
        code: 3,
        stderr: "policy file missing\n".into(),
    };
    assert_eq!(
        err.to_string(),
        "exit: helper exited with code 3: policy file missing"
    );
}

#[test]
fn exit_error_with_empty_stderr_has_no_trailing_colon() {
    let err = AppError::Exit {
        code: 1,
        stderr: "  \n".into(),
    };
    assert_eq!(err.to_string(), "exit: helper exited with code 1");
}

#[test]
fn error_message_no_trailing_period() {
    let err = AppError::Spawn("failed to start kernel-mcp: not found".into());
    let s = err.to_string();
    assert!(
        !s.ends_with('.'),
        "error message must not end with a period: {s}"
    );
}

#[test]
fn every_failure_kind_is_distinguishable() {
    let errors = [
        AppError::Config("x".into()),
        AppError::Disabled("x".into()),
        AppError::InvalidInput("x".into()),
        AppError::Unauthorized("x".into()),
        AppError::Spawn("x".into()),
        AppError::Protocol {
            code: None,
            message: "x".into(),
        },
        AppError::Timeout("x".into()),
        AppError::Exit {
            code: 1,
            stderr: String::new(),
        },
        AppError::Io("x".into()),
    ];

    let kinds: std::collections::HashSet<_> = errors.iter().map(AppError::kind).collect();
    assert_eq!(kinds.len(), errors.len(), "kinds must be unique");
}

#[test]
fn toml_error_converts_to_config_error() {
    let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
    let err: AppError = toml_err.into();
    assert_eq!(err.kind(), "config");
}

#[test]
fn io_error_converts_to_io_error() {
    let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err: AppError = io_err.into();
    assert_eq!(err, AppError::Io("pipe closed".into()));
}

#[test]
fn app_error_implements_std_error_trait() {
    let err = AppError::Io("test".into());
    let boxed: Box<dyn std::error::Error> = Box::new(err);
    assert!(!boxed.to_string().is_empty());
}
