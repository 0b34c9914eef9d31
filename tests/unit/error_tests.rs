//! Unit tests for the error enumeration.

use agent_conduit::AppError;

/// Display output is prefixed with the failure domain.
#[test]
fn display_includes_domain_prefix() {
    let cases = [
        (AppError::Config("bad".to_owned()), "config: bad"),
        (AppError::Spawn("bad".to_owned()), "spawn: bad"),
        (AppError::Stream("bad".to_owned()), "stream: bad"),
        (AppError::Io("bad".to_owned()), "io: bad"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

/// I/O errors convert into the `Io` variant.
#[test]
fn io_error_converts() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(_)));
    assert!(err.to_string().contains("pipe closed"));
}

/// TOML parse errors convert into the `Config` variant.
#[test]
fn toml_error_converts() {
    let parse_err = toml::from_str::<toml::Value>("not [ valid").expect_err("must fail");
    let err: AppError = parse_err.into();
    assert!(matches!(err, AppError::Config(_)));
}
