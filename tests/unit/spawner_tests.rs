//! Unit tests for spawn-config resolution.

use std::path::PathBuf;

use agent_conduit::config::AgentConfig;
use agent_conduit::stream::{ConfigResolver, SpawnResolver};
use agent_conduit::AppError;

fn agent(binary: &str) -> AgentConfig {
    AgentConfig {
        binary: binary.to_owned(),
        ..AgentConfig::default()
    }
}

/// The forced stream-json flags lead the argument list.
#[test]
fn forced_args_lead_the_invocation() {
    let config = ConfigResolver::new(agent("claude"))
        .resolve()
        .expect("resolve must succeed");

    assert_eq!(config.command, "claude");
    assert_eq!(
        &config.args[..3],
        &[
            "--output-format=stream-json".to_owned(),
            "--input-format=stream-json".to_owned(),
            "--verbose".to_owned(),
        ]
    );
    assert!(config.cwd.is_none());
}

/// A configured model is forwarded as `--model <id>`.
#[test]
fn model_flag_is_appended() {
    let mut agent = agent("claude");
    agent.model = Some("sonnet".to_owned());

    let config = ConfigResolver::new(agent).resolve().expect("resolve");

    let position = config
        .args
        .iter()
        .position(|a| a == "--model")
        .expect("--model present");
    assert_eq!(config.args.get(position + 1).map(String::as_str), Some("sonnet"));
}

/// User extra args are appended, minus any attempt to override the forced
/// stream-json flags.
#[test]
fn extra_args_are_filtered() {
    let mut agent = agent("claude");
    agent.extra_args =
        "--output-format=text --input-format=text --verbose --dangerously-skip-permissions"
            .to_owned();

    let config = ConfigResolver::new(agent).resolve().expect("resolve");

    assert_eq!(
        config.args.iter().filter(|a| a.starts_with("--output-format")).count(),
        1,
        "only the forced output format may survive"
    );
    assert_eq!(config.args.iter().filter(|a| *a == "--verbose").count(), 1);
    assert!(config
        .args
        .iter()
        .any(|a| a == "--dangerously-skip-permissions"));
}

/// The configured working directory is carried into the spawn config.
#[test]
fn working_directory_is_carried() {
    let mut agent = agent("claude");
    agent.working_directory = Some(PathBuf::from("/tmp"));

    let config = ConfigResolver::new(agent).resolve().expect("resolve");
    assert_eq!(config.cwd, Some(PathBuf::from("/tmp")));
}

/// An unsafe binary makes resolution fail with a spawn error.
#[test]
fn unsafe_binary_fails_resolution() {
    let err = ConfigResolver::new(agent("bad name"))
        .resolve()
        .expect_err("must fail");
    assert!(matches!(err, AppError::Spawn(_)));
}
