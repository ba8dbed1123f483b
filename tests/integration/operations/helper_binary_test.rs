//! Integration tests for the cepces-submit binary

use std::io::Write;
use std::process::{Command, Output};

use tempfile::NamedTempFile;

use crate::integration::{MockCepServer, LEAF_CSR, PATH_POLICY};

const CERTMONGER_VARS: [&str; 5] = [
    "CERTMONGER_OPERATION",
    "CERTMONGER_CSR",
    "CERTMONGER_CERTIFICATE",
    "CERTMONGER_CA_PROFILE",
    "CERTMONGER_CA_COOKIE",
];

/// Run the helper for `operation` with `config` as the settings file.
fn run_helper(operation: &str, config: &str, extra: &[(&str, &str)]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_cepces-submit"));
    for var in CERTMONGER_VARS {
        command.env_remove(var);
    }
    command
        .env("CERTMONGER_OPERATION", operation)
        .env("CEPCES_CONFIG", config)
        .envs(extra.iter().copied());
    command.output().expect("Failed to run cepces-submit")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_static_operations_without_settings() {
    let missing = "/nonexistent/cepces.toml";

    let output = run_helper("IDENTIFY", missing, &[]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), format!("cepces {}\n", env!("CARGO_PKG_VERSION")));

    let output = run_helper("GET-DEFAULT-TEMPLATE", missing, &[]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).is_empty());

    let output = run_helper("GET-NEW-REQUEST-REQUIREMENTS", missing, &[]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "CERTMONGER_CA_PROFILE\n");
}

#[test]
fn test_listings_without_settings_are_empty() {
    for operation in ["GET-SUPPORTED-TEMPLATES", "FETCH-ROOTS"] {
        let output = run_helper(operation, "/nonexistent/cepces.toml", &[]);
        assert_eq!(output.status.code(), Some(0), "{}", operation);
        assert!(stdout(&output).is_empty(), "{}", operation);
    }
}

#[test]
fn test_submit_without_settings_is_underconfigured() {
    let output = run_helper(
        "SUBMIT",
        "/nonexistent/cepces.toml",
        &[("CERTMONGER_CSR", LEAF_CSR)],
    );
    assert_eq!(output.status.code(), Some(4));
    assert!(stdout(&output).contains("/nonexistent/cepces.toml"));
}

#[test]
fn test_unknown_operation_exits_unsupported() {
    let output = run_helper("FETCH-SCEP-ENCRYPTION-CERT", "/nonexistent/cepces.toml", &[]);
    assert_eq!(output.status.code(), Some(6));
    assert!(stdout(&output).is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_supported_templates_from_settings_file() {
    let mock = MockCepServer::start().await;
    mock.mock_policy().await;

    let mut settings = NamedTempFile::new().unwrap();
    write!(
        settings,
        "[global]\nendpoint = \"{}\"\ntype = \"Policy\"\nauth = \"Anonymous\"\n",
        mock.endpoint(PATH_POLICY)
    )
    .unwrap();
    let path = settings.path().to_string_lossy().into_owned();

    let output = tokio::task::spawn_blocking(move || {
        run_helper("GET-SUPPORTED-TEMPLATES", &path, &[])
    })
    .await
    .unwrap();

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "Machine\nWebServer\nUser\n");
}
