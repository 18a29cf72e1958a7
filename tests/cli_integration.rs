// Integration tests for CLI commands
// These drive the built binary against temporary config, manifest and
// simulated ledger state files.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const MANIFEST: &str = r#"{
    "project": {
        "name": "acme/widgets",
        "url": "https://github.com/acme/widgets"
    },
    "contributors": [
        {
            "display_name": "Alice",
            "handle": "alice",
            "contact_key": "alice@example.org",
            "profile_url": "https://github.com/alice"
        },
        {
            "display_name": "Bob",
            "contact_key": "bob@example.org",
            "profile_url": "https://github.com/bob"
        }
    ]
}"#;

fn attestor(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_attestor"))
        .args(args)
        .env_remove("ATTESTOR_FUNDING_KEY")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp paths are UTF-8")
}

/// Config with local-network deposits, fast retries and a funding key.
fn setup(dir: &TempDir) -> (String, String, String) {
    let config = dir.path().join("config.toml");
    let output = attestor(&["init", "--config", path_str(&config)]);
    assert!(output.status.success());

    let contents = std::fs::read_to_string(&config)
        .unwrap()
        .replace("network = \"testnet\"", "network = \"local\"")
        .replace("base_delay = \"500ms\"", "base_delay = \"100ms\"");
    std::fs::write(&config, contents).unwrap();
    std::fs::write(dir.path().join("funding.key"), "operator-secret\n").unwrap();

    let manifest = dir.path().join("manifest.json");
    std::fs::write(&manifest, MANIFEST).unwrap();

    (
        path_str(&config).to_string(),
        path_str(&manifest).to_string(),
        path_str(&dir.path().join("ledger.json")).to_string(),
    )
}

#[test]
fn test_cli_help() {
    let output = attestor(&["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("run"));
    assert!(stdout.contains("init"));
    assert!(stdout.contains("inspect"));
    assert!(stdout.contains("version"));
}

#[test]
fn test_cli_version() {
    let output = attestor(&["version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&format!("attestor {}", env!("CARGO_PKG_VERSION"))));
}

#[test]
fn test_cli_init_refuses_overwrite() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");

    assert!(attestor(&["init", "--config", path_str(&config)]).status.success());
    let output = attestor(&["init", "--config", path_str(&config)]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("already exists"));

    assert!(attestor(&["init", "--config", path_str(&config), "--force"])
        .status
        .success());
}

#[test]
fn test_cli_run_is_idempotent_across_invocations() {
    let dir = TempDir::new().unwrap();
    let (config, manifest, ledger) = setup(&dir);
    let run = || {
        attestor(&[
            "run",
            "--manifest",
            &manifest,
            "--config",
            &config,
            "--ledger-state",
            &ledger,
            "--output",
            "json",
        ])
    };

    let first = run();
    assert!(
        first.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&first.stderr)
    );
    let summary: serde_json::Value = serde_json::from_slice(&first.stdout).unwrap();
    assert_eq!(summary["created_count"], 2);
    assert_eq!(summary["updated_count"], 0);
    assert_eq!(summary["tx_refs"].as_array().unwrap().len(), 5);
    assert_eq!(summary["total_cost"], 3 * 100 + 2 * 50);

    let second = run();
    assert!(second.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&second.stdout).unwrap();
    assert_eq!(summary["created_count"], 0);
    assert_eq!(summary["updated_count"], 2);
    assert!(summary.get("project_tx_ref").is_none());
    assert_eq!(summary["total_cost"], 2 * 50);

    let inspect = attestor(&["inspect", "--ledger-state", &ledger]);
    assert!(inspect.status.success());
    let stdout = String::from_utf8_lossy(&inspect.stdout);
    assert!(stdout.contains("Subjects (3):"));
    assert!(stdout.contains("Relationships (2):"));
    assert!(stdout.contains("Alice -> acme/widgets stake 100"));
}

#[test]
fn test_cli_run_text_output() {
    let dir = TempDir::new().unwrap();
    let (config, manifest, _) = setup(&dir);

    let output = attestor(&["run", "--manifest", &manifest, "--config", &config]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2 processed, 2 created, 0 updated, 0 failed"));
    assert!(stdout.contains("✅ alice (created)"));
    assert!(stdout.contains("✅ Bob (created)"));
}

#[test]
fn test_cli_run_rejects_foreign_ledger_state() {
    let dir = TempDir::new().unwrap();
    let (config, manifest, ledger) = setup(&dir);
    let args = [
        "run",
        "--manifest",
        manifest.as_str(),
        "--config",
        config.as_str(),
        "--ledger-state",
        ledger.as_str(),
    ];
    assert!(attestor(&args).status.success());

    std::fs::write(dir.path().join("funding.key"), "someone-else\n").unwrap();
    let output = attestor(&args);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not by the configured credential"));
}

#[test]
fn test_cli_run_without_credential_fails() {
    let dir = TempDir::new().unwrap();
    let manifest = dir.path().join("manifest.json");
    std::fs::write(&manifest, MANIFEST).unwrap();
    let config = dir.path().join("missing.toml");

    let output = attestor(&[
        "run",
        "--manifest",
        path_str(&manifest),
        "--config",
        path_str(&config),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ATTESTOR_FUNDING_KEY"));
}

#[test]
fn test_cli_run_rejects_invalid_overrides() {
    let dir = TempDir::new().unwrap();
    let (config, manifest, _) = setup(&dir);

    let output = attestor(&[
        "run",
        "--manifest",
        &manifest,
        "--config",
        &config,
        "--max-attempts",
        "0",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_attempts"));
}
