use super::config::{default_config_path, default_funding_key_path, parse_delay, AttestorConfig};
use super::{init_logging, OutputFormat};
use attestor::ledger::memory::address_for_credential;
use attestor::ledger::InMemoryLedger;
use attestor::provider::{ContributionSource, ManifestSource};
use attestor::{
    AttestationOrchestrator, AttestationSummary, FailureMode, LedgerError, LedgerResult,
};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Environment variable holding the funding credential when no key file is configured
const FUNDING_KEY_ENV: &str = "ATTESTOR_FUNDING_KEY";

/// Command-line overrides for config file settings
#[derive(Debug, Default)]
pub struct Overrides {
    pub failure_mode: Option<String>,
    pub max_attempts: Option<u32>,
    pub base_delay: Option<String>,
}

impl Overrides {
    /// Apply the overrides; values are validated together with the file's.
    pub fn apply(self, config: &mut AttestorConfig) -> Result<(), LedgerError> {
        if let Some(mode) = self.failure_mode {
            config.run.failure_mode = mode.parse::<FailureMode>()?;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.retry.max_attempts = max_attempts;
        }
        if let Some(base_delay) = self.base_delay {
            parse_delay("base_delay", &base_delay)?;
            config.retry.base_delay = base_delay;
        }
        Ok(())
    }
}

/// Attest every contributor listed in a manifest
///
/// ## Configuration Loading
///
/// 1. `--config` flag if provided
/// 2. Default config at `~/.local/share/attestor/config.toml`
/// 3. Built-in defaults when neither file exists
///
/// ## Funding Credential
///
/// 1. `ledger.funding_key_file` from the config
/// 2. `funding.key` adjacent to the config
/// 3. `ATTESTOR_FUNDING_KEY` environment variable
///
/// ## Ledger
///
/// The run is executed against the simulated in-process ledger. With
/// `--ledger-state`, its state is loaded before and written back after the
/// run, also when the run fails, since ledger writes are never reverted.
pub async fn execute(
    manifest: String,
    config_path: Option<String>,
    ledger_state: Option<String>,
    overrides: Overrides,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    let mut config = if config_path.exists() {
        AttestorConfig::load(&config_path)?
    } else {
        AttestorConfig::default()
    };
    overrides.apply(&mut config)?;

    init_logging(&config.logging.level);
    if !config_path.exists() {
        tracing::info!(path = %config_path.display(), "no config file, using defaults");
    }

    let policy = config.retry.policy()?;
    let failure_mode = config.run.failure_mode;
    let credential = read_funding_credential(&config, &config_path)?;

    let ledger_state = ledger_state.map(PathBuf::from);
    let ledger = open_ledger(ledger_state.as_deref(), &credential, &config)?;

    let source = ManifestSource::new(&manifest);
    let project = source.fetch_project_descriptor().await?;
    let contributors = source.fetch_contributors().await?;

    tracing::info!(
        manifest = %manifest,
        network = ?config.ledger.network,
        failure_mode = %failure_mode,
        contributors = contributors.len(),
        "starting attestation run"
    );

    let orchestrator = AttestationOrchestrator::new(ledger.clone(), config.ledger.deposits());
    let result = orchestrator
        .run(&project, &contributors, failure_mode, &policy)
        .await;

    let summary = match &ledger_state {
        Some(path) => {
            let saved = ledger.save(path);
            if saved.is_ok() {
                tracing::info!(path = %path.display(), "ledger state saved");
            }
            settle_run(result, saved)?
        }
        None => result?,
    };
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => print!("{}", render_summary(&summary)),
    }

    if summary.failed_count() > 0 {
        return Err(format!("{} contributor(s) failed", summary.failed_count()).into());
    }
    Ok(())
}

/// Read the funding credential from the first configured source.
fn read_funding_credential(
    config: &AttestorConfig,
    config_path: &Path,
) -> Result<String, LedgerError> {
    let key_file = config
        .ledger
        .funding_key_file
        .clone()
        .or_else(|| Some(default_funding_key_path(config_path)).filter(|p| p.exists()));

    if let Some(path) = key_file {
        let credential = std::fs::read_to_string(&path).map_err(|e| {
            LedgerError::invalid_input(format!(
                "failed to read funding key '{}': {}",
                path.display(),
                e
            ))
        })?;
        return non_empty(credential, &path.display().to_string());
    }

    match std::env::var(FUNDING_KEY_ENV) {
        Ok(credential) => non_empty(credential, FUNDING_KEY_ENV),
        Err(_) => Err(LedgerError::invalid_input(format!(
            "no funding credential: set ledger.funding_key_file or {}",
            FUNDING_KEY_ENV
        ))),
    }
}

fn non_empty(credential: String, source: &str) -> Result<String, LedgerError> {
    let credential = credential.trim().to_string();
    if credential.is_empty() {
        return Err(LedgerError::invalid_input(format!(
            "funding credential from {} is empty",
            source
        )));
    }
    Ok(credential)
}

/// Load the simulated ledger state, or start a fresh funded ledger.
fn open_ledger(
    state: Option<&Path>,
    credential: &str,
    config: &AttestorConfig,
) -> Result<InMemoryLedger, LedgerError> {
    let depth = config.ledger.confirmation_depth();
    let ledger = match state {
        Some(path) if path.exists() => {
            let ledger = InMemoryLedger::load(path)?;
            let owner = ledger.snapshot().address;
            if owner != address_for_credential(credential) {
                return Err(LedgerError::invalid_input(format!(
                    "ledger state '{}' is funded by {}, not by the configured credential",
                    path.display(),
                    owner
                )));
            }
            ledger
        }
        _ => InMemoryLedger::from_credential(credential, config.ledger.initial_balance()),
    };
    Ok(ledger.with_confirmation_depth(depth))
}

/// Combine the run's result with saving the ledger state. The run's own
/// error wins; a save failure next to it is only logged.
fn settle_run(
    result: LedgerResult<AttestationSummary>,
    saved: LedgerResult<()>,
) -> LedgerResult<AttestationSummary> {
    match (result, saved) {
        (result, Ok(())) => result,
        (Ok(_), Err(save_err)) => Err(save_err),
        (Err(run_err), Err(save_err)) => {
            tracing::error!("failed to save ledger state: {}", save_err);
            Err(run_err)
        }
    }
}

/// Human-readable summary.
pub fn render_summary(summary: &AttestationSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Project subject: {}", summary.project_subject_id);
    if let Some(tx) = &summary.project_tx_ref {
        let _ = writeln!(out, "  created in {}", tx);
    }
    let _ = writeln!(
        out,
        "Contributors: {} processed, {} created, {} updated, {} failed",
        summary.contributor_count,
        summary.created_count,
        summary.updated_count,
        summary.failed_count()
    );
    for result in &summary.results {
        match (&result.relationship, &result.error) {
            (Some(rel), _) if result.success => {
                let state = if rel.existed_before { "updated" } else { "created" };
                let _ = writeln!(out, "  ✅ {} ({}) {}", result.contributor, state, rel.id);
            }
            (_, Some(error)) => {
                let _ = writeln!(out, "  ❌ {}: {}", result.contributor, error);
            }
            _ => {
                let _ = writeln!(out, "  ❌ {}", result.contributor);
            }
        }
    }
    let _ = writeln!(out, "Transactions: {}", summary.tx_refs.len());
    for tx in &summary.tx_refs {
        let _ = writeln!(out, "  {}", tx);
    }
    let _ = writeln!(out, "Total cost: {}", summary.total_cost);
    out
}
