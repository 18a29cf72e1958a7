use super::config::{default_config_path, default_funding_key_path, AttestorConfig};
use std::path::{Path, PathBuf};

/// Action to take based on the existing config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    /// No config yet, write a new one
    CreateNew,
    /// Config exists and --force was specified, overwrite it
    Overwrite,
}

/// Decide whether a config file may be written at `config_path`.
pub fn validate_config_state(config_path: &Path, force: bool) -> Result<ConfigAction, String> {
    match (config_path.exists(), force) {
        (false, _) => Ok(ConfigAction::CreateNew),
        (true, true) => Ok(ConfigAction::Overwrite),
        (true, false) => Err(format!(
            "Config already exists at: {} (use --force to overwrite)",
            config_path.display()
        )),
    }
}

/// Write a commented default configuration
///
/// The funding credential is expected in `funding.key` next to the config.
/// The file itself is never created here; the credential is the operator's.
pub fn execute(config_path: Option<String>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    let action = validate_config_state(&config_path, force)?;
    let key_path = default_funding_key_path(&config_path);
    AttestorConfig::create_default(&config_path, &key_path)?;

    match action {
        ConfigAction::CreateNew => println!("✅ Wrote config: {}", config_path.display()),
        ConfigAction::Overwrite => println!("✅ Overwrote config: {}", config_path.display()),
    }
    if !key_path.exists() {
        println!();
        println!("Next: store the funding credential in {}", key_path.display());
        println!("      (or set ATTESTOR_FUNDING_KEY)");
    }

    Ok(())
}
