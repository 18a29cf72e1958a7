//! Contribution data providers.
//!
//! A provider answers two questions: which project is being attested, and who
//! contributed to it, in a stable order. Source-control host clients implement
//! [`ContributionSource`]; [`ManifestSource`] reads the same data from a JSON
//! manifest on disk.

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::types::{ContributorDescriptor, SubjectDescriptor};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Source of project and contributor metadata.
///
/// Failures surface as `RemoteApi` errors carrying the status, when known.
#[async_trait]
pub trait ContributionSource: Send + Sync {
    async fn fetch_project_descriptor(&self) -> LedgerResult<SubjectDescriptor>;

    /// Contributors in the order they should be attested.
    async fn fetch_contributors(&self) -> LedgerResult<Vec<ContributorDescriptor>>;
}

/// On-disk manifest layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub project: SubjectDescriptor,
    #[serde(default)]
    pub contributors: Vec<ContributorDescriptor>,
}

/// Reads a [`Manifest`] from a JSON file on every fetch.
#[derive(Debug, Clone)]
pub struct ManifestSource {
    path: PathBuf,
}

impl ManifestSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> LedgerResult<Manifest> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| {
                let status = (e.kind() == ErrorKind::NotFound).then_some(404);
                LedgerError::remote_api(
                    status,
                    format!("failed to read manifest '{}': {}", self.path.display(), e),
                )
            })?;

        serde_json::from_str(&contents).map_err(|e| {
            LedgerError::invalid_input(format!(
                "failed to parse manifest '{}': {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl ContributionSource for ManifestSource {
    async fn fetch_project_descriptor(&self) -> LedgerResult<SubjectDescriptor> {
        Ok(self.read().await?.project)
    }

    async fn fetch_contributors(&self) -> LedgerResult<Vec<ContributorDescriptor>> {
        Ok(self.read().await?.contributors)
    }
}
