// ABOUTME: Source checkout for the build workspace.
// ABOUTME: Clones the configured branch, or fetches and hard-resets an existing clone.

use crate::config::SourceConfig;
use git2::build::RepoBuilder;
use git2::{Repository, ResetType};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScmError {
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the checkout stage produced.
#[derive(Debug, Clone)]
pub struct CheckoutSummary {
    /// Commit id the workspace now sits at.
    pub commit: String,
    pub branch: String,
}

/// Populate the workspace with the configured branch.
///
/// A fresh workspace gets a clone; an existing clone is fetched and
/// hard-reset to the remote branch tip, discarding local modifications
/// left behind by a previous run. Any fetch or clone error is fatal -
/// the pipeline has nothing to build without a source tree.
pub fn checkout(source: &SourceConfig, workspace: &Path) -> Result<CheckoutSummary, ScmError> {
    if workspace.join(".git").exists() {
        update_existing(source, workspace)
    } else {
        clone_fresh(source, workspace)
    }
}

fn update_existing(source: &SourceConfig, workspace: &Path) -> Result<CheckoutSummary, ScmError> {
    let repo = Repository::open(workspace)?;

    {
        let mut remote = repo.find_remote("origin")?;
        remote.fetch(&[source.branch.as_str()], None, None)?;
    }

    let fetch_head = repo.find_reference("FETCH_HEAD")?;
    let commit = fetch_head.peel_to_commit()?;
    let commit_id = commit.id().to_string();

    repo.reset(commit.as_object(), ResetType::Hard, None)?;

    tracing::debug!(branch = %source.branch, commit = %commit_id, "updated existing workspace");

    Ok(CheckoutSummary {
        commit: commit_id,
        branch: source.branch.clone(),
    })
}

fn clone_fresh(source: &SourceConfig, workspace: &Path) -> Result<CheckoutSummary, ScmError> {
    if let Some(parent) = workspace.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let repo = RepoBuilder::new()
        .branch(&source.branch)
        .clone(&source.url, workspace)?;

    let commit_id = repo.head()?.peel_to_commit()?.id().to_string();

    tracing::debug!(branch = %source.branch, commit = %commit_id, "cloned workspace");

    Ok(CheckoutSummary {
        commit: commit_id,
        branch: source.branch.clone(),
    })
}
