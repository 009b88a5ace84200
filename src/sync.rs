//! Content repository synchronization
//!
//! Clones the content repository on first run and fast-forwards the
//! configured branch on subsequent runs. Sync failures abort the whole
//! indexing run before detection, so the pipeline never indexes a
//! half-updated checkout.

use crate::config::IndexerConfig;
use crate::error::{Error, Result};
use tokio::process::Command;
use tracing::{debug, info};

/// Bring the local checkout up to date. No-op when `repo_url` is empty.
pub async fn sync_repository(config: &IndexerConfig) -> Result<()> {
    if config.repo_url.is_empty() {
        debug!("No repo_url configured, indexing content dir in place");
        return Ok(());
    }

    if config.content_dir.join(".git").is_dir() {
        pull(config).await
    } else {
        clone(config).await
    }
}

async fn clone(config: &IndexerConfig) -> Result<()> {
    info!(
        url = %config.repo_url,
        branch = %config.repo_branch,
        dir = %config.content_dir.display(),
        "Cloning content repository"
    );
    let output = Command::new("git")
        .arg("clone")
        .arg("--depth")
        .arg("1")
        .arg("--branch")
        .arg(&config.repo_branch)
        .arg(&config.repo_url)
        .arg(&config.content_dir)
        .output()
        .await?;

    if !output.status.success() {
        return Err(Error::Sync(format!(
            "git clone failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

async fn pull(config: &IndexerConfig) -> Result<()> {
    info!(
        branch = %config.repo_branch,
        dir = %config.content_dir.display(),
        "Pulling content repository"
    );
    let output = Command::new("git")
        .arg("-C")
        .arg(&config.content_dir)
        .arg("pull")
        .arg("--ff-only")
        .arg("origin")
        .arg(&config.repo_branch)
        .output()
        .await?;

    if !output.status.success() {
        return Err(Error::Sync(format!(
            "git pull failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}
