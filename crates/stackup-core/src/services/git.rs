use std::path::Path;

use tokio::process::Command;

use crate::error::{ProvisionError, Result};

async fn run_git(args: &[&str], working_directory: Option<&Path>) -> Result<String> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = working_directory {
        cmd.current_dir(dir);
    }
    let output = cmd
        .output()
        .await
        .map_err(|e| ProvisionError::Install(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProvisionError::Install(format!(
            "git {} failed (exit {}): {}",
            args.join(" "),
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Clone a repository. `source` can be a local path or a remote URL.
pub async fn clone_repo(source: &str, target_path: &Path) -> Result<()> {
    let target = target_path.to_string_lossy();
    run_git(&["clone", source, &target], None).await?;
    Ok(())
}

pub async fn checkout(repo_path: &Path, reference: &str) -> Result<()> {
    run_git(&["checkout", reference], Some(repo_path)).await?;
    Ok(())
}
