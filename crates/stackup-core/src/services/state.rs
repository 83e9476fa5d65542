use std::path::{Path, PathBuf};

use crate::error::{ProvisionError, Result};
use crate::models::SupervisedProcess;

/// JSON record of the processes currently owned by one service.
pub struct ProcessRecordStore {
    record_file: PathBuf,
}

impl ProcessRecordStore {
    pub fn new(record_file: &Path) -> Self {
        Self {
            record_file: record_file.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.record_file
    }

    pub async fn load(&self) -> Result<Vec<SupervisedProcess>> {
        if !self.record_file.exists() {
            return Ok(Vec::new());
        }
        let json = tokio::fs::read_to_string(&self.record_file)
            .await
            .map_err(|e| ProvisionError::Process(format!("failed to read process record: {e}")))?;
        let records: Vec<SupervisedProcess> = serde_json::from_str(&json)?;
        Ok(records)
    }

    pub async fn save(&self, records: &[SupervisedProcess]) -> Result<()> {
        if let Some(parent) = self.record_file.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ProvisionError::Process(format!("failed to create run dir: {e}"))
            })?;
        }
        let json = serde_json::to_string_pretty(records)?;
        tokio::fs::write(&self.record_file, json)
            .await
            .map_err(|e| ProvisionError::Process(format!("failed to write process record: {e}")))?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.record_file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProvisionError::Process(format!(
                "failed to remove process record: {e}"
            ))),
        }
    }
}
