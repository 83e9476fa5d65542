use crate::error::{ProvisionError, Result};
use crate::models::{DeploymentConfig, ProvisioningState, ServiceDescriptor, ServicePaths};
use crate::services::database::DatabaseBackend;
use crate::services::identity::{AdminCredential, IdentityApi};

/// Answers the existence questions that gate each provisioning step.
///
/// Probing is existence-only: a schema with the wrong character set or a
/// config that drifted after creation is reported as present.
pub struct StateProber<'a, D, I> {
    database: &'a D,
    identity: &'a I,
    config: &'a DeploymentConfig,
}

impl<'a, D: DatabaseBackend, I: IdentityApi> StateProber<'a, D, I> {
    pub fn new(database: &'a D, identity: &'a I, config: &'a DeploymentConfig) -> Self {
        Self {
            database,
            identity,
            config,
        }
    }

    pub async fn probe(
        &self,
        descriptor: &ServiceDescriptor,
        paths: &ServicePaths,
    ) -> Result<ProvisioningState> {
        let mut state = ProvisioningState {
            installed: probe_install(paths),
            ..Default::default()
        };
        if let Some((user, schema)) = self.probe_database(descriptor).await? {
            state.db_user_exists = user;
            state.db_schema_exists = schema;
        }
        if let Some(exists) = self.probe_identity(descriptor).await? {
            state.identity_account_exists = exists;
        }

        tracing::debug!(service = %descriptor.name, ?state, "probed");
        Ok(state)
    }

    /// Login and schema presence, or `None` when the service declares no database.
    pub async fn probe_database(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<Option<(bool, bool)>> {
        let (Some(user), Some(schema)) = (descriptor.db_user(), descriptor.db_schema()) else {
            return Ok(None);
        };
        let user_exists = self.database.user_exists(user).await?;
        let schema_exists = self.database.schema_exists(schema).await?;
        Ok(Some((user_exists, schema_exists)))
    }

    /// Account presence, or `None` when the service declares no identity.
    pub async fn probe_identity(&self, descriptor: &ServiceDescriptor) -> Result<Option<bool>> {
        let Some(account) = descriptor.identity_account() else {
            return Ok(None);
        };
        let cred = AdminCredential::acquire(self.config)?;
        let found = self
            .identity
            .find_user(&cred, account)
            .await
            .map_err(|e| match e {
                ProvisionError::IdentityRegistration(_) => e,
                other => ProvisionError::IdentityRegistration(other.to_string()),
            })?;
        Ok(Some(found.is_some()))
    }
}

/// The install directory is the single marker for "installed".
pub fn probe_install(paths: &ServicePaths) -> bool {
    paths.install_dir.is_dir()
}
