// Each test binary compiles this module independently and uses a different
// subset of helpers, so unused-function warnings are expected.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use stackup_core::models::{DeploymentConfig, EndpointUrls, ServiceDescriptor, ServicePaths};
use stackup_core::services::database::DatabaseBackend;
use stackup_core::services::identity::{AdminCredential, IdentityApi, NewUser};
use stackup_core::services::installer::Installer;
use stackup_core::Result;

/// In-memory database server that understands the provisioner's statements.
#[derive(Default)]
pub struct FakeDatabase {
    pub users: Mutex<BTreeSet<String>>,
    pub schemas: Mutex<BTreeSet<String>>,
    pub statements: Mutex<Vec<String>>,
}

impl FakeDatabase {
    pub fn mutations(&self) -> usize {
        self.statements.lock().unwrap().len()
    }
}

impl DatabaseBackend for FakeDatabase {
    async fn user_exists(&self, user: &str) -> Result<bool> {
        Ok(self.users.lock().unwrap().contains(user))
    }

    async fn schema_exists(&self, schema: &str) -> Result<bool> {
        Ok(self.schemas.lock().unwrap().contains(schema))
    }

    async fn execute(&self, statement: &str) -> Result<()> {
        if let Some(rest) = statement.strip_prefix("CREATE USER '") {
            let name = rest.split('\'').next().unwrap_or_default();
            self.users.lock().unwrap().insert(name.to_string());
        } else if let Some(rest) = statement.strip_prefix("CREATE DATABASE `") {
            let name = rest.split('`').next().unwrap_or_default();
            self.schemas.lock().unwrap().insert(name.to_string());
        }
        self.statements.lock().unwrap().push(statement.to_string());
        Ok(())
    }
}

/// In-memory identity catalog with an `admin` tenant and `admin` role.
pub struct FakeIdentity {
    pub users: Mutex<BTreeMap<String, String>>,
    pub roles: Mutex<BTreeMap<String, String>>,
    pub services: Mutex<Vec<String>>,
    pub endpoints: Mutex<Vec<String>>,
    pub bindings: Mutex<Vec<(String, String)>>,
    pub calls: AtomicUsize,
}

impl Default for FakeIdentity {
    fn default() -> Self {
        let roles = BTreeMap::from([("admin".to_string(), "role-admin".to_string())]);
        Self {
            users: Mutex::default(),
            roles: Mutex::new(roles),
            services: Mutex::default(),
            endpoints: Mutex::default(),
            bindings: Mutex::default(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl FakeIdentity {
    /// Number of create/bind operations performed.
    pub fn mutations(&self) -> usize {
        self.users.lock().unwrap().len()
            + self.services.lock().unwrap().len()
            + self.endpoints.lock().unwrap().len()
            + self.bindings.lock().unwrap().len()
    }

    /// Every API call, lookups included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl IdentityApi for FakeIdentity {
    async fn find_tenant(&self, _cred: &AdminCredential, name: &str) -> Result<Option<String>> {
        self.touch();
        Ok((name == "admin").then(|| "tenant-admin".to_string()))
    }

    async fn find_role(&self, _cred: &AdminCredential, name: &str) -> Result<Option<String>> {
        self.touch();
        Ok(self.roles.lock().unwrap().get(name).cloned())
    }

    async fn create_role(&self, _cred: &AdminCredential, name: &str) -> Result<String> {
        self.touch();
        let id = format!("role-{name}");
        self.roles.lock().unwrap().insert(name.to_string(), id.clone());
        Ok(id)
    }

    async fn find_user(&self, _cred: &AdminCredential, name: &str) -> Result<Option<String>> {
        self.touch();
        Ok(self.users.lock().unwrap().get(name).cloned())
    }

    async fn create_user(&self, _cred: &AdminCredential, user: &NewUser<'_>) -> Result<String> {
        self.touch();
        let id = format!("user-{}", user.name);
        self.users
            .lock()
            .unwrap()
            .insert(user.name.to_string(), id.clone());
        Ok(id)
    }

    async fn add_role(
        &self,
        _cred: &AdminCredential,
        _tenant_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<()> {
        self.touch();
        self.bindings
            .lock()
            .unwrap()
            .push((user_id.to_string(), role_id.to_string()));
        Ok(())
    }

    async fn create_service(
        &self,
        _cred: &AdminCredential,
        name: &str,
        _service_type: &str,
        _description: &str,
    ) -> Result<String> {
        self.touch();
        self.services.lock().unwrap().push(name.to_string());
        Ok(format!("svc-{name}"))
    }

    async fn create_endpoint(
        &self,
        _cred: &AdminCredential,
        region: &str,
        service_id: &str,
        urls: &EndpointUrls,
    ) -> Result<String> {
        self.touch();
        let mut endpoints = self.endpoints.lock().unwrap();
        endpoints.push(format!("{region} {service_id} {}", urls.public));
        Ok(format!("ep-{}", endpoints.len()))
    }
}

/// Installer that only creates the install directory.
#[derive(Default)]
pub struct FakeInstaller {
    pub installs: Mutex<Vec<String>>,
}

impl FakeInstaller {
    pub fn count(&self) -> usize {
        self.installs.lock().unwrap().len()
    }
}

impl Installer for FakeInstaller {
    async fn install(&self, descriptor: &ServiceDescriptor, paths: &ServicePaths) -> Result<()> {
        tokio::fs::create_dir_all(&paths.install_dir).await?;
        self.installs.lock().unwrap().push(descriptor.name.clone());
        Ok(())
    }
}

/// Deployment config rooted in `root`, plus `extra` parameters.
pub fn config_in(root: &Path, extra: &[(&str, &str)]) -> DeploymentConfig {
    let mut params: BTreeMap<String, String> = [
        ("DEST_DIR", "opt"),
        ("CONFIG_DIR", "etc"),
        ("LOG_DIR", "log"),
        ("RUN_DIR", "run"),
    ]
    .iter()
    .map(|(k, dir)| (k.to_string(), root.join(dir).display().to_string()))
    .collect();
    params.insert("ADMIN_TOKEN".into(), "bootstrap-token".into());
    for (key, value) in extra {
        params.insert(key.to_string(), value.to_string());
    }
    DeploymentConfig::new(params)
}

/// Whether `pid` is a live, non-zombie process.
pub fn is_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => {
            let state = stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next());
            !matches!(state, Some('Z') | Some('X') | None)
        }
        Err(_) => false,
    }
}
