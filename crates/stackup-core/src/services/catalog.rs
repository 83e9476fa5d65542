use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::{ProvisionError, Result};
use crate::models::{DeploymentConfig, ServiceDescriptor};
use crate::services::template;

/// Fields left unexpanded by `resolve`. They are rendered later with the
/// per-service substitution map, which includes derived keys.
const LATE_BOUND_FIELDS: &[&str] = &["templates", "processes"];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogFile {
    services: Vec<ServiceDescriptor>,
}

/// The declared services plus the directory their template paths are relative to.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub services: Vec<ServiceDescriptor>,
    pub template_root: PathBuf,
}

impl Catalog {
    /// Load and validate a catalog YAML file.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ProvisionError::ConfigNotFound(path.to_path_buf()));
        }
        let content = tokio::fs::read_to_string(path).await?;
        let template_root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_yaml(&content, template_root)
    }

    pub fn from_yaml(content: &str, template_root: PathBuf) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(content)?;
        if let Err(errors) = validate(&file.services) {
            return Err(ProvisionError::InvalidCatalog(errors.join("; ")));
        }
        Ok(Self {
            services: file.services,
            template_root,
        })
    }

    pub fn get(&self, name: &str) -> Result<&ServiceDescriptor> {
        self.services
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ProvisionError::ServiceNotFound(name.to_string()))
    }

    /// Services in provisioning order, optionally restricted to `names`.
    pub fn plan(&self, names: &[String]) -> Result<Vec<&ServiceDescriptor>> {
        for name in names {
            self.get(name)?;
        }
        let ordered = order(&self.services)?;
        if names.is_empty() {
            return Ok(ordered);
        }
        Ok(ordered
            .into_iter()
            .filter(|s| names.iter().any(|n| n == &s.name))
            .collect())
    }
}

/// Validate a set of service descriptors for completeness.
pub fn validate(services: &[ServiceDescriptor]) -> std::result::Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if services.is_empty() {
        errors.push("catalog must declare at least one service".to_string());
    }

    let mut seen = BTreeSet::new();
    for (i, svc) in services.iter().enumerate() {
        if svc.name.trim().is_empty() {
            errors.push(format!("service {i} has an empty name"));
        } else if !seen.insert(svc.name.as_str()) {
            errors.push(format!("service '{}' is declared twice", svc.name));
        }
    }

    for svc in services {
        for dep in &svc.depends_on {
            if dep == &svc.name {
                errors.push(format!("service '{}' depends on itself", svc.name));
            } else if !seen.contains(dep.as_str()) {
                errors.push(format!(
                    "service '{}' depends on unknown service '{dep}'",
                    svc.name
                ));
            }
        }
        for (i, process) in svc.processes.iter().enumerate() {
            if process.binary.trim().is_empty() {
                errors.push(format!("service '{}' process {i} has no binary", svc.name));
            }
        }
        if svc.provides_identity && svc.identity.is_some() {
            errors.push(format!(
                "service '{}' provides identity and cannot register itself; declare a separate service that depends on it",
                svc.name
            ));
        }
        if let Some(identity) = &svc.identity {
            if identity.service_type.trim().is_empty() {
                errors.push(format!("service '{}' identity has no serviceType", svc.name));
            }
        }
        if let Some(readiness) = &svc.readiness {
            if readiness.timeout_secs == 0 || readiness.interval_ms == 0 {
                errors.push(format!(
                    "service '{}' readiness interval and timeout must be non-zero",
                    svc.name
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Global provisioning order.
///
/// Identity providers come before every other service except the ones they
/// themselves depend on, explicit `dependsOn` edges are honoured, and ties
/// keep declaration order.
pub fn order(services: &[ServiceDescriptor]) -> Result<Vec<&ServiceDescriptor>> {
    let index: HashMap<&str, usize> = services
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.as_str(), i))
        .collect();

    let mut prerequisites: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); services.len()];
    for (i, svc) in services.iter().enumerate() {
        for dep in &svc.depends_on {
            let &j = index.get(dep.as_str()).ok_or_else(|| {
                ProvisionError::InvalidCatalog(format!(
                    "service '{}' depends on unknown service '{dep}'",
                    svc.name
                ))
            })?;
            prerequisites[i].insert(j);
        }
    }

    let explicit = prerequisites.clone();
    for (j, provider) in services.iter().enumerate() {
        if !provider.provides_identity {
            continue;
        }
        let upstream = transitive(&explicit, j);
        for (i, svc) in services.iter().enumerate() {
            if !svc.provides_identity && !upstream.contains(&i) {
                prerequisites[i].insert(j);
            }
        }
    }

    let mut done = vec![false; services.len()];
    let mut ordered = Vec::with_capacity(services.len());
    while ordered.len() < services.len() {
        let next = (0..services.len())
            .find(|&i| !done[i] && prerequisites[i].iter().all(|&j| done[j]));
        match next {
            Some(i) => {
                done[i] = true;
                ordered.push(&services[i]);
            }
            None => {
                let stuck: Vec<&str> = services
                    .iter()
                    .zip(&done)
                    .filter(|(_, d)| !**d)
                    .map(|(s, _)| s.name.as_str())
                    .collect();
                return Err(ProvisionError::InvalidCatalog(format!(
                    "dependency cycle between: {}",
                    stuck.join(", ")
                )));
            }
        }
    }
    Ok(ordered)
}

/// Everything `start` depends on, directly or not.
fn transitive(prerequisites: &[BTreeSet<usize>], start: usize) -> BTreeSet<usize> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<usize> = prerequisites[start].iter().copied().collect();
    while let Some(i) = stack.pop() {
        if seen.insert(i) {
            stack.extend(prerequisites[i].iter().copied());
        }
    }
    seen
}

/// Expand `%KEY%` references to deployment parameters in a descriptor.
///
/// A reference to a key the config does not define is a `MissingParameter`.
pub fn resolve(descriptor: &ServiceDescriptor, config: &DeploymentConfig) -> Result<ServiceDescriptor> {
    let mut value = serde_yaml::to_value(descriptor)?;
    if let Value::Mapping(map) = &mut value {
        for (key, field) in map.iter_mut() {
            let late = key
                .as_str()
                .is_some_and(|k| LATE_BOUND_FIELDS.contains(&k));
            if !late {
                expand(field, config.params(), &descriptor.name)?;
            }
        }
    }
    Ok(serde_yaml::from_value(value)?)
}

fn expand(value: &mut Value, params: &BTreeMap<String, String>, service: &str) -> Result<()> {
    match value {
        Value::String(s) => {
            *s = template::render_str(s, params, service).map_err(|e| match e {
                ProvisionError::UnresolvedPlaceholder { placeholder, .. } => {
                    ProvisionError::MissingParameter(placeholder)
                }
                other => other,
            })?;
        }
        Value::Sequence(items) => {
            for item in items {
                expand(item, params, service)?;
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                expand(item, params, service)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
services:
  - name: nova
    dependsOn: [glance]
    identity:
      serviceType: compute
      password: "%SERVICE_PASSWORD%"
      endpoints:
        public: "http://%HOST%:8774/v2"
        admin: "http://%HOST%:8774/v2"
        internal: "http://%HOST%:8774/v2"
    processes:
      - binary: nova-api
        args: ["--config-file", "%SERVICE_CONFIG_DIR%/nova.conf"]
  - name: glance
    database:
      password: "%GLANCE_DB_PASS%"
  - name: keystone
    providesIdentity: true
    readiness:
      url: "http://%HOST%:5000/v2.0/"
"#;

    fn catalog() -> Catalog {
        Catalog::from_yaml(CATALOG, PathBuf::from("/srv/catalog")).unwrap()
    }

    fn names(services: &[&ServiceDescriptor]) -> Vec<String> {
        services.iter().map(|s| s.name.clone()).collect()
    }

    #[test]
    fn identity_provider_goes_first_then_dependencies() {
        let cat = catalog();
        let ordered = cat.plan(&[]).unwrap();
        assert_eq!(names(&ordered), vec!["keystone", "glance", "nova"]);
    }

    #[test]
    fn plan_subset_keeps_global_order() {
        let cat = catalog();
        let ordered = cat.plan(&["nova".into(), "keystone".into()]).unwrap();
        assert_eq!(names(&ordered), vec!["keystone", "nova"]);
        assert!(matches!(
            cat.plan(&["swift".into()]),
            Err(ProvisionError::ServiceNotFound(n)) if n == "swift"
        ));
    }

    #[test]
    fn cycles_are_rejected() {
        let yaml = r#"
services:
  - name: a
    dependsOn: [b]
  - name: b
    dependsOn: [a]
"#;
        let cat = Catalog::from_yaml(yaml, PathBuf::from(".")).unwrap();
        let err = cat.plan(&[]).unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidCatalog(msg) if msg.contains("cycle")));
    }

    #[test]
    fn identity_provider_may_follow_its_own_dependencies() {
        let yaml = r#"
services:
  - name: swift
  - name: keystone
    providesIdentity: true
    dependsOn: [mysql]
  - name: mysql
"#;
        let cat = Catalog::from_yaml(yaml, PathBuf::from(".")).unwrap();
        assert_eq!(
            names(&cat.plan(&[]).unwrap()),
            vec!["mysql", "keystone", "swift"]
        );
    }

    #[test]
    fn identity_provider_cannot_register_itself() {
        let yaml = r#"
services:
  - name: keystone
    providesIdentity: true
    identity:
      serviceType: identity
      password: x
      endpoints: { public: p, admin: a, internal: i }
"#;
        let err = Catalog::from_yaml(yaml, PathBuf::from(".")).unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidCatalog(msg) if msg.contains("provides identity")));
    }

    #[test]
    fn validation_collects_errors() {
        let yaml = r#"
services:
  - name: a
    dependsOn: [missing, a]
  - name: a
    processes:
      - binary: ""
"#;
        match Catalog::from_yaml(yaml, PathBuf::from(".")) {
            Err(ProvisionError::InvalidCatalog(msg)) => {
                assert!(msg.contains("declared twice"));
                assert!(msg.contains("unknown service 'missing'"));
                assert!(msg.contains("depends on itself"));
                assert!(msg.contains("has no binary"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn resolve_expands_config_but_not_late_fields() {
        let cat = catalog();
        let config = DeploymentConfig::new(
            [("HOST", "10.0.0.5"), ("SERVICE_PASSWORD", "pw")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        let nova = resolve(cat.get("nova").unwrap(), &config).unwrap();
        let identity = nova.identity.unwrap();
        assert_eq!(identity.password, "pw");
        assert_eq!(identity.endpoints.public, "http://10.0.0.5:8774/v2");
        assert_eq!(
            nova.processes[0].args[1],
            "%SERVICE_CONFIG_DIR%/nova.conf"
        );
    }

    #[test]
    fn resolve_reports_missing_parameter() {
        let cat = catalog();
        let err = resolve(cat.get("glance").unwrap(), &DeploymentConfig::default()).unwrap_err();
        assert!(matches!(err, ProvisionError::MissingParameter(k) if k == "GLANCE_DB_PASS"));
    }

    #[tokio::test]
    async fn load_sets_template_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.yaml");
        std::fs::write(&path, CATALOG).unwrap();
        let cat = Catalog::load(&path).await.unwrap();
        assert_eq!(cat.template_root, dir.path());
        assert_eq!(cat.services.len(), 3);
    }
}
