use std::fmt;
use std::time::Duration;

use reqwest::Method;
use serde_json::{json, Value};

use crate::error::{ProvisionError, Result};
use crate::models::{DeploymentConfig, EndpointUrls, IdentitySpec, ServiceDescriptor};

pub const DEFAULT_REGION: &str = "RegionOne";
pub const DEFAULT_ADMIN_URL: &str = "http://localhost:35357/v2.0";

/// Bootstrap admin token, wiped from memory when dropped.
///
/// Acquire it right before a registration and let it fall out of scope
/// afterwards; drop runs on every exit path, including `?` returns.
pub struct AdminCredential {
    token: String,
}

impl AdminCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn acquire(config: &DeploymentConfig) -> Result<Self> {
        Ok(Self::new(config.get("ADMIN_TOKEN")?))
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Drop for AdminCredential {
    fn drop(&mut self) {
        let mut bytes = std::mem::take(&mut self.token).into_bytes();
        bytes.fill(0);
        std::hint::black_box(&bytes);
    }
}

impl fmt::Debug for AdminCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredential")
            .field("token", &"***")
            .finish()
    }
}

/// Account creation request.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub password: &'a str,
    pub tenant_id: &'a str,
    pub email: Option<&'a str>,
}

/// Administrative operations of the identity catalog.
#[allow(async_fn_in_trait)]
pub trait IdentityApi {
    async fn find_tenant(&self, cred: &AdminCredential, name: &str) -> Result<Option<String>>;
    async fn find_role(&self, cred: &AdminCredential, name: &str) -> Result<Option<String>>;
    async fn create_role(&self, cred: &AdminCredential, name: &str) -> Result<String>;
    async fn find_user(&self, cred: &AdminCredential, name: &str) -> Result<Option<String>>;
    async fn create_user(&self, cred: &AdminCredential, user: &NewUser<'_>) -> Result<String>;
    async fn add_role(
        &self,
        cred: &AdminCredential,
        tenant_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<()>;
    async fn create_service(
        &self,
        cred: &AdminCredential,
        name: &str,
        service_type: &str,
        description: &str,
    ) -> Result<String>;
    async fn create_endpoint(
        &self,
        cred: &AdminCredential,
        region: &str,
        service_id: &str,
        urls: &EndpointUrls,
    ) -> Result<String>;
}

/// HTTP client for a Keystone v2.0-style admin API.
pub struct KeystoneClient {
    http: reqwest::Client,
    admin_url: String,
}

impl KeystoneClient {
    pub fn new(admin_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            admin_url: admin_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &DeploymentConfig) -> Result<Self> {
        Self::new(config.get_or("IDENTITY_ADMIN_URL", DEFAULT_ADMIN_URL)?)
    }

    async fn send(
        &self,
        cred: &AdminCredential,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value> {
        let url = format!("{}{path}", self.admin_url);
        tracing::debug!(%method, %url, "identity request");
        let mut request = self
            .http
            .request(method.clone(), &url)
            .header("X-Auth-Token", cred.token())
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            ProvisionError::IdentityRegistration(format!("{method} {path} failed: {e}"))
        })?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ProvisionError::IdentityRegistration(format!(
                "{method} {path} returned {status}: {}",
                text.trim()
            )));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            ProvisionError::IdentityRegistration(format!("{method} {path}: invalid JSON: {e}"))
        })
    }

    async fn find_by_name(
        &self,
        cred: &AdminCredential,
        path: &str,
        collection: &str,
        name: &str,
    ) -> Result<Option<String>> {
        let body = self.send(cred, Method::GET, path, None).await?;
        Ok(body[collection]
            .as_array()
            .into_iter()
            .flatten()
            .find(|item| item["name"].as_str() == Some(name))
            .and_then(|item| item["id"].as_str())
            .map(str::to_string))
    }

    async fn create(
        &self,
        cred: &AdminCredential,
        path: &str,
        key: &str,
        payload: Value,
    ) -> Result<String> {
        let body = self
            .send(cred, Method::POST, path, Some(json!({ key: payload })))
            .await?;
        body[key]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                ProvisionError::IdentityRegistration(format!("POST {path}: response has no id"))
            })
    }
}

impl IdentityApi for KeystoneClient {
    async fn find_tenant(&self, cred: &AdminCredential, name: &str) -> Result<Option<String>> {
        self.find_by_name(cred, "/tenants", "tenants", name).await
    }

    async fn find_role(&self, cred: &AdminCredential, name: &str) -> Result<Option<String>> {
        self.find_by_name(cred, "/OS-KSADM/roles", "roles", name).await
    }

    async fn create_role(&self, cred: &AdminCredential, name: &str) -> Result<String> {
        self.create(cred, "/OS-KSADM/roles", "role", json!({ "name": name }))
            .await
    }

    async fn find_user(&self, cred: &AdminCredential, name: &str) -> Result<Option<String>> {
        self.find_by_name(cred, "/users", "users", name).await
    }

    async fn create_user(&self, cred: &AdminCredential, user: &NewUser<'_>) -> Result<String> {
        let mut payload = json!({
            "name": user.name,
            "password": user.password,
            "tenantId": user.tenant_id,
            "enabled": true,
        });
        if let Some(email) = user.email {
            payload["email"] = json!(email);
        }
        self.create(cred, "/users", "user", payload).await
    }

    async fn add_role(
        &self,
        cred: &AdminCredential,
        tenant_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<()> {
        let path = format!("/tenants/{tenant_id}/users/{user_id}/roles/OS-KSADM/{role_id}");
        self.send(cred, Method::PUT, &path, None).await.map(|_| ())
    }

    async fn create_service(
        &self,
        cred: &AdminCredential,
        name: &str,
        service_type: &str,
        description: &str,
    ) -> Result<String> {
        self.create(
            cred,
            "/OS-KSADM/services",
            "OS-KSADM:service",
            json!({ "name": name, "type": service_type, "description": description }),
        )
        .await
    }

    async fn create_endpoint(
        &self,
        cred: &AdminCredential,
        region: &str,
        service_id: &str,
        urls: &EndpointUrls,
    ) -> Result<String> {
        self.create(
            cred,
            "/endpoints",
            "endpoint",
            json!({
                "region": region,
                "service_id": service_id,
                "publicurl": urls.public,
                "adminurl": urls.admin,
                "internalurl": urls.internal,
            }),
        )
        .await
    }
}

/// Ids created by one registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityOutcome {
    pub account_id: String,
    pub service_id: String,
    pub endpoint_id: String,
    pub roles_bound: Vec<String>,
    pub roles_created: Vec<String>,
}

/// Where registrations are anchored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationScope {
    pub tenant: String,
    pub admin_role: String,
    pub region: String,
}

impl RegistrationScope {
    pub fn from_config(config: &DeploymentConfig) -> Result<Self> {
        Ok(Self {
            tenant: config.get_or("ADMIN_TENANT", "admin")?.to_string(),
            admin_role: config.get_or("ADMIN_ROLE", "admin")?.to_string(),
            region: config.get_or("REGION", DEFAULT_REGION)?.to_string(),
        })
    }
}

pub struct IdentityRegistrar<'a, A> {
    api: &'a A,
    scope: RegistrationScope,
}

impl<'a, A: IdentityApi> IdentityRegistrar<'a, A> {
    pub fn new(api: &'a A, scope: RegistrationScope) -> Self {
        Self { api, scope }
    }

    /// Register the service's account, roles, catalog entry and endpoints.
    ///
    /// Callers skip this entirely when the account already exists. A failure
    /// part-way leaves what was created in place.
    pub async fn register(
        &self,
        descriptor: &ServiceDescriptor,
        cred: &AdminCredential,
    ) -> Result<IdentityOutcome> {
        let spec: &IdentitySpec = descriptor.identity.as_ref().ok_or_else(|| {
            ProvisionError::IdentityRegistration(format!(
                "service '{}' has no identity section",
                descriptor.name
            ))
        })?;
        let account = descriptor
            .identity_account()
            .unwrap_or(descriptor.name.as_str());
        let scope = &self.scope;

        let tenant_id = self
            .api
            .find_tenant(cred, &scope.tenant)
            .await?
            .ok_or_else(|| {
                ProvisionError::IdentityRegistration(format!("tenant '{}' not found", scope.tenant))
            })?;
        let admin_role_id = self
            .api
            .find_role(cred, &scope.admin_role)
            .await?
            .ok_or_else(|| {
                ProvisionError::IdentityRegistration(format!(
                    "role '{}' not found",
                    scope.admin_role
                ))
            })?;

        tracing::info!(account, tenant = %scope.tenant, "creating identity account");
        let account_id = self
            .api
            .create_user(
                cred,
                &NewUser {
                    name: account,
                    password: &spec.password,
                    tenant_id: &tenant_id,
                    email: spec.email.as_deref(),
                },
            )
            .await?;

        let mut outcome = IdentityOutcome {
            account_id: account_id.clone(),
            ..Default::default()
        };

        self.api
            .add_role(cred, &tenant_id, &account_id, &admin_role_id)
            .await?;
        outcome.roles_bound.push(scope.admin_role.clone());

        for role in &spec.roles {
            if role == &scope.admin_role {
                continue;
            }
            let role_id = self.api.find_role(cred, role).await?.ok_or_else(|| {
                ProvisionError::IdentityRegistration(format!("role '{role}' not found"))
            })?;
            self.api
                .add_role(cred, &tenant_id, &account_id, &role_id)
                .await?;
            outcome.roles_bound.push(role.clone());
        }

        tracing::info!(service_type = %spec.service_type, region = %scope.region, "registering catalog entry");
        outcome.service_id = self
            .api
            .create_service(cred, &descriptor.name, &spec.service_type, &spec.description)
            .await?;
        outcome.endpoint_id = self
            .api
            .create_endpoint(cred, &scope.region, &outcome.service_id, &spec.endpoints)
            .await?;

        for role in &spec.extra_roles {
            let role_id = match self.api.find_role(cred, role).await? {
                Some(id) => id,
                None => {
                    let id = self.api.create_role(cred, role).await?;
                    outcome.roles_created.push(role.clone());
                    id
                }
            };
            self.api
                .add_role(cred, &tenant_id, &account_id, &role_id)
                .await?;
            outcome.roles_bound.push(role.clone());
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeCatalog {
        roles: Mutex<Vec<(String, String)>>,
        calls: Mutex<Vec<String>>,
        fail_endpoint: bool,
    }

    impl FakeCatalog {
        fn with_roles(names: &[&str]) -> Self {
            let fake = Self::default();
            *fake.roles.lock().unwrap() = names
                .iter()
                .map(|n| (n.to_string(), format!("role-{n}")))
                .collect();
            fake
        }

        fn log(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl IdentityApi for FakeCatalog {
        async fn find_tenant(&self, _c: &AdminCredential, name: &str) -> Result<Option<String>> {
            Ok((name == "admin").then(|| "tenant-admin".to_string()))
        }

        async fn find_role(&self, _c: &AdminCredential, name: &str) -> Result<Option<String>> {
            let roles = self.roles.lock().unwrap();
            Ok(roles.iter().find(|(n, _)| n == name).map(|(_, id)| id.clone()))
        }

        async fn create_role(&self, _c: &AdminCredential, name: &str) -> Result<String> {
            self.log(format!("create_role {name}"));
            let id = format!("role-{name}");
            self.roles.lock().unwrap().push((name.to_string(), id.clone()));
            Ok(id)
        }

        async fn find_user(&self, _c: &AdminCredential, _name: &str) -> Result<Option<String>> {
            Ok(None)
        }

        async fn create_user(&self, _c: &AdminCredential, user: &NewUser<'_>) -> Result<String> {
            self.log(format!("create_user {} {}", user.name, user.tenant_id));
            Ok(format!("user-{}", user.name))
        }

        async fn add_role(
            &self,
            _c: &AdminCredential,
            tenant_id: &str,
            user_id: &str,
            role_id: &str,
        ) -> Result<()> {
            self.log(format!("add_role {tenant_id} {user_id} {role_id}"));
            Ok(())
        }

        async fn create_service(
            &self,
            _c: &AdminCredential,
            name: &str,
            service_type: &str,
            _description: &str,
        ) -> Result<String> {
            self.log(format!("create_service {name} {service_type}"));
            Ok(format!("svc-{name}"))
        }

        async fn create_endpoint(
            &self,
            _c: &AdminCredential,
            region: &str,
            service_id: &str,
            urls: &EndpointUrls,
        ) -> Result<String> {
            if self.fail_endpoint {
                return Err(ProvisionError::IdentityRegistration("503".into()));
            }
            self.log(format!("create_endpoint {region} {service_id} {}", urls.public));
            Ok("ep-1".to_string())
        }
    }

    fn swift() -> ServiceDescriptor {
        serde_yaml::from_str(
            r#"
name: swift
identity:
  serviceType: object-store
  description: Object Storage
  password: pw
  extraRoles: [ResellerAdmin]
  endpoints:
    public: http://h:8080/v1/AUTH_$(tenant_id)s
    admin: http://h:8080/
    internal: http://h:8080/v1/AUTH_$(tenant_id)s
"#,
        )
        .unwrap()
    }

    fn scope() -> RegistrationScope {
        RegistrationScope::from_config(&DeploymentConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn registers_account_service_endpoint_and_extra_role() {
        let api = FakeCatalog::with_roles(&["admin"]);
        let registrar = IdentityRegistrar::new(&api, scope());
        let cred = AdminCredential::new("tok");
        let outcome = registrar.register(&swift(), &cred).await.unwrap();

        assert_eq!(outcome.account_id, "user-swift");
        assert_eq!(outcome.service_id, "svc-swift");
        assert_eq!(outcome.endpoint_id, "ep-1");
        assert_eq!(outcome.roles_bound, vec!["admin", "ResellerAdmin"]);
        assert_eq!(outcome.roles_created, vec!["ResellerAdmin"]);

        let calls = api.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                "create_user swift tenant-admin".to_string(),
                "add_role tenant-admin user-swift role-admin".to_string(),
                "create_service swift object-store".to_string(),
                "create_endpoint RegionOne svc-swift http://h:8080/v1/AUTH_$(tenant_id)s"
                    .to_string(),
                "create_role ResellerAdmin".to_string(),
                "add_role tenant-admin user-swift role-ResellerAdmin".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn missing_admin_role_fails_before_mutation() {
        let api = FakeCatalog::with_roles(&[]);
        let registrar = IdentityRegistrar::new(&api, scope());
        let err = registrar
            .register(&swift(), &AdminCredential::new("tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::IdentityRegistration(m) if m.contains("admin")));
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn endpoint_failure_leaves_account_in_place() {
        let api = FakeCatalog {
            fail_endpoint: true,
            ..FakeCatalog::with_roles(&["admin"])
        };
        let registrar = IdentityRegistrar::new(&api, scope());
        assert!(registrar
            .register(&swift(), &AdminCredential::new("tok"))
            .await
            .is_err());
        let calls = api.calls.lock().unwrap();
        assert!(calls.iter().any(|c| c.starts_with("create_user")));
        assert!(!calls.iter().any(|c| c.starts_with("create_endpoint")));
    }

    #[test]
    fn credential_requires_token_and_hides_it() {
        assert!(matches!(
            AdminCredential::acquire(&DeploymentConfig::default()),
            Err(ProvisionError::MissingParameter(k)) if k == "ADMIN_TOKEN"
        ));
        let cred = AdminCredential::new("super-secret");
        assert_eq!(cred.token(), "super-secret");
        assert!(!format!("{cred:?}").contains("super-secret"));
    }

    #[tokio::test]
    async fn keystone_client_looks_up_by_name() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2.0/tenants")
            .match_header("x-auth-token", "tok")
            .expect(2)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"tenants":[{"id":"t1","name":"demo"},{"id":"t2","name":"admin"}]}"#)
            .create_async()
            .await;

        let client = KeystoneClient::new(&format!("{}/v2.0/", server.url())).unwrap();
        let cred = AdminCredential::new("tok");
        assert_eq!(
            client.find_tenant(&cred, "admin").await.unwrap().as_deref(),
            Some("t2")
        );
        assert_eq!(client.find_tenant(&cred, "nope").await.unwrap(), None);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn keystone_client_creates_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2.0/endpoints")
            .match_body(mockito::Matcher::PartialJson(json!({
                "endpoint": {
                    "region": "RegionOne",
                    "service_id": "s1",
                    "publicurl": "http://h:9292/v1",
                }
            })))
            .with_status(200)
            .with_body(r#"{"endpoint":{"id":"e1"}}"#)
            .create_async()
            .await;

        let client = KeystoneClient::new(&format!("{}/v2.0", server.url())).unwrap();
        let urls = EndpointUrls {
            public: "http://h:9292/v1".into(),
            admin: "http://h:9292/v1".into(),
            internal: "http://h:9292/v1".into(),
        };
        let id = client
            .create_endpoint(&AdminCredential::new("tok"), "RegionOne", "s1", &urls)
            .await
            .unwrap();
        assert_eq!(id, "e1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn keystone_client_surfaces_http_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v2.0/users")
            .with_status(409)
            .with_body("conflict")
            .create_async()
            .await;

        let client = KeystoneClient::new(&format!("{}/v2.0", server.url())).unwrap();
        let err = client
            .create_user(
                &AdminCredential::new("tok"),
                &NewUser {
                    name: "nova",
                    password: "pw",
                    tenant_id: "t1",
                    email: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::IdentityRegistration(m) if m.contains("409")));
    }
}
