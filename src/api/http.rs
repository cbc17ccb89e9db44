// Copyright (c) 2025 - Cowboy AI, Inc.
//! HTTP control-plane adapter
//!
//! Speaks the agent HTTP API through each network's forward proxy. This is
//! the only place response bodies are matched against known message text to
//! recover an [`ErrorKind`].

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::error::{ApiError, ApiResult, ErrorKind};
use super::types::*;
use super::{ApiTarget, ControlPlane, ControlPlaneConnector};
use crate::domain::{ConfigEntry, Resource, ResourceId};

const TOKEN_HEADER: &str = "X-Consul-Token";

/// HTTP adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Host the forward proxies listen on
    #[serde(default = "default_proxy_host")]
    pub proxy_host: String,
}

fn default_timeout() -> u64 {
    30
}

fn default_proxy_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            proxy_host: default_proxy_host(),
        }
    }
}

/// Builds [`HttpControlPlane`] clients
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    config: HttpConfig,
}

impl HttpConnector {
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }
}

impl ControlPlaneConnector for HttpConnector {
    fn connect(&self, target: &ApiTarget) -> ApiResult<Arc<dyn ControlPlane>> {
        let mut builder = Client::builder().timeout(Duration::from_secs(self.config.timeout_secs));
        if let Some(port) = target.proxy_port {
            let proxy = reqwest::Proxy::http(format!("http://{}:{port}", self.config.proxy_host))
                .map_err(|e| ApiError::new(ErrorKind::Invalid, format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::new(ErrorKind::Transport, format!("failed to create HTTP client: {e}")))?;

        debug!(cluster = %target.cluster, node = %target.node, address = %target.address, "built control-plane client");
        Ok(Arc::new(HttpControlPlane {
            base_url: format!("http://{}", target.address),
            token: target.token.clone(),
            client,
        }))
    }
}

/// Control-plane client over HTTP
pub struct HttpControlPlane {
    base_url: String,
    token: Option<String>,
    client: Client,
}

/// Map a failed response onto an error kind.
pub fn classify(status: StatusCode, body: &str) -> ErrorKind {
    if body.contains("ACL not found") {
        return ErrorKind::AclNotFound;
    }
    if body.contains("ACL system must be bootstrapped")
        || body.contains("The ACL system is currently in legacy mode")
        || body.contains("ACL support disabled")
    {
        return ErrorKind::NotBootstrapped;
    }
    if body.contains("Intentions are read only while being upgraded")
        || body.contains("intentions are being migrated")
    {
        return ErrorKind::IntentionsMigrating;
    }
    if body.contains("No cluster leader") {
        return ErrorKind::NoLeader;
    }
    if body.contains("transport: Error while dialing") || body.contains("resolver") {
        return ErrorKind::Transport;
    }
    match status {
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::CONFLICT => ErrorKind::Conflict,
        StatusCode::GATEWAY_TIMEOUT => ErrorKind::GatewayTimeout,
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => ErrorKind::Forbidden,
        StatusCode::BAD_REQUEST => ErrorKind::Invalid,
        _ => ErrorKind::Other,
    }
}

fn transport(err: reqwest::Error) -> ApiError {
    ApiError::new(ErrorKind::Transport, err.to_string())
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PeeringTokenResponse {
    peering_token: String,
}

#[derive(Deserialize)]
struct AreaResponse {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Serialize)]
struct ResourceBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    owner: Option<&'a ResourceId>,
    data: &'a serde_json::Value,
}

impl HttpControlPlane {
    fn request(&self, method: Method, path: &str, opts: &RequestOptions) -> RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.client.request(method, url);
        if let Some(token) = opts.token.as_ref().or(self.token.as_ref()) {
            req = req.header(TOKEN_HEADER, token);
        }
        if let Some(partition) = &opts.partition {
            req = req.query(&[("partition", partition)]);
        }
        if let Some(ns) = &opts.namespace {
            req = req.query(&[("ns", ns)]);
        }
        req
    }

    async fn send(&self, req: RequestBuilder) -> ApiResult<Response> {
        let resp = req.send().await.map_err(transport)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        trace!(%status, %body, "control-plane call failed");
        Err(ApiError::new(classify(status, &body), body.trim().to_string()).with_status(status.as_u16()))
    }

    async fn json<T: DeserializeOwned>(&self, req: RequestBuilder) -> ApiResult<T> {
        self.send(req)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::new(ErrorKind::Other, format!("invalid response body: {e}")))
    }

    async fn ok(&self, req: RequestBuilder) -> ApiResult<()> {
        self.send(req).await.map(drop)
    }

    /// 404 reads as absent
    async fn optional<T: DeserializeOwned>(&self, req: RequestBuilder) -> ApiResult<Option<T>> {
        match self.json(req).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is(ErrorKind::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn resource_path(id: &ResourceId) -> String {
        format!(
            "/api/{}/{}",
            id.resource_type.path(),
            urlencoding::encode(&id.name)
        )
    }

    fn resource_opts(id: &ResourceId) -> RequestOptions {
        RequestOptions::tenancy(&id.tenancy.partition, &id.tenancy.namespace)
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn acl_bootstrap(&self) -> ApiResult<AclToken> {
        let req = self.request(Method::PUT, "/v1/acl/bootstrap", &RequestOptions::default());
        self.json(req).await
    }

    async fn acl_token_read_self(&self) -> ApiResult<AclToken> {
        let req = self.request(Method::GET, "/v1/acl/token/self", &RequestOptions::default());
        self.json(req).await
    }

    async fn acl_token_list(&self, opts: &RequestOptions) -> ApiResult<Vec<AclToken>> {
        self.json(self.request(Method::GET, "/v1/acl/tokens", opts)).await
    }

    async fn acl_token_create(&self, token: &AclToken, opts: &RequestOptions) -> ApiResult<AclToken> {
        self.json(self.request(Method::PUT, "/v1/acl/token", opts).json(token))
            .await
    }

    async fn acl_token_update(&self, token: &AclToken, opts: &RequestOptions) -> ApiResult<AclToken> {
        let path = format!("/v1/acl/token/{}", token.accessor_id);
        self.json(self.request(Method::PUT, &path, opts).json(token)).await
    }

    async fn acl_policy_read_by_name(
        &self,
        name: &str,
        opts: &RequestOptions,
    ) -> ApiResult<Option<AclPolicy>> {
        let path = format!("/v1/acl/policy/name/{}", urlencoding::encode(name));
        self.optional(self.request(Method::GET, &path, opts)).await
    }

    async fn acl_policy_list(&self, opts: &RequestOptions) -> ApiResult<Vec<AclPolicy>> {
        self.json(self.request(Method::GET, "/v1/acl/policies", opts)).await
    }

    async fn acl_policy_create(&self, policy: &AclPolicy, opts: &RequestOptions) -> ApiResult<AclPolicy> {
        self.json(self.request(Method::PUT, "/v1/acl/policy", opts).json(policy))
            .await
    }

    async fn acl_policy_update(&self, policy: &AclPolicy, opts: &RequestOptions) -> ApiResult<AclPolicy> {
        let path = format!("/v1/acl/policy/{}", policy.id);
        self.json(self.request(Method::PUT, &path, opts).json(policy)).await
    }

    async fn partition_list(&self) -> ApiResult<Vec<AdminPartition>> {
        let req = self.request(Method::GET, "/v1/partitions", &RequestOptions::default());
        self.json(req).await
    }

    async fn partition_create(&self, partition: &AdminPartition) -> ApiResult<AdminPartition> {
        let req = self
            .request(Method::PUT, "/v1/partition", &RequestOptions::default())
            .json(partition);
        self.json(req).await
    }

    async fn namespace_list(&self, opts: &RequestOptions) -> ApiResult<Vec<Namespace>> {
        self.json(self.request(Method::GET, "/v1/namespaces", opts)).await
    }

    async fn namespace_create(&self, ns: &Namespace, opts: &RequestOptions) -> ApiResult<Namespace> {
        self.json(self.request(Method::PUT, "/v1/namespace", opts).json(ns))
            .await
    }

    async fn namespace_update(&self, ns: &Namespace, opts: &RequestOptions) -> ApiResult<Namespace> {
        let path = format!("/v1/namespace/{}", urlencoding::encode(&ns.name));
        self.json(self.request(Method::PUT, &path, opts).json(ns)).await
    }

    async fn config_entry_set(&self, entry: &ConfigEntry) -> ApiResult<()> {
        let opts = RequestOptions {
            partition: Some(entry.partition.clone()).filter(|p| !p.is_empty()),
            namespace: Some(entry.namespace.clone()).filter(|n| !n.is_empty()),
            token: None,
        };
        self.ok(self.request(Method::PUT, "/v1/config", &opts).json(entry))
            .await
    }

    async fn resource_write(&self, resource: &Resource) -> ApiResult<()> {
        let req = self
            .request(
                Method::PUT,
                &Self::resource_path(&resource.id),
                &Self::resource_opts(&resource.id),
            )
            .json(&ResourceBody {
                owner: resource.owner.as_ref(),
                data: &resource.data,
            });
        self.ok(req).await
    }

    async fn resource_delete(&self, id: &ResourceId) -> ApiResult<()> {
        let req = self.request(Method::DELETE, &Self::resource_path(id), &Self::resource_opts(id));
        match self.ok(req).await {
            Err(err) if err.is(ErrorKind::NotFound) => Ok(()),
            other => other,
        }
    }

    async fn catalog_register(
        &self,
        reg: &CatalogRegistration,
        opts: &RequestOptions,
    ) -> ApiResult<()> {
        self.ok(self.request(Method::PUT, "/v1/catalog/register", opts).json(reg))
            .await
    }

    async fn catalog_deregister(
        &self,
        dereg: &CatalogDeregistration,
        opts: &RequestOptions,
    ) -> ApiResult<()> {
        self.ok(self.request(Method::PUT, "/v1/catalog/deregister", opts).json(dereg))
            .await
    }

    async fn catalog_nodes(&self, opts: &RequestOptions) -> ApiResult<Vec<CatalogNode>> {
        self.json(self.request(Method::GET, "/v1/catalog/nodes", opts)).await
    }

    async fn catalog_service(
        &self,
        service: &str,
        opts: &RequestOptions,
    ) -> ApiResult<Vec<CatalogService>> {
        let path = format!("/v1/catalog/service/{}", urlencoding::encode(service));
        self.json(self.request(Method::GET, &path, opts)).await
    }

    async fn health_checks(&self, service: &str, opts: &RequestOptions) -> ApiResult<Vec<HealthCheck>> {
        let path = format!("/v1/health/checks/{}", urlencoding::encode(service));
        self.json(self.request(Method::GET, &path, opts)).await
    }

    async fn agent_service_register(
        &self,
        reg: &AgentServiceRegistration,
        opts: &RequestOptions,
    ) -> ApiResult<()> {
        self.ok(self.request(Method::PUT, "/v1/agent/service/register", opts).json(reg))
            .await
    }

    async fn agent_join(&self, address: &str) -> ApiResult<()> {
        let path = format!("/v1/agent/join/{}", urlencoding::encode(address));
        self.ok(self.request(Method::PUT, &path, &RequestOptions::default()))
            .await
    }

    async fn kv_put(&self, key: &str, value: &[u8], opts: &RequestOptions) -> ApiResult<()> {
        let path = format!("/v1/kv/{key}");
        self.ok(self.request(Method::PUT, &path, opts).body(value.to_vec()))
            .await
    }

    async fn kv_get(&self, key: &str, opts: &RequestOptions) -> ApiResult<Option<Vec<u8>>> {
        let path = format!("/v1/kv/{key}");
        let req = self.request(Method::GET, &path, opts).query(&[("raw", "")]);
        match self.send(req).await {
            Ok(resp) => resp
                .bytes()
                .await
                .map(|b| Some(b.to_vec()))
                .map_err(transport),
            Err(err) if err.is(ErrorKind::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn status_leader(&self) -> ApiResult<String> {
        let req = self.request(Method::GET, "/v1/status/leader", &RequestOptions::default());
        self.json(req).await
    }

    async fn status_peers(&self) -> ApiResult<Vec<String>> {
        let req = self.request(Method::GET, "/v1/status/peers", &RequestOptions::default());
        self.json(req).await
    }

    async fn snapshot_save(&self) -> ApiResult<Vec<u8>> {
        let req = self.request(Method::GET, "/v1/snapshot", &RequestOptions::default());
        let resp = self.send(req).await?;
        resp.bytes().await.map(|b| b.to_vec()).map_err(transport)
    }

    async fn snapshot_restore(&self, snapshot: &[u8]) -> ApiResult<()> {
        let req = self
            .request(Method::PUT, "/v1/snapshot", &RequestOptions::default())
            .body(snapshot.to_vec());
        self.ok(req).await
    }

    async fn peering_generate_token(&self, req: &PeeringGenerateTokenRequest) -> ApiResult<String> {
        let http = self
            .request(Method::POST, "/v1/peering/token", &RequestOptions::default())
            .json(req);
        let resp: PeeringTokenResponse = self.json(http).await?;
        Ok(resp.peering_token)
    }

    async fn peering_establish(&self, req: &PeeringEstablishRequest) -> ApiResult<()> {
        let http = self
            .request(Method::POST, "/v1/peering/establish", &RequestOptions::default())
            .json(req);
        self.ok(http).await
    }

    async fn peering_read(&self, name: &str, opts: &RequestOptions) -> ApiResult<Option<PeeringInfo>> {
        let path = format!("/v1/peering/{}", urlencoding::encode(name));
        self.optional(self.request(Method::GET, &path, opts)).await
    }

    async fn network_area_create(&self, area: &NetworkAreaSpec) -> ApiResult<String> {
        let req = self
            .request(Method::POST, "/v1/operator/area", &RequestOptions::default())
            .json(area);
        let resp: AreaResponse = self.json(req).await?;
        Ok(resp.id)
    }

    async fn network_area_join(&self, area_id: &str, addresses: &[String]) -> ApiResult<()> {
        let path = format!("/v1/operator/area/{}/join", urlencoding::encode(area_id));
        let req = self
            .request(Method::PUT, &path, &RequestOptions::default())
            .json(addresses);
        self.ok(req).await
    }
}
