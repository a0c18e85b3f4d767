//! REST implementation of [`ComputeGateway`]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::ComputeError;
use crate::gateway::ComputeGateway;
use crate::types::{
    Instance, InstanceGroup, InstanceReference, InstanceWithNamedPorts, Operation, TargetPool,
};

/// Default Compute Engine v1 endpoint
pub const DEFAULT_COMPUTE_ENDPOINT: &str = "https://compute.googleapis.com/compute/v1";

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Supplies OAuth access tokens for API calls
///
/// Token acquisition (metadata server, workload identity, key files) lives
/// outside this crate.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return a currently valid bearer token
    async fn token(&self) -> Result<String, ComputeError>;
}

/// Fixed token, for short-lived tools and tests
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap an already issued token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(..)")
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String, ComputeError> {
        Ok(self.0.clone())
    }
}

/// Client configuration
#[derive(Clone, Debug)]
pub struct ComputeClientConfig {
    /// API base URL, without trailing slash
    pub endpoint: String,
    /// Timeout applied to every request
    pub request_timeout: Duration,
}

impl Default for ComputeClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_COMPUTE_ENDPOINT.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Compute Engine client over the v1 REST API
#[derive(Clone)]
pub struct ComputeClient {
    http: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn TokenSource>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct InstancesRequest {
    instances: Vec<InstanceReference>,
}

impl InstancesRequest {
    fn new(links: &[String]) -> Self {
        Self {
            instances: links
                .iter()
                .map(|l| InstanceReference { instance: l.clone() })
                .collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListInstancesRequest {
    instance_state: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListInstancesPage {
    #[serde(default)]
    items: Vec<InstanceWithNamedPorts>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl ComputeClient {
    /// Build a client with the given configuration and token source
    pub fn new(
        config: ComputeClientConfig,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, ComputeError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.endpoint, path);
        trace!(%method, %url, "Compute API request");
        self.http.request(method, url)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ComputeError> {
        let token = self.tokens.token().await?;
        let resp = req.bearer_auth(token).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }

        let code = status.as_u16();
        let body = resp.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(parsed) if !parsed.error.message.is_empty() => parsed.error.message,
            _ if !body.is_empty() => body,
            _ => format!("got HTTP response code {}", code),
        };
        debug!(code, message = %message, "Compute API returned an error");
        Err(ComputeError::from_status(code, message))
    }
}

#[async_trait]
impl ComputeGateway for ComputeClient {
    async fn insert_instance(
        &self,
        project: &str,
        zone: &str,
        instance: &Instance,
    ) -> Result<Operation, ComputeError> {
        let req = self
            .request(Method::POST, &format!("projects/{}/zones/{}/instances", project, zone))
            .json(instance);
        self.send(req).await
    }

    async fn get_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<Instance, ComputeError> {
        let req = self.request(
            Method::GET,
            &format!("projects/{}/zones/{}/instances/{}", project, zone, name),
        );
        self.send(req).await
    }

    async fn delete_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<Operation, ComputeError> {
        let req = self.request(
            Method::DELETE,
            &format!("projects/{}/zones/{}/instances/{}", project, zone, name),
        );
        self.send(req).await
    }

    async fn list_group_instances(
        &self,
        project: &str,
        zone: &str,
        group: &str,
    ) -> Result<Vec<String>, ComputeError> {
        let path = format!(
            "projects/{}/zones/{}/instanceGroups/{}/listInstances",
            project, zone, group
        );
        let mut links = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self
                .request(Method::POST, &path)
                .json(&ListInstancesRequest {
                    instance_state: "RUNNING",
                });
            if let Some(ref token) = page_token {
                req = req.query(&[("pageToken", token)]);
            }

            let page: ListInstancesPage = self.send(req).await?;
            links.extend(page.items.into_iter().map(|i| i.instance));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(links),
            }
        }
    }

    async fn add_group_instances(
        &self,
        project: &str,
        zone: &str,
        group: &str,
        instances: &[String],
    ) -> Result<Operation, ComputeError> {
        let req = self
            .request(
                Method::POST,
                &format!(
                    "projects/{}/zones/{}/instanceGroups/{}/addInstances",
                    project, zone, group
                ),
            )
            .json(&InstancesRequest::new(instances));
        self.send(req).await
    }

    async fn remove_group_instances(
        &self,
        project: &str,
        zone: &str,
        group: &str,
        instances: &[String],
    ) -> Result<Operation, ComputeError> {
        let req = self
            .request(
                Method::POST,
                &format!(
                    "projects/{}/zones/{}/instanceGroups/{}/removeInstances",
                    project, zone, group
                ),
            )
            .json(&InstancesRequest::new(instances));
        self.send(req).await
    }

    async fn insert_group(
        &self,
        project: &str,
        zone: &str,
        group: &InstanceGroup,
    ) -> Result<Operation, ComputeError> {
        let req = self
            .request(
                Method::POST,
                &format!("projects/{}/zones/{}/instanceGroups", project, zone),
            )
            .json(group);
        self.send(req).await
    }

    async fn target_pool_instances(
        &self,
        project: &str,
        region: &str,
        pool: &str,
    ) -> Result<Vec<String>, ComputeError> {
        let req = self.request(
            Method::GET,
            &format!("projects/{}/regions/{}/targetPools/{}", project, region, pool),
        );
        let pool: TargetPool = self.send(req).await?;
        Ok(pool.instances)
    }

    async fn add_target_pool_instance(
        &self,
        project: &str,
        region: &str,
        pool: &str,
        instance: &str,
    ) -> Result<Operation, ComputeError> {
        let req = self
            .request(
                Method::POST,
                &format!(
                    "projects/{}/regions/{}/targetPools/{}/addInstance",
                    project, region, pool
                ),
            )
            .json(&InstancesRequest::new(&[instance.to_string()]));
        self.send(req).await
    }

    async fn remove_target_pool_instance(
        &self,
        project: &str,
        region: &str,
        pool: &str,
        instance: &str,
    ) -> Result<Operation, ComputeError> {
        let req = self
            .request(
                Method::POST,
                &format!(
                    "projects/{}/regions/{}/targetPools/{}/removeInstance",
                    project, region, pool
                ),
            )
            .json(&InstancesRequest::new(&[instance.to_string()]));
        self.send(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode, Uri};
    use axum::Router;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{}", addr)
    }

    fn client(endpoint: String) -> ComputeClient {
        ComputeClient::new(
            ComputeClientConfig {
                endpoint,
                request_timeout: Duration::from_secs(5),
            },
            Arc::new(StaticToken::new("test-token")),
        )
        .expect("client should build")
    }

    #[tokio::test]
    async fn get_instance_sends_bearer_token() {
        let router = Router::new().fallback(|uri: Uri, headers: HeaderMap| async move {
            let authorized = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                == Some("Bearer test-token");
            if !authorized {
                return (StatusCode::UNAUTHORIZED, String::new());
            }
            assert_eq!(uri.path(), "/projects/p/zones/z/instances/worker-a");
            (
                StatusCode::OK,
                r#"{"name":"worker-a","status":"RUNNING"}"#.to_string(),
            )
        });
        let endpoint = serve(router).await;

        let instance = client(endpoint)
            .get_instance("p", "z", "worker-a")
            .await
            .expect("instance should be returned");
        assert_eq!(instance.status, "RUNNING");
    }

    #[tokio::test]
    async fn api_errors_are_classified() {
        let router = Router::new().fallback(|uri: Uri| async move {
            if uri.path().ends_with("/missing") {
                (
                    StatusCode::NOT_FOUND,
                    r#"{"error":{"code":404,"message":"The resource was not found"}}"#.to_string(),
                )
            } else {
                (
                    StatusCode::BAD_REQUEST,
                    r#"{"error":{"code":400,"message":"Invalid value for field"}}"#.to_string(),
                )
            }
        });
        let client = client(serve(router).await);

        let err = client
            .get_instance("p", "z", "missing")
            .await
            .expect_err("should be not found");
        assert!(err.is_not_found());

        let err = client
            .insert_instance("p", "z", &Instance::default())
            .await
            .expect_err("should be rejected");
        assert_eq!(
            err,
            ComputeError::Permanent {
                code: 400,
                message: "Invalid value for field".into()
            }
        );
    }

    #[tokio::test]
    async fn list_group_instances_follows_pages() {
        let router = Router::new().fallback(|uri: Uri| async move {
            let body = if uri.query().unwrap_or_default().contains("pageToken=next") {
                r#"{"items":[{"instance":"link-b","status":"RUNNING"}]}"#
            } else {
                r#"{"items":[{"instance":"link-a","status":"RUNNING"}],"nextPageToken":"next"}"#
            };
            (StatusCode::OK, body.to_string())
        });
        let client = client(serve(router).await);

        let links = client
            .list_group_instances("p", "z", "infra-master-z")
            .await
            .expect("listing should succeed");
        assert_eq!(links, vec!["link-a".to_string(), "link-b".to_string()]);
    }

    #[tokio::test]
    async fn transport_failures_are_transient() {
        // nothing listens on port 9 locally
        let err = client("http://127.0.0.1:9".to_string())
            .get_instance("p", "z", "worker-a")
            .await
            .expect_err("connection should fail");
        assert!(matches!(err, ComputeError::Transient(_)));
    }
}
