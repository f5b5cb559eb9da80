//! Service registry client implementation.
//!
//! Wraps the registry's HTTP API in typed calls. Each call is a single
//! request: no retries, no caching. Status codes are mapped back onto the
//! shared [`Error`] type so callers can match on `is_not_found()` and
//! `is_validation()` the same way the server does.

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use svcreg_common::{
    ApiIndex, DeregisterResponse, Error, ErrorResponse, HeartbeatAck, Instance, InstanceId,
    RegisterRequest, Result,
};
use tracing::debug;

/// Service registry client.
///
/// Holds a pooled hyper client, so one instance should be reused for the
/// lifetime of the calling service.
pub struct RegistryClient {
    /// Base URL of the service registry (e.g., "http://localhost:8001").
    base_url: String,

    /// Hyper HTTP client (reusable, pooled connections).
    client: Client<HttpConnector, Full<Bytes>>,
}

impl RegistryClient {
    /// Creates a new service registry client.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Self { base_url, client }
    }

    /// Returns the registry base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches the API index.
    pub async fn index(&self) -> Result<ApiIndex> {
        let (status, body) = self.send(Method::GET, "/", None).await?;
        expect_status(status, StatusCode::OK, &body)?;
        parse_json(&body)
    }

    /// Lists every registered instance.
    pub async fn list(&self) -> Result<Vec<Instance>> {
        let (status, body) = self.send(Method::GET, "/services", None).await?;
        expect_status(status, StatusCode::OK, &body)?;
        parse_json(&body)
    }

    /// Finds instances of `name`, optionally restricted to `version`.
    pub async fn find(&self, name: &str, version: Option<&str>) -> Result<Vec<Instance>> {
        let path = services_path(name, version)?;
        debug!("Discovering {} from {}", name, self.base_url);

        let (status, body) = self.send(Method::GET, &path, None).await?;
        expect_status(status, StatusCode::OK, &body)?;

        let instances: Vec<Instance> = parse_json(&body)?;
        debug!("Discovered {} instance(s) of {}", instances.len(), name);
        Ok(instances)
    }

    /// Registers an instance and returns the record the registry stored.
    pub async fn register(&self, request: &RegisterRequest) -> Result<Instance> {
        let body = serde_json::to_vec(request)
            .map_err(|e| Error::Protocol(format!("Failed to serialize request: {}", e)))?;

        let (status, body) = self.send(Method::POST, "/services", Some(body)).await?;
        expect_status(status, StatusCode::CREATED, &body)?;

        let instance: Instance = parse_json(&body)?;
        debug!("Registered as instance {}", instance.id);
        Ok(instance)
    }

    /// Sends a heartbeat and returns the refreshed record.
    pub async fn heartbeat(&self, id: InstanceId) -> Result<Instance> {
        let (status, body) = self
            .send(Method::POST, &format!("/services/{}", id), None)
            .await?;

        if status == StatusCode::NOT_FOUND {
            return Err(Error::instance_not_found(id));
        }
        expect_status(status, StatusCode::ACCEPTED, &body)?;

        let ack: HeartbeatAck = parse_json(&body)?;
        Ok(ack.doc)
    }

    /// Deregisters an instance.
    ///
    /// `Ok(false)` means the registry knew the id but failed to remove it.
    pub async fn deregister(&self, id: InstanceId) -> Result<bool> {
        let (status, body) = self
            .send(Method::DELETE, &format!("/services/{}", id), None)
            .await?;

        if status == StatusCode::NOT_FOUND {
            return Err(Error::instance_not_found(id));
        }
        expect_status(status, StatusCode::OK, &body)?;

        let response: DeregisterResponse = parse_json(&body)?;
        Ok(response.success)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(StatusCode, Bytes)> {
        let url = format!("{}{}", self.base_url, path);
        let uri: Uri = url
            .parse()
            .map_err(|e| Error::Protocol(format!("Invalid URI {}: {}", url, e)))?;

        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(bytes) => {
                builder = builder.header("content-type", "application/json");
                Full::new(Bytes::from(bytes))
            }
            None => Full::new(Bytes::new()),
        };
        let req = builder
            .body(body)
            .map_err(|e| Error::Protocol(format!("Failed to build request: {}", e)))?;

        let resp = self
            .client
            .request(req)
            .await
            .map_err(|e| Error::Protocol(format!("HTTP request failed: {}", e)))?;

        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| Error::Protocol(format!("Failed to read response: {}", e)))?
            .to_bytes();

        Ok((status, bytes))
    }
}

/// Builds `/services/<name>[?version=<version>]`.
fn services_path(name: &str, version: Option<&str>) -> Result<String> {
    let mut path = format!("/services/{}", urlencoding::encode(name));

    if let Some(version) = version {
        let query = serde_urlencoded::to_string(&[("version", version)])
            .map_err(|e| Error::Protocol(format!("Failed to encode query: {}", e)))?;
        path.push('?');
        path.push_str(&query);
    }

    Ok(path)
}

fn expect_status(actual: StatusCode, expected: StatusCode, body: &Bytes) -> Result<()> {
    if actual == expected {
        return Ok(());
    }

    let message = serde_json::from_slice::<ErrorResponse>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());

    match actual {
        StatusCode::BAD_REQUEST => Err(Error::validation(message)),
        StatusCode::NOT_FOUND => Err(Error::not_found(message)),
        _ => Err(Error::Protocol(format!(
            "Registry returned status {}: {}",
            actual, message
        ))),
    }
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| Error::Protocol(format!("Failed to parse JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = RegistryClient::new("http://localhost:8001/");
        assert_eq!(client.base_url(), "http://localhost:8001");
    }

    #[test]
    fn test_services_path() {
        assert_eq!(services_path("web", None).unwrap(), "/services/web");
        assert_eq!(
            services_path("web", Some("1.2.3")).unwrap(),
            "/services/web?version=1.2.3"
        );
        assert_eq!(
            services_path("my svc", Some("1.0 beta")).unwrap(),
            "/services/my%20svc?version=1.0+beta"
        );
        assert_eq!(services_path("a/b@1", None).unwrap(), "/services/a%2Fb%401");
    }

    #[test]
    fn test_expect_status_maps_errors() {
        let body = Bytes::from(r#"{"message":"Either host, port or name missing: port"}"#);
        let err = expect_status(StatusCode::BAD_REQUEST, StatusCode::CREATED, &body).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("port"));

        let err = expect_status(StatusCode::NOT_FOUND, StatusCode::OK, &Bytes::new()).unwrap_err();
        assert!(err.is_not_found());

        let err =
            expect_status(StatusCode::BAD_GATEWAY, StatusCode::OK, &Bytes::from("upstream")).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_protocol_error() {
        let client = RegistryClient::new("http://127.0.0.1:1");
        let err = client.list().await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
