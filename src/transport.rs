use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;

use crate::error::TransportError;

/// Status and raw body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The network boundary. Resources are relative to the server url.
///
/// Implementations return `Err` only when no response was obtained; a
/// non-2xx answer is still an `Ok(HttpResponse)`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(
        &self,
        resource: &str,
        query: &[(String, String)],
    ) -> Result<HttpResponse, TransportError>;

    async fn post_json(
        &self,
        resource: &str,
        body: &Value,
        query: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<HttpResponse, TransportError>;

    async fn patch_json(
        &self,
        resource: &str,
        body: &Value,
        query: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<HttpResponse, TransportError>;
}

/// [`HttpTransport`] over a shared `reqwest::Client`.
pub struct ReqwestTransport {
    base_url: String,
    auth_header: Option<String>,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            base_url,
            auth_header: None,
            client: reqwest::Client::new(),
        }
    }

    /// Personal access tokens go out as Basic auth with an empty user name.
    pub fn with_personal_access_token(self, token: &str) -> Self {
        self.with_basic_auth("", token)
    }

    pub fn with_basic_auth(mut self, user: &str, password: &str) -> Self {
        let creds = format!("{user}:{password}");
        let encoded = base64::engine::general_purpose::STANDARD.encode(creds);
        self.auth_header = Some(format!("Basic {encoded}"));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, TransportError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    fn url(&self, resource: &str) -> String {
        format!("{}{}", self.base_url, resource.trim_start_matches('/'))
    }

    fn request(
        &self,
        method: reqwest::Method,
        resource: &str,
        query: &[(String, String)],
    ) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(method, self.url(resource))
            .query(query)
            .header("Accept", "application/json");
        if let Some(auth) = &self.auth_header {
            request = request.header("Authorization", auth);
        }
        request
    }

    fn with_json_body(
        request: reqwest::RequestBuilder,
        body: &Value,
        headers: &[(String, String)],
    ) -> reqwest::RequestBuilder {
        let has_content_type = headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
        let mut request = request.body(body.to_string());
        if !has_content_type {
            request = request.header("Content-Type", "application/json");
        }
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }

    async fn send(request: reqwest::RequestBuilder) -> Result<HttpResponse, TransportError> {
        let resp = request.send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        resource: &str,
        query: &[(String, String)],
    ) -> Result<HttpResponse, TransportError> {
        Self::send(self.request(reqwest::Method::GET, resource, query)).await
    }

    async fn post_json(
        &self,
        resource: &str,
        body: &Value,
        query: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<HttpResponse, TransportError> {
        let request = self.request(reqwest::Method::POST, resource, query);
        Self::send(Self::with_json_body(request, body, headers)).await
    }

    async fn patch_json(
        &self,
        resource: &str,
        body: &Value,
        query: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<HttpResponse, TransportError> {
        let request = self.request(reqwest::Method::PATCH, resource, query);
        Self::send(Self::with_json_body(request, body, headers)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_sends_query_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tfs/DefaultCollection/_apis/wit/workitems"))
            .and(query_param("ids", "1,2"))
            .and(query_param("api-version", "6.0"))
            .and(header("Authorization", "Basic OnNlY3JldA=="))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"count":0,"value":[]}"#))
            .expect(1)
            .mount(&server)
            .await;

        let transport =
            ReqwestTransport::new(format!("{}/tfs", server.uri())).with_personal_access_token("secret");
        let query = vec![
            ("ids".to_string(), "1,2".to_string()),
            ("api-version".to_string(), "6.0".to_string()),
        ];
        let resp = transport
            .get("DefaultCollection/_apis/wit/workitems", &query)
            .await
            .unwrap();

        assert!(resp.is_success());
        assert_eq!(resp.body, r#"{"count":0,"value":[]}"#);
    }

    #[tokio::test]
    async fn patch_uses_supplied_content_type() {
        let server = MockServer::start().await;
        let body = json!([{"op": "remove", "path": "/relations/0"}]);
        Mock::given(method("PATCH"))
            .and(path("/DefaultCollection/_apis/wit/workitems/5"))
            .and(header("Content-Type", "application/json-patch+json"))
            .and(body_json(&body))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(server.uri());
        let headers = vec![(
            "Content-Type".to_string(),
            "application/json-patch+json".to_string(),
        )];
        let resp = transport
            .patch_json("DefaultCollection/_apis/wit/workitems/5", &body, &[], &headers)
            .await
            .unwrap();

        assert_eq!(resp.status, 400);
        assert!(!resp.is_success());
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let transport = ReqwestTransport::new("http://127.0.0.1:9/");
        let result = transport.get("anything", &[]).await;
        assert!(matches!(result, Err(TransportError::Http(_))));
    }
}
