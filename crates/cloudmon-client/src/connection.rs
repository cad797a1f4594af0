//! Authenticated connection to one monitoring API endpoint.
//!
//! A [`Connection`] authenticates lazily: the first call that needs a token
//! or an endpoint performs exactly one authentication and one catalog
//! resolution, and the result is kept for the life of the connection. A
//! failed attempt leaves nothing cached, so the next call tries again.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use cloudmon_auth::{decompose, EndpointResolver, TokenAuthenticator};
use cloudmon_core::{
    CloudmonError, Credentials, HttpRequest, HttpResponse, ResolvedEndpoint, ResolvedEndpoints,
    Result, Transport, ValidationError,
};
use cloudmon_telemetry::{MetricsRecorder, NoopMetricsRecorder};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tokio::sync::Mutex;

/// Content type sent with request bodies.
const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Token and endpoints obtained by the single authentication of a
/// connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub endpoints: ResolvedEndpoints,
}

/// Parsed response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// No body at all
    Empty,
    /// `application/json` body
    Json(Value),
    /// Any other content type, returned verbatim
    Text(String),
}

/// A response whose status was accepted by the connection (2xx, 404, 409).
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
    /// Raw body text, kept for diagnostics
    pub raw: String,
}

impl ApiResponse {
    /// True for 2xx
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// JSON body, if the response carried one
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Take the JSON body, failing if the response was not JSON.
    pub fn into_json(self) -> Result<Value> {
        match self.body {
            ResponseBody::Json(value) => Ok(value),
            _ => Err(CloudmonError::malformed(
                format!("expected a JSON body with status {}", self.status),
                &self.raw,
            )),
        }
    }

    /// `Location` header, if present
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }
}

/// Builder for [`Connection`].
pub struct ConnectionBuilder {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    auth_url: String,
    service: String,
    base_url: Option<String>,
    resolver: EndpointResolver,
    metrics: Arc<dyn MetricsRecorder>,
}

impl ConnectionBuilder {
    /// Identity base URL; `/auth` is appended when authenticating.
    pub fn auth_url<S: Into<String>>(mut self, url: S) -> Self {
        self.auth_url = url.into();
        self
    }

    /// Resolver key of the service requests go to.
    pub fn service<S: Into<String>>(mut self, service: S) -> Self {
        self.service = service.into();
        self
    }

    /// Force the base URL instead of taking it from the catalog.
    pub fn base_url<S: Into<String>>(mut self, base_url: Option<S>) -> Self {
        self.base_url = base_url.map(Into::into);
        self
    }

    pub fn resolver(mut self, resolver: EndpointResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Finish the connection. Only a malformed forced base URL fails here;
    /// nothing touches the network.
    pub fn build(self) -> Result<Connection> {
        let forced = match self.base_url.as_deref() {
            Some(url) => Some(decompose(url)?),
            None => None,
        };

        Ok(Connection {
            transport: self.transport,
            credentials: self.credentials,
            authenticator: TokenAuthenticator::new(self.auth_url),
            service: self.service,
            forced,
            resolver: self.resolver,
            metrics: self.metrics,
            session: Mutex::new(None),
        })
    }
}

/// A lazily authenticated connection.
pub struct Connection {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    authenticator: TokenAuthenticator,
    service: String,
    forced: Option<ResolvedEndpoint>,
    resolver: EndpointResolver,
    metrics: Arc<dyn MetricsRecorder>,
    session: Mutex<Option<Session>>,
}

impl Connection {
    /// Start building a connection with default auth URL, service key,
    /// resolver and a no-op metrics recorder.
    pub fn builder(transport: Arc<dyn Transport>, credentials: Credentials) -> ConnectionBuilder {
        ConnectionBuilder {
            transport,
            credentials,
            auth_url: cloudmon_config::DEFAULT_AUTH_URL.to_string(),
            service: cloudmon_config::DEFAULT_SERVICE.to_string(),
            base_url: None,
            resolver: EndpointResolver::default(),
            metrics: Arc::new(NoopMetricsRecorder),
        }
    }

    /// Resolver key of the service this connection talks to
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Authenticate and resolve endpoints unless already done.
    ///
    /// Concurrent first callers serialise on the session lock, so only one
    /// authentication happens. Failures are returned and nothing is cached.
    pub async fn ensure_session(&self) -> Result<Session> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }

        let auth = match self
            .authenticator
            .authenticate(self.transport.as_ref(), &self.credentials)
            .await
        {
            Ok(auth) => auth,
            Err(err) => {
                self.metrics.record_error(&self.service, "auth");
                tracing::warn!("authentication failed: {}", err);
                return Err(err);
            }
        };

        let endpoints = self.resolver.resolve(&auth.catalog)?;
        tracing::debug!(
            "session established; {} endpoints resolved",
            endpoints.len()
        );

        let session = Session {
            token: auth.token,
            endpoints,
        };
        *guard = Some(session.clone());
        Ok(session)
    }

    /// Cached token; `None` until the first successful authentication.
    pub async fn token(&self) -> Option<String> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|session| session.token.clone())
    }

    /// All endpoints resolved from the catalog.
    pub async fn endpoints(&self) -> Result<ResolvedEndpoints> {
        Ok(self.ensure_session().await?.endpoints)
    }

    /// Endpoint requests are sent to. A forced base URL wins over the
    /// catalog.
    pub async fn endpoint(&self) -> Result<ResolvedEndpoint> {
        let session = self.ensure_session().await?;
        self.select_endpoint(&session)
    }

    fn select_endpoint(&self, session: &Session) -> Result<ResolvedEndpoint> {
        if let Some(forced) = &self.forced {
            return Ok(forced.clone());
        }
        session
            .endpoints
            .get(&self.service)
            .cloned()
            .ok_or_else(|| CloudmonError::EndpointNotFound(self.service.clone()))
    }

    /// Issue one authenticated request.
    ///
    /// `path` is relative to the endpoint's base path. `headers` are applied
    /// after the defaults and may override them, except `X-Auth-Token`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<&Value>,
        headers: &[(&str, &str)],
    ) -> Result<ApiResponse> {
        let session = self.ensure_session().await?;
        let endpoint = self.select_endpoint(&session)?;

        let mut request = HttpRequest::new(method.clone(), endpoint.url_for(path))
            .with_header("Accept", "application/json")?;

        if method == Method::POST || method == Method::PUT {
            request = request.with_header("Content-Type", JSON_CONTENT_TYPE)?;
            let payload = body.cloned().unwrap_or_else(|| Value::Object(Default::default()));
            request = request.with_body(payload.to_string());
        } else if let Some(body) = body {
            request = request.with_body(body.to_string());
        }

        for (name, value) in headers {
            if name.eq_ignore_ascii_case("x-auth-token") {
                continue;
            }
            request = request.with_header(name, value)?;
        }
        request = request.with_header("X-Auth-Token", &session.token)?;

        for (key, value) in params {
            request = request.with_query(key.clone(), value.clone());
        }

        self.metrics
            .record_request_start(&self.service, method.as_str());
        let started = Instant::now();

        let result = self.transport.send(request).await;
        let latency = started.elapsed().as_secs_f64();

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                self.metrics.record_request_end(&self.service, false, latency);
                self.metrics.record_error(&self.service, "transport");
                tracing::warn!("{} {} failed: {}", method, path, err);
                return Err(err);
            }
        };

        tracing::debug!("{} {} -> {}", method, path, response.status);

        match self.interpret(response) {
            Ok(api_response) => {
                self.metrics.record_request_end(&self.service, true, latency);
                Ok(api_response)
            }
            Err(err) => {
                self.metrics.record_request_end(&self.service, false, latency);
                self.metrics.record_error(&self.service, error_kind(&err));
                tracing::warn!("{} {} failed: {}", method, path, err);
                Err(err)
            }
        }
    }

    /// GET with query parameters
    pub async fn get(&self, path: &str, params: &[(String, String)]) -> Result<ApiResponse> {
        self.request(Method::GET, path, params, None, &[]).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        self.request(Method::POST, path, &[], Some(body), &[]).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        self.request(Method::PUT, path, &[], Some(body), &[]).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.request(Method::DELETE, path, &[], None, &[]).await
    }

    fn interpret(&self, response: HttpResponse) -> Result<ApiResponse> {
        let status = response.status;
        let accepted = status.is_success()
            || status == StatusCode::NOT_FOUND
            || status == StatusCode::CONFLICT;

        if !accepted {
            if status == StatusCode::BAD_REQUEST {
                if let Some(validation) = ValidationError::from_body(&response.body) {
                    return Err(CloudmonError::Validation(validation));
                }
            }
            return Err(CloudmonError::unexpected_status(
                status.as_u16(),
                &response.body,
            ));
        }

        let body = parse_body(&response)?;
        Ok(ApiResponse {
            status,
            headers: response.headers,
            body,
            raw: response.body,
        })
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("auth_url", &self.authenticator.auth_url())
            .field("credentials", &self.credentials)
            .field("service", &self.service)
            .field("forced", &self.forced)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

/// Interpret a body according to its content type.
fn parse_body(response: &HttpResponse) -> Result<ResponseBody> {
    if response.body.is_empty() {
        return Ok(ResponseBody::Empty);
    }

    match response.media_type().as_deref() {
        Some("application/json") => serde_json::from_str(&response.body)
            .map(ResponseBody::Json)
            .map_err(|e| {
                CloudmonError::malformed(format!("invalid JSON body: {}", e), &response.body)
            }),
        Some(_) => Ok(ResponseBody::Text(response.body.clone())),
        None => Err(CloudmonError::malformed(
            "missing content-type header",
            &response.body,
        )),
    }
}

fn error_kind(err: &CloudmonError) -> &'static str {
    match err {
        CloudmonError::Validation(_) => "validation",
        CloudmonError::UnexpectedStatus { .. } => "status",
        CloudmonError::MalformedResponse { .. } => "malformed",
        CloudmonError::InvalidCredentials { .. } => "auth",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{auth_ok, ScriptedTransport};
    use cloudmon_telemetry::InMemoryMetricsRecorder;
    use reqwest::header::CONTENT_TYPE;
    use serde_json::json;

    fn connection(transport: Arc<ScriptedTransport>) -> Connection {
        Connection::builder(transport, Credentials::new("alice", "key"))
            .auth_url("https://identity.example.com/v1.1")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn authenticates_once_for_several_calls() {
        let transport = Arc::new(ScriptedTransport::new(vec![auth_ok()]));
        let conn = connection(transport.clone());

        let first = conn.endpoint().await.unwrap();
        let second = conn.endpoint().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.host, "monitoring.example.com");
        assert_eq!(transport.calls(), 1);
        assert_eq!(conn.token().await.as_deref(), Some("tok-1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_callers_authenticate_once() {
        let transport = Arc::new(ScriptedTransport::new(vec![auth_ok()]));
        let conn = Arc::new(connection(transport.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let conn = Arc::clone(&conn);
                tokio::spawn(async move { conn.endpoint().await })
            })
            .collect();

        for handle in handles {
            let endpoint = handle.await.unwrap().unwrap();
            assert_eq!(endpoint.host, "monitoring.example.com");
        }
        assert_eq!(transport.calls(), 1);
        assert_eq!(conn.token().await.as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn failed_auth_caches_nothing() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            HttpResponse::new(StatusCode::UNAUTHORIZED),
            auth_ok(),
        ]));
        let conn = connection(transport.clone());

        let err = conn.endpoint().await.unwrap_err();
        assert!(err.is_auth_failure());
        assert!(conn.token().await.is_none());

        conn.endpoint().await.unwrap();
        assert_eq!(transport.calls(), 2);
        assert!(conn.token().await.is_some());
    }

    #[tokio::test]
    async fn missing_service_is_endpoint_not_found() {
        let transport = Arc::new(ScriptedTransport::new(vec![auth_ok()]));
        let conn = Connection::builder(transport, Credentials::new("alice", "key"))
            .service("dns")
            .build()
            .unwrap();

        let err = conn.endpoint().await.unwrap_err();
        assert!(matches!(err, CloudmonError::EndpointNotFound(ref s) if s == "dns"));
    }

    #[tokio::test]
    async fn forced_base_url_wins_but_still_authenticates() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            auth_ok(),
            HttpResponse::new(StatusCode::NO_CONTENT),
        ]));
        let conn = Connection::builder(transport.clone(), Credentials::new("alice", "key"))
            .base_url(Some("http://127.0.0.1:9000/v1.0/777/"))
            .build()
            .unwrap();

        conn.delete("/entities/en1").await.unwrap();

        let sent = transport.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].url, "http://127.0.0.1:9000/v1.0/777/entities/en1");
        assert_eq!(sent[1].header("X-Auth-Token"), Some("tok-1"));
    }

    #[test]
    fn malformed_forced_base_url_fails_build() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let res = Connection::builder(transport, Credentials::new("a", "b"))
            .base_url(Some("not a url"))
            .build();
        assert!(matches!(res, Err(CloudmonError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn request_sets_standard_headers() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            auth_ok(),
            HttpResponse::new(StatusCode::CREATED),
        ]));
        let conn = connection(transport.clone());

        conn.request(
            Method::POST,
            "/entities",
            &[],
            Some(&json!({"label": "web"})),
            &[("X-Auth-Token", "spoofed"), ("X-Request-Id", "r1")],
        )
        .await
        .unwrap();

        let sent = &transport.requests()[1];
        assert_eq!(sent.url, "https://monitoring.example.com/v1.0/123456/entities");
        assert_eq!(sent.header("X-Auth-Token"), Some("tok-1"));
        assert_eq!(sent.header("Accept"), Some("application/json"));
        assert_eq!(sent.header("Content-Type"), Some(JSON_CONTENT_TYPE));
        assert_eq!(sent.header("X-Request-Id"), Some("r1"));
        assert_eq!(sent.body.as_deref(), Some(r#"{"label":"web"}"#));
    }

    #[tokio::test]
    async fn parses_bodies_by_content_type() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            auth_ok(),
            HttpResponse::new(StatusCode::OK)
                .with_header(CONTENT_TYPE, "application/json; charset=UTF-8")
                .with_body(r#"{"id":"en1"}"#),
            HttpResponse::new(StatusCode::OK)
                .with_header(CONTENT_TYPE, "text/plain")
                .with_body("pong"),
            HttpResponse::new(StatusCode::NOT_FOUND),
            HttpResponse::new(StatusCode::OK).with_body("orphan"),
        ]));
        let conn = connection(transport);

        let json_resp = conn.get("/entities/en1", &[]).await.unwrap();
        assert_eq!(json_resp.json(), Some(&json!({"id": "en1"})));

        let text = conn.get("/ping", &[]).await.unwrap();
        assert_eq!(text.body, ResponseBody::Text("pong".to_string()));

        let missing = conn.get("/entities/nope", &[]).await.unwrap();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
        assert_eq!(missing.body, ResponseBody::Empty);

        let err = conn.get("/orphan", &[]).await.unwrap_err();
        assert!(matches!(err, CloudmonError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn status_policy_maps_errors() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            auth_ok(),
            HttpResponse::json(
                StatusCode::BAD_REQUEST,
                &json!({"code": 400, "type": "badRequest", "message": "bad label"}),
            ),
            HttpResponse::new(StatusCode::BAD_REQUEST).with_body("nope"),
            HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR).with_body("boom"),
            HttpResponse::new(StatusCode::CONFLICT),
        ]));
        let metrics = Arc::new(InMemoryMetricsRecorder::new());
        let conn = Connection::builder(transport, Credentials::new("alice", "key"))
            .metrics(metrics.clone())
            .build()
            .unwrap();

        let err = conn.get("/a", &[]).await.unwrap_err();
        assert!(matches!(err, CloudmonError::Validation(ref v) if v.message == "bad label"));

        let err = conn.get("/b", &[]).await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.body(), Some("nope"));

        let err = conn.get("/c", &[]).await.unwrap_err();
        assert!(matches!(err, CloudmonError::UnexpectedStatus { status: 500, .. }));

        let conflict = conn.get("/d", &[]).await.unwrap();
        assert_eq!(conflict.status, StatusCode::CONFLICT);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_started, 4);
        assert_eq!(snapshot.requests_succeeded, 1);
        assert_eq!(snapshot.requests_failed, 3);
    }
}
