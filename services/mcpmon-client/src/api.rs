//! REST API client
//!
//! Each endpoint is described once in [`Endpoint`]: method, path, whether it
//! needs the session token, and which cache tags a successful call
//! invalidates. [`ApiClient`] turns those descriptions into requests, unwraps
//! the server's `{ success, data, message }` envelope and keeps the monitor
//! cache in step.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::cache::{SharedCache, Tag};
use crate::config::ApiConfig;
use crate::error::{ClientError, Result};
use crate::io::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::model::{
    AuthUser, ContactMessage, Credentials, Feedback, Monitor, MonitorChanges, MonitorRecord,
    NewMonitor, NewPassword, PasswordResetRequest, ScanRequest, SignupRequest,
};
use crate::session::Session;

/// API endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Login,
    Signup,
    VerifyEmail(String),
    ForgotPassword,
    ResetPassword(String),
    ListMonitors,
    GetMonitor(String),
    CreateMonitor,
    UpdateMonitor(String),
    DeleteMonitor(String),
    MonitorStats(String),
    PauseMonitor(String),
    ResumeMonitor(String),
    PublicMonitor(String),
    SubmitFeedback,
    SubmitContact,
    ScanChannel,
}

impl Endpoint {
    pub fn method(&self) -> HttpMethod {
        match self {
            Endpoint::VerifyEmail(_)
            | Endpoint::ListMonitors
            | Endpoint::GetMonitor(_)
            | Endpoint::MonitorStats(_)
            | Endpoint::PublicMonitor(_) => HttpMethod::Get,
            Endpoint::Login
            | Endpoint::Signup
            | Endpoint::ForgotPassword
            | Endpoint::ResetPassword(_)
            | Endpoint::SubmitFeedback
            | Endpoint::SubmitContact
            | Endpoint::ScanChannel
            | Endpoint::CreateMonitor
            | Endpoint::PauseMonitor(_)
            | Endpoint::ResumeMonitor(_) => HttpMethod::Post,
            Endpoint::UpdateMonitor(_) => HttpMethod::Put,
            Endpoint::DeleteMonitor(_) => HttpMethod::Delete,
        }
    }

    /// Path relative to the API base URL
    pub fn path(&self) -> String {
        match self {
            Endpoint::Login => "auth/login".to_string(),
            Endpoint::Signup => "auth/signup".to_string(),
            Endpoint::VerifyEmail(token) => format!("auth/verify-email/{}", token),
            Endpoint::ForgotPassword => "auth/forgot-password".to_string(),
            Endpoint::ResetPassword(token) => format!("auth/reset-password/{}", token),
            Endpoint::ListMonitors | Endpoint::CreateMonitor => "monitors".to_string(),
            Endpoint::GetMonitor(id) | Endpoint::UpdateMonitor(id) | Endpoint::DeleteMonitor(id) => {
                format!("monitors/{}", id)
            }
            Endpoint::MonitorStats(id) => format!("monitors/{}/stats", id),
            Endpoint::PauseMonitor(id) => format!("monitors/{}/pause", id),
            Endpoint::ResumeMonitor(id) => format!("monitors/{}/resume", id),
            Endpoint::PublicMonitor(id) => format!("monitors/public/{}", id),
            Endpoint::SubmitFeedback => "feedback".to_string(),
            Endpoint::SubmitContact => "contact".to_string(),
            Endpoint::ScanChannel => "scan".to_string(),
        }
    }

    /// Whether the call is refused without a session token
    ///
    /// Public endpoints still carry the token when one is held.
    pub fn requires_auth(&self) -> bool {
        !matches!(
            self,
            Endpoint::Login
                | Endpoint::Signup
                | Endpoint::VerifyEmail(_)
                | Endpoint::ForgotPassword
                | Endpoint::ResetPassword(_)
                | Endpoint::PublicMonitor(_)
                | Endpoint::SubmitContact
                | Endpoint::ScanChannel
        )
    }

    /// Cache tags a successful call invalidates
    pub fn invalidates(&self) -> Vec<Tag> {
        match self {
            Endpoint::CreateMonitor | Endpoint::DeleteMonitor(_) => vec![Tag::Monitors],
            Endpoint::UpdateMonitor(id) | Endpoint::PauseMonitor(id) | Endpoint::ResumeMonitor(id) => {
                vec![Tag::Monitor(id.clone()), Tag::Monitors]
            }
            _ => Vec::new(),
        }
    }
}

/// Client for the MCPmon REST API
pub struct ApiClient {
    base_url: String,
    session: Session,
    cache: SharedCache,
    transport: Arc<dyn HttpTransport>,
}

impl ApiClient {
    /// Create a client using reqwest
    pub fn new(config: &ApiConfig, session: Session, cache: SharedCache) -> Result<Self> {
        let transport =
            ReqwestTransport::new(Duration::from_secs(config.request_timeout_seconds))?;
        Ok(Self::with_transport(
            config,
            session,
            cache,
            Arc::new(transport),
        ))
    }

    /// Create a client with a custom HTTP transport
    pub fn with_transport(
        config: &ApiConfig,
        session: Session,
        cache: SharedCache,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
            cache,
            transport,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    fn url(&self, endpoint: &Endpoint, query: &[(&str, &str)]) -> Result<String> {
        let raw = format!("{}/{}", self.base_url, endpoint.path());
        if query.is_empty() {
            return Ok(raw);
        }
        let mut url = reqwest::Url::parse(&raw)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", raw, e)))?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(url.to_string())
    }

    async fn call(
        &self,
        endpoint: Endpoint,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Value> {
        let bearer = self.session.token();
        if endpoint.requires_auth() && bearer.is_none() {
            return Err(ClientError::Unauthenticated);
        }

        let request = HttpRequest {
            method: endpoint.method(),
            url: self.url(&endpoint, query)?,
            bearer,
            body,
        };
        let response = self.transport.send(request).await?;
        let data = unwrap_envelope(response)?;

        let tags = endpoint.invalidates();
        if !tags.is_empty() {
            debug!("Invalidating {:?} after {:?}", tags, endpoint);
            self.cache.write().await.invalidate(&tags);
        }
        Ok(data)
    }

    async fn call_with<B: Serialize>(&self, endpoint: Endpoint, body: &B) -> Result<Value> {
        let body = serde_json::to_value(body)?;
        self.call(endpoint, &[], Some(body)).await
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// Log in and store the issued token in the session
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthUser> {
        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let data = self.call_with(Endpoint::Login, &credentials).await?;
        self.start_session(data)
    }

    /// Create an account and store the issued token in the session
    pub async fn signup(&self, request: &SignupRequest) -> Result<AuthUser> {
        let data = self.call_with(Endpoint::Signup, request).await?;
        self.start_session(data)
    }

    fn start_session(&self, data: Value) -> Result<AuthUser> {
        let user: AuthUser = serde_json::from_value(data)?;
        self.session.set_token(user.token.clone());
        debug!("Session started for {}", user.email);
        Ok(user)
    }

    /// Drop the session token and everything cached for it
    pub async fn logout(&self) {
        self.session.clear();
        self.cache.write().await.clear();
    }

    /// Start a session from the URL the OAuth provider redirected to
    ///
    /// The callback carries either `error=<message>` or `success=true` and
    /// `data=<JSON user with token>`.
    pub fn complete_oauth(&self, callback_url: &str) -> Result<AuthUser> {
        let url = reqwest::Url::parse(callback_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", callback_url, e)))?;

        let mut success = false;
        let mut data = None;
        for (key, value) in url.query_pairs() {
            match &*key {
                "error" => return Err(ClientError::OAuth(value.into_owned())),
                "success" => success = value == "true",
                "data" => data = Some(value.into_owned()),
                _ => {}
            }
        }

        match data {
            Some(data) if success => self.start_session(serde_json::from_str(&data)?),
            _ => Err(ClientError::OAuth(
                "callback carries no authentication data".to_string(),
            )),
        }
    }

    pub async fn verify_email(&self, token: &str) -> Result<Value> {
        self.call(Endpoint::VerifyEmail(token.to_string()), &[], None)
            .await
    }

    /// Ask the server to email a password reset link
    pub async fn forgot_password(&self, email: &str) -> Result<Value> {
        let body = PasswordResetRequest {
            email: email.to_string(),
        };
        self.call_with(Endpoint::ForgotPassword, &body).await
    }

    /// Set a new password using the token from the reset link
    pub async fn reset_password(&self, token: &str, password: &str) -> Result<Value> {
        let body = NewPassword {
            password: password.to_string(),
        };
        self.call_with(Endpoint::ResetPassword(token.to_string()), &body)
            .await
    }

    // ========================================================================
    // Monitors
    // ========================================================================

    /// List monitors; the unfiltered list becomes the cached collection view
    pub async fn list_monitors(&self, filters: &[(&str, &str)]) -> Result<Vec<MonitorRecord>> {
        let data = self.call(Endpoint::ListMonitors, filters, None).await?;
        let records = records_from(data)?;
        if filters.is_empty() {
            self.cache.write().await.store_list(records.clone());
        }
        Ok(records)
    }

    /// Fetch one monitor into its cached singular view
    pub async fn get_monitor(&self, id: &str) -> Result<MonitorRecord> {
        let data = self
            .call(Endpoint::GetMonitor(id.to_string()), &[], None)
            .await?;
        let record = record_from(data)?;
        self.cache.write().await.store_monitor(record.clone());
        Ok(record)
    }

    pub async fn create_monitor(&self, monitor: &NewMonitor) -> Result<MonitorRecord> {
        let data = self.call_with(Endpoint::CreateMonitor, monitor).await?;
        record_from(data)
    }

    pub async fn update_monitor(&self, id: &str, changes: &MonitorChanges) -> Result<MonitorRecord> {
        let data = self
            .call_with(Endpoint::UpdateMonitor(id.to_string()), changes)
            .await?;
        record_from(data)
    }

    pub async fn delete_monitor(&self, id: &str) -> Result<()> {
        self.call(Endpoint::DeleteMonitor(id.to_string()), &[], None)
            .await?;
        Ok(())
    }

    pub async fn pause_monitor(&self, id: &str) -> Result<Value> {
        self.call(Endpoint::PauseMonitor(id.to_string()), &[], None)
            .await
    }

    pub async fn resume_monitor(&self, id: &str) -> Result<Value> {
        self.call(Endpoint::ResumeMonitor(id.to_string()), &[], None)
            .await
    }

    pub async fn monitor_stats(&self, id: &str) -> Result<Value> {
        self.call(Endpoint::MonitorStats(id.to_string()), &[], None)
            .await
    }

    // ========================================================================
    // Support
    // ========================================================================

    pub async fn submit_feedback(&self, feedback: &Feedback) -> Result<Value> {
        self.call_with(Endpoint::SubmitFeedback, feedback).await
    }

    pub async fn submit_contact(&self, message: &ContactMessage) -> Result<Value> {
        self.call_with(Endpoint::SubmitContact, message).await
    }

    pub async fn scan_channel(&self, request: &ScanRequest) -> Result<Value> {
        self.call_with(Endpoint::ScanChannel, request).await
    }

    /// Public status page data; needs no session
    pub async fn public_monitor(&self, id: &str) -> Result<Monitor> {
        let data = self
            .call(Endpoint::PublicMonitor(id.to_string()), &[], None)
            .await?;
        Ok(serde_json::from_value(data)?)
    }
}

/// Extract `data` from a response, mapping failures to `ClientError::Api`
fn unwrap_envelope(response: HttpResponse) -> Result<Value> {
    let body: Value = if response.body.trim().is_empty() {
        Value::Null
    } else {
        match serde_json::from_str(&response.body) {
            Ok(body) => body,
            Err(e) if response.is_success() => return Err(e.into()),
            Err(_) => Value::String(response.body.clone()),
        }
    };

    let message = match &body {
        Value::Object(fields) => fields
            .get("message")
            .or_else(|| fields.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string),
        Value::String(text) => Some(text.clone()),
        _ => None,
    };

    if !response.is_success() {
        return Err(ClientError::Api {
            status: response.status,
            message: message.unwrap_or_else(|| format!("HTTP {}", response.status)),
        });
    }

    match body {
        Value::Object(mut fields) if fields.contains_key("success") || fields.contains_key("data") => {
            if fields.get("success") == Some(&Value::Bool(false)) {
                return Err(ClientError::Api {
                    status: response.status,
                    message: message.unwrap_or_else(|| "Request failed".to_string()),
                });
            }
            Ok(fields.remove("data").unwrap_or(Value::Null))
        }
        other => Ok(other),
    }
}

fn record_from(data: Value) -> Result<MonitorRecord> {
    MonitorRecord::from_value(data)
        .ok_or_else(|| ClientError::Http("Expected a monitor object in response".to_string()))
}

fn records_from(data: Value) -> Result<Vec<MonitorRecord>> {
    match data {
        Value::Array(items) => items.into_iter().map(record_from).collect(),
        _ => Err(ClientError::Http(
            "Expected a list of monitors in response".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::shared_cache;
    use crate::io::MockHttpTransport;
    use serde_json::json;

    fn ok(body: Value) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status: 200,
            body: body.to_string(),
        })
    }

    fn client(transport: MockHttpTransport, session: Session) -> ApiClient {
        ApiClient::with_transport(
            &ApiConfig {
                base_url: "http://api.test/api/".to_string(),
                request_timeout_seconds: 5,
            },
            session,
            shared_cache(),
            Arc::new(transport),
        )
    }

    #[test]
    fn test_endpoint_table() {
        assert_eq!(Endpoint::Login.method(), HttpMethod::Post);
        assert_eq!(Endpoint::Login.path(), "auth/login");
        assert!(!Endpoint::Login.requires_auth());

        let update = Endpoint::UpdateMonitor("m1".to_string());
        assert_eq!(update.method(), HttpMethod::Put);
        assert_eq!(update.path(), "monitors/m1");
        assert_eq!(
            update.invalidates(),
            vec![Tag::Monitor("m1".to_string()), Tag::Monitors]
        );

        assert_eq!(
            Endpoint::PublicMonitor("m1".to_string()).path(),
            "monitors/public/m1"
        );
        assert!(!Endpoint::PublicMonitor("m1".to_string()).requires_auth());
        assert!(Endpoint::ListMonitors.invalidates().is_empty());

        assert_eq!(
            Endpoint::ResetPassword("r1".to_string()).path(),
            "auth/reset-password/r1"
        );
        assert!(!Endpoint::ForgotPassword.requires_auth());
        assert!(Endpoint::SubmitFeedback.requires_auth());
        assert!(!Endpoint::SubmitContact.requires_auth());
        assert_eq!(Endpoint::ScanChannel.method(), HttpMethod::Post);
        assert_eq!(Endpoint::ScanChannel.path(), "scan");
    }

    #[test]
    fn test_oauth_callback_starts_session() {
        let session = Session::new();
        let api = client(MockHttpTransport::new(), session.clone());

        let user = api
            .complete_oauth(
                "https://app.test/auth/callback?success=true&data=%7B%22_id%22%3A%22u1%22%2C%22email%22%3A%22a%40b.c%22%2C%22token%22%3A%22jwt%22%7D",
            )
            .unwrap();

        assert_eq!(user.id.as_deref(), Some("u1"));
        assert_eq!(session.token(), Some("jwt".to_string()));
    }

    #[test]
    fn test_oauth_callback_error_leaves_session_empty() {
        let session = Session::new();
        let api = client(MockHttpTransport::new(), session.clone());

        let err = api
            .complete_oauth("https://app.test/auth/callback?error=Please%20login%20with%20your%20email%20and%20password")
            .unwrap_err();

        match err {
            ClientError::OAuth(message) => {
                assert_eq!(message, "Please login with your email and password")
            }
            other => panic!("expected ClientError::OAuth, got {other:?}"),
        }
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_feedback_requires_session() {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().never();
        let api = client(transport, Session::new());

        let err = api
            .submit_feedback(&Feedback {
                feedback: "nice".to_string(),
                allow_response: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_login_stores_token() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .withf(|request| {
                request.method == HttpMethod::Post
                    && request.url == "http://api.test/api/auth/login"
                    && request.bearer.is_none()
                    && request.body == Some(json!({"email": "a@b.c", "password": "pw"}))
            })
            .times(1)
            .returning(|_| {
                ok(json!({"success": true, "data": {"id": "u1", "email": "a@b.c", "token": "jwt"}}))
            });
        let session = Session::new();
        let api = client(transport, session.clone());

        let user = api.login("a@b.c", "pw").await.unwrap();

        assert_eq!(user.email, "a@b.c");
        assert_eq!(session.token(), Some("jwt".to_string()));
    }

    #[tokio::test]
    async fn test_authenticated_call_without_token_is_rejected() {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().never();
        let api = client(transport, Session::new());

        let err = api.list_monitors(&[]).await.unwrap_err();
        assert!(matches!(err, ClientError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_list_monitors_populates_cache_with_bearer() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .withf(|request| {
                request.url == "http://api.test/api/monitors" && request.bearer.as_deref() == Some("t")
            })
            .returning(|_| ok(json!({"success": true, "data": [{"_id": "a"}, {"_id": "b"}]})));
        let api = client(transport, Session::with_token("t"));

        let records = api.list_monitors(&[]).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(api.cache().read().await.list().unwrap(), records);
    }

    #[tokio::test]
    async fn test_filtered_list_bypasses_cache() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .withf(|request| request.url == "http://api.test/api/monitors?status=online")
            .returning(|_| ok(json!({"data": [{"_id": "a"}]})));
        let api = client(transport, Session::with_token("t"));

        api.list_monitors(&[("status", "online")]).await.unwrap();

        assert!(!api.cache().read().await.is_list_loaded());
    }

    #[tokio::test]
    async fn test_error_envelope_maps_to_api_error() {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().returning(|_| {
            Ok(HttpResponse {
                status: 404,
                body: json!({"success": false, "message": "Monitor not found"}).to_string(),
            })
        });
        let api = client(transport, Session::with_token("t"));

        match api.get_monitor("missing").await.unwrap_err() {
            ClientError::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Monitor not found");
            }
            other => panic!("expected ClientError::Api, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pause_invalidates_cached_views() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .withf(|request| request.url.ends_with("/monitors/a"))
            .returning(|_| ok(json!({"data": {"_id": "a", "status": "online"}})));
        transport
            .expect_send()
            .withf(|request| {
                request.method == HttpMethod::Post && request.url.ends_with("/monitors/a/pause")
            })
            .returning(|_| ok(json!({"success": true, "data": {"_id": "a", "status": "paused"}})));
        let api = client(transport, Session::with_token("t"));

        api.get_monitor("a").await.unwrap();
        assert!(api.cache().read().await.get("a").is_some());

        api.pause_monitor("a").await.unwrap();
        assert!(api.cache().read().await.get("a").is_none());
    }

    #[tokio::test]
    async fn test_delete_accepts_empty_body() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .withf(|request| request.method == HttpMethod::Delete)
            .returning(|_| {
                Ok(HttpResponse {
                    status: 204,
                    body: String::new(),
                })
            });
        let api = client(transport, Session::with_token("t"));

        api.delete_monitor("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_logout_clears_session_and_cache() {
        let transport = MockHttpTransport::new();
        let api = client(transport, Session::with_token("t"));
        api.cache()
            .write()
            .await
            .store_monitor(MonitorRecord::from_value(json!({"_id": "a"})).unwrap());

        api.logout().await;

        assert!(!api.session().is_authenticated());
        assert!(api.cache().read().await.get("a").is_none());
    }
}
