//! Typed client for the attendance backend.
//!
//! All mutating operations are single atomic round-trips: on failure the
//! error is surfaced and local state is left untouched. Nothing here
//! retries automatically; transport failures are user-retryable only.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{
    AttendanceEntry, AttendanceRecord, ClassDetail, NewSession, Paged, Session,
};
use crate::search::PageFetcher;

pub mod model;

pub use model::{
    AuthTokens, EntityKind, Envelope, ErrorBody, HistoryQuery, LoginRequest, QueryPairs,
    RefreshRequest, ResetOutcome, SessionAttendance, SortOrder,
};

/// The operations the roster and history engines need; implemented by
/// `ApiClient` and by recording mocks in tests.
#[async_trait]
pub trait AttendanceApi: Send + Sync {
    async fn class_detail(&self, class_id: &str) -> Result<ClassDetail>;

    /// Sessions of a class; `unrecorded_only` narrows to sessions without
    /// any attendance yet.
    async fn sessions_by_class(&self, class_id: &str, unrecorded_only: bool)
        -> Result<Vec<Session>>;

    async fn attendance_status(&self, session_id: &str) -> Result<SessionAttendance>;

    /// Create path; the server rejects this with a conflict when records
    /// already exist for the session.
    async fn create_attendances(
        &self,
        session_id: &str,
        entries: &[AttendanceEntry],
    ) -> Result<Vec<AttendanceRecord>>;

    /// Amend path for an already-recorded session.
    async fn update_attendances(
        &self,
        session_id: &str,
        entries: &[AttendanceEntry],
    ) -> Result<Vec<AttendanceRecord>>;

    async fn list_attendances(&self, query: &HistoryQuery) -> Result<Paged<AttendanceRecord>>;

    /// External reset back to Unrecorded; hard-deletes every record of the
    /// session. Not part of the recording state machine.
    async fn reset_attendance(&self, session_id: &str) -> Result<ResetOutcome>;
}

#[derive(Debug, Default)]
struct AuthState {
    access: Option<String>,
    refresh: Option<String>,
}

pub struct ApiClient {
    http: Client,
    base_url: Url,
    auth: tokio::sync::Mutex<AuthState>,
    // Single-flight guard: concurrent 401s queue here and replay with the
    // token the first waiter obtained.
    refresh_gate: tokio::sync::Mutex<()>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(base_url: Url, timeout: Duration) -> Self {
        let http = Client::builder()
            .user_agent("rollcall/0.1")
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        ApiClient {
            http,
            base_url,
            auth: tokio::sync::Mutex::new(AuthState::default()),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Init-on-login: install a token pair obtained elsewhere (e.g. from
    /// the environment).
    pub async fn set_tokens(&self, access: String, refresh: Option<String>) {
        let mut auth = self.auth.lock().await;
        auth.access = Some(access);
        auth.refresh = refresh;
    }

    /// Clear-on-logout/expiry.
    pub async fn clear_session(&self) {
        let mut auth = self.auth.lock().await;
        auth.access = None;
        auth.refresh = None;
    }

    pub async fn session_active(&self) -> bool {
        self.auth.lock().await.access.is_some()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let body = encode_body(&LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })?;
        let tokens: Envelope<AuthTokens> = self
            .execute(Method::POST, "auth/login", &[], Some(&body), None)
            .await?;
        info!(username, "signed in");
        self.set_tokens(tokens.data.access_token, tokens.data.refresh_token)
            .await;
        Ok(())
    }

    /// One request with at most one token-refresh retry on 401.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<Envelope<T>> {
        let token = self.auth.lock().await.access.clone();
        let first = self
            .execute(method.clone(), path, query, body, token.as_deref())
            .await;
        match first {
            Err(Error::AuthExpired) => {
                let stale = token.ok_or(Error::AuthExpired)?;
                let fresh = self.refresh_access(&stale).await?;
                self.execute(method, path, query, body, Some(&fresh)).await
            }
            other => other,
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&serde_json::Value>,
        token: Option<&str>,
    ) -> Result<Envelope<T>> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| Error::Transport(e.to_string()))?;
        debug!(%url, method = %method, "api request");

        let mut req = self.http.request(method, url);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let res = req.send().await.map_err(|e| Error::Transport(e.to_string()))?;
        let status = res.status();
        if status.is_success() {
            return res
                .json::<Envelope<T>>()
                .await
                .map_err(|e| Error::Transport(format!("invalid response body: {e}")));
        }

        let raw = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&raw)
            .ok()
            .and_then(|b| b.message);
        warn!(%status, message = message.as_deref().unwrap_or(""), "api error");
        Err(classify(status, message))
    }

    /// Serializes refreshes: whoever holds the gate refreshes, everyone
    /// queued behind it reuses the token that refresh produced.
    async fn refresh_access(&self, stale: &str) -> Result<String> {
        let _gate = self.refresh_gate.lock().await;

        let refresh = {
            let auth = self.auth.lock().await;
            if let Some(current) = &auth.access {
                if current != stale {
                    // Another waiter already refreshed while we queued.
                    return Ok(current.clone());
                }
            }
            auth.refresh.clone().ok_or(Error::AuthExpired)?
        };

        let body = encode_body(&RefreshRequest {
            refresh_token: refresh,
        })?;
        let refreshed: Result<Envelope<AuthTokens>> = self
            .execute(Method::POST, "auth/refresh-token", &[], Some(&body), None)
            .await;

        match refreshed {
            Ok(env) => {
                let mut auth = self.auth.lock().await;
                auth.access = Some(env.data.access_token.clone());
                if env.data.refresh_token.is_some() {
                    auth.refresh = env.data.refresh_token;
                }
                info!("access token refreshed");
                Ok(env.data.access_token)
            }
            Err(err) => {
                warn!(?err, "token refresh failed; terminating session");
                self.clear_session().await;
                Err(Error::AuthExpired)
            }
        }
    }

    /// Generic paginated listing used by the entity pickers.
    pub async fn list_page<T: DeserializeOwned>(
        &self,
        kind: EntityKind,
        search: &str,
        page: u32,
        limit: u32,
    ) -> Result<Paged<T>> {
        let mut pairs = QueryPairs::new();
        pairs.push("search", search);
        pairs.push("page", page.to_string());
        pairs.push("limit", limit.to_string());
        let env: Envelope<Vec<T>> = self
            .request(Method::GET, kind.path(), pairs.as_slice(), None)
            .await?;
        Ok(Paged {
            data: env.data,
            meta: env.meta.unwrap_or_default(),
        })
    }

    pub async fn session(&self, session_id: &str) -> Result<Session> {
        let env: Envelope<Session> = self
            .request(Method::GET, &format!("sessions/{session_id}"), &[], None)
            .await?;
        Ok(env.data)
    }

    pub async fn create_session(&self, body: &NewSession) -> Result<Session> {
        let body = encode_body(body)?;
        let env: Envelope<Session> = self
            .request(Method::POST, "sessions", &[], Some(&body))
            .await?;
        Ok(env.data)
    }

    pub async fn update_session(&self, session_id: &str, body: &NewSession) -> Result<Session> {
        let body = encode_body(body)?;
        let env: Envelope<Session> = self
            .request(Method::PATCH, &format!("sessions/{session_id}"), &[], Some(&body))
            .await?;
        Ok(env.data)
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<Session> {
        let env: Envelope<Session> = self
            .request(Method::DELETE, &format!("sessions/{session_id}"), &[], None)
            .await?;
        Ok(env.data)
    }
}

/// Encoding happens before the request leaves the process, so a failure
/// here is a local Validation error, not a transport one.
fn encode_body<T: serde::Serialize>(body: &T) -> Result<serde_json::Value> {
    serde_json::to_value(body)
        .map_err(|e| Error::Validation(format!("could not encode request: {e}")))
}

fn classify(status: StatusCode, message: Option<String>) -> Error {
    let message = message.unwrap_or_else(|| format!("server returned {status}"));
    match status {
        StatusCode::UNAUTHORIZED => Error::AuthExpired,
        StatusCode::NOT_FOUND => Error::NotFound(message),
        StatusCode::CONFLICT => Error::Conflict(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Error::Validation(message),
        _ => Error::Transport(message),
    }
}

#[async_trait]
impl AttendanceApi for ApiClient {
    async fn class_detail(&self, class_id: &str) -> Result<ClassDetail> {
        let env: Envelope<ClassDetail> = self
            .request(Method::GET, &format!("classes/{class_id}"), &[], None)
            .await?;
        Ok(env.data)
    }

    async fn sessions_by_class(
        &self,
        class_id: &str,
        unrecorded_only: bool,
    ) -> Result<Vec<Session>> {
        let path = if unrecorded_only {
            format!("sessions/classid/{class_id}/without-attendance")
        } else {
            format!("sessions/classid/{class_id}")
        };
        let env: Envelope<Vec<Session>> = self.request(Method::GET, &path, &[], None).await?;
        Ok(env.data)
    }

    async fn attendance_status(&self, session_id: &str) -> Result<SessionAttendance> {
        let env: Envelope<SessionAttendance> = self
            .request(
                Method::GET,
                &format!("attendances/status/{session_id}"),
                &[],
                None,
            )
            .await?;
        Ok(env.data)
    }

    async fn create_attendances(
        &self,
        session_id: &str,
        entries: &[AttendanceEntry],
    ) -> Result<Vec<AttendanceRecord>> {
        let body = serde_json::json!({
            "sessionId": session_id,
            "attendances": entries,
        });
        let env: Envelope<Vec<AttendanceRecord>> = self
            .request(Method::POST, "attendances", &[], Some(&body))
            .await?;
        Ok(env.data)
    }

    async fn update_attendances(
        &self,
        session_id: &str,
        entries: &[AttendanceEntry],
    ) -> Result<Vec<AttendanceRecord>> {
        let body = serde_json::json!({ "attendances": entries });
        let env: Envelope<Vec<AttendanceRecord>> = self
            .request(
                Method::PATCH,
                &format!("attendances/{session_id}"),
                &[],
                Some(&body),
            )
            .await?;
        Ok(env.data)
    }

    async fn list_attendances(&self, query: &HistoryQuery) -> Result<Paged<AttendanceRecord>> {
        let pairs = query.query_pairs();
        let env: Envelope<Vec<AttendanceRecord>> = self
            .request(Method::GET, "attendances", pairs.as_slice(), None)
            .await?;
        Ok(Paged {
            data: env.data,
            meta: env.meta.unwrap_or_default(),
        })
    }

    async fn reset_attendance(&self, session_id: &str) -> Result<ResetOutcome> {
        let env: Envelope<ResetOutcome> = self
            .request(
                Method::DELETE,
                &format!("attendances/reset/{session_id}"),
                &[],
                None,
            )
            .await?;
        Ok(env.data)
    }
}

/// Adapts one entity collection endpoint to the search list's fetcher seam.
pub struct EntityPager<T> {
    client: Arc<ApiClient>,
    kind: EntityKind,
    _marker: PhantomData<fn() -> T>,
}

impl<T> EntityPager<T> {
    pub fn new(client: Arc<ApiClient>, kind: EntityKind) -> Self {
        EntityPager {
            client,
            kind,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T> PageFetcher<T> for EntityPager<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    async fn fetch_page(&self, search: &str, page: u32, limit: u32) -> Result<Vec<T>> {
        let paged = self.client.list_page(self.kind, search, page, limit).await?;
        Ok(paged.data)
    }
}
