//! Authenticated access to one site.
//!
//! A [`Session`] owns the cookie jar for a registered site and wraps every
//! remote call with the re-login protocol: when the CMS answers a call as
//! unauthorized, the session logs in again (asking the host's
//! [`Authenticator`] for credentials) and retries the call exactly once.

mod cookies;
mod form;
mod transport;

pub use cookies::{AUTH_COOKIE, CLIPBOARD_COOKIE, CookieJar};
pub use form::{EncodedBody, FormData, FormValue, escape_path, guess_content_type};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, Transport};

use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{FsError, FsResult};
use crate::types::RemoteUri;

/// Login credentials supplied by the host.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of credentials. The host owns any prompting UI.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn credentials(&self, site: &RemoteUri) -> FsResult<Credentials>;
}

/// Authenticator that always answers with the same credentials.
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub Credentials);

#[async_trait]
impl Authenticator for StaticCredentials {
    async fn credentials(&self, _site: &RemoteUri) -> FsResult<Credentials> {
        Ok(self.0.clone())
    }
}

/// Returns true when a response means "log in first".
pub fn is_unauthorized(response: &HttpResponse) -> bool {
    if response.status == 401 {
        return true;
    }
    if response
        .header("bobo-exception-type")
        .is_some_and(|v| v.contains("Unauthorized"))
    {
        return true;
    }
    response.is_redirect()
        && response.location().is_some_and(|location| {
            ["require_login", "login_form", "credentials_cookie_auth"]
                .iter()
                .any(|marker| location.contains(marker))
        })
}

/// Authenticated HTTP session for one site root.
pub struct Session {
    root: RemoteUri,
    transport: Arc<dyn Transport>,
    authenticator: Arc<dyn Authenticator>,
    cookies: RwLock<CookieJar>,
    /// Bumped after each successful login; serializes re-login.
    login_generation: Mutex<u64>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("root", &self.root)
            .field("cookies", &self.cookies.read().header_value().is_some())
            .finish()
    }
}

impl Session {
    pub fn new(
        root: RemoteUri,
        transport: Arc<dyn Transport>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            root,
            transport,
            authenticator,
            cookies: RwLock::new(CookieJar::new()),
            login_generation: Mutex::new(0),
        }
    }

    /// Site root this session authenticates against.
    pub fn root(&self) -> &RemoteUri {
        &self.root
    }

    /// Snapshot of the cookie jar, for persistence.
    pub fn cookies(&self) -> CookieJar {
        self.cookies.read().clone()
    }

    /// Replace the cookie jar with a persisted one.
    pub fn restore_cookies(&self, jar: CookieJar) {
        *self.cookies.write() = jar;
    }

    /// Returns true if a login cookie is present.
    pub fn is_logged_in(&self) -> bool {
        self.cookies.read().get(AUTH_COOKIE).is_some()
    }

    /// GET with re-login.
    pub async fn get(&self, path_and_query: &str) -> FsResult<HttpResponse> {
        self.call(Method::Get, path_and_query, None).await
    }

    /// POST a form with re-login.
    pub async fn post(&self, path: &str, form: &FormData) -> FsResult<HttpResponse> {
        self.call(Method::Post, path, Some(form)).await
    }

    /// Perform a call; on an unauthorized answer, log in and retry once.
    ///
    /// If the login fails, the caller sees the original unauthorized error,
    /// not the login failure.
    pub async fn call(
        &self,
        method: Method,
        path_and_query: &str,
        form: Option<&FormData>,
    ) -> FsResult<HttpResponse> {
        let seen_generation = *self.login_generation.lock().await;
        let response = self.send(method, path_and_query, form).await?;
        if !is_unauthorized(&response) {
            return Ok(response);
        }

        let original = FsError::unauthorized(format!("{method} {path_and_query}"));
        if let Err(e) = self.relogin(seen_generation).await {
            tracing::warn!(site = %self.root, error = %e, "re-login failed");
            return Err(original);
        }

        let retry = self.send(method, path_and_query, form).await?;
        if is_unauthorized(&retry) {
            tracing::warn!(path = %path_and_query, "still unauthorized after re-login");
            return Err(original);
        }
        Ok(retry)
    }

    /// Log in unless another caller already did since `seen_generation`.
    async fn relogin(&self, seen_generation: u64) -> FsResult<()> {
        let mut generation = self.login_generation.lock().await;
        if *generation != seen_generation {
            return Ok(());
        }
        tracing::info!(site = %self.root, "session expired, logging in again");
        self.login_inner().await?;
        *generation += 1;
        Ok(())
    }

    /// Log in explicitly.
    pub async fn login(&self) -> FsResult<()> {
        let mut generation = self.login_generation.lock().await;
        self.login_inner().await?;
        *generation += 1;
        Ok(())
    }

    async fn login_inner(&self) -> FsResult<()> {
        let credentials = self.authenticator.credentials(&self.root).await?;
        let form = FormData::new()
            .text("__ac_name", credentials.username.as_str())
            .text("__ac_password", credentials.password.as_str())
            .text("form.submitted", "1");
        let path = format!("{}/login_form", self.root_path());
        let response = self.send(Method::Post, &path, Some(&form)).await?;
        // absorb() already ran in send(); check this response set the cookie
        let mut probe = CookieJar::new();
        if probe.absorb(&response).iter().any(|name| name == AUTH_COOKIE) {
            tracing::info!(site = %self.root, user = %credentials.username, "logged in");
            Ok(())
        } else {
            Err(FsError::unauthorized(format!(
                "login failed for {} at {}",
                credentials.username, self.root
            )))
        }
    }

    fn root_path(&self) -> &str {
        match self.root.path() {
            "/" => "",
            path => path,
        }
    }

    async fn send(
        &self,
        method: Method,
        path_and_query: &str,
        form: Option<&FormData>,
    ) -> FsResult<HttpResponse> {
        let mut headers = Vec::new();
        if let Some(cookie) = self.cookies.read().header_value() {
            headers.push(("Cookie".to_string(), cookie));
        }
        let body = form.map(|form| {
            let encoded = form.encode();
            headers.push(("Content-Type".to_string(), encoded.content_type));
            encoded.bytes
        });
        let request = HttpRequest {
            method,
            authority: self.root.authority().to_string(),
            path_and_query: escape_path(path_and_query),
            headers,
            body,
        };

        let response = self.transport.send(request).await?;
        tracing::debug!(
            method = %method,
            path = %path_and_query,
            status = response.status,
            "remote call"
        );
        self.cookies.write().absorb(&response);
        Ok(response)
    }
}
