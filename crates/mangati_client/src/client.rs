//! crates/mangati_client/src/client.rs
//!
//! A typed HTTP client for the Mangati API that routes every call through the
//! session manager: the bearer token is attached only while it is locally
//! valid, and a 401 from anything but the credential endpoints signs the user
//! out and remembers where they were headed.

use async_trait::async_trait;
use reqwest::{header, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::session::{SessionManager, TokenRefresher};
use crate::storage::{FileStorage, MemoryStorage, SessionStore, Storage, StoredSession, UserProfile};

const LOGIN_PATH: &str = "/api/auth/login";
const REGISTER_PATH: &str = "/api/auth/register";
const REFRESH_PATH: &str = "/api/auth/refresh";
const ME_PATH: &str = "/api/auth/me";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: String,
    /// Where the session survives restarts; `None` keeps it in memory.
    pub storage_dir: Option<PathBuf>,
    pub expiry_buffer: Duration,
    pub refresh_margin: Duration,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            storage_dir: None,
            expiry_buffer: Duration::from_secs(30),
            refresh_margin: Duration::from_secs(120),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
    remember_me: bool,
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
    user: UserProfile,
}

impl From<AuthResponse> for StoredSession {
    fn from(auth: AuthResponse) -> Self {
        StoredSession {
            token: auth.token,
            user: auth.user,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn is_credential_endpoint(path: &str) -> bool {
    path.starts_with(LOGIN_PATH) || path.starts_with(REGISTER_PATH)
}

async fn status_error(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.message,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string(),
    };
    ClientError::Status {
        status: status.as_u16(),
        message,
    }
}

/// Calls `POST /api/auth/refresh` with the current token.
pub struct HttpRefresher {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRefresher {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpRefresher {
    async fn refresh(&self, token: &str) -> Result<StoredSession, ClientError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, REFRESH_PATH))
            .bearer_auth(token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(response.json::<AuthResponse>().await?.into())
    }
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionManager>,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let storage: Arc<dyn Storage> = match &config.storage_dir {
            Some(dir) => Arc::new(FileStorage::open(dir)?),
            None => Arc::new(MemoryStorage::new()),
        };
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let refresher: Arc<dyn TokenRefresher> =
            Arc::new(HttpRefresher::new(http.clone(), config.base_url.clone()));

        let session = SessionManager::new(
            SessionStore::new(storage),
            Some(refresher),
            chrono::Duration::from_std(config.expiry_buffer).unwrap_or(chrono::Duration::seconds(30)),
            chrono::Duration::from_std(config.refresh_margin).unwrap_or(chrono::Duration::minutes(2)),
        );
        if let Some(user) = session.resume() {
            info!("Resumed session for {}", user.username);
        }

        Ok(Self {
            http,
            base_url: config.base_url,
            session,
        })
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<UserProfile, ClientError> {
        let body = LoginBody {
            email,
            password,
            remember_me,
        };
        let auth: AuthResponse = self.send(Method::POST, LOGIN_PATH, Some(&body)).await?;
        self.start_session(auth)
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Option<&str>,
    ) -> Result<UserProfile, ClientError> {
        let body = RegisterBody {
            username,
            email,
            password,
            role,
        };
        let auth: AuthResponse = self.send(Method::POST, REGISTER_PATH, Some(&body)).await?;
        self.start_session(auth)
    }

    pub async fn me(&self) -> Result<UserProfile, ClientError> {
        self.send::<(), _>(Method::GET, ME_PATH, None).await
    }

    /// Forces a refresh now, sharing any refresh already in flight.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        self.session.refresh_now().await.map(|_| ())
    }

    /// Local sign-out; the server keeps no session to revoke.
    pub fn logout(&self) {
        self.session.clear();
    }

    fn start_session(&self, auth: AuthResponse) -> Result<UserProfile, ClientError> {
        let session = StoredSession::from(auth);
        self.session.store(&session)?;
        Ok(session.user)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send::<(), T>(Method::GET, path, None).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.send(Method::POST, path, Some(body)).await
    }

    /// Sends a request whose success carries no body (204).
    pub async fn execute<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<(), ClientError> {
        self.request(method, path, body).await.map(|_| ())
    }

    async fn send<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ClientError> {
        let response = self.request(method, path, body).await?;
        Ok(response.json::<T>().await?)
    }

    async fn request<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut request = self
            .http
            .request(method.clone(), format!("{}{}", self.base_url, path));
        if let Some(body) = body {
            request = request.json(body);
        }

        let token = match self.session.bearer().await {
            Ok(token) => token,
            Err(e) => {
                // The refresh already signed the user out.
                debug!("Proceeding without credentials: {}", e);
                None
            }
        };
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED && !is_credential_endpoint(path) {
            warn!("{} {} was rejected as unauthenticated; signing out", method, path);
            self.session.clear();
            self.session.remember_redirect(path);
            return Err(ClientError::LoginRequired {
                return_to: Some(path.to_string()),
            });
        }
        if !status.is_success() {
            return Err(status_error(response).await);
        }
        Ok(response)
    }
}
