//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: registration, login, the current user, token
//! refresh and a claims echo for diagnosing role matching.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, response::IntoResponse, Json};
use mangati_core::{validation, NewUser, PortError, Role, User};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{HttpError, HttpResult};
use crate::web::dto::{AuthResponse, DebugAuthResponse, LoginRequest, RegisterRequest, UserDto};
use crate::web::middleware::AuthCaller;
use crate::web::state::AppState;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

//=========================================================================================
// Password Hashing
//=========================================================================================

/// Hashes a password into a PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

fn verify_password(password: &str, hashed: &str) -> HttpResult<bool> {
    let parsed_hash = PasswordHash::new(hashed).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        HttpError::internal()
    })?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Mints a token for `user` with the roles currently stored for them.
async fn issue_for(state: &AppState, user: User) -> HttpResult<AuthResponse> {
    let roles = state.db.get_user_roles(user.id).await?;
    let issued = state.issuer.issue(&user, &roles).map_err(|e| {
        error!("Failed to issue token for {}: {}", user.id, e);
        HttpError::internal()
    })?;
    let user = User { roles, ..user };
    Ok(AuthResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        user: UserDto::from(&user),
    })
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/auth/register - Create an account and sign it in
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "User registered", body = AuthResponse),
        (status = 400, description = "Invalid input or duplicate account")
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> HttpResult<impl IntoResponse> {
    // 1. Validate input
    let username = validation::required_text("Username", &req.username, validation::USERNAME_MAX)?;
    let email = validation::email(&req.email)?;
    validation::password(&req.password)?;

    // 2. Reject duplicates
    if state.db.email_taken(&email).await? {
        return Err(HttpError::bad_request("Email is already registered"));
    }
    if state.db.username_taken(&username).await? {
        return Err(HttpError::bad_request("Username is already taken"));
    }

    // 3. Hash the password
    let hashed_password = hash_password(&req.password).map_err(|e| {
        error!("Failed to hash password: {:?}", e);
        HttpError::internal()
    })?;

    // 4. Create the user with exactly one role
    let role = req
        .role
        .as_deref()
        .map(Role::from_requested)
        .unwrap_or(Role::Viewer);
    let user = state
        .db
        .create_user(NewUser {
            username,
            email,
            hashed_password,
            role,
        })
        .await
        .map_err(|e| match e {
            PortError::Conflict(msg) => HttpError::bad_request(msg),
            other => other.into(),
        })?;
    info!("Registered user {} as {}", user.username, role);

    // 5. Sign the new user in
    Ok(Json(issue_for(&state, user).await?))
}

/// POST /api/auth/login - Login with an existing account
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> HttpResult<impl IntoResponse> {
    // 1. Get user by email; an unknown email is indistinguishable from a bad password
    let credentials = match state.db.get_credentials_by_email(req.email.trim()).await {
        Ok(credentials) => credentials,
        Err(PortError::NotFound(_)) => {
            warn!("Login attempt for unknown email");
            return Err(HttpError::unauthorized(INVALID_CREDENTIALS));
        }
        Err(e) => return Err(e.into()),
    };

    // 2. Verify password
    if !verify_password(&req.password, &credentials.hashed_password)? {
        warn!("Failed login for user {}", credentials.user.id);
        return Err(HttpError::unauthorized(INVALID_CREDENTIALS));
    }

    // 3. Issue a token with fresh roles
    Ok(Json(issue_for(&state, credentials.user).await?))
}

/// GET /api/auth/me - The authenticated user's profile
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = UserDto),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "User no longer exists")
    ),
    security(("bearer_auth" = []))
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
) -> HttpResult<Json<UserDto>> {
    let user = state.db.get_user_by_id(caller.user_id).await?;
    Ok(Json(UserDto::from(&user)))
}

/// POST /api/auth/refresh - Exchange a still-valid token for a fresh one
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "auth",
    responses(
        (status = 200, description = "Token refreshed", body = AuthResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
) -> HttpResult<Json<AuthResponse>> {
    let user = state.db.get_user_by_id(caller.user_id).await.map_err(|e| match e {
        PortError::NotFound(_) => HttpError::unauthorized("Authentication required"),
        other => other.into(),
    })?;
    Ok(Json(issue_for(&state, user).await?))
}

/// GET /api/auth/debug - Echo the claims of the presented token
#[utoipa::path(
    get,
    path = "/api/auth/debug",
    tag = "auth",
    responses(
        (status = 200, description = "Claims of the current token", body = DebugAuthResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn debug_handler(AuthCaller(caller): AuthCaller) -> Json<DebugAuthResponse> {
    let has_claim = |value: &str| caller.role_claims.iter().any(|c| c == value);
    Json(DebugAuthResponse {
        user_id: caller.user_id,
        username: caller.username.clone(),
        email: caller.email.clone(),
        role_claims: caller.role_claims.clone(),
        is_in_viewer_role: caller.has_role(Role::Viewer),
        is_in_writer_role: caller.has_role(Role::Writer),
        is_in_admin_role: caller.has_role(Role::Admin),
        is_in_writer_role_uppercase: has_claim("WRITER"),
        is_in_writer_role_lowercase: has_claim("writer"),
    })
}
