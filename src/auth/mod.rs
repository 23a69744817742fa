/*!
 * # Authentication and Authorization Module
 *
 * Operators sign in with their badge number (`matricula`); administrators
 * must also present a password. A successful login issues an HS256 JWT that
 * is returned in the body and set as an HttpOnly cookie, so browser screens
 * and shop-floor tablets can use either transport.
 *
 * Route guards are applied with [`AuthRouterExt`]: `with_auth` requires a
 * valid session, `with_permission` additionally checks the role's
 * permission table in [`rbac`].
 */

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use metrics::counter;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::entities::user;
use crate::errors::ServiceError;
use crate::ApiResponse;

pub mod password;
pub mod rbac;

pub use rbac::permissions as consts;
pub use rbac::Role;

/// Claim structure for session tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,       // User ID
    pub matricula: String, // Badge number
    pub name: String,
    pub role: Role,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub iss: String,
    pub aud: String,
}

/// Authenticated user extracted from the session token
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub matricula: String,
    pub name: String,
    pub role: Role,
    #[serde(skip)]
    pub token_id: String,
    #[serde(skip)]
    pub expires_at: i64,
}

impl AuthUser {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.role.has_permission(permission)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl TryFrom<Claims> for AuthUser {
    type Error = AuthError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?,
            matricula: claims.matricula,
            name: claims.name,
            role: claims.role,
            token_id: claims.jti,
            expires_at: claims.exp,
        })
    }
}

/// Handlers take `AuthUser` as an argument on routes guarded by `with_auth`.
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub session_ttl: Duration,
    pub cookie_name: String,
    pub cookie_secure: bool,
}

impl AuthConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            jwt_audience: cfg.auth_audience.clone(),
            jwt_issuer: cfg.auth_issuer.clone(),
            session_ttl: cfg.session_ttl(),
            cookie_name: cfg.session_cookie_name.clone(),
            cookie_secure: cfg.session_cookie_secure || cfg.is_production(),
        }
    }
}

/// Revocation list entry
#[derive(Clone, Debug)]
struct RevokedToken {
    jti: String,
    expiry: DateTime<Utc>,
}

/// Issues, validates and revokes sessions
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
    db: Arc<DbPool>,
    revoked_tokens: Arc<RwLock<Vec<RevokedToken>>>,
}

/// Login request: operators send only their badge number
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 20, message = "matricula is required"))]
    pub matricula: String,
    #[validate(length(max = 128))]
    pub password: Option<String>,
}

/// Issued session
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Session {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: AuthUser,
}

impl AuthService {
    pub fn new(config: AuthConfig, db: Arc<DbPool>) -> Self {
        Self {
            config,
            db,
            revoked_tokens: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Check credentials and issue a session.
    ///
    /// Inactive and unknown users get the same `InvalidCredentials` error.
    #[instrument(skip(self, credentials), fields(matricula = %credentials.matricula))]
    pub async fn login(&self, credentials: &LoginRequest) -> Result<Session, AuthError> {
        let found = user::Entity::find()
            .filter(user::Column::Matricula.eq(credentials.matricula.trim()))
            .one(&*self.db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        let Some(found) = found.filter(|u| u.active) else {
            counter!("shopfloor.auth.login_failed", 1);
            return Err(AuthError::InvalidCredentials);
        };

        let password_ok = match (&found.password_hash, credentials.password.as_deref()) {
            (Some(hash), Some(given)) => password::verify_password(given, hash),
            (Some(_), None) => false,
            // an admin without a stored hash can never log in
            (None, _) => !found.role.requires_password(),
        };
        if !password_ok {
            counter!("shopfloor.auth.login_failed", 1);
            warn!(user_id = %found.id, "login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let session = self.issue_session(&found)?;
        counter!("shopfloor.auth.login", 1);
        info!(user_id = %found.id, role = %found.role, "session issued");
        Ok(session)
    }

    /// Generate a session token for a user
    pub fn issue_session(&self, user: &user::Model) -> Result<Session, AuthError> {
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(self.config.session_ttl)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;

        let claims = Claims {
            sub: user.id.to_string(),
            matricula: user.matricula.clone(),
            name: user.name.clone(),
            role: user.role,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        let access_token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))?;

        Ok(Session {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.session_ttl.as_secs() as i64,
            user: AuthUser::try_from(claims)?,
        })
    }

    /// Validate a session token and extract the claims
    pub async fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?
        .claims;

        if self.is_token_revoked(&claims.jti).await {
            return Err(AuthError::RevokedToken);
        }

        Ok(claims)
    }

    /// Revoke the session a user is currently holding
    pub async fn revoke(&self, user: &AuthUser) {
        let expiry = DateTime::<Utc>::from_timestamp(user.expires_at, 0).unwrap_or_else(Utc::now);
        let mut revoked = self.revoked_tokens.write().await;
        revoked.push(RevokedToken {
            jti: user.token_id.clone(),
            expiry,
        });

        // expired entries can go, the token would be rejected anyway
        let now = Utc::now();
        revoked.retain(|t| t.expiry > now);
    }

    async fn is_token_revoked(&self, token_id: &str) -> bool {
        let revoked = self.revoked_tokens.read().await;
        revoked.iter().any(|t| t.jti == token_id)
    }

    /// Reload the user behind a session, rejecting deactivated accounts
    pub async fn current_user(&self, auth: &AuthUser) -> Result<user::Model, AuthError> {
        user::Entity::find_by_id(auth.user_id)
            .one(&*self.db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?
            .filter(|u| u.active)
            .ok_or(AuthError::UserNotFound)
    }

    /// Applies the stored role and profile to a session; deactivated or
    /// deleted users lose it immediately.
    pub async fn refresh(&self, mut auth: AuthUser) -> Result<AuthUser, AuthError> {
        let stored = self.current_user(&auth).await?;
        auth.role = stored.role;
        auth.matricula = stored.matricula;
        auth.name = stored.name;
        Ok(auth)
    }

    fn session_cookie(&self, token: &str, max_age: u64) -> Result<HeaderValue, AuthError> {
        let secure = if self.config.cookie_secure {
            "; Secure"
        } else {
            ""
        };
        HeaderValue::from_str(&format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
            self.config.cookie_name, token, max_age, secure
        ))
        .map_err(|e| AuthError::InternalError(e.to_string()))
    }
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingAuth,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token has been revoked")]
    RevokedToken,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("User not found")]
    UserNotFound,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingAuth
            | AuthError::InvalidCredentials
            | AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::RevokedToken
            | AuthError::UserNotFound => ServiceError::Unauthorized(err.to_string()),
            AuthError::InsufficientPermissions => ServiceError::Forbidden(err.to_string()),
            AuthError::TokenCreation(msg)
            | AuthError::DatabaseError(msg)
            | AuthError::InternalError(msg) => ServiceError::InternalError(msg),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ServiceError::from(self).into_response()
    }
}

/// Permission middleware to check if a user has the required permission
pub async fn permission_middleware(
    State(required_permission): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    if !user.has_permission(&required_permission) {
        counter!("shopfloor.auth.forbidden", 1);
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Authentication middleware that extracts and validates session tokens
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication service not available",
            )
                .into_response();
        }
    };

    let token = match extract_token(request.headers(), &auth_service.config.cookie_name) {
        Some(token) => token,
        None => return AuthError::MissingAuth.into_response(),
    };

    let user = match auth_service.validate_token(&token).await {
        Ok(claims) => AuthUser::try_from(claims),
        Err(e) => Err(e),
    };
    // role and active flag come from the database, not from the token
    let user = match user {
        Ok(user) => auth_service.refresh(user).await,
        Err(e) => Err(e),
    };

    match user {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Session token from `Authorization: Bearer` or, failing that, the session cookie
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Authentication routes, nested under `/auth`
pub fn auth_routes() -> axum::Router<Arc<AuthService>> {
    let session_routes = axum::Router::new()
        .route("/logout", post(logout_handler))
        .route("/me", get(me_handler))
        .with_auth();

    axum::Router::new()
        .route("/login", post(login_handler))
        .merge(session_routes)
        .layer(DefaultBodyLimit::max(1024 * 16))
}

/// Log in with badge number (and password for administrators)
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = Session),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login_handler(
    State(auth_service): State<Arc<AuthService>>,
    crate::handlers::common::ValidatedJson(credentials): crate::handlers::common::ValidatedJson<
        LoginRequest,
    >,
) -> Result<Response, ServiceError> {
    let session = auth_service.login(&credentials).await?;
    let cookie =
        auth_service.session_cookie(&session.access_token, session.expires_in.max(0) as u64)?;

    let mut response = Json(ApiResponse::success(session)).into_response();
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}

/// Revoke the current session and clear the cookie
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 200, description = "Session revoked"),
        (status = 401, description = "No session", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn logout_handler(
    State(auth_service): State<Arc<AuthService>>,
    auth_user: AuthUser,
) -> Result<Response, ServiceError> {
    auth_service.revoke(&auth_user).await;
    info!(user_id = %auth_user.user_id, "session revoked");

    let cookie = auth_service.session_cookie("", 0)?;
    let mut response = Json(ApiResponse::success(serde_json::json!({
        "message": "Successfully logged out"
    })))
    .into_response();
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}

/// The user behind the current session
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user", body = crate::entities::user::Model),
        (status = 401, description = "No session", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn me_handler(
    State(auth_service): State<Arc<AuthService>>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<user::Model>>, ServiceError> {
    let user = auth_service.current_user(&auth_user).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_permission(self, permission: &str) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_permission(self, permission: &str) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            permission.to_string(),
            permission_middleware,
        ))
        .with_auth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        let config = AuthConfig {
            jwt_secret: "k3Jd9sLq0Zx7Wv2Np5Rt8Ym1Bc4Hf6Gu3Ae0Io9Pl2Ks5Dj8Fh1Qw4Er7Ty0Ui3Oz6Xc".into(),
            jwt_audience: "shopfloor-clients".into(),
            jwt_issuer: "shopfloor-api".into(),
            session_ttl: Duration::from_secs(600),
            cookie_name: "shopfloor_session".into(),
            cookie_secure: false,
        };
        AuthService::new(
            config,
            Arc::new(sea_orm::DatabaseConnection::Disconnected),
        )
    }

    fn operator() -> user::Model {
        user::Model {
            id: Uuid::new_v4(),
            matricula: "1042".into(),
            name: "Ana Souza".into(),
            role: Role::Operator,
            password_hash: None,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn issued_session_validates_until_revoked() {
        let auth = service();
        let user = operator();
        let session = auth.issue_session(&user).unwrap();

        let claims = auth.validate_token(&session.access_token).await.unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.role, Role::Operator);

        auth.revoke(&session.user).await;
        assert!(matches!(
            auth.validate_token(&session.access_token).await,
            Err(AuthError::RevokedToken)
        ));
    }

    #[tokio::test]
    async fn token_signed_with_another_secret_is_rejected() {
        let auth = service();
        let mut other = service();
        other.config.jwt_secret = "a-completely-different-signing-secret-for-this-unit-test-0987".into();
        let session = other.issue_session(&operator()).unwrap();

        assert!(matches!(
            auth.validate_token(&session.access_token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn token_is_read_from_bearer_then_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; shopfloor_session=from-cookie"),
        );
        assert_eq!(
            extract_token(&headers, "shopfloor_session").as_deref(),
            Some("from-cookie")
        );

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(
            extract_token(&headers, "shopfloor_session").as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn missing_token_yields_none() {
        let headers = HeaderMap::new();
        assert!(extract_token(&headers, "shopfloor_session").is_none());
    }

    #[test]
    fn auth_errors_map_to_http_statuses() {
        assert_eq!(
            ServiceError::from(AuthError::MissingAuth).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::from(AuthError::InsufficientPermissions).status_code(),
            StatusCode::FORBIDDEN
        );
    }
}
