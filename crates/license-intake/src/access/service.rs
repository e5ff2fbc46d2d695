use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::intake::notifications::password_reset;
use crate::intake::validation::is_valid_email;
use crate::intake::{Mailer, RepositoryError, ValidationErrors};

use super::domain::{Admin, AdminId, AdminRole, AdminSession, AdminStats};
use super::middleware::{cleared_session_cookie, session_cookie};
use super::passwords::{hash_password_blocking, verify_password_blocking, PasswordError};
use super::repository::AdminRepository;
use super::tokens::{Claims, TokenError, TokenIssuer};

pub const MIN_PASSWORD_LENGTH: usize = 6;
const RECENT_LOGIN_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub admin: Admin,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<AdminRole>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<AdminRole>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForgotPassword {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordReset {
    pub token: String,
    pub new_password: String,
}

/// Delivery settings for password reset links.
pub struct ResetMail {
    pub mailer: Arc<dyn Mailer>,
    /// Frontend origin; the link points at `{link_base}/admin/reset-password`.
    pub link_base: String,
    pub timeout: StdDuration,
}

fn check_username(errors: &mut ValidationErrors, username: &str) {
    let length = username.chars().count();
    if !(3..=50).contains(&length) {
        errors.push("username", "Username must be between 3 and 50 characters");
    }
}

fn check_email(errors: &mut ValidationErrors, email: &str) {
    if !is_valid_email(email) {
        errors.push("email", "Please enter a valid email address");
    }
}

fn check_password(errors: &mut ValidationErrors, field: &str, password: &str) {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(
            field,
            format!("Password must be at least {MIN_PASSWORD_LENGTH} characters"),
        );
    }
}

/// Admin authentication, sessions, and account management.
pub struct AccessService {
    repository: Arc<dyn AdminRepository>,
    tokens: TokenIssuer,
    reset_mail: Option<ResetMail>,
    secure_cookies: bool,
}

impl AccessService {
    pub fn new(repository: Arc<dyn AdminRepository>, tokens: TokenIssuer) -> Self {
        Self {
            repository,
            tokens,
            reset_mail: None,
            secure_cookies: false,
        }
    }

    pub fn with_reset_mail(mut self, reset_mail: ResetMail) -> Self {
        self.reset_mail = Some(reset_mail);
        self
    }

    /// Mark session cookies `Secure`; enabled in production.
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    /// `Set-Cookie` value carrying a session token for the token lifetime.
    pub fn session_cookie(&self, token: &str) -> String {
        session_cookie(token, self.tokens.ttl(), self.secure_cookies)
    }

    /// Log out: sessions are stateless, so this only expires the cookie.
    pub fn logout(&self, session: &AdminSession) -> String {
        info!(username = %session.username, "admin logged out");
        cleared_session_cookie(self.secure_cookies)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, AccessError> {
        let username = request.username.trim();
        let admin = self
            .repository
            .fetch_by_username(username)
            .await?
            .filter(|admin| admin.is_active)
            .ok_or_else(invalid_credentials)?;

        if !verify_password_blocking(request.password, admin.password_hash.clone()).await? {
            warn!(username, "rejected login attempt");
            return Err(invalid_credentials());
        }

        let mut admin = admin;
        admin.last_login = Some(Utc::now());
        let admin = self.repository.update(admin).await?;
        let token = self.tokens.issue(admin.id, admin.role)?;

        info!(username = %admin.username, role = %admin.role, "admin logged in");
        Ok(LoginResponse { admin, token })
    }

    /// Create the first account as a super admin; closed once any admin exists.
    pub async fn register_first(&self, request: NewAdmin) -> Result<Admin, AccessError> {
        if self.repository.count().await? > 0 {
            return Err(AccessError::Forbidden(
                "Registration is closed; ask a super admin for an account".to_string(),
            ));
        }
        self.insert_admin(request, AdminRole::SuperAdmin).await
    }

    /// Resolve a bearer token into a session for an active admin.
    pub async fn authenticate(&self, token: &str) -> Result<AdminSession, AccessError> {
        let claims = self.tokens.verify(token)?;
        match self.active_admin(&claims).await? {
            Some(admin) => Ok(admin.session()),
            None => Err(AccessError::Unauthorized(
                "Not authorized to access this route".to_string(),
            )),
        }
    }

    /// Mail a one-hour reset link to the active admin owning `email`.
    ///
    /// Unknown addresses succeed silently so the endpoint does not reveal which accounts exist.
    pub async fn forgot_password(&self, request: ForgotPassword) -> Result<(), AccessError> {
        let email = request.email.trim().to_lowercase();
        let mut errors = ValidationErrors::default();
        check_email(&mut errors, &email);
        errors.into_result()?;

        let Some(admin) = self
            .repository
            .fetch_by_email(&email)
            .await?
            .filter(|admin| admin.is_active)
        else {
            info!("password reset requested for an unknown or inactive address");
            return Ok(());
        };

        let Some(reset_mail) = &self.reset_mail else {
            warn!(username = %admin.username, "password reset requested but no mailer is configured");
            return Ok(());
        };

        let token = self.tokens.issue_password_reset(admin.id, admin.role)?;
        let link = format!(
            "{}/admin/reset-password?token={token}",
            reset_mail.link_base.trim_end_matches('/')
        );
        let message = password_reset(
            &admin.email,
            &link,
            self.tokens.reset_ttl().num_minutes(),
        );

        match tokio::time::timeout(reset_mail.timeout, reset_mail.mailer.send(message)).await {
            Ok(Ok(())) => info!(username = %admin.username, "password reset link sent"),
            Ok(Err(error)) => {
                warn!(username = %admin.username, %error, "password reset email failed")
            }
            Err(_) => warn!(username = %admin.username, "password reset email timed out"),
        }
        Ok(())
    }

    /// Set a new password from a reset token. Session tokens are not accepted here.
    pub async fn reset_password(&self, request: PasswordReset) -> Result<(), AccessError> {
        let mut errors = ValidationErrors::default();
        if request.token.trim().is_empty() {
            errors.push("token", "Reset token is required");
        }
        check_password(&mut errors, "newPassword", &request.new_password);
        errors.into_result()?;

        let claims = self
            .tokens
            .verify_password_reset(request.token.trim())
            .map_err(|error| {
                warn!(%error, "rejected password reset token");
                invalid_reset_token()
            })?;
        let mut admin = self
            .active_admin(&claims)
            .await?
            .ok_or_else(invalid_reset_token)?;

        admin.password_hash = hash_password_blocking(request.new_password).await?;
        let admin = self.repository.update(admin).await?;
        info!(username = %admin.username, "admin password reset");
        Ok(())
    }

    pub async fn me(&self, session: &AdminSession) -> Result<Admin, AccessError> {
        self.repository
            .fetch(session.admin_id)
            .await?
            .ok_or(AccessError::NotFound)
    }

    pub async fn change_password(
        &self,
        session: &AdminSession,
        change: PasswordChange,
    ) -> Result<(), AccessError> {
        let mut errors = ValidationErrors::default();
        check_password(&mut errors, "newPassword", &change.new_password);
        errors.into_result()?;

        let mut admin = self.me(session).await?;
        if !verify_password_blocking(change.current_password, admin.password_hash.clone()).await? {
            return Err(AccessError::Unauthorized(
                "Current password is incorrect".to_string(),
            ));
        }

        admin.password_hash = hash_password_blocking(change.new_password).await?;
        self.repository.update(admin).await?;
        info!(username = %session.username, "admin password changed");
        Ok(())
    }

    pub async fn create_admin(
        &self,
        session: &AdminSession,
        request: NewAdmin,
    ) -> Result<Admin, AccessError> {
        require_manager(session)?;
        let role = request.role.unwrap_or(AdminRole::Admin);
        let created = self.insert_admin(request, role).await?;
        info!(created = %created.username, by = %session.username, "admin account created");
        Ok(created)
    }

    /// Active admins, newest first.
    pub async fn list_admins(&self, session: &AdminSession) -> Result<Vec<Admin>, AccessError> {
        require_manager(session)?;
        Ok(self
            .repository
            .list()
            .await?
            .into_iter()
            .filter(|admin| admin.is_active)
            .collect())
    }

    pub async fn update_admin(
        &self,
        session: &AdminSession,
        id: AdminId,
        update: AdminUpdate,
    ) -> Result<Admin, AccessError> {
        require_manager(session)?;
        if id == session.admin_id && (update.role.is_some() || update.is_active.is_some()) {
            return Err(AccessError::Rejected(
                "You cannot change your own role or active status".to_string(),
            ));
        }

        let mut admin = self.repository.fetch(id).await?.ok_or(AccessError::NotFound)?;
        let mut errors = ValidationErrors::default();
        if let Some(username) = update.username {
            let username = username.trim().to_string();
            check_username(&mut errors, &username);
            admin.username = username;
        }
        if let Some(email) = update.email {
            let email = email.trim().to_lowercase();
            check_email(&mut errors, &email);
            admin.email = email;
        }
        errors.into_result()?;

        if let Some(role) = update.role {
            admin.role = role;
        }
        if let Some(is_active) = update.is_active {
            admin.is_active = is_active;
        }

        let updated = self.repository.update(admin).await.map_err(account_conflict)?;
        info!(updated = %updated.username, by = %session.username, "admin account updated");
        Ok(updated)
    }

    pub async fn deactivate_admin(
        &self,
        session: &AdminSession,
        id: AdminId,
    ) -> Result<(), AccessError> {
        require_manager(session)?;
        if id == session.admin_id {
            return Err(AccessError::Rejected(
                "You cannot deactivate your own account".to_string(),
            ));
        }

        let mut admin = self.repository.fetch(id).await?.ok_or(AccessError::NotFound)?;
        admin.is_active = false;
        let admin = self.repository.update(admin).await?;
        info!(deactivated = %admin.username, by = %session.username, "admin account deactivated");
        Ok(())
    }

    pub async fn stats(&self) -> Result<AdminStats, AccessError> {
        let cutoff = Utc::now() - Duration::days(RECENT_LOGIN_WINDOW_DAYS);
        let admins = self.repository.list().await?;
        let mut stats = AdminStats::default();
        for admin in &admins {
            stats.total += 1;
            if admin.is_active {
                stats.active += 1;
            } else {
                stats.inactive += 1;
            }
            if admin.last_login.is_some_and(|at| at >= cutoff) {
                stats.recent_logins += 1;
            }
        }
        Ok(stats)
    }

    /// Seed a super admin when the store is empty. Returns the created account, if any.
    pub async fn ensure_bootstrap_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Option<Admin>, AccessError> {
        if self.repository.count().await? > 0 {
            return Ok(None);
        }
        let admin = self
            .insert_admin(
                NewAdmin {
                    username: username.to_string(),
                    email: email.to_string(),
                    password: password.to_string(),
                    role: None,
                },
                AdminRole::SuperAdmin,
            )
            .await?;
        info!(username = %admin.username, "bootstrap super admin created");
        Ok(Some(admin))
    }

    async fn insert_admin(&self, request: NewAdmin, role: AdminRole) -> Result<Admin, AccessError> {
        let username = request.username.trim().to_string();
        let email = request.email.trim().to_lowercase();
        let mut errors = ValidationErrors::default();
        check_username(&mut errors, &username);
        check_email(&mut errors, &email);
        check_password(&mut errors, "password", &request.password);
        errors.into_result()?;

        let admin = Admin {
            id: AdminId::generate(),
            username,
            email,
            role,
            is_active: true,
            password_hash: hash_password_blocking(request.password).await?,
            last_login: None,
            created_at: Utc::now(),
        };

        self.repository.insert(admin).await.map_err(account_conflict)
    }

    async fn active_admin(&self, claims: &Claims) -> Result<Option<Admin>, AccessError> {
        let admin_id = claims
            .sub
            .parse::<AdminId>()
            .map_err(|_| AccessError::Token(TokenError::Invalid("malformed subject".into())))?;
        Ok(self
            .repository
            .fetch(admin_id)
            .await?
            .filter(|admin| admin.is_active))
    }
}

fn invalid_credentials() -> AccessError {
    AccessError::Unauthorized("Invalid credentials".to_string())
}

fn invalid_reset_token() -> AccessError {
    AccessError::Rejected("Invalid or expired reset token".to_string())
}

/// Username and email uniqueness is enforced by the store; surface its conflict as 409.
fn account_conflict(error: RepositoryError) -> AccessError {
    match error {
        RepositoryError::Conflict => AccessError::Conflict(
            "Admin with this username or email already exists".to_string(),
        ),
        other => other.into(),
    }
}

fn require_manager(session: &AdminSession) -> Result<(), AccessError> {
    if session.role.can_manage_admins() {
        Ok(())
    } else {
        Err(AccessError::Forbidden(
            "Only super admins can manage admin accounts".to_string(),
        ))
    }
}

/// Error raised by the access service.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Conflict(String),
    #[error("admin not found")]
    NotFound,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AccessError::Validation(errors) => {
                let payload = json!({
                    "error": "Validation failed",
                    "errors": errors.errors(),
                });
                return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
            }
            AccessError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message),
            AccessError::Token(TokenError::Expired) => {
                (StatusCode::UNAUTHORIZED, "Token expired".to_string())
            }
            AccessError::Token(TokenError::Invalid(_)) => (
                StatusCode::UNAUTHORIZED,
                "Not authorized to access this route".to_string(),
            ),
            AccessError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            AccessError::Rejected(message) => (StatusCode::BAD_REQUEST, message),
            AccessError::Conflict(message) => (StatusCode::CONFLICT, message),
            AccessError::NotFound | AccessError::Repository(RepositoryError::NotFound) => {
                (StatusCode::NOT_FOUND, "Admin not found".to_string())
            }
            other => {
                error!(error = %other, "access request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
