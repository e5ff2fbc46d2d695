//! Admin authentication and authorization for the review surface.
//!
//! Passwords are stored as argon2 PHC strings and sessions travel as HS256
//! tokens, either as a bearer header or the HttpOnly `token` cookie set at
//! login. `require_admin` turns a token into an [`AdminSession`] request
//! extension that downstream handlers extract. Password reset links carry a
//! separate short-lived token that is never accepted as a session.

pub mod domain;
pub mod middleware;
pub mod passwords;
pub mod repository;
pub mod router;
pub mod service;
pub mod tokens;

#[cfg(test)]
mod tests;

pub use domain::{Admin, AdminId, AdminRole, AdminSession, AdminStats};
pub use middleware::{cleared_session_cookie, extract_token, require_admin, session_cookie};
pub use repository::AdminRepository;
pub use router::{account_router, auth_router};
pub use service::{
    AccessError, AccessService, AdminUpdate, ForgotPassword, LoginRequest, LoginResponse,
    NewAdmin, PasswordChange, PasswordReset, ResetMail,
};
pub use tokens::{Claims, TokenError, TokenIssuer, TokenPurpose};
