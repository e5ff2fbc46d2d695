use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

const DEV_JWT_SECRET: &str = "learner-license-dev-secret-change-me";
const DEV_ADMIN_PASSWORD: &str = "admin123";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub mail: MailConfig,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_number<T: std::str::FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    var_or(name, default)
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidNumber { name })
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(&var_or("APP_ENV", "development"));

        let host = var_or("APP_HOST", "127.0.0.1");
        let port = var_or("APP_PORT", "3000")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;
        let max_request_bytes = parse_number("APP_MAX_REQUEST_BYTES", "10485760")?;

        let log_level = var_or("APP_LOG_LEVEL", "info");

        let jwt_secret = match optional_var("APP_JWT_SECRET") {
            Some(secret) => secret,
            None if environment == AppEnvironment::Production => {
                return Err(ConfigError::MissingJwtSecret)
            }
            None => DEV_JWT_SECRET.to_string(),
        };
        let bootstrap_password = match optional_var("APP_ADMIN_PASSWORD") {
            Some(password) => password,
            None if environment == AppEnvironment::Production => {
                return Err(ConfigError::MissingAdminPassword)
            }
            None => DEV_ADMIN_PASSWORD.to_string(),
        };
        let token_ttl_hours = parse_number("APP_TOKEN_TTL_HOURS", "24")?;
        if token_ttl_hours <= 0 {
            return Err(ConfigError::InvalidNumber {
                name: "APP_TOKEN_TTL_HOURS",
            });
        }

        let storage = StorageConfig {
            backend: StorageBackend::parse(&var_or("APP_STORAGE_BACKEND", "memory"))?,
            root: PathBuf::from(var_or("APP_STORAGE_ROOT", "./uploads")),
            public_base_url: var_or("APP_STORAGE_PUBLIC_URL", "http://localhost:3000/uploads"),
            timeout: Duration::from_secs(parse_number("APP_STORAGE_TIMEOUT_SECS", "20")?),
        };
        let database = DatabaseConfig {
            backend: DatabaseBackend::parse(&var_or("APP_DATABASE_BACKEND", "memory"))?,
            path: PathBuf::from(var_or("APP_DATABASE_PATH", "./data/license-intake.db")),
        };
        if storage.backend.is_durable() != database.backend.is_durable() {
            return Err(ConfigError::MixedDurability);
        }

        let mail = MailConfig {
            backend: MailBackend::parse(&var_or("APP_MAIL_BACKEND", "log"))?,
            smtp_host: optional_var("APP_SMTP_HOST"),
            smtp_port: parse_number("APP_SMTP_PORT", "587")?,
            smtp_username: optional_var("APP_SMTP_USERNAME"),
            smtp_password: optional_var("APP_SMTP_PASSWORD"),
            from: var_or("APP_MAIL_FROM", "noreply@learnerlicense.com"),
            admin_to: var_or("APP_MAIL_ADMIN_TO", "admin@learnerlicense.com"),
            timeout: Duration::from_secs(parse_number("APP_MAIL_TIMEOUT_SECS", "10")?),
        };
        if mail.backend == MailBackend::Smtp && mail.smtp_host.is_none() {
            return Err(ConfigError::MissingSmtpHost);
        }

        Ok(Self {
            environment,
            server: ServerConfig {
                host,
                port,
                max_request_bytes,
            },
            telemetry: TelemetryConfig { log_level },
            auth: AuthConfig {
                jwt_secret,
                token_ttl_hours,
                bootstrap_username: var_or("APP_ADMIN_USERNAME", "admin"),
                bootstrap_email: var_or("APP_ADMIN_EMAIL", "admin@learnerlicense.com"),
                bootstrap_password,
                frontend_url: var_or("APP_FRONTEND_URL", "http://localhost:5173"),
            },
            storage,
            database,
            mail,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_request_bytes: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Token signing and the account seeded on an empty admin store.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub bootstrap_username: String,
    pub bootstrap_email: String,
    pub bootstrap_password: String,
    /// Origin of the admin frontend; password reset links point there.
    pub frontend_url: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("bootstrap_username", &self.bootstrap_username)
            .field("bootstrap_email", &self.bootstrap_email)
            .field("frontend_url", &self.frontend_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Filesystem,
}

impl StorageBackend {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "filesystem" | "fs" => Ok(Self::Filesystem),
            _ => Err(ConfigError::InvalidBackend {
                name: "APP_STORAGE_BACKEND",
                value: raw.to_string(),
            }),
        }
    }

    pub const fn is_durable(self) -> bool {
        matches!(self, Self::Filesystem)
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub root: PathBuf,
    pub public_base_url: String,
    pub timeout: Duration,
}

/// Where submission and admin records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Memory,
    Sqlite,
}

impl DatabaseBackend {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(ConfigError::InvalidBackend {
                name: "APP_DATABASE_BACKEND",
                value: raw.to_string(),
            }),
        }
    }

    pub const fn is_durable(self) -> bool {
        matches!(self, Self::Sqlite)
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailBackend {
    Log,
    Smtp,
}

impl MailBackend {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "smtp" => Ok(Self::Smtp),
            _ => Err(ConfigError::InvalidBackend {
                name: "APP_MAIL_BACKEND",
                value: raw.to_string(),
            }),
        }
    }
}

#[derive(Clone)]
pub struct MailConfig {
    pub backend: MailBackend,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from: String,
    pub admin_to: String,
    pub timeout: Duration,
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("backend", &self.backend)
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("from", &self.from)
            .field("admin_to", &self.admin_to)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str },
    InvalidBackend { name: &'static str, value: String },
    MissingJwtSecret,
    MissingAdminPassword,
    MissingSmtpHost,
    MixedDurability,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name } => {
                write!(f, "{name} must be a positive number")
            }
            ConfigError::InvalidBackend { name, value } => {
                write!(f, "{name} has unsupported value '{value}'")
            }
            ConfigError::MissingJwtSecret => {
                write!(f, "APP_JWT_SECRET must be set in production")
            }
            ConfigError::MissingAdminPassword => {
                write!(f, "APP_ADMIN_PASSWORD must be set in production")
            }
            ConfigError::MissingSmtpHost => {
                write!(f, "APP_SMTP_HOST is required when APP_MAIL_BACKEND=smtp")
            }
            ConfigError::MixedDurability => write!(
                f,
                "APP_STORAGE_BACKEND=filesystem requires APP_DATABASE_BACKEND=sqlite and vice versa"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
