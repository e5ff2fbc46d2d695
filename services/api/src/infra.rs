use license_intake::access::{AccessService, AdminRepository, ResetMail, TokenIssuer};
use license_intake::adapters::{
    FilesystemDocumentStore, InMemoryAdminRepository, InMemoryDocumentStore,
    InMemorySubmissionRepository, LogMailer, SmtpMailer, SqliteStore,
};
use license_intake::config::{
    AppConfig, AppEnvironment, DatabaseBackend, DatabaseConfig, MailBackend, MailConfig,
    StorageBackend, StorageConfig,
};
use license_intake::error::AppError;
use license_intake::intake::{
    DocumentStore, EmailNotifier, IntakeSettings, Mailer, NotificationDispatcher,
    SubmissionRepository, SubmissionService,
};
use license_intake::ServiceState;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn document_store(config: &StorageConfig) -> Arc<dyn DocumentStore> {
    match config.backend {
        StorageBackend::Memory => Arc::new(InMemoryDocumentStore::default()),
        StorageBackend::Filesystem => Arc::new(FilesystemDocumentStore::new(
            config.root.clone(),
            config.public_base_url.clone(),
        )),
    }
}

pub(crate) fn mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>, AppError> {
    let mailer: Arc<dyn Mailer> = match config.backend {
        MailBackend::Log => Arc::new(LogMailer),
        MailBackend::Smtp => Arc::new(SmtpMailer::from_config(config)?),
    };
    Ok(mailer)
}

pub(crate) fn notifier(
    mailer: Arc<dyn Mailer>,
    config: &MailConfig,
) -> Arc<dyn NotificationDispatcher> {
    Arc::new(EmailNotifier::new(mailer, config.admin_to.clone()))
}

/// Submission and admin repositories for the configured record backend.
pub(crate) async fn repositories(
    config: &DatabaseConfig,
) -> Result<(Arc<dyn SubmissionRepository>, Arc<dyn AdminRepository>), AppError> {
    match config.backend {
        DatabaseBackend::Memory => Ok((
            Arc::new(InMemorySubmissionRepository::default()),
            Arc::new(InMemoryAdminRepository::default()),
        )),
        DatabaseBackend::Sqlite => {
            let store = SqliteStore::open(&config.path).await?;
            tracing::info!(path = %config.path.display(), "opened sqlite record store");
            Ok((Arc::new(store.submissions()), Arc::new(store.admins())))
        }
    }
}

pub(crate) fn intake_settings(config: &AppConfig) -> IntakeSettings {
    IntakeSettings {
        storage_timeout: config.storage.timeout,
        notification_timeout: config.mail.timeout,
        ..IntakeSettings::default()
    }
}

pub(crate) fn token_issuer(config: &AppConfig) -> TokenIssuer {
    TokenIssuer::new(
        config.auth.jwt_secret.as_bytes(),
        chrono::Duration::hours(config.auth.token_ttl_hours),
    )
}

/// Wire the intake and access services against the configured backends.
pub(crate) async fn build_services(config: &AppConfig) -> Result<ServiceState, AppError> {
    let (submission_repository, admin_repository) = repositories(&config.database).await?;
    let mailer = mailer(&config.mail)?;
    let submissions = SubmissionService::new(
        submission_repository,
        document_store(&config.storage),
        notifier(mailer.clone(), &config.mail),
        intake_settings(config),
    );
    let access = AccessService::new(admin_repository, token_issuer(config))
        .with_secure_cookies(config.environment == AppEnvironment::Production)
        .with_reset_mail(ResetMail {
            mailer,
            link_base: config.auth.frontend_url.clone(),
            timeout: config.mail.timeout,
        });
    Ok(ServiceState {
        submissions: Arc::new(submissions),
        access: Arc::new(access),
    })
}

/// Seed the configured super admin when no admin exists yet.
pub(crate) async fn bootstrap_admin(
    state: &ServiceState,
    config: &AppConfig,
) -> Result<(), AppError> {
    let auth = &config.auth;
    if state
        .access
        .ensure_bootstrap_admin(
            &auth.bootstrap_username,
            &auth.bootstrap_email,
            &auth.bootstrap_password,
        )
        .await?
        .is_some()
    {
        tracing::warn!(
            username = %auth.bootstrap_username,
            "seeded bootstrap super admin; change its password before going live"
        );
    }
    Ok(())
}
