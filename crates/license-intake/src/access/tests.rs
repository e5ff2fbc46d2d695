use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::*;
use crate::adapters::{InMemoryAdminRepository, OutboxMailer};

fn service() -> AccessService {
    AccessService::new(
        Arc::new(InMemoryAdminRepository::default()),
        TokenIssuer::new(b"access-test-secret", chrono::Duration::hours(1)),
    )
}

fn new_admin(username: &str, role: Option<AdminRole>) -> NewAdmin {
    NewAdmin {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        password: "secret-pass".to_string(),
        role,
    }
}

async fn seeded() -> (AccessService, Admin) {
    let access = service();
    let root = access
        .register_first(new_admin("root", None))
        .await
        .expect("first admin registered");
    (access, root)
}

fn login(username: &str, password: &str) -> LoginRequest {
    LoginRequest {
        username: username.to_string(),
        password: password.to_string(),
    }
}

#[tokio::test]
async fn first_registration_creates_super_admin_then_closes() {
    let (access, root) = seeded().await;
    assert_eq!(root.role, AdminRole::SuperAdmin);
    assert!(root.is_active);

    let json = serde_json::to_value(&root).expect("serializes");
    assert!(json.get("passwordHash").is_none());
    assert_eq!(json["role"], "super_admin");

    let error = access
        .register_first(new_admin("intruder", Some(AdminRole::SuperAdmin)))
        .await
        .expect_err("registration closed");
    assert!(matches!(error, AccessError::Forbidden(_)));
}

#[tokio::test]
async fn login_issues_token_that_authenticates() {
    let (access, root) = seeded().await;

    let response = access
        .login(login("root", "secret-pass"))
        .await
        .expect("login succeeds");
    assert_eq!(response.admin.id, root.id);
    assert!(response.admin.last_login.is_some());

    let session = access
        .authenticate(&response.token)
        .await
        .expect("token valid");
    assert_eq!(session.username, "root");
    assert_eq!(session.role, AdminRole::SuperAdmin);

    let stats = access.stats().await.expect("stats");
    assert_eq!(stats.recent_logins, 1);
}

#[tokio::test]
async fn wrong_password_and_unknown_user_look_the_same() {
    let (access, _) = seeded().await;

    for request in [login("root", "wrong-pass"), login("ghost", "secret-pass")] {
        match access.login(request).await {
            Err(AccessError::Unauthorized(message)) => assert_eq!(message, "Invalid credentials"),
            other => panic!("expected unauthorized, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn deactivated_admin_cannot_log_in_or_reuse_token() {
    let (access, root) = seeded().await;
    let reviewer = access
        .create_admin(&root.session(), new_admin("reviewer", None))
        .await
        .expect("created");
    assert_eq!(reviewer.role, AdminRole::Admin);

    let token = access
        .login(login("reviewer", "secret-pass"))
        .await
        .expect("login")
        .token;
    access
        .deactivate_admin(&root.session(), reviewer.id)
        .await
        .expect("deactivated");

    assert!(matches!(
        access.authenticate(&token).await,
        Err(AccessError::Unauthorized(_))
    ));
    assert!(matches!(
        access.login(login("reviewer", "secret-pass")).await,
        Err(AccessError::Unauthorized(_))
    ));

    let listed = access.list_admins(&root.session()).await.expect("list");
    assert_eq!(listed.len(), 1);
    let stats = access.stats().await.expect("stats");
    assert_eq!((stats.total, stats.active, stats.inactive), (2, 1, 1));
}

#[tokio::test]
async fn plain_admins_cannot_manage_accounts() {
    let (access, root) = seeded().await;
    let reviewer = access
        .create_admin(&root.session(), new_admin("reviewer", Some(AdminRole::Admin)))
        .await
        .expect("created");
    let session = reviewer.session();

    assert!(matches!(
        access.create_admin(&session, new_admin("another", None)).await,
        Err(AccessError::Forbidden(_))
    ));
    assert!(matches!(
        access.list_admins(&session).await,
        Err(AccessError::Forbidden(_))
    ));
    assert!(matches!(
        access.deactivate_admin(&session, root.id).await,
        Err(AccessError::Forbidden(_))
    ));
}

#[tokio::test]
async fn duplicate_username_or_email_conflicts() {
    let (access, root) = seeded().await;
    let mut duplicate_email = new_admin("someone", None);
    duplicate_email.email = "ROOT@example.com".to_string();

    for request in [new_admin("root", None), duplicate_email] {
        assert!(matches!(
            access.create_admin(&root.session(), request).await,
            Err(AccessError::Conflict(_))
        ));
    }
}

#[tokio::test]
async fn renaming_onto_an_existing_account_is_a_conflict() {
    let (access, root) = seeded().await;
    let other = access
        .create_admin(&root.session(), new_admin("reviewer", None))
        .await
        .expect("second admin");

    let clashes = [
        AdminUpdate {
            username: Some("root".to_string()),
            ..AdminUpdate::default()
        },
        AdminUpdate {
            email: Some("Root@Example.com".to_string()),
            ..AdminUpdate::default()
        },
    ];
    for update in clashes {
        let error = access
            .update_admin(&root.session(), other.id, update)
            .await
            .expect_err("clash rejected");
        assert!(matches!(error, AccessError::Conflict(_)));
        assert_eq!(error.into_response().status(), StatusCode::CONFLICT);
    }

    let unchanged = access.me(&other.session()).await.expect("still present");
    assert_eq!(unchanged.username, "reviewer");
    assert_eq!(unchanged.email, "reviewer@example.com");
}

#[tokio::test]
async fn account_fields_are_validated() {
    let (access, root) = seeded().await;
    let request = NewAdmin {
        username: "ab".to_string(),
        email: "not-an-email".to_string(),
        password: "123".to_string(),
        role: None,
    };

    match access.create_admin(&root.session(), request).await {
        Err(AccessError::Validation(errors)) => {
            assert!(errors.mentions("username"));
            assert!(errors.mentions("email"));
            assert!(errors.mentions("password"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn super_admin_cannot_demote_or_deactivate_self() {
    let (access, root) = seeded().await;
    let session = root.session();

    let demote = AdminUpdate {
        role: Some(AdminRole::Admin),
        ..AdminUpdate::default()
    };
    assert!(matches!(
        access.update_admin(&session, root.id, demote).await,
        Err(AccessError::Rejected(_))
    ));
    assert!(matches!(
        access.deactivate_admin(&session, root.id).await,
        Err(AccessError::Rejected(_))
    ));

    let rename = AdminUpdate {
        email: Some("Chief@Example.com".to_string()),
        ..AdminUpdate::default()
    };
    let updated = access
        .update_admin(&session, root.id, rename)
        .await
        .expect("own email editable");
    assert_eq!(updated.email, "chief@example.com");
}

#[tokio::test]
async fn super_admin_promotes_reviewer() {
    let (access, root) = seeded().await;
    let reviewer = access
        .create_admin(&root.session(), new_admin("reviewer", None))
        .await
        .expect("created");

    let promoted = access
        .update_admin(
            &root.session(),
            reviewer.id,
            AdminUpdate {
                role: Some(AdminRole::SuperAdmin),
                ..AdminUpdate::default()
            },
        )
        .await
        .expect("promoted");
    assert_eq!(promoted.role, AdminRole::SuperAdmin);

    let missing = access
        .update_admin(&root.session(), AdminId::generate(), AdminUpdate::default())
        .await;
    assert!(matches!(missing, Err(AccessError::NotFound)));
}

#[tokio::test]
async fn password_change_requires_current_password() {
    let (access, root) = seeded().await;
    let session = root.session();

    let wrong = access
        .change_password(
            &session,
            PasswordChange {
                current_password: "not-it".to_string(),
                new_password: "new-secret".to_string(),
            },
        )
        .await;
    assert!(matches!(wrong, Err(AccessError::Unauthorized(_))));

    let short = access
        .change_password(
            &session,
            PasswordChange {
                current_password: "secret-pass".to_string(),
                new_password: "12345".to_string(),
            },
        )
        .await;
    assert!(matches!(short, Err(AccessError::Validation(_))));

    access
        .change_password(
            &session,
            PasswordChange {
                current_password: "secret-pass".to_string(),
                new_password: "new-secret".to_string(),
            },
        )
        .await
        .expect("changed");
    assert!(access.login(login("root", "secret-pass")).await.is_err());
    assert!(access.login(login("root", "new-secret")).await.is_ok());
}

#[tokio::test]
async fn bootstrap_only_seeds_an_empty_store() {
    let access = service();
    let created = access
        .ensure_bootstrap_admin("admin", "admin@example.com", "change-me")
        .await
        .expect("bootstrap");
    assert_eq!(created.map(|admin| admin.role), Some(AdminRole::SuperAdmin));

    let again = access
        .ensure_bootstrap_admin("other", "other@example.com", "change-me")
        .await
        .expect("bootstrap");
    assert!(again.is_none());
}

#[tokio::test]
async fn tokens_from_another_secret_are_rejected() {
    let (access, root) = seeded().await;
    let foreign = TokenIssuer::new(b"different-secret", chrono::Duration::hours(1))
        .issue(root.id, root.role)
        .expect("token");
    assert!(matches!(
        access.authenticate(&foreign).await,
        Err(AccessError::Token(TokenError::Invalid(_)))
    ));
}

fn reset_service(issuer: TokenIssuer) -> (AccessService, OutboxMailer) {
    let outbox = OutboxMailer::default();
    let access = AccessService::new(Arc::new(InMemoryAdminRepository::default()), issuer)
        .with_reset_mail(ResetMail {
            mailer: Arc::new(outbox.clone()),
            link_base: "https://intake.example.com/".to_string(),
            timeout: StdDuration::from_secs(1),
        });
    (access, outbox)
}

fn forgot(email: &str) -> ForgotPassword {
    ForgotPassword {
        email: email.to_string(),
    }
}

fn reset_token_from(outbox: &OutboxMailer) -> String {
    let messages = outbox.messages();
    let body = &messages.last().expect("reset email sent").html_body;
    let start = body.find("token=").expect("link carries a token") + "token=".len();
    body[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect()
}

#[tokio::test]
async fn forgot_password_mails_a_link_that_resets_the_password() {
    let (access, outbox) =
        reset_service(TokenIssuer::new(b"access-test-secret", chrono::Duration::hours(1)));
    access
        .register_first(new_admin("root", None))
        .await
        .expect("first admin");

    access
        .forgot_password(forgot("ROOT@example.com"))
        .await
        .expect("request accepted");
    let messages = outbox.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].to, "root@example.com");
    assert!(messages[0]
        .html_body
        .contains("https://intake.example.com/admin/reset-password?token="));

    let token = reset_token_from(&outbox);
    access
        .reset_password(PasswordReset {
            token,
            new_password: "brand-new-pass".to_string(),
        })
        .await
        .expect("reset succeeds");

    assert!(access.login(login("root", "secret-pass")).await.is_err());
    assert!(access.login(login("root", "brand-new-pass")).await.is_ok());
}

#[tokio::test]
async fn unknown_or_inactive_addresses_send_nothing() {
    let (access, outbox) =
        reset_service(TokenIssuer::new(b"access-test-secret", chrono::Duration::hours(1)));
    let root = access
        .register_first(new_admin("root", None))
        .await
        .expect("first admin");
    let retired = access
        .create_admin(&root.session(), new_admin("retired", None))
        .await
        .expect("second admin");
    access
        .deactivate_admin(&root.session(), retired.id)
        .await
        .expect("deactivated");

    for email in ["nobody@example.com", "retired@example.com"] {
        access
            .forgot_password(forgot(email))
            .await
            .expect("answer does not reveal accounts");
    }
    assert!(outbox.messages().is_empty());

    assert!(matches!(
        access.forgot_password(forgot("not-an-email")).await,
        Err(AccessError::Validation(_))
    ));
}

#[tokio::test]
async fn session_and_reset_tokens_do_not_cross_over() {
    let (access, outbox) =
        reset_service(TokenIssuer::new(b"access-test-secret", chrono::Duration::hours(1)));
    access
        .register_first(new_admin("root", None))
        .await
        .expect("first admin");

    access
        .forgot_password(forgot("root@example.com"))
        .await
        .expect("request accepted");
    let reset_token = reset_token_from(&outbox);
    assert!(matches!(
        access.authenticate(&reset_token).await,
        Err(AccessError::Token(TokenError::Invalid(_)))
    ));

    let session_token = access
        .login(login("root", "secret-pass"))
        .await
        .expect("login")
        .token;
    let error = access
        .reset_password(PasswordReset {
            token: session_token,
            new_password: "brand-new-pass".to_string(),
        })
        .await
        .expect_err("session token refused");
    assert!(matches!(error, AccessError::Rejected(_)));
    assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    assert!(access.login(login("root", "secret-pass")).await.is_ok());
}

#[tokio::test]
async fn expired_reset_tokens_are_refused() {
    let issuer = TokenIssuer::new(b"access-test-secret", chrono::Duration::hours(1))
        .with_reset_ttl(chrono::Duration::hours(-2));
    let (access, outbox) = reset_service(issuer);
    access
        .register_first(new_admin("root", None))
        .await
        .expect("first admin");
    access
        .forgot_password(forgot("root@example.com"))
        .await
        .expect("request accepted");

    let result = access
        .reset_password(PasswordReset {
            token: reset_token_from(&outbox),
            new_password: "brand-new-pass".to_string(),
        })
        .await;
    assert!(matches!(result, Err(AccessError::Rejected(_))));
}
