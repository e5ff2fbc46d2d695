use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domain::{Submission, SubmissionId, SubmissionStatus};

/// A rendered email ready for a [`Mailer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Transport that delivers rendered messages.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError>;
}

#[async_trait]
impl<M> Mailer for std::sync::Arc<M>
where
    M: Mailer + ?Sized,
{
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        (**self).send(message).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("invalid mail address '{0}'")]
    Address(String),
    #[error("mail message could not be built: {0}")]
    Message(String),
    #[error("mail transport failure: {0}")]
    Transport(String),
}

/// Outbound notification hooks used by the submission lifecycle.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify_admin_of_new_submission(
        &self,
        submission: &Submission,
    ) -> Result<(), NotificationError>;

    async fn notify_applicant_of_submission(
        &self,
        submission: &Submission,
    ) -> Result<(), NotificationError>;

    async fn notify_applicant_of_status_change(
        &self,
        submission: &Submission,
        status: SubmissionStatus,
        notes: Option<&str>,
    ) -> Result<(), NotificationError>;
}

/// Email implementation of [`NotificationDispatcher`].
pub struct EmailNotifier<M> {
    mailer: M,
    admin_address: String,
}

impl<M> EmailNotifier<M>
where
    M: Mailer,
{
    pub fn new(mailer: M, admin_address: impl Into<String>) -> Self {
        Self {
            mailer,
            admin_address: admin_address.into(),
        }
    }
}

#[async_trait]
impl<M> NotificationDispatcher for EmailNotifier<M>
where
    M: Mailer,
{
    async fn notify_admin_of_new_submission(
        &self,
        submission: &Submission,
    ) -> Result<(), NotificationError> {
        self.mailer
            .send(admin_alert(submission, &self.admin_address))
            .await
    }

    async fn notify_applicant_of_submission(
        &self,
        submission: &Submission,
    ) -> Result<(), NotificationError> {
        self.mailer.send(applicant_confirmation(submission)).await
    }

    async fn notify_applicant_of_status_change(
        &self,
        submission: &Submission,
        status: SubmissionStatus,
        notes: Option<&str>,
    ) -> Result<(), NotificationError> {
        self.mailer
            .send(status_update(submission, status, notes))
            .await
    }
}

/// What happened to a best-effort notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    Failed,
    TimedOut,
}

/// Run a notification with a deadline, logging instead of propagating failures.
pub async fn dispatch_best_effort<F>(
    kind: &'static str,
    submission_id: &SubmissionId,
    timeout: Duration,
    send: F,
) -> DispatchOutcome
where
    F: Future<Output = Result<(), NotificationError>>,
{
    match tokio::time::timeout(timeout, send).await {
        Ok(Ok(())) => {
            debug!(kind, %submission_id, "notification delivered");
            DispatchOutcome::Delivered
        }
        Ok(Err(error)) => {
            warn!(kind, %submission_id, %error, "notification failed");
            DispatchOutcome::Failed
        }
        Err(_) => {
            warn!(kind, %submission_id, ?timeout, "notification timed out");
            DispatchOutcome::TimedOut
        }
    }
}

pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn detail_row(label: &str, value: &str) -> String {
    format!(
        "<tr><td><strong>{}</strong></td><td>{}</td></tr>",
        escape_html(label),
        escape_html(value)
    )
}

fn wrap(title: &str, body: &str) -> String {
    format!(
        "<html><body><h2>{}</h2>{body}<p>Learner's License Portal</p></body></html>",
        escape_html(title)
    )
}

pub fn admin_alert(submission: &Submission, admin_address: &str) -> EmailMessage {
    let personal = &submission.personal;
    let address = &personal.address;
    let mut rows = String::new();
    rows.push_str(&detail_row("Submission ID", submission.submission_id.as_str()));
    rows.push_str(&detail_row("Full name", &personal.full_name));
    rows.push_str(&detail_row("Email", &personal.email));
    rows.push_str(&detail_row("Phone", &personal.phone_number));
    rows.push_str(&detail_row(
        "Date of birth",
        &personal.date_of_birth.format("%Y-%m-%d").to_string(),
    ));
    rows.push_str(&detail_row(
        "Address",
        &format!(
            "{}, {}, {} - {}",
            address.street, address.city, address.state, address.pincode
        ),
    ));
    rows.push_str(&detail_row(
        "Submitted at",
        &submission.submitted_at.to_rfc3339(),
    ));

    let body = format!(
        "<p>A new learner's license application is waiting for review.</p><table>{rows}</table>"
    );

    EmailMessage {
        to: admin_address.to_string(),
        subject: format!(
            "New Learner's License Application - {}",
            submission.submission_id
        ),
        html_body: wrap("New application received", &body),
    }
}

pub fn applicant_confirmation(submission: &Submission) -> EmailMessage {
    let body = format!(
        "<p>Dear {},</p>\
         <p>Your learner's license application has been received and is under review.</p>\
         <p>Your submission ID is <strong>{}</strong>. Keep it to check your application status.</p>",
        escape_html(&submission.personal.full_name),
        escape_html(submission.submission_id.as_str()),
    );

    EmailMessage {
        to: submission.personal.email.clone(),
        subject: format!("Application Confirmation - {}", submission.submission_id),
        html_body: wrap("Application received", &body),
    }
}

pub fn status_update(
    submission: &Submission,
    status: SubmissionStatus,
    notes: Option<&str>,
) -> EmailMessage {
    let headline = status.headline();
    let mut body = format!(
        "<p>Dear {},</p><p>The status of your application <strong>{}</strong> is now <strong>{}</strong>.</p>",
        escape_html(&submission.personal.full_name),
        escape_html(submission.submission_id.as_str()),
        escape_html(headline),
    );
    if let Some(notes) = notes {
        body.push_str(&format!("<p>Notes: {}</p>", escape_html(notes)));
    }
    match status {
        SubmissionStatus::Approved => body.push_str(
            "<p>Please visit your nearest RTO office with the original documents to continue.</p>",
        ),
        SubmissionStatus::Rejected => body.push_str(
            "<p>You may correct the issues above and submit a new application.</p>",
        ),
        SubmissionStatus::Pending => {}
    }

    EmailMessage {
        to: submission.personal.email.clone(),
        subject: format!("Application {headline} - {}", submission.submission_id),
        html_body: wrap("Application status update", &body),
    }
}

/// Password reset link for an admin account. `link` already carries the token.
pub fn password_reset(to: &str, link: &str, valid_for_minutes: i64) -> EmailMessage {
    let body = format!(
        "<p>A password reset has been requested for your admin account.</p>\
         <p><a href=\"{link}\">Reset your password</a></p>\
         <p>If the link does not open, paste this address into your browser:<br>{link}</p>\
         <p>The link expires in {valid_for_minutes} minutes. \
         If you did not ask for a reset you can ignore this email.</p>",
        link = escape_html(link),
    );

    EmailMessage {
        to: to.to_string(),
        subject: "Admin Password Reset Request".to_string(),
        html_body: wrap("Password reset", &body),
    }
}
