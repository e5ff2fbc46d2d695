use clap::{Args, ValueEnum};
use license_intake::access::{AccessService, AdminRole, NewAdmin, TokenIssuer};
use license_intake::adapters::{
    InMemoryAdminRepository, InMemoryDocumentStore, InMemorySubmissionRepository, OutboxMailer,
};
use license_intake::error::AppError;
use license_intake::intake::{
    DocumentSlot, DocumentUpload, DocumentUploads, EmailNotifier, IntakeError, IntakeSettings,
    Submission, SubmissionForm, SubmissionQuery, SubmissionService, SubmissionStatus,
};
use std::sync::Arc;

const DEMO_ADMIN_INBOX: &str = "admin@learnerlicense.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum DemoDecision {
    Approved,
    Rejected,
}

impl DemoDecision {
    fn as_status(self) -> &'static str {
        match self {
            DemoDecision::Approved => "approved",
            DemoDecision::Rejected => "rejected",
        }
    }
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Applicant name used for the sample submission.
    #[arg(long, default_value = "Jane Doe")]
    pub(crate) applicant: String,
    /// Review outcome applied by the demo reviewer.
    #[arg(long, value_enum, default_value_t = DemoDecision::Approved)]
    pub(crate) decision: DemoDecision,
    /// Internal notes recorded with the review decision.
    #[arg(long, default_value = "All documents verified")]
    pub(crate) notes: String,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            applicant: "Jane Doe".to_string(),
            decision: DemoDecision::Approved,
            notes: "All documents verified".to_string(),
        }
    }
}

struct DemoEnvironment {
    submissions: SubmissionService,
    access: AccessService,
    outbox: OutboxMailer,
}

fn demo_environment() -> DemoEnvironment {
    let outbox = OutboxMailer::default();
    let submissions = SubmissionService::new(
        Arc::new(InMemorySubmissionRepository::default()),
        Arc::new(InMemoryDocumentStore::default()),
        Arc::new(EmailNotifier::new(outbox.clone(), DEMO_ADMIN_INBOX)),
        IntakeSettings::default(),
    );
    let access = AccessService::new(
        Arc::new(InMemoryAdminRepository::default()),
        TokenIssuer::new(b"demo-only-secret", chrono::Duration::hours(1)),
    );
    DemoEnvironment {
        submissions,
        access,
        outbox,
    }
}

fn sample_form(applicant: &str) -> SubmissionForm {
    let mut form = SubmissionForm::default();
    for (name, value) in [
        ("fullName", applicant),
        ("phoneNumber", "9876543210"),
        ("email", "jane.doe@example.com"),
        ("dateOfBirth", "1995-06-15"),
        ("address[street]", "12 MG Road, Indiranagar"),
        ("address[city]", "Bengaluru"),
        ("address[state]", "Karnataka"),
        ("address[pincode]", "560038"),
    ] {
        form.set(name, value.to_string());
    }
    form
}

fn sample_uploads() -> DocumentUploads {
    DocumentUploads::default()
        .with(
            DocumentSlot::IdentityProof,
            DocumentUpload::new(
                "aadhaar.pdf",
                Some("application/pdf".to_string()),
                b"%PDF-1.4 demo identity proof".to_vec(),
            ),
        )
        .with(
            DocumentSlot::Photograph,
            DocumentUpload::new(
                "photo.jpg",
                Some("image/jpeg".to_string()),
                vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10],
            ),
        )
        .with(
            DocumentSlot::Signature,
            DocumentUpload::new(
                "signature.png",
                Some("image/png".to_string()),
                b"\x89PNG\r\n\x1a\n".to_vec(),
            ),
        )
}

fn render_history(submission: &Submission) {
    println!("  Status history:");
    for entry in submission.status_history() {
        println!(
            "    {} {:<8} by {:<10} {}",
            entry.changed_at.format("%Y-%m-%d %H:%M:%S"),
            entry.status.label(),
            entry.changed_by.as_deref().unwrap_or("applicant"),
            entry.notes.as_deref().unwrap_or("-"),
        );
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        applicant,
        decision,
        notes,
    } = args;
    let env = demo_environment();

    println!("Learner's license intake demo");

    let registrar = env
        .access
        .register_first(NewAdmin {
            username: "registrar".to_string(),
            email: "registrar@learnerlicense.com".to_string(),
            password: "registrar-pass".to_string(),
            role: None,
        })
        .await?;
    let reviewer = env
        .access
        .create_admin(
            &registrar.session(),
            NewAdmin {
                username: "admin1".to_string(),
                email: "admin1@learnerlicense.com".to_string(),
                password: "reviewer-pass".to_string(),
                role: Some(AdminRole::Admin),
            },
        )
        .await?;
    println!(
        "  Staff: {} ({}), {} ({})",
        registrar.username,
        registrar.role.label(),
        reviewer.username,
        reviewer.role.label()
    );

    let mut rejected_form = sample_form(&applicant);
    rejected_form.set("phoneNumber", "1234567890".to_string());
    match env
        .submissions
        .create(rejected_form, sample_uploads())
        .await
    {
        Err(IntakeError::Validation(errors)) => {
            println!("\nInvalid submission rejected");
            for error in errors.errors() {
                println!("  {}: {}", error.field, error.message);
            }
        }
        Err(other) => return Err(other.into()),
        Ok(unexpected) => println!(
            "\nUnexpectedly accepted {}",
            unexpected.submission_id
        ),
    }

    let submission = env
        .submissions
        .create(sample_form(&applicant), sample_uploads())
        .await?;
    let receipt = submission.receipt();
    println!("\nSubmission received");
    println!("  Submission ID: {}", receipt.submission_id);
    println!("  Status: {}", receipt.status.headline());
    println!(
        "  Submitted at: {}",
        receipt.submitted_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    let check = env
        .submissions
        .status_check(submission.submission_id.as_str())
        .await?;
    println!(
        "\nPublic status check for {}: {}",
        check.applicant_name,
        check.status.headline()
    );

    let reviewed = env
        .submissions
        .transition_status(
            submission.submission_id.as_str(),
            decision.as_status(),
            &reviewer.username,
            Some(notes),
        )
        .await?;
    println!("\nReview recorded");
    println!("  Status: {}", reviewed.status().headline());
    println!(
        "  Reviewed by: {}",
        reviewed.reviewed_by().unwrap_or("unknown")
    );
    render_history(&reviewed);

    match env
        .submissions
        .delete(reviewed.id, &reviewer.session())
        .await
    {
        Err(IntakeError::Forbidden(message)) => {
            println!("\nDelete attempt by {}: refused ({message})", reviewer.username)
        }
        Err(other) => return Err(other.into()),
        Ok(()) => println!("\nDelete attempt by {}: succeeded", reviewer.username),
    }

    let pending = env
        .submissions
        .query(&SubmissionQuery {
            status: Some(SubmissionStatus::Pending),
            ..SubmissionQuery::default()
        })
        .await?;
    let stats = env.submissions.stats().await?;
    println!("\nQueue snapshot");
    println!(
        "  Pending matches: {} (page {} of {})",
        pending.pagination.total_items,
        pending.pagination.current_page,
        pending.pagination.total_pages.max(1)
    );
    println!(
        "  Totals: {} submitted, {} pending, {} approved, {} rejected",
        stats.total, stats.pending, stats.approved, stats.rejected
    );

    let messages = env.outbox.messages();
    println!("\nNotifications queued ({})", messages.len());
    for message in messages {
        println!("  to {:<32} {}", message.to, message.subject);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_runs_end_to_end() {
        run_demo(DemoArgs::default()).await.expect("demo completes");
    }

    #[tokio::test]
    async fn demo_supports_rejections() {
        let args = DemoArgs {
            decision: DemoDecision::Rejected,
            notes: "Photograph is blurred".to_string(),
            ..DemoArgs::default()
        };
        run_demo(args).await.expect("demo completes");
    }

    #[test]
    fn sample_form_is_valid() {
        let today = chrono::NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date");
        assert!(license_intake::intake::validation::validate_personal_details(
            &sample_form("Jane Doe"),
            today
        )
        .is_ok());
    }
}
