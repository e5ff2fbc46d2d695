//! Concrete stores and mailers behind the intake and access traits.

pub mod filesystem;
pub mod mail;
pub mod memory;
pub mod sqlite;

pub use filesystem::FilesystemDocumentStore;
pub use mail::{LogMailer, SmtpMailer};
pub use memory::{
    InMemoryAdminRepository, InMemoryDocumentStore, InMemorySubmissionRepository, OutboxMailer,
};
pub use sqlite::{SqliteAdminRepository, SqliteStore, SqliteSubmissionRepository};
