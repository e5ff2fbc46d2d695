use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::query::QueryAs;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::Sqlite;
use tokio::sync::Mutex;
use tracing::info;

use crate::access::{Admin, AdminId, AdminRepository, AdminRole};
use crate::intake::{
    RecordId, RepositoryError, SearchResult, SortField, SortOrder, StatusHistoryEntry, Submission,
    SubmissionId, SubmissionQuery, SubmissionRepository, SubmissionStats, SubmissionStatus,
};

const MAX_CONNECTIONS: u32 = 5;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS submissions (
        id TEXT PRIMARY KEY,
        submission_id TEXT NOT NULL UNIQUE,
        status TEXT NOT NULL,
        full_name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone_number TEXT NOT NULL,
        submitted_at TEXT NOT NULL,
        record TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS submissions_status_submitted_at ON submissions (status, submitted_at)",
    r#"
    CREATE TABLE IF NOT EXISTS admins (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE COLLATE NOCASE,
        role TEXT NOT NULL,
        is_active INTEGER NOT NULL,
        password_hash TEXT NOT NULL,
        last_login TEXT,
        created_at TEXT NOT NULL
    )
    "#,
];

fn database(error: sqlx::Error) -> RepositoryError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        _ => RepositoryError::Unavailable(error.to_string()),
    }
}

fn unreadable(error: impl Display) -> RepositoryError {
    RepositoryError::Unavailable(format!("stored record is unreadable: {error}"))
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(unreadable)
}

/// Durable record store in a single SQLite file, shared by submissions and admins.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    writes: Arc<Mutex<()>>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and ensure the schema exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| RepositoryError::Unavailable(error.to_string()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(database)?;

        let store = Self {
            pool,
            writes: Arc::new(Mutex::new(())),
        };
        store.initialize().await?;
        info!(path = %path.display(), "sqlite record store ready");
        Ok(store)
    }

    async fn initialize(&self) -> Result<(), RepositoryError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(database)?;
        }
        Ok(())
    }

    pub fn submissions(&self) -> SqliteSubmissionRepository {
        SqliteSubmissionRepository {
            store: self.clone(),
        }
    }

    pub fn admins(&self) -> SqliteAdminRepository {
        SqliteAdminRepository {
            store: self.clone(),
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Submissions kept as JSON documents beside the columns used for lookups and listing.
#[derive(Clone)]
pub struct SqliteSubmissionRepository {
    store: SqliteStore,
}

fn encode_submission(submission: &Submission) -> Result<String, RepositoryError> {
    serde_json::to_string(submission).map_err(unreadable)
}

fn decode_submission(record: &str) -> Result<Submission, RepositoryError> {
    serde_json::from_str(record).map_err(unreadable)
}

/// `%needle%` with LIKE metacharacters escaped by `\`.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn filter_clause(status: Option<&str>, pattern: Option<&str>) -> String {
    let mut clause = String::from(" WHERE 1 = 1");
    if status.is_some() {
        clause.push_str(" AND status = ?");
    }
    if pattern.is_some() {
        clause.push_str(
            " AND (full_name LIKE ? ESCAPE '\\' OR email LIKE ? ESCAPE '\\' \
             OR submission_id LIKE ? ESCAPE '\\' OR phone_number LIKE ? ESCAPE '\\')",
        );
    }
    clause
}

fn bind_filters<'q, O>(
    mut statement: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    status: Option<&'q str>,
    pattern: Option<&'q str>,
) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
    if let Some(status) = status {
        statement = statement.bind(status);
    }
    if let Some(pattern) = pattern {
        for _ in 0..4 {
            statement = statement.bind(pattern);
        }
    }
    statement
}

fn order_clause(query: &SubmissionQuery) -> String {
    let column = match query.sort_by {
        SortField::SubmittedAt => "submitted_at",
        SortField::FullName => "lower(full_name)",
        SortField::Status => "status",
    };
    let direction = match query.sort_order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    format!(
        " ORDER BY {column} {direction}, submitted_at {direction}, submission_id {direction}"
    )
}

#[async_trait]
impl SubmissionRepository for SqliteSubmissionRepository {
    async fn insert(&self, submission: Submission) -> Result<Submission, RepositoryError> {
        let record = encode_submission(&submission)?;
        sqlx::query(
            r#"
            INSERT INTO submissions (
                id, submission_id, status, full_name, email, phone_number, submitted_at, record
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(submission.id.to_string())
        .bind(submission.submission_id.as_str())
        .bind(submission.status().label())
        .bind(submission.personal.full_name.as_str())
        .bind(submission.personal.email.as_str())
        .bind(submission.personal.phone_number.as_str())
        .bind(timestamp(submission.submitted_at))
        .bind(record)
        .execute(&self.store.pool)
        .await
        .map_err(database)?;
        Ok(submission)
    }

    async fn fetch(&self, id: RecordId) -> Result<Option<Submission>, RepositoryError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT record FROM submissions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.store.pool)
            .await
            .map_err(database)?;
        row.map(|(record,)| decode_submission(&record)).transpose()
    }

    async fn fetch_by_submission_id(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Option<Submission>, RepositoryError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT record FROM submissions WHERE submission_id = ?")
                .bind(submission_id.as_str())
                .fetch_optional(&self.store.pool)
                .await
                .map_err(database)?;
        row.map(|(record,)| decode_submission(&record)).transpose()
    }

    async fn submission_id_exists(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<bool, RepositoryError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM submissions WHERE submission_id = ?)")
                .bind(submission_id.as_str())
                .fetch_one(&self.store.pool)
                .await
                .map_err(database)?;
        Ok(exists)
    }

    async fn append_status(
        &self,
        id: RecordId,
        entry: StatusHistoryEntry,
    ) -> Result<Submission, RepositoryError> {
        // Read-modify-write of the history document; one writer at a time.
        let _writer = self.store.writes.lock().await;
        let mut tx = self.store.pool.begin().await.map_err(database)?;

        let row: Option<(String,)> = sqlx::query_as("SELECT record FROM submissions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(database)?;
        let (record,) = row.ok_or(RepositoryError::NotFound)?;
        let mut submission = decode_submission(&record)?;
        submission.apply_transition(entry);

        sqlx::query("UPDATE submissions SET status = ?, record = ? WHERE id = ?")
            .bind(submission.status().label())
            .bind(encode_submission(&submission)?)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(database)?;
        tx.commit().await.map_err(database)?;
        Ok(submission)
    }

    async fn delete(&self, id: RecordId) -> Result<bool, RepositoryError> {
        let _writer = self.store.writes.lock().await;
        let result = sqlx::query("DELETE FROM submissions WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.store.pool)
            .await
            .map_err(database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn search(&self, query: &SubmissionQuery) -> Result<SearchResult, RepositoryError> {
        let status = query.status.map(SubmissionStatus::label);
        let pattern = query.search.as_deref().map(like_pattern);
        let filter = filter_clause(status, pattern.as_deref());

        let count_sql = format!("SELECT COUNT(*) FROM submissions{filter}");
        let (total,): (i64,) =
            bind_filters(sqlx::query_as(&count_sql), status, pattern.as_deref())
                .fetch_one(&self.store.pool)
                .await
                .map_err(database)?;

        let page_sql = format!(
            "SELECT record FROM submissions{filter}{} LIMIT ? OFFSET ?",
            order_clause(query)
        );
        let offset = i64::try_from(query.offset()).unwrap_or(i64::MAX);
        let rows: Vec<(String,)> =
            bind_filters(sqlx::query_as(&page_sql), status, pattern.as_deref())
                .bind(i64::from(query.limit))
                .bind(offset)
                .fetch_all(&self.store.pool)
                .await
                .map_err(database)?;

        let submissions = rows
            .iter()
            .map(|(record,)| decode_submission(record))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SearchResult {
            submissions,
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn status_counts(&self) -> Result<SubmissionStats, RepositoryError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM submissions GROUP BY status")
                .fetch_all(&self.store.pool)
                .await
                .map_err(database)?;

        let mut stats = SubmissionStats::default();
        for (status, count) in rows {
            let count = u64::try_from(count).unwrap_or(0);
            stats.total += count;
            match status.parse::<SubmissionStatus>().map_err(unreadable)? {
                SubmissionStatus::Pending => stats.pending += count,
                SubmissionStatus::Approved => stats.approved += count,
                SubmissionStatus::Rejected => stats.rejected += count,
            }
        }
        Ok(stats)
    }
}

/// Admin accounts; username and email (case-insensitive) are unique columns.
#[derive(Clone)]
pub struct SqliteAdminRepository {
    store: SqliteStore,
}

type AdminRow = (
    String,
    String,
    String,
    String,
    bool,
    String,
    Option<String>,
    String,
);

const ADMIN_COLUMNS: &str =
    "id, username, email, role, is_active, password_hash, last_login, created_at";

fn admin_from_row(row: AdminRow) -> Result<Admin, RepositoryError> {
    let (id, username, email, role, is_active, password_hash, last_login, created_at) = row;
    Ok(Admin {
        id: id.parse::<AdminId>().map_err(unreadable)?,
        username,
        email,
        role: role.parse::<AdminRole>().map_err(unreadable)?,
        is_active,
        password_hash,
        last_login: last_login.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&created_at)?,
    })
}

impl SqliteAdminRepository {
    async fn fetch_where(
        &self,
        column: &str,
        value: String,
    ) -> Result<Option<Admin>, RepositoryError> {
        let sql = format!("SELECT {ADMIN_COLUMNS} FROM admins WHERE {column} = ?");
        let row: Option<AdminRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.store.pool)
            .await
            .map_err(database)?;
        row.map(admin_from_row).transpose()
    }
}

#[async_trait]
impl AdminRepository for SqliteAdminRepository {
    async fn insert(&self, admin: Admin) -> Result<Admin, RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO admins (
                id, username, email, role, is_active, password_hash, last_login, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(admin.id.to_string())
        .bind(admin.username.as_str())
        .bind(admin.email.as_str())
        .bind(admin.role.label())
        .bind(admin.is_active)
        .bind(admin.password_hash.as_str())
        .bind(admin.last_login.map(timestamp))
        .bind(timestamp(admin.created_at))
        .execute(&self.store.pool)
        .await
        .map_err(database)?;
        Ok(admin)
    }

    async fn update(&self, admin: Admin) -> Result<Admin, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE admins
            SET username = ?, email = ?, role = ?, is_active = ?, password_hash = ?, last_login = ?
            WHERE id = ?
            "#,
        )
        .bind(admin.username.as_str())
        .bind(admin.email.as_str())
        .bind(admin.role.label())
        .bind(admin.is_active)
        .bind(admin.password_hash.as_str())
        .bind(admin.last_login.map(timestamp))
        .bind(admin.id.to_string())
        .execute(&self.store.pool)
        .await
        .map_err(database)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(admin)
    }

    async fn fetch(&self, id: AdminId) -> Result<Option<Admin>, RepositoryError> {
        self.fetch_where("id", id.to_string()).await
    }

    async fn fetch_by_username(&self, username: &str) -> Result<Option<Admin>, RepositoryError> {
        self.fetch_where("username", username.to_string()).await
    }

    async fn fetch_by_email(&self, email: &str) -> Result<Option<Admin>, RepositoryError> {
        self.fetch_where("email", email.to_string()).await
    }

    async fn list(&self) -> Result<Vec<Admin>, RepositoryError> {
        let sql = format!("SELECT {ADMIN_COLUMNS} FROM admins ORDER BY created_at DESC");
        let rows: Vec<AdminRow> = sqlx::query_as(&sql)
            .fetch_all(&self.store.pool)
            .await
            .map_err(database)?;
        rows.into_iter().map(admin_from_row).collect()
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM admins")
            .fetch_one(&self.store.pool)
            .await
            .map_err(database)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("jane"), "%jane%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn timestamps_sort_as_text() {
        let earlier = DateTime::parse_from_rfc3339("2025-03-01T09:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc);
        let later = earlier + chrono::Duration::milliseconds(1500);
        assert!(timestamp(earlier) < timestamp(later));
        assert_eq!(parse_timestamp(&timestamp(later)).expect("parses"), later);
    }

    #[test]
    fn filter_clause_lists_placeholders_in_bind_order() {
        assert_eq!(filter_clause(None, None), " WHERE 1 = 1");
        let clause = filter_clause(Some("pending"), Some("%x%"));
        assert!(clause.starts_with(" WHERE 1 = 1 AND status = ? AND (full_name LIKE ?"));
        assert_eq!(clause.matches('?').count(), 5);
    }
}
