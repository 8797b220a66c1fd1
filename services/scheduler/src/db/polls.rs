//! Postgres-backed poll repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::postgres::{PgArguments, PgPool, PgRow};
use sqlx::Row;
use tempo_id::PollId;

use super::DbError;
use crate::polls::{NewPoll, Poll, PollKind, PollRepository, PollStatus, RepoError};

const POLL_COLUMNS: &str = "poll_id, kind, status, category, question, choices, source_title, \
                            source_signal, synthesized, scheduled_start, scheduled_end, \
                            activated_at, closed_at, archived_at, created_at, updated_at";

struct PollRow(Poll);

type PollQuery<'q> = sqlx::query::QueryAs<'q, sqlx::Postgres, PollRow, PgArguments>;

impl<'r> sqlx::FromRow<'r, PgRow> for PollRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let poll_id: String = row.try_get("poll_id")?;
        let kind: String = row.try_get("kind")?;
        let status: String = row.try_get("status")?;
        let Json(choices): Json<Vec<String>> = row.try_get("choices")?;

        Ok(Self(Poll {
            id: poll_id
                .parse::<PollId>()
                .map_err(|e| decode_error("poll_id", e))?,
            kind: kind.parse().map_err(|e: String| decode_error("kind", e))?,
            status: status.parse().map_err(|e: String| decode_error("status", e))?,
            category: row.try_get("category")?,
            question: row.try_get("question")?,
            choices,
            source_title: row.try_get("source_title")?,
            source_signal: row.try_get("source_signal")?,
            synthesized: row.try_get("synthesized")?,
            scheduled_start: row.try_get("scheduled_start")?,
            scheduled_end: row.try_get("scheduled_end")?,
            activated_at: row.try_get("activated_at")?,
            closed_at: row.try_get("closed_at")?,
            archived_at: row.try_get("archived_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

fn decode_error(column: &str, e: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.to_string().into(),
    }
}

fn status_texts(statuses: &[PollStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// Poll repository over the `polls` table.
#[derive(Clone)]
pub struct PgPollRepository {
    pool: PgPool,
}

impl PgPollRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_many(&self, query: PollQuery<'_>) -> Result<Vec<Poll>, RepoError> {
        let rows = query.fetch_all(&self.pool).await.map_err(DbError::Query)?;
        Ok(rows.into_iter().map(|PollRow(poll)| poll).collect())
    }
}

#[async_trait]
impl PollRepository for PgPollRepository {
    async fn create(&self, poll: NewPoll) -> Result<Poll, RepoError> {
        let kind = poll.kind;
        let start = poll.window.start;
        let poll = poll.into_poll();

        let sql = format!(
            r#"
            INSERT INTO polls (
                poll_id, kind, status, category, question, choices, source_title,
                source_signal, synthesized, scheduled_start, scheduled_end,
                activated_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            RETURNING {POLL_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, PollRow>(&sql)
            .bind(poll.id.to_string())
            .bind(poll.kind.as_str())
            .bind(poll.status.as_str())
            .bind(&poll.category)
            .bind(&poll.question)
            .bind(Json(&poll.choices))
            .bind(&poll.source_title)
            .bind(&poll.source_signal)
            .bind(poll.synthesized)
            .bind(poll.scheduled_start)
            .bind(poll.scheduled_end)
            .bind(poll.activated_at)
            .bind(poll.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::Query);

        match row {
            Ok(PollRow(created)) => Ok(created),
            Err(e) if e.is_unique_violation() => Err(RepoError::DuplicateWindow { kind, start }),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, poll: &Poll) -> Result<Poll, RepoError> {
        let sql = format!(
            r#"
            UPDATE polls
            SET status = $2,
                category = $3,
                question = $4,
                choices = $5,
                source_title = $6,
                source_signal = $7,
                activated_at = $8,
                closed_at = $9,
                archived_at = $10,
                updated_at = now()
            WHERE poll_id = $1 AND status = ANY($11)
            RETURNING {POLL_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, PollRow>(&sql)
            .bind(poll.id.to_string())
            .bind(poll.status.as_str())
            .bind(&poll.category)
            .bind(&poll.question)
            .bind(Json(&poll.choices))
            .bind(&poll.source_title)
            .bind(&poll.source_signal)
            .bind(poll.activated_at)
            .bind(poll.closed_at)
            .bind(poll.archived_at)
            .bind(status_texts(&poll.status.predecessors()))
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)?;

        if let Some(PollRow(updated)) = row {
            return Ok(updated);
        }

        // Either missing or the guard refused a backward move.
        let current = self.get(poll.id).await?;
        Err(RepoError::InvalidTransition {
            id: poll.id,
            from: current.status,
            to: poll.status,
        })
    }

    async fn get(&self, id: PollId) -> Result<Poll, RepoError> {
        let row = sqlx::query_as::<_, PollRow>(&format!(
            "SELECT {POLL_COLUMNS} FROM polls WHERE poll_id = $1"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        row.map(|PollRow(poll)| poll).ok_or(RepoError::NotFound(id))
    }

    async fn find_by_window(
        &self,
        kind: PollKind,
        start: DateTime<Utc>,
    ) -> Result<Option<Poll>, RepoError> {
        let row = sqlx::query_as::<_, PollRow>(&format!(
            "SELECT {POLL_COLUMNS} FROM polls WHERE kind = $1 AND scheduled_start = $2"
        ))
        .bind(kind.as_str())
        .bind(start)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(row.map(|PollRow(poll)| poll))
    }

    async fn get_units_created_since(
        &self,
        since: DateTime<Utc>,
        kind: Option<PollKind>,
    ) -> Result<Vec<Poll>, RepoError> {
        let sql = format!(
            r#"
            SELECT {POLL_COLUMNS} FROM polls
            WHERE created_at >= $1 AND ($2::TEXT IS NULL OR kind = $2)
            ORDER BY created_at DESC
            "#
        );
        self.fetch_many(
            sqlx::query_as::<_, PollRow>(&sql)
                .bind(since)
                .bind(kind.map(|k| k.as_str())),
        )
        .await
    }

    async fn close_expired(&self, now: DateTime<Utc>) -> Result<u64, RepoError> {
        let done = sqlx::query(
            r#"
            UPDATE polls
            SET status = 'closed', closed_at = $1, updated_at = $1
            WHERE status IN ('scheduled', 'active') AND scheduled_end <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;
        Ok(done.rows_affected())
    }

    async fn activate_due(&self, now: DateTime<Utc>) -> Result<u64, RepoError> {
        let done = sqlx::query(
            r#"
            UPDATE polls
            SET status = 'active', activated_at = $1, updated_at = $1
            WHERE status = 'scheduled' AND scheduled_start <= $1 AND scheduled_end > $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;
        Ok(done.rows_affected())
    }

    async fn activated_since(&self, since: DateTime<Utc>) -> Result<Vec<Poll>, RepoError> {
        let sql = format!(
            "SELECT {POLL_COLUMNS} FROM polls WHERE activated_at >= $1 ORDER BY scheduled_start"
        );
        self.fetch_many(sqlx::query_as::<_, PollRow>(&sql).bind(since))
            .await
    }

    async fn count_upcoming(&self, now: DateTime<Utc>) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM polls WHERE status = 'scheduled' AND scheduled_start > $1",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::Query)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn list_by_status(&self, status: PollStatus) -> Result<Vec<Poll>, RepoError> {
        let sql = format!(
            "SELECT {POLL_COLUMNS} FROM polls WHERE status = $1 ORDER BY scheduled_start, kind"
        );
        self.fetch_many(sqlx::query_as::<_, PollRow>(&sql).bind(status.as_str()))
            .await
    }

    async fn archive_closed_before(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, RepoError> {
        let done = sqlx::query(
            r#"
            UPDATE polls
            SET status = 'archived', archived_at = $2, updated_at = $2
            WHERE status = 'closed' AND scheduled_end < $1
            "#,
        )
        .bind(cutoff)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;
        Ok(done.rows_affected())
    }
}
