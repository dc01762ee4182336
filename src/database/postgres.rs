use crate::database::store::{AppendedEvent, Grader, Store};
use crate::error::{Error, Result};
use crate::models::{
    answer::Answer,
    assignment::Assignment,
    attempt::{Attempt, AttemptStatus},
    event::Event,
    question::Question,
    recording::Recording,
    test::Test,
    user::User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Inserts the event and bumps its per-type counter on the caller's connection.
async fn insert_event(conn: &mut PgConnection, event: &Event) -> Result<AppendedEvent> {
    let row = sqlx::query_as::<_, Event>(
        r#"
        INSERT INTO events (id, attempt_id, event_type, event_data, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(event.id)
    .bind(event.attempt_id)
    .bind(&event.event_type)
    .bind(&event.event_data)
    .bind(event.created_at)
    .fetch_one(&mut *conn)
    .await?;

    let type_total: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO attempt_event_counters (attempt_id, event_type, total)
        VALUES ($1, $2, 1)
        ON CONFLICT (attempt_id, event_type) DO UPDATE
        SET total = attempt_event_counters.total + 1
        RETURNING total
        "#,
    )
    .bind(event.attempt_id)
    .bind(&event.event_type)
    .fetch_one(&mut *conn)
    .await?;

    Ok(AppendedEvent {
        event: row,
        type_total,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE email = $1"#)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn insert_user(&self, user: &User) -> Result<User> {
        // Two invites for the same new email may race; the loser reads the winner's row.
        let row = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, name, role, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.role)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_test(&self, test: &Test) -> Result<Test> {
        let row = sqlx::query_as::<_, Test>(
            r#"
            INSERT INTO tests (
                id, created_by, title, description, duration_seconds,
                camera_required, record_video, block_tab_switch, require_fullscreen, disable_copy_paste,
                auto_flag_threshold, expires_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(test.id)
        .bind(test.created_by)
        .bind(&test.title)
        .bind(&test.description)
        .bind(test.duration_seconds)
        .bind(test.policy.camera_required)
        .bind(test.policy.record_video)
        .bind(test.policy.block_tab_switch)
        .bind(test.policy.require_fullscreen)
        .bind(test.policy.disable_copy_paste)
        .bind(test.auto_flag_threshold)
        .bind(test.expires_at)
        .bind(test.created_at)
        .bind(test.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_test(&self, test: &Test) -> Result<Test> {
        let row = sqlx::query_as::<_, Test>(
            r#"
            UPDATE tests
            SET title = $2, description = $3, duration_seconds = $4,
                camera_required = $5, record_video = $6, block_tab_switch = $7,
                require_fullscreen = $8, disable_copy_paste = $9,
                auto_flag_threshold = $10, expires_at = $11, updated_at = $12
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(test.id)
        .bind(&test.title)
        .bind(&test.description)
        .bind(test.duration_seconds)
        .bind(test.policy.camera_required)
        .bind(test.policy.record_video)
        .bind(test.policy.block_tab_switch)
        .bind(test.policy.require_fullscreen)
        .bind(test.policy.disable_copy_paste)
        .bind(test.auto_flag_threshold)
        .bind(test.expires_at)
        .bind(test.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_test(&self, id: Uuid) -> Result<Option<Test>> {
        let test = sqlx::query_as::<_, Test>(r#"SELECT * FROM tests WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(test)
    }

    async fn list_tests_by_owner(&self, owner: Uuid) -> Result<Vec<Test>> {
        let rows = sqlx::query_as::<_, Test>(
            r#"SELECT * FROM tests WHERE created_by = $1 ORDER BY created_at DESC"#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_test(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(r#"DELETE FROM tests WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_question(&self, question: &Question) -> Result<Question> {
        let row = sqlx::query_as::<_, Question>(
            r#"
            INSERT INTO questions (
                id, test_id, question_type, prompt, image_url, marks, position,
                choices, correct_answer, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(question.id)
        .bind(question.test_id)
        .bind(question.question_type)
        .bind(&question.prompt)
        .bind(&question.image_url)
        .bind(question.marks)
        .bind(question.position)
        .bind(&question.choices)
        .bind(&question.correct_answer)
        .bind(question.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_questions(&self, test_id: Uuid) -> Result<Vec<Question>> {
        let rows = sqlx::query_as::<_, Question>(
            r#"SELECT * FROM questions WHERE test_id = $1 ORDER BY position ASC, created_at ASC"#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_assignment(&self, assignment: &Assignment) -> Result<Assignment> {
        let row = sqlx::query_as::<_, Assignment>(
            r#"
            INSERT INTO assignments (
                id, test_id, user_id, invite_token, expires_at, attempts_allowed, link_mode, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(assignment.id)
        .bind(assignment.test_id)
        .bind(assignment.user_id)
        .bind(&assignment.invite_token)
        .bind(assignment.expires_at)
        .bind(assignment.attempts_allowed)
        .bind(assignment.link_mode)
        .bind(assignment.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_assignment(&self, id: Uuid) -> Result<Option<Assignment>> {
        let row = sqlx::query_as::<_, Assignment>(r#"SELECT * FROM assignments WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_assignment_by_token(&self, token: &str) -> Result<Option<Assignment>> {
        let row = sqlx::query_as::<_, Assignment>(
            r#"SELECT * FROM assignments WHERE invite_token = $1"#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_assignments_for_tests(&self, test_ids: &[Uuid]) -> Result<Vec<Assignment>> {
        if test_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, Assignment>(
            r#"SELECT * FROM assignments WHERE test_id = ANY($1) ORDER BY created_at DESC"#,
        )
        .bind(test_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_assignment(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(r#"DELETE FROM assignments WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_counted_attempts(&self, assignment_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM attempts
            WHERE assignment_id = $1 AND status IN ('in_progress', 'submitted', 'auto_submitted')
            "#,
        )
        .bind(assignment_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn create_attempt_within_quota(
        &self,
        attempt: &Attempt,
        attempts_allowed: i32,
        opening_events: &[Event],
    ) -> Result<Option<Attempt>> {
        let mut tx = self.pool.begin().await?;

        // Serialises concurrent starts against the same assignment.
        let locked: Option<Uuid> =
            sqlx::query_scalar(r#"SELECT id FROM assignments WHERE id = $1 FOR UPDATE"#)
                .bind(attempt.assignment_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(Error::NotFound("Assignment not found".to_string()));
        }

        let used: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM attempts
            WHERE assignment_id = $1 AND status IN ('in_progress', 'submitted', 'auto_submitted')
            "#,
        )
        .bind(attempt.assignment_id)
        .fetch_one(&mut *tx)
        .await?;

        if used >= i64::from(attempts_allowed) {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query_as::<_, Attempt>(
            r#"
            INSERT INTO attempts (
                id, assignment_id, candidate_id, status, started_at, finished_at,
                score, flagged, metadata, created_at
            ) VALUES ($1, $2, $3, $4, $5, NULL, NULL, FALSE, $6, $7)
            RETURNING *
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.assignment_id)
        .bind(attempt.candidate_id)
        .bind(attempt.status)
        .bind(attempt.started_at)
        .bind(&attempt.metadata)
        .bind(attempt.created_at)
        .fetch_one(&mut *tx)
        .await?;

        for event in opening_events {
            insert_event(&mut *tx, event).await?;
        }

        tx.commit().await?;
        Ok(Some(row))
    }

    async fn get_attempt(&self, id: Uuid) -> Result<Option<Attempt>> {
        let row = sqlx::query_as::<_, Attempt>(r#"SELECT * FROM attempts WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_attempts_for_assignments(&self, assignment_ids: &[Uuid]) -> Result<Vec<Attempt>> {
        if assignment_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, Attempt>(
            r#"SELECT * FROM attempts WHERE assignment_id = ANY($1) ORDER BY created_at DESC"#,
        )
        .bind(assignment_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn finalize_attempt(
        &self,
        id: Uuid,
        status: AttemptStatus,
        finished_at: DateTime<Utc>,
        grade: Grader<'_>,
    ) -> Result<Option<Attempt>> {
        let mut tx = self.pool.begin().await?;

        // Answer writes take FOR SHARE on this row, so none can land after the read below.
        let open: Option<Uuid> = sqlx::query_scalar(
            r#"SELECT id FROM attempts WHERE id = $1 AND status = 'in_progress' FOR UPDATE"#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        if open.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let answers = sqlx::query_as::<_, Answer>(
            r#"SELECT * FROM answers WHERE attempt_id = $1 ORDER BY updated_at ASC"#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        let score = grade(&answers);

        let row = sqlx::query_as::<_, Attempt>(
            r#"
            UPDATE attempts
            SET status = $2, score = $3, finished_at = $4
            WHERE id = $1 AND status = 'in_progress'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(score)
        .bind(finished_at)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row)
    }

    async fn mark_flagged(&self, id: Uuid) -> Result<()> {
        sqlx::query(r#"UPDATE attempts SET flagged = TRUE WHERE id = $1 AND flagged = FALSE"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_attempt(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(r#"DELETE FROM attempts WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_overdue_attempts(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT a.id
            FROM attempts a
            JOIN assignments s ON s.id = a.assignment_id
            JOIN tests t ON t.id = s.test_id
            WHERE a.status = 'in_progress'
              AND a.started_at + make_interval(secs => t.duration_seconds) <= $1
            ORDER BY a.started_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn upsert_answer(&self, answer: &Answer) -> Result<Option<Answer>> {
        let mut tx = self.pool.begin().await?;

        let open: Option<Uuid> = sqlx::query_scalar(
            r#"SELECT id FROM attempts WHERE id = $1 AND status = 'in_progress' FOR SHARE"#,
        )
        .bind(answer.attempt_id)
        .fetch_optional(&mut *tx)
        .await?;
        if open.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query_as::<_, Answer>(
            r#"
            INSERT INTO answers (id, attempt_id, question_id, answer_data, time_taken_ms, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (attempt_id, question_id) DO UPDATE
            SET answer_data = EXCLUDED.answer_data,
                time_taken_ms = EXCLUDED.time_taken_ms,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(answer.id)
        .bind(answer.attempt_id)
        .bind(answer.question_id)
        .bind(&answer.answer_data)
        .bind(answer.time_taken_ms)
        .bind(answer.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(row))
    }

    async fn list_answers(&self, attempt_id: Uuid) -> Result<Vec<Answer>> {
        let rows = sqlx::query_as::<_, Answer>(
            r#"SELECT * FROM answers WHERE attempt_id = $1 ORDER BY updated_at ASC"#,
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_answers(&self, attempt_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM answers WHERE attempt_id = $1"#)
            .bind(attempt_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn append_event(&self, event: &Event) -> Result<AppendedEvent> {
        let mut tx = self.pool.begin().await?;
        let appended = insert_event(&mut *tx, event).await?;
        tx.commit().await?;
        Ok(appended)
    }

    async fn list_events(&self, attempt_id: Uuid) -> Result<Vec<Event>> {
        let rows = sqlx::query_as::<_, Event>(
            r#"SELECT * FROM events WHERE attempt_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_events(&self, attempt_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM events WHERE attempt_id = $1"#)
            .bind(attempt_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn insert_recording(&self, recording: &Recording) -> Result<Recording> {
        let row = sqlx::query_as::<_, Recording>(
            r#"
            INSERT INTO recordings (id, attempt_id, local_path, content_type, size_bytes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(recording.id)
        .bind(recording.attempt_id)
        .bind(&recording.local_path)
        .bind(&recording.content_type)
        .bind(recording.size_bytes)
        .bind(recording.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_recordings(&self, attempt_id: Uuid) -> Result<Vec<Recording>> {
        let rows = sqlx::query_as::<_, Recording>(
            r#"SELECT * FROM recordings WHERE attempt_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
