use crate::game::{Badge, Grade, QuestionResult, SubmittedAnswer, grade};
use crate::model::access::HasOwner;
use crate::model::entity::{Quiz, UserEntity, XpUpdate};
use crate::model::repo::ResourceTyped;
use crate::model::{
    DatabaseError, ModelManager, error::DatabaseResult, repo::CrudRepository,
};
use crate::web::AuthenticatedUser;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::prelude::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

/// One graded submission of a quiz.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct QuizAttempt {
    id: Uuid,
    quiz_id: Uuid,
    user_id: Uuid,
    #[schema(value_type = Vec<SubmittedAnswer>)]
    answers: Json<Vec<SubmittedAnswer>>,
    #[schema(value_type = Vec<QuestionResult>)]
    results: Json<Vec<QuestionResult>>,
    earned_points: i32,
    total_points: i32,
    score: i32,
    passed: bool,
    time_spent: i64,
    attempt_number: i32,
    xp_awarded: i32,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct QuizAttemptCreate {
    pub quiz_id: Uuid,
    pub user_id: Uuid,
    pub answers: Vec<SubmittedAnswer>,
    pub grade: Grade,
    pub time_spent: i64,
    pub xp_awarded: i32,
}

impl ResourceTyped for QuizAttempt {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::QuizAttempt
    }
}

impl QuizAttempt {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn quiz_id(&self) -> Uuid {
        self.quiz_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn attempt_number(&self) -> i32 {
        self.attempt_number
    }

    pub fn xp_awarded(&self) -> i32 {
        self.xp_awarded
    }

    pub fn results(&self) -> &[QuestionResult] {
        &self.results
    }
}

async fn insert(conn: &mut PgConnection, data: &QuizAttemptCreate) -> DatabaseResult<QuizAttempt> {
    let attempt = sqlx::query_as(
        r#"
        INSERT INTO quiz_attempts (
            id, quiz_id, user_id, answers, results, earned_points, total_points,
            score, passed, time_spent, attempt_number, xp_awarded
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
            (SELECT COALESCE(MAX(attempt_number), 0) + 1 FROM quiz_attempts WHERE quiz_id = $2 AND user_id = $3),
            $11
        )
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(data.quiz_id)
    .bind(data.user_id)
    .bind(Json(&data.answers))
    .bind(Json(&data.grade.results))
    .bind(data.grade.earned_points)
    .bind(data.grade.total_points)
    .bind(data.grade.score)
    .bind(data.grade.passed)
    .bind(data.time_spent.max(0))
    .bind(data.xp_awarded)
    .fetch_one(&mut *conn)
    .await?;

    Ok(attempt)
}

#[async_trait]
impl CrudRepository<QuizAttempt, QuizAttemptCreate, Uuid> for QuizAttempt {
    /// `attempt_number` is the user's running count for this quiz.
    async fn create(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: QuizAttemptCreate,
    ) -> DatabaseResult<Self> {
        let mut conn = mm.executor().acquire().await?;
        insert(&mut conn, &data).await
    }

    /// Attempts are immutable; only the XP column can be corrected.
    async fn update(
        mut self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: QuizAttemptCreate,
    ) -> DatabaseResult<Self> {
        sqlx::query("UPDATE quiz_attempts SET xp_awarded = $1 WHERE id = $2")
            .bind(data.xp_awarded)
            .bind(self.id)
            .execute(mm.executor())
            .await?;

        self.xp_awarded = data.xp_awarded;
        Ok(self)
    }

    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM quiz_attempts WHERE id = $1")
            .bind(self.id)
            .execute(mm.executor())
            .await?;
        Ok(())
    }

    async fn find_by_id(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM quiz_attempts WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    async fn list(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            "SELECT * FROM quiz_attempts ORDER BY created_at DESC, id LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    async fn count(mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        let result: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quiz_attempts")
            .fetch_one(mm.executor())
            .await?;
        Ok(result)
    }
}

#[async_trait]
impl HasOwner for QuizAttempt {
    type OwnerId = Uuid;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.user_id)
    }
}

/// A stored attempt and the XP it credited, if any.
#[derive(Debug, Clone)]
pub struct Submission {
    pub attempt: QuizAttempt,
    pub xp: Option<XpUpdate>,
}

impl QuizAttempt {
    /// Grades `answers`, stores the attempt and credits XP in one transaction.
    ///
    /// The quiz's XP is credited only on the user's first passing attempt; a
    /// perfect score also earns [`Badge::Perfectionist`]. Fails with
    /// [`DatabaseError::AttemptLimitReached`] once `max_attempts` is used up.
    pub async fn submit(
        mm: &ModelManager,
        quiz: &Quiz,
        user_id: Uuid,
        answers: Vec<SubmittedAnswer>,
        time_spent: i64,
    ) -> DatabaseResult<Submission> {
        let mut tx = mm.begin().await?;

        // serialises concurrent submissions of the same user
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let (taken, passed_before): (i64, bool) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(BOOL_OR(passed), FALSE)
            FROM quiz_attempts
            WHERE quiz_id = $1 AND user_id = $2
            "#,
        )
        .bind(quiz.id())
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(max) = quiz.max_attempts() {
            if taken >= max as i64 {
                return Err(DatabaseError::AttemptLimitReached(max));
            }
        }

        let grade = grade(quiz.questions(), &answers, quiz.passing_score());
        let first_pass = grade.passed && !passed_before;
        let perfect = grade.total_points > 0 && grade.score == 100;

        let data = QuizAttemptCreate {
            quiz_id: quiz.id(),
            user_id,
            answers,
            grade,
            time_spent,
            xp_awarded: if first_pass { quiz.xp_reward() } else { 0 },
        };
        let attempt = insert(&mut tx, &data).await?;

        let xp = if first_pass || perfect {
            let earned: &[Badge] = if perfect { &[Badge::Perfectionist] } else { &[] };
            UserEntity::credit_xp(&mut tx, user_id, data.xp_awarded as i64, earned).await?
        } else {
            None
        };

        tx.commit().await?;
        Ok(Submission { attempt, xp })
    }

    /// The user's attempts at one quiz, latest first.
    pub async fn all_for_user(
        mm: &ModelManager,
        quiz_id: Uuid,
        user_id: Uuid,
    ) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            r#"
            SELECT * FROM quiz_attempts
            WHERE quiz_id = $1 AND user_id = $2
            ORDER BY attempt_number DESC
            "#,
        )
        .bind(quiz_id)
        .bind(user_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    /// `(attempts, passed attempts, average score)` over every quiz the user took.
    pub async fn totals_for_user(mm: &ModelManager, user_id: Uuid) -> DatabaseResult<(i64, i64, f64)> {
        let result = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE passed), COALESCE(AVG(score), 0)::float8
            FROM quiz_attempts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(mm.executor())
        .await?;
        Ok(result)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QuizStats {
    pub quiz_id: Uuid,
    pub total_attempts: i64,
    pub unique_users: i64,
    pub average_score: f64,
    /// Percentage of attempts that passed.
    pub pass_rate: f64,
    pub highest_score: i32,
}

impl QuizStats {
    pub async fn collect(mm: &ModelManager, quiz_id: Uuid) -> DatabaseResult<Self> {
        use crate::game::stats::{percentage, round1};

        let (attempts, users, passed, avg, highest): (i64, i64, i64, f64, i32) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(DISTINCT user_id),
                COUNT(*) FILTER (WHERE passed),
                COALESCE(AVG(score), 0)::float8,
                COALESCE(MAX(score), 0)
            FROM quiz_attempts
            WHERE quiz_id = $1
            "#,
        )
        .bind(quiz_id)
        .fetch_one(mm.executor())
        .await?;

        Ok(Self {
            quiz_id,
            total_attempts: attempts,
            unique_users: users,
            average_score: round1(avg),
            pass_rate: percentage(passed, attempts),
            highest_score: highest,
        })
    }
}
