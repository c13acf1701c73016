use crate::impl_paginatable_for;
use crate::model::access::HasOwner;
use crate::model::entity::Course;
use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult, repo::CrudRepository};
use crate::web::AuthenticatedUser;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

pub const DEFAULT_PASSING_SCORE: i32 = 70;
pub const DEFAULT_QUIZ_XP: i32 = 50;
pub const MAX_QUESTION_POINTS: i32 = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QuestionOption {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Question {
    /// Assigned on save when missing.
    #[serde(default)]
    pub id: Uuid,
    pub text: String,
    pub options: Vec<QuestionOption>,
    #[serde(default = "default_points")]
    pub points: i32,
    #[serde(default)]
    pub explanation: String,
}

fn default_points() -> i32 {
    1
}

impl Question {
    /// Indexes of the correct options.
    pub fn correct_options(&self) -> impl Iterator<Item = usize> + '_ {
        self.options
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_correct)
            .map(|(i, _)| i)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Quiz {
    id: Uuid,
    course_id: Uuid,
    lesson_id: Option<Uuid>,
    title: String,
    description: String,
    #[schema(value_type = Vec<Question>)]
    questions: Json<Vec<Question>>,
    passing_score: i32,
    time_limit_minutes: Option<i32>,
    xp_reward: i32,
    max_attempts: Option<i32>,
    is_published: bool,
    created_at: DateTime<Utc>,
}

impl ResourceTyped for Quiz {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Quiz
    }
}

impl Quiz {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn course_id(&self) -> Uuid {
        self.course_id
    }

    pub fn lesson_id(&self) -> Option<Uuid> {
        self.lesson_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn passing_score(&self) -> i32 {
        self.passing_score
    }

    pub fn time_limit_minutes(&self) -> Option<i32> {
        self.time_limit_minutes
    }

    pub fn xp_reward(&self) -> i32 {
        self.xp_reward
    }

    pub fn max_attempts(&self) -> Option<i32> {
        self.max_attempts
    }

    pub fn is_published(&self) -> bool {
        self.is_published
    }

    pub fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }

    pub fn total_points(&self) -> i32 {
        self.questions
            .iter()
            .fold(0i32, |total, q| total.saturating_add(q.points.max(0)))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
pub struct QuizCreate {
    pub course_id: Uuid,
    pub lesson_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub questions: Vec<Question>,
    pub passing_score: Option<i32>,
    pub time_limit_minutes: Option<i32>,
    pub xp_reward: Option<i32>,
    pub max_attempts: Option<i32>,
    pub is_published: Option<bool>,
}

impl QuizCreate {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err(String::from("quiz title is required"));
        }
        if self.questions.is_empty() {
            return Err(String::from("a quiz needs at least one question"));
        }
        if self.passing_score.is_some_and(|s| !(0..=100).contains(&s)) {
            return Err(String::from("passing_score must be between 0 and 100"));
        }
        if self.time_limit_minutes.is_some_and(|m| m <= 0) {
            return Err(String::from("time_limit_minutes must be positive"));
        }
        if self.max_attempts.is_some_and(|m| m <= 0) {
            return Err(String::from("max_attempts must be positive"));
        }
        if self.xp_reward.is_some_and(|xp| xp < 0) {
            return Err(String::from("xp_reward cannot be negative"));
        }

        for (i, question) in self.questions.iter().enumerate() {
            let n = i + 1;
            if question.text.trim().is_empty() {
                return Err(format!("question {} has no text", n));
            }
            if question.options.len() < 2 {
                return Err(format!("question {} needs at least two options", n));
            }
            if question.correct_options().next().is_none() {
                return Err(format!("question {} needs a correct option", n));
            }
            if !(1..=MAX_QUESTION_POINTS).contains(&question.points) {
                return Err(format!(
                    "question {} must be worth between 1 and {} points",
                    n, MAX_QUESTION_POINTS
                ));
            }
        }
        Ok(())
    }

    /// Gives every question a unique id, keeping the ones the client sent.
    pub fn normalize(&mut self) {
        let mut seen = std::collections::HashSet::with_capacity(self.questions.len());
        for question in &mut self.questions {
            if question.id.is_nil() || !seen.insert(question.id) {
                question.id = Uuid::new_v4();
                seen.insert(question.id);
            }
        }
    }
}

#[async_trait]
impl CrudRepository<Quiz, QuizCreate, Uuid> for Quiz {
    async fn create(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        mut data: QuizCreate,
    ) -> DatabaseResult<Self> {
        data.normalize();

        let quiz = sqlx::query_as(
            r#"
            INSERT INTO quizzes (
                id, course_id, lesson_id, title, description, questions, passing_score,
                time_limit_minutes, xp_reward, max_attempts, is_published
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.course_id)
        .bind(data.lesson_id)
        .bind(data.title.trim())
        .bind(&data.description)
        .bind(Json(&data.questions))
        .bind(data.passing_score.unwrap_or(DEFAULT_PASSING_SCORE))
        .bind(data.time_limit_minutes)
        .bind(data.xp_reward.unwrap_or(DEFAULT_QUIZ_XP))
        .bind(data.max_attempts)
        .bind(data.is_published.unwrap_or(true))
        .fetch_one(mm.executor())
        .await?;

        Ok(quiz)
    }

    async fn update(
        self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        mut data: QuizCreate,
    ) -> DatabaseResult<Self> {
        data.normalize();

        let quiz = sqlx::query_as(
            r#"
            UPDATE quizzes SET
                lesson_id = $1, title = $2, description = $3, questions = $4,
                passing_score = $5, time_limit_minutes = $6, xp_reward = $7,
                max_attempts = $8, is_published = $9
            WHERE id = $10
            RETURNING *
            "#,
        )
        .bind(data.lesson_id)
        .bind(data.title.trim())
        .bind(&data.description)
        .bind(Json(&data.questions))
        .bind(data.passing_score.unwrap_or(self.passing_score))
        .bind(data.time_limit_minutes)
        .bind(data.xp_reward.unwrap_or(self.xp_reward))
        .bind(data.max_attempts)
        .bind(data.is_published.unwrap_or(self.is_published))
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;

        Ok(quiz)
    }

    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM quizzes WHERE id = $1")
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
        let result = sqlx::query_as("SELECT * FROM quizzes WHERE id = $1")
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
        let result =
            sqlx::query_as("SELECT * FROM quizzes ORDER BY created_at, id LIMIT $1 OFFSET $2")
                .bind(limit)
                .bind(offset)
                .fetch_all(mm.executor())
                .await?;
        Ok(result)
    }

    async fn count(mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        let result: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quizzes")
            .fetch_one(mm.executor())
            .await?;

        Ok(result)
    }
}

impl_paginatable_for!(Quiz, QuizCreate, Uuid);

#[async_trait]
impl HasOwner for Quiz {
    type OwnerId = Option<Uuid>;

    async fn get_owner_id(
        &self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Course::instructor_of(mm, self.course_id).await
    }
}

impl Quiz {
    pub async fn all_by_course(
        mm: &ModelManager,
        course_id: Uuid,
        published_only: bool,
    ) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            r#"
            SELECT * FROM quizzes
            WHERE course_id = $1 AND (is_published OR NOT $2)
            ORDER BY created_at, id
            "#,
        )
        .bind(course_id)
        .bind(published_only)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    pub async fn find_by_title(
        mm: &ModelManager,
        course_id: Uuid,
        title: &str,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as(
            "SELECT * FROM quizzes WHERE course_id = $1 AND title = $2 ORDER BY created_at, id LIMIT 1",
        )
        .bind(course_id)
        .bind(title)
        .fetch_optional(mm.executor())
        .await?;
        Ok(result)
    }
}
