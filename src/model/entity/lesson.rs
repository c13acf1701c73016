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
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LessonType {
    Theory,
    Code,
    Quiz,
    Interactive,
    Video,
    Exercise,
}

impl LessonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Theory => "theory",
            Self::Code => "code",
            Self::Quiz => "quiz",
            Self::Interactive => "interactive",
            Self::Video => "video",
            Self::Exercise => "exercise",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct CodeBlock {
    pub language: String,
    pub starter_code: String,
    pub solution: String,
    pub hints: Vec<String>,
    pub expected_output: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct InteractiveStep {
    pub title: String,
    pub instruction: String,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct LessonContent {
    /// Markdown body.
    pub text: String,
    pub code: Option<CodeBlock>,
    pub steps: Vec<InteractiveStep>,
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Lesson {
    id: Uuid,
    course_id: Uuid,
    title: String,
    description: String,
    lesson_type: String,
    order_index: i32,
    #[schema(value_type = LessonContent)]
    content: Json<LessonContent>,
    duration_minutes: i32,
    xp_reward: i32,
    is_published: bool,
    created_at: DateTime<Utc>,
}

impl ResourceTyped for Lesson {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Lesson
    }
}

impl Lesson {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn course_id(&self) -> Uuid {
        self.course_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn lesson_type(&self) -> &str {
        &self.lesson_type
    }

    pub fn order_index(&self) -> i32 {
        self.order_index
    }

    pub fn content(&self) -> &LessonContent {
        &self.content
    }

    pub fn duration_minutes(&self) -> i32 {
        self.duration_minutes
    }

    pub fn xp_reward(&self) -> i32 {
        self.xp_reward
    }

    pub fn is_published(&self) -> bool {
        self.is_published
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
pub struct LessonCreate {
    pub course_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub lesson_type: LessonType,
    /// Appended after the last lesson when missing.
    pub order_index: Option<i32>,
    #[serde(default)]
    pub content: LessonContent,
    pub duration_minutes: Option<i32>,
    pub xp_reward: Option<i32>,
    pub is_published: Option<bool>,
}

impl LessonCreate {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err(String::from("lesson title is required"));
        }
        if self.order_index.is_some_and(|i| i < 0) {
            return Err(String::from("order_index cannot be negative"));
        }
        if self.xp_reward.is_some_and(|xp| xp < 0) {
            return Err(String::from("xp_reward cannot be negative"));
        }
        if self.duration_minutes.is_some_and(|m| m < 0) {
            return Err(String::from("duration_minutes cannot be negative"));
        }

        match self.lesson_type {
            LessonType::Code if self.content.code.is_none() => {
                Err(String::from("code lessons need a code block"))
            }
            LessonType::Interactive if self.content.steps.is_empty() => {
                Err(String::from("interactive lessons need at least one step"))
            }
            LessonType::Video
                if self
                    .content
                    .video_url
                    .as_deref()
                    .is_none_or(|url| url.trim().is_empty()) =>
            {
                Err(String::from("video lessons need a video_url"))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl CrudRepository<Lesson, LessonCreate, Uuid> for Lesson {
    async fn create(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: LessonCreate,
    ) -> DatabaseResult<Self> {
        let lesson = sqlx::query_as(
            r#"
            INSERT INTO lessons (
                id, course_id, title, description, lesson_type, order_index, content,
                duration_minutes, xp_reward, is_published
            )
            VALUES (
                $1, $2, $3, $4, $5,
                COALESCE($6, (SELECT COALESCE(MAX(order_index) + 1, 0) FROM lessons WHERE course_id = $2)),
                $7, $8, $9, $10
            )
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.course_id)
        .bind(data.title.trim())
        .bind(&data.description)
        .bind(data.lesson_type.as_str())
        .bind(data.order_index)
        .bind(Json(&data.content))
        .bind(data.duration_minutes.unwrap_or(0))
        .bind(data.xp_reward.unwrap_or(10))
        .bind(data.is_published.unwrap_or(true))
        .fetch_one(mm.executor())
        .await?;

        Ok(lesson)
    }

    /// The owning course never changes on update.
    async fn update(
        self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: LessonCreate,
    ) -> DatabaseResult<Self> {
        let lesson = sqlx::query_as(
            r#"
            UPDATE lessons SET
                title = $1, description = $2, lesson_type = $3, order_index = $4,
                content = $5, duration_minutes = $6, xp_reward = $7, is_published = $8
            WHERE id = $9
            RETURNING *
            "#,
        )
        .bind(data.title.trim())
        .bind(&data.description)
        .bind(data.lesson_type.as_str())
        .bind(data.order_index.unwrap_or(self.order_index))
        .bind(Json(&data.content))
        .bind(data.duration_minutes.unwrap_or(self.duration_minutes))
        .bind(data.xp_reward.unwrap_or(self.xp_reward))
        .bind(data.is_published.unwrap_or(self.is_published))
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;

        Ok(lesson)
    }

    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM lessons WHERE id = $1")
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
        let result = sqlx::query_as("SELECT * FROM lessons WHERE id = $1")
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
            "SELECT * FROM lessons ORDER BY course_id, order_index, id LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    async fn count(mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        let result: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lessons")
            .fetch_one(mm.executor())
            .await?;

        Ok(result)
    }
}

impl_paginatable_for!(Lesson, LessonCreate, Uuid);

#[async_trait]
impl HasOwner for Lesson {
    type OwnerId = Option<Uuid>;

    async fn get_owner_id(
        &self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Course::instructor_of(mm, self.course_id).await
    }
}

/// Neighbour of a lesson, enough to render a link.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct LessonSummary {
    pub id: Uuid,
    pub title: String,
    pub order_index: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LessonNavigation {
    pub prev: Option<LessonSummary>,
    pub next: Option<LessonSummary>,
}

impl Lesson {
    /// Lessons of a course in reading order. `published_only` hides drafts.
    pub async fn all_by_course(
        mm: &ModelManager,
        course_id: Uuid,
        published_only: bool,
    ) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            r#"
            SELECT * FROM lessons
            WHERE course_id = $1 AND (is_published OR NOT $2)
            ORDER BY order_index, id
            "#,
        )
        .bind(course_id)
        .bind(published_only)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    /// Ids of the lessons a student has to finish to complete the course.
    pub async fn published_ids(mm: &ModelManager, course_id: Uuid) -> DatabaseResult<Vec<Uuid>> {
        let result = sqlx::query_scalar(
            "SELECT id FROM lessons WHERE course_id = $1 AND is_published ORDER BY order_index, id",
        )
        .bind(course_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    /// Published lesson ids for several courses at once, keyed by course.
    pub async fn published_ids_by_course(
        mm: &ModelManager,
        course_ids: &[Uuid],
    ) -> DatabaseResult<HashMap<Uuid, Vec<Uuid>>> {
        let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
            r#"
            SELECT course_id, id FROM lessons
            WHERE course_id = ANY($1) AND is_published
            ORDER BY course_id, order_index, id
            "#,
        )
        .bind(course_ids)
        .fetch_all(mm.executor())
        .await?;

        let mut result: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for (course_id, id) in rows {
            result.entry(course_id).or_default().push(id);
        }
        Ok(result)
    }

    /// Previous and next published lessons by `order_index` within the course.
    pub async fn neighbors(&self, mm: &ModelManager) -> DatabaseResult<LessonNavigation> {
        let prev = sqlx::query_as::<_, LessonSummary>(
            r#"
            SELECT id, title, order_index FROM lessons
            WHERE course_id = $1 AND is_published AND order_index < $2
            ORDER BY order_index DESC
            LIMIT 1
            "#,
        )
        .bind(self.course_id)
        .bind(self.order_index)
        .fetch_optional(mm.executor());

        let next = sqlx::query_as::<_, LessonSummary>(
            r#"
            SELECT id, title, order_index FROM lessons
            WHERE course_id = $1 AND is_published AND order_index > $2
            ORDER BY order_index ASC
            LIMIT 1
            "#,
        )
        .bind(self.course_id)
        .bind(self.order_index)
        .fetch_optional(mm.executor());

        let (prev, next) = tokio::try_join!(prev, next)?;
        Ok(LessonNavigation { prev, next })
    }
}
