use crate::game::{Badge, CompletedLesson, LessonCompletion, covers_all, record_completion};
use crate::impl_paginatable_for;
use crate::model::access::HasOwner;
use crate::model::entity::{Course, Lesson, UserEntity, XpUpdate};
use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult, repo::CrudRepository};
use crate::web::AuthenticatedUser;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::prelude::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct UserProgress {
    id: Uuid,
    user_id: Uuid,
    course_id: Uuid,
    #[schema(value_type = Vec<CompletedLesson>)]
    completed_lessons: Json<Vec<CompletedLesson>>,
    current_lesson_id: Option<Uuid>,
    total_xp: i64,
    total_time_spent: i64,
    is_completed: bool,
    completed_at: Option<DateTime<Utc>>,
    enrolled_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
}

impl ResourceTyped for UserProgress {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::UserProgress
    }
}

impl UserProgress {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn course_id(&self) -> Uuid {
        self.course_id
    }

    pub fn completed_lessons(&self) -> &[CompletedLesson] {
        &self.completed_lessons
    }

    pub fn total_xp(&self) -> i64 {
        self.total_xp
    }

    pub fn total_time_spent(&self) -> i64 {
        self.total_time_spent
    }

    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    pub fn current_lesson_id(&self) -> Option<Uuid> {
        self.current_lesson_id
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserProgressCreate {
    pub user_id: Uuid,
    pub course_id: Uuid,
}

/// What completing a lesson changed.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub progress: UserProgress,
    pub completion: LessonCompletion,
    /// Set when this completion finished the course.
    pub course_completed: bool,
    pub xp_earned: i64,
    pub xp: Option<XpUpdate>,
}

async fn insert_if_missing(
    conn: &mut PgConnection,
    user_id: Uuid,
    course_id: Uuid,
) -> DatabaseResult<Option<UserProgress>> {
    let inserted: Option<UserProgress> = sqlx::query_as(
        r#"
        INSERT INTO user_progress (id, user_id, course_id)
        VALUES ($1,$2,$3)
        ON CONFLICT (user_id, course_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(&mut *conn)
    .await?;

    if inserted.is_some() {
        sqlx::query("UPDATE courses SET enrolled_students = enrolled_students + 1 WHERE id = $1")
            .bind(course_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(inserted)
}

#[async_trait]
impl CrudRepository<UserProgress, UserProgressCreate, Uuid> for UserProgress {
    /// Enrolls; an existing record is returned untouched.
    async fn create(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: UserProgressCreate,
    ) -> DatabaseResult<Self> {
        let (progress, _) = Self::enroll(mm, data.user_id, data.course_id).await?;
        Ok(progress)
    }

    /// Only `last_accessed` moves; everything else is owned by completions.
    async fn update(
        self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        _data: UserProgressCreate,
    ) -> DatabaseResult<Self> {
        let progress =
            sqlx::query_as("UPDATE user_progress SET last_accessed = now() WHERE id = $1 RETURNING *")
                .bind(self.id)
                .fetch_one(mm.executor())
                .await?;
        Ok(progress)
    }

    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        let mut tx = mm.begin().await?;
        sqlx::query("DELETE FROM user_progress WHERE id = $1")
            .bind(self.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE courses SET enrolled_students = GREATEST(enrolled_students - 1, 0) WHERE id = $1",
        )
        .bind(self.course_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM user_progress WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    /// Admins list everything, everyone else only their own records.
    async fn list(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            r#"
            SELECT * FROM user_progress
            WHERE user_id = $1 OR $2
            ORDER BY last_accessed DESC, id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(actor.user_id())
        .bind(actor.user_role() == crate::web::UserRole::Admin)
        .bind(limit)
        .bind(offset)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    async fn count(mm: &ModelManager, actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        let result: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_progress WHERE user_id = $1 OR $2")
                .bind(actor.user_id())
                .bind(actor.user_role() == crate::web::UserRole::Admin)
                .fetch_one(mm.executor())
                .await?;

        Ok(result)
    }
}

impl_paginatable_for!(UserProgress, UserProgressCreate, Uuid);

#[async_trait]
impl HasOwner for UserProgress {
    type OwnerId = Uuid;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.user_id)
    }
}

impl UserProgress {
    /// Idempotent. The flag is true only when this call created the record,
    /// which is also the only time the course's enrolment count moves.
    pub async fn enroll(
        mm: &ModelManager,
        user_id: Uuid,
        course_id: Uuid,
    ) -> DatabaseResult<(Self, bool)> {
        let mut tx = mm.begin().await?;

        let (progress, newly) = match insert_if_missing(&mut tx, user_id, course_id).await? {
            Some(progress) => (progress, true),
            None => {
                let progress = sqlx::query_as(
                    "SELECT * FROM user_progress WHERE user_id = $1 AND course_id = $2",
                )
                .bind(user_id)
                .bind(course_id)
                .fetch_one(&mut *tx)
                .await?;
                (progress, false)
            }
        };

        tx.commit().await?;
        Ok((progress, newly))
    }

    pub async fn find_for(
        mm: &ModelManager,
        user_id: Uuid,
        course_id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result =
            sqlx::query_as("SELECT * FROM user_progress WHERE user_id = $1 AND course_id = $2")
                .bind(user_id)
                .bind(course_id)
                .fetch_optional(mm.executor())
                .await?;
        Ok(result)
    }

    /// Records a lesson completion, enrolling first when needed.
    ///
    /// First completions credit the lesson's XP (plus `first-steps` on the
    /// user's very first lesson). Finishing the last published lesson of the
    /// course marks the record complete and credits the course XP once.
    pub async fn complete_lesson(
        mm: &ModelManager,
        user_id: Uuid,
        lesson: &Lesson,
        course: &Course,
        score: i32,
        time_spent: i64,
    ) -> DatabaseResult<CompletionOutcome> {
        let required = Lesson::published_ids(mm, course.id()).await?;
        let mut tx = mm.begin().await?;

        insert_if_missing(&mut tx, user_id, course.id()).await?;

        let current: UserProgress = sqlx::query_as(
            "SELECT * FROM user_progress WHERE user_id = $1 AND course_id = $2 FOR UPDATE",
        )
        .bind(user_id)
        .bind(course.id())
        .fetch_one(&mut *tx)
        .await?;

        let had_any_lesson: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM user_progress WHERE user_id = $1 AND jsonb_array_length(completed_lessons) > 0)",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let now = Utc::now();
        let Json(mut completed) = current.completed_lessons;
        let completion = record_completion(&mut completed, lesson.id(), score, time_spent, now);

        let mut xp_earned = 0i64;
        let mut badges = Vec::new();
        if completion == LessonCompletion::First {
            xp_earned += lesson.xp_reward() as i64;
            if !had_any_lesson {
                badges.push(Badge::FirstSteps);
            }
        }

        let course_completed = !current.is_completed && covers_all(&completed, &required);
        if course_completed {
            xp_earned += course.xp_reward() as i64;
            badges.push(Badge::CourseFinisher);
        }

        let progress: UserProgress = sqlx::query_as(
            r#"
            UPDATE user_progress SET
                completed_lessons = $1,
                current_lesson_id = $2,
                total_xp = total_xp + $3,
                total_time_spent = total_time_spent + $4,
                is_completed = is_completed OR $5,
                completed_at = CASE WHEN $5 THEN $6 ELSE completed_at END,
                last_accessed = $6
            WHERE id = $7
            RETURNING *
            "#,
        )
        .bind(Json(&completed))
        .bind(lesson.id())
        .bind(xp_earned)
        .bind(time_spent.max(0))
        .bind(course_completed)
        .bind(now)
        .bind(current.id)
        .fetch_one(&mut *tx)
        .await?;

        let xp = if xp_earned > 0 || !badges.is_empty() {
            UserEntity::credit_xp(&mut tx, user_id, xp_earned, &badges).await?
        } else {
            None
        };

        tx.commit().await?;

        if course_completed {
            tracing::info!("user {} completed course {}", user_id, course.id());
        }

        Ok(CompletionOutcome {
            progress,
            completion,
            course_completed,
            xp_earned,
            xp,
        })
    }

    /// `(enrolled, completed courses, completed lessons, seconds spent)`.
    pub async fn totals_for_user(
        mm: &ModelManager,
        user_id: Uuid,
    ) -> DatabaseResult<(i64, i64, i64, i64)> {
        let result = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE is_completed),
                COALESCE(SUM(jsonb_array_length(completed_lessons)), 0)::int8,
                COALESCE(SUM(total_time_spent), 0)::int8
            FROM user_progress
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(mm.executor())
        .await?;
        Ok(result)
    }
}
