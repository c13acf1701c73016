use crate::game::stats::average_rating;
use crate::model::access::HasOwner;
use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, Page, PageRequest, error::DatabaseResult, repo::CrudRepository};
use crate::web::AuthenticatedUser;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::prelude::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Review {
    id: Uuid,
    course_id: Uuid,
    user_id: Uuid,
    rating: i16,
    comment: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ReviewCreate {
    pub course_id: Uuid,
    pub user_id: Uuid,
    pub rating: i16,
    pub comment: String,
}

impl ReviewCreate {
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=5).contains(&self.rating) {
            return Err(String::from("rating must be between 1 and 5"));
        }
        if self.comment.chars().count() > 2_000 {
            return Err(String::from("comment must be at most 2000 characters"));
        }
        Ok(())
    }
}

impl ResourceTyped for Review {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Review
    }
}

impl Review {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn course_id(&self) -> Uuid {
        self.course_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn rating(&self) -> i16 {
        self.rating
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }
}

/// Locks the course row and rewrites its rating aggregate from every review.
/// Must run inside the transaction that changed the reviews.
pub(crate) async fn recompute_course_rating(conn: &mut PgConnection, course_id: Uuid) -> DatabaseResult<f64> {
    let ratings: Vec<i16> = sqlx::query_scalar("SELECT rating FROM course_reviews WHERE course_id = $1")
        .bind(course_id)
        .fetch_all(&mut *conn)
        .await?;

    let average = average_rating(&ratings);
    sqlx::query("UPDATE courses SET average_rating = $1, total_ratings = $2, updated_at = now() WHERE id = $3")
        .bind(average)
        .bind(ratings.len() as i64)
        .bind(course_id)
        .execute(&mut *conn)
        .await?;

    Ok(average)
}

pub(crate) async fn lock_course(conn: &mut PgConnection, course_id: Uuid) -> DatabaseResult<()> {
    sqlx::query("SELECT id FROM courses WHERE id = $1 FOR UPDATE")
        .bind(course_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[async_trait]
impl CrudRepository<Review, ReviewCreate, Uuid> for Review {
    /// One review per (user, course): posting again replaces the earlier one.
    async fn create(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: ReviewCreate,
    ) -> DatabaseResult<Self> {
        let mut tx = mm.begin().await?;
        lock_course(&mut tx, data.course_id).await?;

        let review: Review = sqlx::query_as(
            r#"
            INSERT INTO course_reviews (id, course_id, user_id, rating, comment)
            VALUES ($1,$2,$3,$4,$5)
            ON CONFLICT (course_id, user_id)
            DO UPDATE SET rating = EXCLUDED.rating, comment = EXCLUDED.comment, created_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.course_id)
        .bind(data.user_id)
        .bind(data.rating)
        .bind(&data.comment)
        .fetch_one(&mut *tx)
        .await?;

        recompute_course_rating(&mut tx, data.course_id).await?;
        tx.commit().await?;
        Ok(review)
    }

    async fn update(
        mut self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: ReviewCreate,
    ) -> DatabaseResult<Self> {
        let mut tx = mm.begin().await?;
        lock_course(&mut tx, self.course_id).await?;

        sqlx::query("UPDATE course_reviews SET rating = $1, comment = $2 WHERE id = $3")
            .bind(data.rating)
            .bind(&data.comment)
            .bind(self.id)
            .execute(&mut *tx)
            .await?;

        recompute_course_rating(&mut tx, self.course_id).await?;
        tx.commit().await?;

        self.rating = data.rating;
        self.comment = data.comment;
        Ok(self)
    }

    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        let mut tx = mm.begin().await?;
        lock_course(&mut tx, self.course_id).await?;

        sqlx::query("DELETE FROM course_reviews WHERE id = $1")
            .bind(self.id)
            .execute(&mut *tx)
            .await?;

        recompute_course_rating(&mut tx, self.course_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM course_reviews WHERE id = $1")
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
            "SELECT * FROM course_reviews ORDER BY created_at DESC, id LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    async fn count(mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        let result: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM course_reviews")
            .fetch_one(mm.executor())
            .await?;
        Ok(result)
    }
}

#[async_trait]
impl HasOwner for Review {
    type OwnerId = Uuid;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.user_id)
    }
}

impl Review {
    pub async fn page_by_course(
        mm: &ModelManager,
        course_id: Uuid,
        request: PageRequest,
    ) -> DatabaseResult<Page<Self>> {
        let items = sqlx::query_as(
            r#"
            SELECT * FROM course_reviews
            WHERE course_id = $1
            ORDER BY created_at DESC, id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(course_id)
        .bind(request.limit())
        .bind(request.offset())
        .fetch_all(mm.executor());

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM course_reviews WHERE course_id = $1")
            .bind(course_id)
            .fetch_one(mm.executor());

        let (items, total) = tokio::try_join!(items, total)?;
        Ok(Page::new(items, total, request))
    }

    /// Rewrites every course's rating aggregate. Returns the number of courses touched.
    pub async fn recompute_all(mm: &ModelManager) -> DatabaseResult<usize> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM courses ORDER BY id")
            .fetch_all(mm.executor())
            .await?;

        for id in &ids {
            let mut tx = mm.begin().await?;
            lock_course(&mut tx, *id).await?;
            recompute_course_rating(&mut tx, *id).await?;
            tx.commit().await?;
        }

        Ok(ids.len())
    }
}
