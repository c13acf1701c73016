use crate::config::App;
use crate::error::AppResult;
use crate::game::{Badge, level_for_xp, merge_badges};
use crate::impl_paginatable_for;
use crate::model::access::HasOwner;
use crate::model::entity::Course;
use super::review::{lock_course, recompute_course_rating};
use crate::model::repo::ResourceTyped;
use crate::web::AuthenticatedUser;
use crate::web::UserRole;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::prelude::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

use crate::model::{ModelManager, error::DatabaseResult, repo::CrudRepository};

#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct UserEntity {
    id: Uuid,
    username: String,
    email: String,
    #[serde(skip)]
    password_hash: String,
    role: String,
    total_xp: i64,
    level: i32,
    #[schema(value_type = Vec<String>)]
    badges: Json<Vec<String>>,
    #[schema(value_type = UserPreferences)]
    preferences: Json<UserPreferences>,
    is_active: bool,
    created_at: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct UserPreferences {
    pub theme: String,
    pub language: String,
    pub notifications: bool,
    pub daily_goal_minutes: i32,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            theme: String::from("light"),
            language: String::from("en"),
            notifications: true,
            daily_goal_minutes: 15,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct UserEntityCreateUpdate {
    pub username: String,
    pub email: String,
    /// Empty on update keeps the current hash.
    pub password_hash: String,
    pub preferences: Option<UserPreferences>,
}

/// Outcome of crediting XP to a user.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct XpUpdate {
    pub total_xp: i64,
    pub level: i32,
    pub previous_level: i32,
    pub new_badges: Vec<Badge>,
}

impl XpUpdate {
    pub fn leveled_up(&self) -> bool {
        self.level > self.previous_level
    }
}

impl ResourceTyped for UserEntity {
    fn get_resource_type() -> crate::model::repo::ResourceType {
        crate::model::repo::ResourceType::User
    }
}

impl UserEntity {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn hash(&self) -> &str {
        &self.password_hash
    }

    pub fn role(&self) -> UserRole {
        UserRole::from(self.role.as_str())
    }

    pub fn total_xp(&self) -> i64 {
        self.total_xp
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn badges(&self) -> &[String] {
        &self.badges
    }

    pub fn preferences(&self) -> &UserPreferences {
        &self.preferences
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }
}

#[async_trait::async_trait]
impl CrudRepository<UserEntity, UserEntityCreateUpdate, Uuid> for UserEntity {
    async fn create(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        data: UserEntityCreateUpdate,
    ) -> DatabaseResult<Self> {
        Self::create_with_role(mm, actor, data, UserRole::Student).await
    }

    async fn update(
        mut self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: UserEntityCreateUpdate,
    ) -> DatabaseResult<Self> {
        let preferences = data.preferences.unwrap_or_else(|| self.preferences.0.clone());
        let password_hash = if data.password_hash.is_empty() {
            self.password_hash.clone()
        } else {
            data.password_hash
        };

        sqlx::query(
            "UPDATE users SET username = $1, email = $2, password_hash = $3, preferences = $4 WHERE id = $5",
        )
        .bind(&data.username)
        .bind(&data.email)
        .bind(&password_hash)
        .bind(Json(&preferences))
        .bind(self.id)
        .execute(mm.executor())
        .await?;

        self.username = data.username;
        self.email = data.email;
        self.password_hash = password_hash;
        self.preferences = Json(preferences);
        Ok(self)
    }

    /// Reviews and progress go with the user; the aggregates of every course
    /// they touched are rewritten in the same transaction.
    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        let mut tx = mm.begin().await?;

        // sorted so concurrent deletes lock courses in the same order
        let reviewed: Vec<Uuid> = sqlx::query_scalar(
            "SELECT DISTINCT course_id FROM course_reviews WHERE user_id = $1 ORDER BY course_id",
        )
        .bind(self.id)
        .fetch_all(&mut *tx)
        .await?;
        let enrolled: Vec<Uuid> = sqlx::query_scalar(
            "SELECT DISTINCT course_id FROM user_progress WHERE user_id = $1 ORDER BY course_id",
        )
        .bind(self.id)
        .fetch_all(&mut *tx)
        .await?;

        let mut touched: Vec<Uuid> = reviewed.iter().chain(&enrolled).copied().collect();
        touched.sort();
        touched.dedup();
        for course_id in &touched {
            lock_course(&mut tx, *course_id).await?;
        }

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(self.id)
            .execute(&mut *tx)
            .await?;

        for course_id in &reviewed {
            recompute_course_rating(&mut tx, *course_id).await?;
        }
        for course_id in &enrolled {
            Course::recount_enrollment(&mut tx, *course_id).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM users WHERE id = $1")
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
        let result = sqlx::query_as("SELECT * FROM users ORDER BY created_at, id LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(mm.executor())
            .await?;
        Ok(result)
    }

    async fn count(mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        let result: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(mm.executor())
            .await?;

        Ok(result)
    }
}

impl_paginatable_for!(UserEntity, UserEntityCreateUpdate, Uuid);

#[async_trait]
impl HasOwner for UserEntity {
    type OwnerId = Uuid;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.id) // owners of users are themselves
    }
}

impl UserEntity {
    pub async fn create_with_role(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: UserEntityCreateUpdate,
        role: UserRole,
    ) -> DatabaseResult<Self> {
        let preferences = data.preferences.unwrap_or_default();
        let user = sqlx::query_as(
            r#"
            INSERT INTO users (id, username, email, password_hash, role, preferences)
            VALUES ($1,$2,$3,$4,$5,$6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&data.username)
        .bind(&data.email)
        .bind(&data.password_hash)
        .bind(role.to_string())
        .bind(Json(&preferences))
        .fetch_one(mm.executor())
        .await?;

        Ok(user)
    }

    pub async fn find_by_username(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        username: &str,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn find_by_email(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        email: &str,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM users WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    /// Login accepts either the username or the email.
    pub async fn find_by_login(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        login: &str,
    ) -> DatabaseResult<Option<Self>> {
        if login.contains('@') {
            if let Some(user) = Self::find_by_email(mm, actor, login).await? {
                return Ok(Some(user));
            }
        }
        Self::find_by_username(mm, actor, login).await
    }

    pub async fn touch_login(&mut self, mm: &ModelManager) -> DatabaseResult<()> {
        let now: DateTime<Utc> = sqlx::query_scalar(
            "UPDATE users SET last_login = now() WHERE id = $1 RETURNING last_login",
        )
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;

        self.last_login = Some(now);
        Ok(())
    }

    /// Credits `xp`, recomputes the level and awards `earned` plus any level
    /// badges, inside the caller's transaction. `None` when the user no longer exists.
    pub async fn credit_xp(
        conn: &mut PgConnection,
        user_id: Uuid,
        xp: i64,
        earned: &[Badge],
    ) -> DatabaseResult<Option<XpUpdate>> {
        let row: Option<(i64, i32, Json<Vec<String>>)> =
            sqlx::query_as("SELECT total_xp, level, badges FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *conn)
                .await?;

        let Some((total_xp, previous_level, Json(mut badges))) = row else {
            return Ok(None);
        };

        let total_xp = total_xp + xp.max(0);
        let level = level_for_xp(total_xp);

        let mut candidates = earned.to_vec();
        candidates.extend(Badge::for_level(level));
        let new_badges = merge_badges(&mut badges, candidates);

        sqlx::query("UPDATE users SET total_xp = $1, level = $2, badges = $3 WHERE id = $4")
            .bind(total_xp)
            .bind(level)
            .bind(Json(&badges))
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        if !new_badges.is_empty() {
            tracing::debug!("user {} earned badges {:?}", user_id, new_badges);
        }

        Ok(Some(XpUpdate {
            total_xp,
            level,
            previous_level,
            new_badges,
        }))
    }

    /// Top users by XP; ties go to whoever joined first.
    pub async fn leaderboard(mm: &ModelManager, limit: i64) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            "SELECT * FROM users WHERE is_active ORDER BY total_xp DESC, created_at, id LIMIT $1",
        )
        .bind(limit)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    /// Returns `None` when no user has that id.
    pub async fn set_role(
        mm: &ModelManager,
        id: Uuid,
        role: UserRole,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("UPDATE users SET role = $1 WHERE id = $2 RETURNING *")
            .bind(role.to_string())
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    /// Creates the configured admin account if it does not exist yet.
    pub async fn ensure_admin(mm: &ModelManager, app: &App) -> AppResult<()> {
        let Some((username, email, password)) = app.admin_credentials() else {
            return Ok(());
        };

        let system = AuthenticatedUser::admin();
        if Self::find_by_username(mm, &system, username).await?.is_some() {
            return Ok(());
        }

        let data = UserEntityCreateUpdate {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: crate::auth::hash_password(password)?,
            preferences: None,
        };

        match Self::create_with_role(mm, &system, data, UserRole::Admin).await {
            Ok(admin) => {
                tracing::info!("bootstrapped admin account `{}`", admin.username());
                Ok(())
            }
            // another instance won the race
            Err(e) if e.is_unique_violation() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
