use crate::impl_paginatable_for;
use crate::model::access::HasOwner;
use crate::model::repo::ResourceTyped;
use crate::model::{Page, PageRequest};
use crate::model::{ModelManager, error::DatabaseResult, repo::CrudRepository};
use crate::web::{AuthenticatedUser, UserRole};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use sqlx::types::Json;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum CourseCategory {
    WebDevelopment,
    DataScience,
    MobileDevelopment,
    GameDevelopment,
    MachineLearning,
    Devops,
    Algorithms,
    Databases,
    Other,
}

impl CourseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebDevelopment => "web-development",
            Self::DataScience => "data-science",
            Self::MobileDevelopment => "mobile-development",
            Self::GameDevelopment => "game-development",
            Self::MachineLearning => "machine-learning",
            Self::Devops => "devops",
            Self::Algorithms => "algorithms",
            Self::Databases => "databases",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CourseLanguage {
    Javascript,
    Typescript,
    Python,
    Java,
    Csharp,
    Cpp,
    Go,
    Rust,
    Html,
    Css,
    Sql,
    Other,
}

impl CourseLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Javascript => "javascript",
            Self::Typescript => "typescript",
            Self::Python => "python",
            Self::Java => "java",
            Self::Csharp => "csharp",
            Self::Cpp => "cpp",
            Self::Go => "go",
            Self::Rust => "rust",
            Self::Html => "html",
            Self::Css => "css",
            Self::Sql => "sql",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct SyllabusModule {
    pub title: String,
    pub description: String,
    pub topics: Vec<String>,
    pub estimated_hours: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Course {
    id: Uuid,
    title: String,
    description: String,
    category: String,
    difficulty: String,
    language: String,
    instructor_id: Option<Uuid>,
    thumbnail: String,
    duration_hours: i32,
    xp_reward: i32,
    #[schema(value_type = Vec<String>)]
    tags: Json<Vec<String>>,
    #[schema(value_type = Vec<SyllabusModule>)]
    syllabus: Json<Vec<SyllabusModule>>,
    #[schema(value_type = Vec<String>)]
    learning_objectives: Json<Vec<String>>,
    #[schema(value_type = Vec<String>)]
    prerequisites: Json<Vec<String>>,
    enrolled_students: i64,
    average_rating: f64,
    total_ratings: i64,
    is_published: bool,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
pub struct CourseCreate {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: CourseCategory,
    pub difficulty: Difficulty,
    pub language: CourseLanguage,
    #[serde(default)]
    pub thumbnail: String,
    pub duration_hours: Option<i32>,
    pub xp_reward: Option<i32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub syllabus: Vec<SyllabusModule>,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    pub is_published: Option<bool>,
    pub is_active: Option<bool>,
}

impl CourseCreate {
    pub fn validate(&self) -> Result<(), String> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(String::from("course title is required"));
        }
        if title.chars().count() > 200 {
            return Err(String::from("course title must be at most 200 characters"));
        }
        if self.duration_hours.is_some_and(|h| h < 0) {
            return Err(String::from("duration_hours cannot be negative"));
        }
        if self.xp_reward.is_some_and(|xp| xp < 0) {
            return Err(String::from("xp_reward cannot be negative"));
        }
        if self.syllabus.iter().any(|m| m.title.trim().is_empty()) {
            return Err(String::from("every syllabus module needs a title"));
        }
        Ok(())
    }
}

impl ResourceTyped for Course {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Course
    }
}

impl Course {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn instructor_id(&self) -> Option<Uuid> {
        self.instructor_id
    }

    pub fn xp_reward(&self) -> i32 {
        self.xp_reward
    }

    pub fn enrolled_students(&self) -> i64 {
        self.enrolled_students
    }

    pub fn average_rating(&self) -> f64 {
        self.average_rating
    }

    pub fn total_ratings(&self) -> i64 {
        self.total_ratings
    }

    pub fn is_published(&self) -> bool {
        self.is_published
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Published, active courses are public; drafts only reach their
    /// instructor and admins.
    pub fn is_visible_to(&self, actor: &AuthenticatedUser) -> bool {
        if self.is_published && self.is_active {
            return true;
        }
        actor.user_role() == UserRole::Admin || self.instructor_id == Some(actor.user_id())
    }
}

#[async_trait]
impl CrudRepository<Course, CourseCreate, Uuid> for Course {
    async fn create(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        data: CourseCreate,
    ) -> DatabaseResult<Self> {
        // system actors (CLI, bootstrap) own nothing
        let instructor_id = (!actor.is_system()).then(|| actor.user_id());

        let course = sqlx::query_as(
            r#"
            INSERT INTO courses (
                id, title, description, category, difficulty, language, instructor_id,
                thumbnail, duration_hours, xp_reward, tags, syllabus, learning_objectives,
                prerequisites, is_published, is_active
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.title.trim())
        .bind(&data.description)
        .bind(data.category.as_str())
        .bind(data.difficulty.as_str())
        .bind(data.language.as_str())
        .bind(instructor_id)
        .bind(&data.thumbnail)
        .bind(data.duration_hours.unwrap_or(0))
        .bind(data.xp_reward.unwrap_or(100))
        .bind(Json(&data.tags))
        .bind(Json(&data.syllabus))
        .bind(Json(&data.learning_objectives))
        .bind(Json(&data.prerequisites))
        .bind(data.is_published.unwrap_or(false))
        .bind(data.is_active.unwrap_or(true))
        .fetch_one(mm.executor())
        .await?;

        Ok(course)
    }

    async fn update(
        self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: CourseCreate,
    ) -> DatabaseResult<Self> {
        let course = sqlx::query_as(
            r#"
            UPDATE courses SET
                title = $1, description = $2, category = $3, difficulty = $4, language = $5,
                thumbnail = $6, duration_hours = $7, xp_reward = $8, tags = $9, syllabus = $10,
                learning_objectives = $11, prerequisites = $12, is_published = $13,
                is_active = $14, updated_at = now()
            WHERE id = $15
            RETURNING *
            "#,
        )
        .bind(data.title.trim())
        .bind(&data.description)
        .bind(data.category.as_str())
        .bind(data.difficulty.as_str())
        .bind(data.language.as_str())
        .bind(&data.thumbnail)
        .bind(data.duration_hours.unwrap_or(self.duration_hours))
        .bind(data.xp_reward.unwrap_or(self.xp_reward))
        .bind(Json(&data.tags))
        .bind(Json(&data.syllabus))
        .bind(Json(&data.learning_objectives))
        .bind(Json(&data.prerequisites))
        .bind(data.is_published.unwrap_or(self.is_published))
        .bind(data.is_active.unwrap_or(self.is_active))
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;

        Ok(course)
    }

    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM courses WHERE id = $1")
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
        let result = sqlx::query_as("SELECT * FROM courses WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    async fn list(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<Self>> {
        let filter = CourseFilter::default();
        Self::search(mm, actor, &filter, limit, offset).await
    }

    async fn count(mm: &ModelManager, actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        Self::count_filtered(mm, actor, &CourseFilter::default()).await
    }
}

impl_paginatable_for!(Course, CourseCreate, Uuid);

#[async_trait]
impl HasOwner for Course {
    type OwnerId = Option<Uuid>;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.instructor_id)
    }
}

// Listing

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CourseSort {
    #[default]
    Newest,
    Rating,
    Popular,
    Title,
}

impl CourseSort {
    /// Every ordering ends in `id` so pages are stable.
    fn order_by(&self) -> &'static str {
        match self {
            Self::Newest => " ORDER BY created_at DESC, id",
            Self::Rating => " ORDER BY average_rating DESC, total_ratings DESC, id",
            Self::Popular => " ORDER BY enrolled_students DESC, id",
            Self::Title => " ORDER BY title ASC, id",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CourseFilter {
    pub category: Option<CourseCategory>,
    pub difficulty: Option<Difficulty>,
    pub language: Option<CourseLanguage>,
    /// Case-insensitive match on title or description.
    pub search: Option<String>,
    #[serde(default)]
    pub sort: CourseSort,
}

fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, actor: &AuthenticatedUser, filter: &CourseFilter) {
    qb.push(" WHERE TRUE");

    match actor.user_role() {
        UserRole::Admin => {}
        UserRole::Instructor => {
            qb.push(" AND ((is_published AND is_active) OR instructor_id = ")
                .push_bind(actor.user_id())
                .push(")");
        }
        _ => {
            qb.push(" AND is_published AND is_active");
        }
    }

    if let Some(category) = filter.category {
        qb.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(difficulty) = filter.difficulty {
        qb.push(" AND difficulty = ").push_bind(difficulty.as_str());
    }
    if let Some(language) = filter.language {
        qb.push(" AND language = ").push_bind(language.as_str());
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", escape_like(search));
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

impl Course {
    pub async fn search(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        filter: &CourseFilter,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<Self>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM courses");
        push_filters(&mut qb, actor, filter);
        qb.push(filter.sort.order_by());
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(offset);

        let result = qb.build_query_as::<Self>().fetch_all(mm.executor()).await?;
        Ok(result)
    }

    pub async fn count_filtered(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        filter: &CourseFilter,
    ) -> DatabaseResult<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM courses");
        push_filters(&mut qb, actor, filter);

        let result = qb.build_query_scalar::<i64>().fetch_one(mm.executor()).await?;
        Ok(result)
    }

    pub async fn search_page(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        filter: &CourseFilter,
        request: PageRequest,
    ) -> DatabaseResult<Page<Self>> {
        let (items, total) = tokio::try_join!(
            Self::search(mm, actor, filter, request.limit(), request.offset()),
            Self::count_filtered(mm, actor, filter),
        )?;
        Ok(Page::new(items, total, request))
    }

    pub async fn find_by_title(mm: &ModelManager, title: &str) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM courses WHERE title = $1 ORDER BY created_at, id LIMIT 1")
            .bind(title)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn instructor_of(mm: &ModelManager, course_id: Uuid) -> DatabaseResult<Option<Uuid>> {
        let result: Option<Option<Uuid>> =
            sqlx::query_scalar("SELECT instructor_id FROM courses WHERE id = $1")
                .bind(course_id)
                .fetch_optional(mm.executor())
                .await?;
        Ok(result.flatten())
    }

    pub async fn set_published(
        mm: &ModelManager,
        id: Uuid,
        published: bool,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as(
            "UPDATE courses SET is_published = $1, updated_at = now() WHERE id = $2 RETURNING *",
        )
        .bind(published)
        .bind(id)
        .fetch_optional(mm.executor())
        .await?;
        Ok(result)
    }

    /// Rewrites one course's `enrolled_students` from its progress rows.
    pub(crate) async fn recount_enrollment(
        conn: &mut PgConnection,
        course_id: Uuid,
    ) -> DatabaseResult<()> {
        sqlx::query(
            r#"
            UPDATE courses SET enrolled_students =
                (SELECT COUNT(*) FROM user_progress WHERE course_id = $1)
            WHERE id = $1
            "#,
        )
        .bind(course_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Recounts enrolments from progress rows. Returns the number of courses changed.
    pub async fn resync_enrollment_counts(mm: &ModelManager) -> DatabaseResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE courses c SET enrolled_students = sub.cnt
            FROM (
                SELECT c2.id, COUNT(up.id) AS cnt
                FROM courses c2
                LEFT JOIN user_progress up ON up.course_id = c2.id
                GROUP BY c2.id
            ) sub
            WHERE c.id = sub.id AND c.enrolled_students <> sub.cnt
            "#,
        )
        .execute(mm.executor())
        .await?;
        Ok(result.rows_affected())
    }
}

// Stats

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CourseStats {
    pub course_id: Uuid,
    pub enrolled_students: i64,
    pub completed_students: i64,
    /// Percentage of enrolled students who completed the course.
    pub completion_rate: f64,
    pub average_rating: f64,
    pub total_ratings: i64,
    pub lessons: i64,
    pub quizzes: i64,
    pub quiz_attempts: i64,
    /// Percentage of quiz attempts that passed.
    pub quiz_pass_rate: f64,
    pub average_quiz_score: f64,
}

impl CourseStats {
    pub async fn collect(mm: &ModelManager, course: &Course) -> DatabaseResult<Self> {
        use crate::game::stats::{percentage, round1};

        let id = course.id();
        let executor = mm.executor();

        let lessons = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM lessons WHERE course_id = $1")
            .bind(id)
            .fetch_one(executor);
        let quizzes = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM quizzes WHERE course_id = $1")
            .bind(id)
            .fetch_one(executor);
        let progress = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_completed) FROM user_progress WHERE course_id = $1",
        )
        .bind(id)
        .fetch_one(executor);
        let attempts = sqlx::query_as::<_, (i64, i64, f64)>(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE a.passed), COALESCE(AVG(a.score), 0)::float8
            FROM quiz_attempts a
            JOIN quizzes q ON q.id = a.quiz_id
            WHERE q.course_id = $1
            "#,
        )
        .bind(id)
        .fetch_one(executor);

        let (lessons, quizzes, (enrolled, completed), (attempts, passed, avg_score)) =
            tokio::try_join!(lessons, quizzes, progress, attempts)?;

        Ok(Self {
            course_id: id,
            enrolled_students: course.enrolled_students().max(enrolled),
            completed_students: completed,
            completion_rate: percentage(completed, enrolled),
            average_rating: course.average_rating(),
            total_ratings: course.total_ratings(),
            lessons,
            quizzes,
            quiz_attempts: attempts,
            quiz_pass_rate: percentage(passed, attempts),
            average_quiz_score: round1(avg_score),
        })
    }
}
