use serde::{Deserialize, Serialize};

use crate::{
    model::{ModelManager, error::DatabaseResult},
    web::AuthenticatedUser,
};

#[derive(Debug, Clone)]
pub enum ResourceType {
    User,
    Course,
    Review,
    Lesson,
    Quiz,
    QuizAttempt,
    UserProgress,
}

impl ResourceType {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Course => "Course",
            Self::Review => "Review",
            Self::Lesson => "Lesson",
            Self::Quiz => "Quiz",
            Self::QuizAttempt => "Quiz attempt",
            Self::UserProgress => "Progress",
        }
    }
}

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// `page`/`limit` resolved into a window over an ordered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: i64,
    limit: i64,
}

impl PageRequest {
    /// `page` is 1-based and at least 1; `limit` is clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        let pages = if total <= 0 {
            0
        } else {
            (total + request.limit() - 1) / request.limit()
        };

        Self {
            items,
            total,
            page: request.page(),
            limit: request.limit(),
            pages,
        }
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            pages: self.pages,
        }
    }
}

pub trait ResourceTyped {
    fn get_resource_type() -> ResourceType;
}

#[async_trait::async_trait]
pub trait CrudRepository<T, CreateUpdate, V>
where
    T: ResourceTyped,
    V: Clone + Copy,
{
    async fn create(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        data: CreateUpdate,
    ) -> DatabaseResult<T>;
    async fn update(
        self,
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        data: CreateUpdate,
    ) -> DatabaseResult<T>
    where
        Self: Sized;

    async fn delete(self, mm: &ModelManager, actor: &AuthenticatedUser) -> DatabaseResult<()>
    where
        Self: Sized;

    async fn find_by_id(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        id: V,
    ) -> DatabaseResult<Option<T>>;

    /// Rows in a stable total order, so consecutive windows never overlap.
    async fn list(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<T>>;
    async fn count(mm: &ModelManager, actor: &AuthenticatedUser) -> DatabaseResult<i64>;
}

#[async_trait::async_trait]
pub trait PaginatableRepository<T, CreateUpdate, V>
where
    T: ResourceTyped + CrudRepository<T, CreateUpdate, V>,
    V: Clone + Copy,
{
    async fn page(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        request: PageRequest,
    ) -> DatabaseResult<Page<T>>;
}

#[macro_export]
macro_rules! impl_paginatable_for {
    ($ent:ident, $ent_create:ident, $ent_id:ident) => {
        #[async_trait::async_trait]
        impl $crate::model::PaginatableRepository<$ent, $ent_create, $ent_id> for $ent {
            async fn page(
                mm: &ModelManager,
                actor: &AuthenticatedUser,
                request: $crate::model::PageRequest,
            ) -> DatabaseResult<$crate::model::Page<$ent>> {
                let (items, count) = tokio::try_join!(
                    $ent::list(mm, actor, request.limit(), request.offset()),
                    $ent::count(mm, actor),
                )?;
                Ok($crate::model::Page::new(items, count, request))
            }
        }
    };
}
