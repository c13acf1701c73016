use serde::Serialize;

use crate::model::entity::{Lesson, LessonNavigation};

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct LessonResponse {
    #[serde(flatten)]
    pub lesson: Lesson,
    pub navigation: LessonNavigation,
}
