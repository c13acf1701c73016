use serde::{Deserialize, Serialize};

use crate::game::stats::percentage;
use crate::model::entity::{UserProgress, XpUpdate};

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct CompleteLessonBody {
    /// 0..=100, defaults to 100.
    pub score: Option<i32>,
    /// Seconds, defaults to 0.
    pub time_spent: Option<i64>,
}

impl CompleteLessonBody {
    pub fn validate(&self) -> Result<(), String> {
        if self.score.is_some_and(|s| !(0..=100).contains(&s)) {
            return Err(String::from("score must be between 0 and 100"));
        }
        if self.time_spent.is_some_and(|t| t < 0) {
            return Err(String::from("time_spent cannot be negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProgressResponse {
    #[serde(flatten)]
    pub progress: UserProgress,
    pub total_lessons: i64,
    /// Completed published lessons over all published lessons, one decimal.
    pub completion_percentage: f64,
}

impl ProgressResponse {
    /// `published` are the lesson ids that count toward completion.
    pub fn new(progress: UserProgress, published: &[uuid::Uuid]) -> Self {
        let done = published
            .iter()
            .filter(|id| {
                progress
                    .completed_lessons()
                    .iter()
                    .any(|c| c.lesson_id == **id)
            })
            .count() as i64;
        let total = published.len() as i64;

        Self {
            completion_percentage: percentage(done, total),
            total_lessons: total,
            progress,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CompletionResponse {
    pub progress: ProgressResponse,
    pub first_completion: bool,
    pub course_completed: bool,
    pub xp_earned: i64,
    pub level_up: bool,
    pub xp: Option<XpUpdate>,
}
