use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::SubmittedAnswer;
use crate::model::entity::{Question, Quiz, QuizAttempt, XpUpdate};

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct OptionView {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct QuestionView {
    pub id: Uuid,
    pub text: String,
    pub options: Vec<OptionView>,
    pub points: i32,
    /// Number of options to pick; enough for the client to render checkboxes.
    pub select_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl QuestionView {
    fn new(question: &Question, reveal: bool) -> Self {
        Self {
            id: question.id,
            text: question.text.clone(),
            options: question
                .options
                .iter()
                .map(|o| OptionView {
                    text: o.text.clone(),
                    is_correct: reveal.then_some(o.is_correct),
                })
                .collect(),
            points: question.points,
            select_count: question.correct_options().count(),
            explanation: reveal.then(|| question.explanation.clone()),
        }
    }
}

/// A quiz as served to clients; answers are only included for its managers.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct QuizView {
    pub id: Uuid,
    pub course_id: Uuid,
    pub lesson_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub questions: Vec<QuestionView>,
    pub total_points: i32,
    pub passing_score: i32,
    pub time_limit_minutes: Option<i32>,
    pub xp_reward: i32,
    pub max_attempts: Option<i32>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

impl QuizView {
    pub fn new(quiz: &Quiz, reveal: bool) -> Self {
        Self {
            id: quiz.id(),
            course_id: quiz.course_id(),
            lesson_id: quiz.lesson_id(),
            title: quiz.title().to_string(),
            description: quiz.description().to_string(),
            questions: quiz
                .questions()
                .iter()
                .map(|q| QuestionView::new(q, reveal))
                .collect(),
            total_points: quiz.total_points(),
            passing_score: quiz.passing_score(),
            time_limit_minutes: quiz.time_limit_minutes(),
            xp_reward: quiz.xp_reward(),
            max_attempts: quiz.max_attempts(),
            is_published: quiz.is_published(),
            created_at: *quiz.created_at(),
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SubmitBody {
    pub answers: Vec<SubmittedAnswer>,
    /// Seconds spent on the attempt.
    #[serde(default)]
    pub time_spent: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SubmitResponse {
    pub attempt: QuizAttempt,
    pub level_up: bool,
    /// Present when the submission credited XP or badges.
    pub xp: Option<XpUpdate>,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::entity::QuestionOption;

    #[test]
    fn question_view_hides_answers_test() {
        let question = Question {
            id: Uuid::new_v4(),
            text: String::from("2 + 2"),
            options: vec![
                QuestionOption {
                    text: String::from("4"),
                    is_correct: true,
                },
                QuestionOption {
                    text: String::from("5"),
                    is_correct: false,
                },
            ],
            points: 2,
            explanation: String::from("arithmetic"),
        };

        let hidden = serde_json::to_value(QuestionView::new(&question, false)).unwrap();
        assert!(hidden["options"][0].get("is_correct").is_none());
        assert!(hidden.get("explanation").is_none());
        assert_eq!(hidden["select_count"], 1);

        let shown = serde_json::to_value(QuestionView::new(&question, true)).unwrap();
        assert_eq!(shown["options"][0]["is_correct"], true);
        assert_eq!(shown["explanation"], "arithmetic");
    }
}
