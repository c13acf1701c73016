use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::entity::Question;

/// One answered question as sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SubmittedAnswer {
    pub question_id: Uuid,
    /// Indexes into the question's option list.
    #[serde(default)]
    pub selected_options: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QuestionResult {
    pub question_id: Uuid,
    pub selected_options: Vec<usize>,
    pub correct_options: Vec<usize>,
    pub is_correct: bool,
    pub points_earned: i32,
    pub points_possible: i32,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Grade {
    pub earned_points: i32,
    pub total_points: i32,
    pub correct_count: i32,
    /// `round(earned / total * 100)`, zero for a quiz without points.
    pub score: i32,
    pub passed: bool,
    pub results: Vec<QuestionResult>,
}

/// A question counts as correct only when the selected set equals the set of
/// correct options. Unknown question ids are ignored; the first answer given
/// for a question wins.
pub fn grade(questions: &[Question], answers: &[SubmittedAnswer], passing_score: i32) -> Grade {
    let mut by_question: HashMap<Uuid, &SubmittedAnswer> = HashMap::with_capacity(answers.len());
    for answer in answers {
        by_question.entry(answer.question_id).or_insert(answer);
    }

    let mut earned_points: i32 = 0;
    let mut total_points: i32 = 0;
    let mut correct_count = 0;
    let mut results = Vec::with_capacity(questions.len());

    for question in questions {
        let correct: BTreeSet<usize> = question.correct_options().collect();
        let selected: BTreeSet<usize> = by_question
            .get(&question.id)
            .map(|a| a.selected_options.iter().copied().collect())
            .unwrap_or_default();

        let is_correct = !selected.is_empty() && selected == correct;
        let points_earned = if is_correct { question.points } else { 0 };

        total_points = total_points.saturating_add(question.points.max(0));
        earned_points = earned_points.saturating_add(points_earned.max(0));
        if is_correct {
            correct_count += 1;
        }

        results.push(QuestionResult {
            question_id: question.id,
            selected_options: selected.into_iter().collect(),
            correct_options: correct.into_iter().collect(),
            is_correct,
            points_earned,
            points_possible: question.points,
            explanation: question.explanation.clone(),
        });
    }

    let score = score_percent(earned_points, total_points);

    Grade {
        earned_points,
        total_points,
        correct_count,
        score,
        passed: score >= passing_score,
        results,
    }
}

fn score_percent(earned: i32, total: i32) -> i32 {
    if total <= 0 {
        return 0;
    }
    (earned as f64 / total as f64 * 100.0).round() as i32
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::entity::QuestionOption;

    fn question(points: i32, correct: &[usize], options: usize) -> Question {
        Question {
            id: Uuid::new_v4(),
            text: String::from("?"),
            options: (0..options)
                .map(|i| QuestionOption {
                    text: format!("option {}", i),
                    is_correct: correct.contains(&i),
                })
                .collect(),
            points,
            explanation: String::from("because"),
        }
    }

    fn answer(q: &Question, selected: &[usize]) -> SubmittedAnswer {
        SubmittedAnswer {
            question_id: q.id,
            selected_options: selected.to_vec(),
        }
    }

    #[test]
    fn grade_huge_points_do_not_overflow_test() {
        let qs = vec![question(i32::MAX, &[0], 2), question(1, &[0], 2)];
        let answers = vec![answer(&qs[0], &[0])];
        let grade = grade(&qs, &answers, 70);

        assert_eq!(grade.total_points, i32::MAX);
        assert_eq!(grade.earned_points, i32::MAX);
        assert!((0..=100).contains(&grade.score));
    }

    #[test]
    fn grade_all_correct_test() {
        let qs = vec![question(1, &[0], 3), question(2, &[2], 3)];
        let answers = vec![answer(&qs[0], &[0]), answer(&qs[1], &[2])];

        let grade = grade(&qs, &answers, 70);
        assert_eq!(grade.earned_points, 3);
        assert_eq!(grade.total_points, 3);
        assert_eq!(grade.score, 100);
        assert!(grade.passed);
        assert_eq!(grade.correct_count, 2);
    }

    #[test]
    fn grade_weighted_rounding_test() {
        // 1 of 3 points: 33.33 -> 33
        let qs = vec![question(1, &[0], 2), question(2, &[1], 2)];
        let answers = vec![answer(&qs[0], &[0]), answer(&qs[1], &[0])];
        let g = grade(&qs, &answers, 70);
        assert_eq!(g.score, 33);
        assert!(!g.passed);

        // 2 of 3 points: 66.67 -> 67
        let answers = vec![answer(&qs[0], &[1]), answer(&qs[1], &[1])];
        let g = grade(&qs, &answers, 67);
        assert_eq!(g.score, 67);
        assert!(g.passed, "score equal to the passing score passes");
    }

    #[test]
    fn grade_multi_select_needs_exact_set_test() {
        let qs = vec![question(4, &[0, 2], 4)];

        let partial = grade(&qs, &[answer(&qs[0], &[0])], 50);
        assert_eq!(partial.earned_points, 0);

        let extra = grade(&qs, &[answer(&qs[0], &[0, 1, 2])], 50);
        assert_eq!(extra.earned_points, 0);

        let exact = grade(&qs, &[answer(&qs[0], &[2, 0, 2])], 50);
        assert_eq!(exact.earned_points, 4);
        assert_eq!(exact.results[0].selected_options, vec![0, 2]);
    }

    #[test]
    fn grade_unanswered_and_unknown_test() {
        let qs = vec![question(1, &[0], 2), question(1, &[1], 2)];
        let stray = SubmittedAnswer {
            question_id: Uuid::new_v4(),
            selected_options: vec![0],
        };

        let g = grade(&qs, &[answer(&qs[0], &[0]), stray], 50);
        assert_eq!(g.results.len(), 2);
        assert!(!g.results[1].is_correct);
        assert_eq!(g.score, 50);
        assert!(g.passed);
    }

    #[test]
    fn grade_first_answer_wins_test() {
        let qs = vec![question(1, &[0], 2)];
        let g = grade(&qs, &[answer(&qs[0], &[1]), answer(&qs[0], &[0])], 50);
        assert_eq!(g.earned_points, 0);
    }

    #[test]
    fn grade_empty_quiz_test() {
        let g = grade(&[], &[], 0);
        assert_eq!(g.score, 0);
        assert_eq!(g.total_points, 0);
        assert!(g.passed);
    }
}
