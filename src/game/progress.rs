use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CompletedLesson {
    pub lesson_id: Uuid,
    /// Best score seen so far.
    pub score: i32,
    /// Accumulated seconds over every attempt.
    pub time_spent: i64,
    pub attempts: i32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LessonCompletion {
    /// First time this lesson is completed, XP should be granted.
    First,
    /// Already completed before; only score/time/attempts moved.
    Repeat,
}

/// Records one completion of `lesson_id`. A lesson never appears twice in
/// `completed`: repeats keep the best score and bump `attempts`.
pub fn record_completion(
    completed: &mut Vec<CompletedLesson>,
    lesson_id: Uuid,
    score: i32,
    time_spent: i64,
    now: DateTime<Utc>,
) -> LessonCompletion {
    let time_spent = time_spent.max(0);

    if let Some(entry) = completed.iter_mut().find(|c| c.lesson_id == lesson_id) {
        entry.score = entry.score.max(score);
        entry.time_spent += time_spent;
        entry.attempts += 1;
        return LessonCompletion::Repeat;
    }

    completed.push(CompletedLesson {
        lesson_id,
        score,
        time_spent,
        attempts: 1,
        completed_at: now,
    });
    LessonCompletion::First
}

/// True when every lesson in `lesson_ids` has a completion entry. A course
/// without lessons is never complete.
pub fn covers_all(completed: &[CompletedLesson], lesson_ids: &[Uuid]) -> bool {
    !lesson_ids.is_empty()
        && lesson_ids
            .iter()
            .all(|id| completed.iter().any(|c| c.lesson_id == *id))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_completion_test() {
        let mut completed = Vec::new();
        let lesson = Uuid::new_v4();
        let outcome = record_completion(&mut completed, lesson, 80, 120, Utc::now());

        assert_eq!(outcome, LessonCompletion::First);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].attempts, 1);
        assert_eq!(completed[0].score, 80);
    }

    #[test]
    fn repeat_keeps_max_score_and_counts_attempts_test() {
        let mut completed = Vec::new();
        let lesson = Uuid::new_v4();
        let first_at = Utc::now();
        record_completion(&mut completed, lesson, 80, 120, first_at);

        let outcome = record_completion(&mut completed, lesson, 60, 30, Utc::now());
        assert_eq!(outcome, LessonCompletion::Repeat);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].score, 80);
        assert_eq!(completed[0].attempts, 2);
        assert_eq!(completed[0].time_spent, 150);
        assert_eq!(completed[0].completed_at, first_at);

        record_completion(&mut completed, lesson, 95, -10, Utc::now());
        assert_eq!(completed[0].score, 95);
        assert_eq!(completed[0].attempts, 3);
        assert_eq!(completed[0].time_spent, 150);
    }

    #[test]
    fn different_lessons_are_separate_entries_test() {
        let mut completed = Vec::new();
        record_completion(&mut completed, Uuid::new_v4(), 100, 10, Utc::now());
        record_completion(&mut completed, Uuid::new_v4(), 100, 10, Utc::now());
        assert_eq!(completed.len(), 2);
    }

    #[test]
    fn covers_all_test() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut completed = Vec::new();
        assert!(!covers_all(&completed, &[]));

        record_completion(&mut completed, a, 100, 0, Utc::now());
        assert!(!covers_all(&completed, &[a, b]));
        assert!(covers_all(&completed, &[a]));

        record_completion(&mut completed, b, 50, 0, Utc::now());
        assert!(covers_all(&completed, &[b, a]));
        assert!(!covers_all(&completed, &[]));
    }
}
