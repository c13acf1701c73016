//! XP, levels, badges, quiz grading and the aggregates built on them.
//!
//! Everything here is pure: entities and handlers feed data in and persist
//! what comes out.

mod badges;
pub use badges::{Badge, merge_badges};

mod grading;
pub use grading::{Grade, QuestionResult, SubmittedAnswer, grade};

mod level;
pub use level::{LevelProgress, level_for_xp, xp_for_level};

mod progress;
pub use progress::{CompletedLesson, LessonCompletion, covers_all, record_completion};

pub mod stats;
