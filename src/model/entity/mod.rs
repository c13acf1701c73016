mod user;
pub use user::{UserEntity, UserEntityCreateUpdate, UserPreferences, XpUpdate};

mod course;
pub use course::{
    Course, CourseCategory, CourseCreate, CourseFilter, CourseLanguage, CourseSort, CourseStats,
    Difficulty, SyllabusModule,
};

mod review;
pub use review::{Review, ReviewCreate};

mod lesson;
pub use lesson::{
    CodeBlock, InteractiveStep, Lesson, LessonContent, LessonCreate, LessonNavigation,
    LessonSummary, LessonType,
};

mod quiz;
pub use quiz::{Question, QuestionOption, Quiz, QuizCreate};

mod quiz_attempt;
pub use quiz_attempt::{QuizAttempt, QuizAttemptCreate, QuizStats, Submission};

mod user_progress;
pub use user_progress::{CompletionOutcome, UserProgress, UserProgressCreate};

