use clap::{Parser, Subcommand, ValueEnum};
use learnquest::error::{AppError, AppResult};
use learnquest::model::entity::{
    Course, CourseCreate, Lesson, LessonContent, LessonCreate, LessonType, Quiz, QuizCreate,
    Review, UserEntity, UserEntityCreateUpdate,
};
use learnquest::model::{CrudRepository, DbConnection, ModelManager};
use learnquest::web::{AuthenticatedUser, UserRole};
use serde_json::json;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(about = "CLI tool for filling the LearnQuest DB", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserCommands,
    },

    /// Manage courses
    Course {
        #[command(subcommand)]
        action: CourseCommands,
    },

    /// Manage lessons
    Lesson {
        #[command(subcommand)]
        action: LessonCommands,
    },

    /// Manage quizzes
    Quiz {
        #[command(subcommand)]
        action: QuizCommands,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum RoleArg {
    Student,
    Instructor,
    Admin,
}

impl From<RoleArg> for UserRole {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Student => Self::Student,
            RoleArg::Instructor => Self::Instructor,
            RoleArg::Admin => Self::Admin,
        }
    }
}

/// User management
#[derive(Subcommand, Debug)]
pub enum UserCommands {
    Add {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, value_enum, default_value = "student")]
        role: RoleArg,
    },
    /// Change the role of an existing user
    SetRole {
        #[arg(long)]
        username: String,
        #[arg(long, value_enum)]
        role: RoleArg,
    },
}

/// Course management
#[derive(Subcommand, Debug)]
pub enum CourseCommands {
    Add {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "other")]
        category: String,
        #[arg(long, default_value = "beginner")]
        difficulty: String,
        #[arg(long, default_value = "other")]
        language: String,
        #[arg(long)]
        xp_reward: Option<i32>,
        /// Username of the instructor owning the course
        #[arg(long)]
        instructor: Option<String>,
        #[arg(long, default_value_t = false)]
        publish: bool,
    },
    Publish {
        #[arg(long)]
        title: String,
        /// Take the course back to draft instead
        #[arg(long, default_value_t = false)]
        unpublish: bool,
    },
    /// Recount enrolments and recompute every rating aggregate
    Resync,
}

/// Lesson management
#[derive(Subcommand, Debug)]
pub enum LessonCommands {
    Add {
        /// Course title to attach the lesson to
        #[arg(long)]
        course_title: String,
        #[arg(long)]
        title: String,
        /// Path to a Markdown file with lesson content
        #[arg(long)]
        file: String,
        /// Appended after the last lesson when missing
        #[arg(long)]
        order_index: Option<i32>,
        #[arg(long)]
        xp_reward: Option<i32>,
        #[arg(long, default_value_t = false)]
        draft: bool,
    },
}

/// Quiz management
#[derive(Subcommand, Debug)]
pub enum QuizCommands {
    /// Import a quiz from a JSON file; `course_id` is filled in from the course title
    Import {
        #[arg(long)]
        course_title: String,
        #[arg(long)]
        file: String,
    },
}

async fn course_by_title(mm: &ModelManager, title: &str) -> AppResult<Course> {
    Course::find_by_title(mm, title)
        .await?
        .ok_or_else(|| AppError::InvalidInput(format!("no course titled `{}`", title)))
}

async fn user_by_name(
    mm: &ModelManager,
    actor: &AuthenticatedUser,
    username: &str,
) -> AppResult<UserEntity> {
    UserEntity::find_by_username(mm, actor, username)
        .await?
        .ok_or_else(|| AppError::InvalidInput(format!("no user named `{}`", username)))
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let _ = dotenvy::dotenv();
    let args = Cli::parse();

    let url = std::env::var("DATABASE_URL")
        .map_err(|_| AppError::InvalidInput(String::from("DATABASE_URL is not set")))?;
    let mm = ModelManager::new(DbConnection::connect(&url)?);
    let system = AuthenticatedUser::admin();

    match args.command {
        Commands::User { action } => match action {
            UserCommands::Add { username, email, password, role } => {
                let user = UserEntity::create_with_role(
                    &mm,
                    &system,
                    UserEntityCreateUpdate {
                        username,
                        email,
                        password_hash: learnquest::auth::hash_password(&password)?,
                        preferences: None,
                    },
                    role.into(),
                )
                .await?;
                println!("User created: {} ({})", user.username(), user.id());
            }

            UserCommands::SetRole { username, role } => {
                let user = user_by_name(&mm, &system, &username).await?;
                let role: UserRole = role.into();
                UserEntity::set_role(&mm, user.id(), role).await?;
                println!("User {} is now {}", username, role);
            }
        },

        Commands::Course { action } => match action {
            CourseCommands::Add {
                title,
                description,
                category,
                difficulty,
                language,
                xp_reward,
                instructor,
                publish,
            } => {
                let data: CourseCreate = serde_json::from_value(json!({
                    "title": title,
                    "description": description,
                    "category": category,
                    "difficulty": difficulty,
                    "language": language,
                    "xp_reward": xp_reward,
                    "is_published": publish,
                }))
                .map_err(|e| AppError::InvalidInput(e.to_string()))?;
                data.validate().map_err(AppError::InvalidInput)?;

                // the creating actor becomes the instructor
                let owner = match instructor {
                    Some(name) => {
                        let user = user_by_name(&mm, &system, &name).await?;
                        course_owner(user.id(), user.username(), user.role())?
                    }
                    None => system.clone(),
                };

                let course = Course::create(&mm, &owner, data).await?;
                println!("Course created: {} ({})", course.title(), course.id());
            }

            CourseCommands::Publish { title, unpublish } => {
                let course = course_by_title(&mm, &title).await?;
                Course::set_published(&mm, course.id(), !unpublish).await?;
                let state = if unpublish { "draft" } else { "published" };
                println!("Course {} is now {}", title, state);
            }

            CourseCommands::Resync => {
                let enrolments = Course::resync_enrollment_counts(&mm).await?;
                let ratings = Review::recompute_all(&mm).await?;
                println!(
                    "Fixed {} enrolment counts, recomputed ratings of {} courses",
                    enrolments, ratings
                );
            }
        },

        Commands::Lesson { action } => match action {
            LessonCommands::Add { course_title, title, file, order_index, xp_reward, draft } => {
                let course = course_by_title(&mm, &course_title).await?;
                let text = std::fs::read_to_string(file)?;

                let data = LessonCreate {
                    course_id: course.id(),
                    title,
                    description: String::new(),
                    lesson_type: LessonType::Theory,
                    order_index,
                    content: LessonContent { text, ..Default::default() },
                    duration_minutes: None,
                    xp_reward,
                    is_published: Some(!draft),
                };
                data.validate().map_err(AppError::InvalidInput)?;

                let lesson = Lesson::create(&mm, &system, data).await?;
                println!(
                    "Lesson created: {} at position {} ({})",
                    lesson.title(),
                    lesson.order_index(),
                    lesson.id()
                );
            }
        },

        Commands::Quiz { action } => match action {
            QuizCommands::Import { course_title, file } => {
                let course = course_by_title(&mm, &course_title).await?;
                let raw = std::fs::read_to_string(file)?;

                let mut value: serde_json::Value =
                    serde_json::from_str(&raw).map_err(|e| AppError::InvalidInput(e.to_string()))?;
                let Some(object) = value.as_object_mut() else {
                    return Err(AppError::InvalidInput(String::from(
                        "quiz file must hold a JSON object",
                    )));
                };
                object.insert(String::from("course_id"), json!(course.id()));

                let data: QuizCreate = serde_json::from_value(value)
                    .map_err(|e| AppError::InvalidInput(e.to_string()))?;
                data.validate().map_err(AppError::InvalidInput)?;
                if let Some(lesson_id) = data.lesson_id {
                    check_lesson(&mm, &system, lesson_id, course.id()).await?;
                }

                let quiz = Quiz::create(&mm, &system, data).await?;
                println!(
                    "Quiz imported: {} with {} questions ({})",
                    quiz.title(),
                    quiz.questions().len(),
                    quiz.id()
                );
            }
        },
    }

    Ok(())
}

/// Only instructors and admins may own a course.
fn course_owner(id: Uuid, username: &str, role: UserRole) -> AppResult<AuthenticatedUser> {
    let owner = AuthenticatedUser::new(id, role);
    if !owner.can_author() {
        return Err(AppError::InvalidInput(format!(
            "`{}` is a {} and cannot own a course",
            username, role
        )));
    }
    Ok(owner)
}

async fn check_lesson(
    mm: &ModelManager,
    actor: &AuthenticatedUser,
    lesson_id: Uuid,
    course_id: Uuid,
) -> AppResult<()> {
    match Lesson::find_by_id(mm, actor, lesson_id).await? {
        Some(lesson) if lesson.course_id() == course_id => Ok(()),
        _ => Err(AppError::InvalidInput(format!(
            "lesson {} does not belong to the course",
            lesson_id
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn course_owner_requires_author_role_test() {
        let id = Uuid::new_v4();
        assert!(course_owner(id, "teacher", UserRole::Instructor).is_ok());
        assert!(course_owner(id, "root", UserRole::Admin).is_ok());

        let err = course_owner(id, "pupil", UserRole::Student).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(msg) if msg.contains("pupil")));
    }
}
