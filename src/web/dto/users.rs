use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::LevelProgress;
use crate::model::entity::{UserEntity, UserPreferences};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterBody {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterBody {
    pub fn validate(&self) -> Result<(), String> {
        validate_username(&self.username)?;
        validate_email(&self.email)?;
        validate_password(&self.password)
    }
}

pub fn validate_username(username: &str) -> Result<(), String> {
    let username = username.trim();
    let len = username.chars().count();
    if !(3..=30).contains(&len) {
        return Err(String::from("username must be 3 to 30 characters long"));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(String::from(
            "username may only contain letters, digits, '_' and '-'",
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(String::from("a valid email is required")),
    }
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < 6 {
        return Err(String::from("password must be at least 6 characters long"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginBody {
    /// Username or email.
    #[serde(alias = "username", alias = "email")]
    pub login: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct UpdateUserBody {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub preferences: Option<UserPreferences>,
}

impl UpdateUserBody {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(username) = &self.username {
            validate_username(username)?;
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        if let Some(password) = &self.password {
            validate_password(password)?;
        }
        Ok(())
    }
}

/// What the user themselves (or an admin) sees.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
    pub total_xp: i64,
    pub level: i32,
    pub level_progress: LevelProgress,
    pub badges: Vec<String>,
    pub preferences: UserPreferences,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&UserEntity> for UserResponse {
    fn from(user: &UserEntity) -> Self {
        Self {
            id: user.id(),
            username: user.username().to_string(),
            email: user.email().to_string(),
            role: user.role().to_string(),
            total_xp: user.total_xp(),
            level: user.level(),
            level_progress: LevelProgress::from_xp(user.total_xp()),
            badges: user.badges().to_vec(),
            preferences: user.preferences().clone(),
            is_active: user.is_active(),
            created_at: *user.created_at(),
        }
    }
}

/// What everyone else sees.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PublicProfile {
    pub id: Uuid,
    pub username: String,
    pub role: String,
    pub total_xp: i64,
    pub level: i32,
    pub badges: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&UserEntity> for PublicProfile {
    fn from(user: &UserEntity) -> Self {
        Self {
            id: user.id(),
            username: user.username().to_string(),
            role: user.role().to_string(),
            total_xp: user.total_xp(),
            level: user.level(),
            badges: user.badges().to_vec(),
            created_at: *user.created_at(),
        }
    }
}

/// Owners and admins get the full record, everyone else the public profile.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(untagged)]
pub enum UserView {
    Full(UserResponse),
    Public(PublicProfile),
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UserStats {
    pub user_id: Uuid,
    pub level_progress: LevelProgress,
    pub badges: Vec<String>,
    pub enrolled_courses: i64,
    pub completed_courses: i64,
    pub completed_lessons: i64,
    /// Seconds.
    pub total_time_spent: i64,
    pub quiz_attempts: i64,
    pub quizzes_passed: i64,
    pub average_quiz_score: f64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub id: Uuid,
    pub username: String,
    pub total_xp: i64,
    pub level: i32,
    pub badges: usize,
}

impl LeaderboardEntry {
    pub fn ranked(users: &[UserEntity]) -> Vec<Self> {
        users
            .iter()
            .enumerate()
            .map(|(i, user)| Self {
                rank: i + 1,
                id: user.id(),
                username: user.username().to_string(),
                total_xp: user.total_xp(),
                level: user.level(),
                badges: user.badges().len(),
            })
            .collect()
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LeaderboardQuery {
    /// Defaults to 10, at most 100.
    pub limit: Option<i64>,
}
