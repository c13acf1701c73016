use serde::{Deserialize, Serialize};

use crate::model::entity::UserProgress;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ReviewBody {
    pub rating: i16,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct EnrollResponse {
    pub progress: UserProgress,
    /// False when the caller was already enrolled.
    pub newly_enrolled: bool,
}
