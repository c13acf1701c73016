use serde::Serialize;

const XP_UNIT: u64 = 100;

/// `floor(sqrt(xp / 100)) + 1`. Negative XP counts as zero.
pub fn level_for_xp(xp: i64) -> i32 {
    let units = xp.max(0) as u64 / XP_UNIT;
    units.isqrt() as i32 + 1
}

/// Smallest XP total at which `level` is reached.
pub fn xp_for_level(level: i32) -> i64 {
    let steps = (level.max(1) - 1) as i64;
    XP_UNIT as i64 * steps * steps
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct LevelProgress {
    pub level: i32,
    pub total_xp: i64,
    pub current_level_xp: i64,
    pub next_level_xp: i64,
    pub xp_to_next_level: i64,
    /// How far between the two thresholds, 0..=100.
    pub percent: f64,
}

impl LevelProgress {
    pub fn from_xp(total_xp: i64) -> Self {
        let total_xp = total_xp.max(0);
        let level = level_for_xp(total_xp);
        let current_level_xp = xp_for_level(level);
        let next_level_xp = xp_for_level(level + 1);
        let span = (next_level_xp - current_level_xp) as f64;
        let percent = ((total_xp - current_level_xp) as f64 / span * 1000.0).round() / 10.0;

        Self {
            level,
            total_xp,
            current_level_xp,
            next_level_xp,
            xp_to_next_level: next_level_xp - total_xp,
            percent,
        }
    }
}
