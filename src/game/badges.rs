use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Badge {
    FirstSteps,
    CourseFinisher,
    Perfectionist,
    RisingStar,
    Veteran,
}

impl Badge {
    pub fn slug(&self) -> &'static str {
        match self {
            Self::FirstSteps => "first-steps",
            Self::CourseFinisher => "course-finisher",
            Self::Perfectionist => "perfectionist",
            Self::RisingStar => "rising-star",
            Self::Veteran => "veteran",
        }
    }

    /// Badges unlocked by reaching `level`.
    pub fn for_level(level: i32) -> Vec<Badge> {
        let mut badges = Vec::new();
        if level >= 5 {
            badges.push(Self::RisingStar);
        }
        if level >= 10 {
            badges.push(Self::Veteran);
        }
        badges
    }
}

/// Adds the badges missing from `owned`, returning only the new ones.
pub fn merge_badges<I>(owned: &mut Vec<String>, earned: I) -> Vec<Badge>
where
    I: IntoIterator<Item = Badge>,
{
    let mut added = Vec::new();
    for badge in earned {
        if !owned.iter().any(|slug| slug == badge.slug()) {
            owned.push(badge.slug().to_string());
            added.push(badge);
        }
    }
    added
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn merge_skips_owned_badges_test() {
        let mut owned = vec![String::from("first-steps")];
        let added = merge_badges(
            &mut owned,
            [Badge::FirstSteps, Badge::Perfectionist, Badge::Perfectionist],
        );
        assert_eq!(added, vec![Badge::Perfectionist]);
        assert_eq!(owned, vec!["first-steps", "perfectionist"]);
    }

    #[test]
    fn level_badges_test() {
        assert!(Badge::for_level(4).is_empty());
        assert_eq!(Badge::for_level(5), vec![Badge::RisingStar]);
        assert_eq!(Badge::for_level(12), vec![Badge::RisingStar, Badge::Veteran]);
    }
}
