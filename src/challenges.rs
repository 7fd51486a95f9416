use crate::stats::challenge_week_index;
use chrono::NaiveDate;
use serde::Serialize;

/// Quantity a weekly challenge is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMetric {
    VerifiedHabits,
    VerifiedReports,
    EndorsementsGiven,
    CommentsAuthored,
    Streak,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Challenge {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub target: u32,
    pub icon: &'static str,
    pub week: u8,
    pub metric: ProgressMetric,
}

/// Inputs for every [`ProgressMetric`], gathered once per refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChallengeCounters {
    pub verified_habits: u32,
    pub verified_reports: u32,
    pub endorsements_given: u32,
    pub comments_authored: u32,
    pub streak: u32,
}

impl ChallengeCounters {
    pub fn value(&self, metric: ProgressMetric) -> u32 {
        match metric {
            ProgressMetric::VerifiedHabits => self.verified_habits,
            ProgressMetric::VerifiedReports => self.verified_reports,
            ProgressMetric::EndorsementsGiven => self.endorsements_given,
            ProgressMetric::CommentsAuthored => self.comments_authored,
            ProgressMetric::Streak => self.streak,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeProgress {
    #[serde(flatten)]
    pub challenge: Challenge,
    /// Clamped to the target.
    pub progress: u32,
    pub completed: bool,
}

const fn challenge(
    id: &'static str,
    title: &'static str,
    description: &'static str,
    target: u32,
    icon: &'static str,
    week: u8,
    metric: ProgressMetric,
) -> Challenge {
    Challenge {
        id,
        title,
        description,
        target,
        icon,
        week,
        metric,
    }
}

/// Four weekly sets indexed by [`challenge_week_index`]; week four repeats
/// the first set.
pub const WEEKLY_CHALLENGES: [[Challenge; 4]; 4] = [
    [
        challenge(
            "w1_ch1",
            "Recycler of the Day",
            "Complete at least 1 verified habit",
            1,
            "🎯",
            1,
            ProgressMetric::VerifiedHabits,
        ),
        challenge(
            "w1_ch2",
            "Streak of 3",
            "Complete 3 distinct verified actions",
            3,
            "🔥",
            1,
            ProgressMetric::VerifiedHabits,
        ),
        challenge(
            "w1_ch3",
            "Community Verifier",
            "Verify 5 posts",
            5,
            "✓",
            1,
            ProgressMetric::EndorsementsGiven,
        ),
        challenge(
            "w1_ch4",
            "Reporter of the Week",
            "Get 2 reports verified",
            2,
            "📊",
            1,
            ProgressMetric::VerifiedReports,
        ),
    ],
    [
        challenge(
            "w2_ch1",
            "Eco Warrior",
            "Complete 5 verified habits",
            5,
            "⚔️",
            2,
            ProgressMetric::VerifiedHabits,
        ),
        challenge(
            "w2_ch2",
            "Active Commenter",
            "Leave 10 comments in the community",
            10,
            "💬",
            2,
            ProgressMetric::CommentsAuthored,
        ),
        challenge(
            "w2_ch3",
            "Fire Streak",
            "Keep a 5 day streak",
            5,
            "🔥",
            2,
            ProgressMetric::Streak,
        ),
        challenge(
            "w2_ch4",
            "Problem Inspector",
            "Get 3 reports verified",
            3,
            "🔍",
            2,
            ProgressMetric::VerifiedReports,
        ),
    ],
    [
        challenge(
            "w3_ch1",
            "Plastic Master",
            "Complete 10 verified habits",
            10,
            "♻️",
            3,
            ProgressMetric::VerifiedHabits,
        ),
        challenge(
            "w3_ch2",
            "Expert Verifier",
            "Verify 15 posts",
            15,
            "✅",
            3,
            ProgressMetric::EndorsementsGiven,
        ),
        challenge(
            "w3_ch3",
            "Full Week",
            "Complete 7 verified habits",
            7,
            "📅",
            3,
            ProgressMetric::VerifiedHabits,
        ),
        challenge(
            "w3_ch4",
            "Pro Reporter",
            "Get 5 reports verified",
            5,
            "📢",
            3,
            ProgressMetric::VerifiedReports,
        ),
    ],
    [
        challenge(
            "w4_ch1",
            "Recycler of the Day",
            "Complete at least 1 verified habit",
            1,
            "🎯",
            4,
            ProgressMetric::VerifiedHabits,
        ),
        challenge(
            "w4_ch2",
            "Streak of 3",
            "Complete 3 distinct verified actions",
            3,
            "🔥",
            4,
            ProgressMetric::VerifiedHabits,
        ),
        challenge(
            "w4_ch3",
            "Community Verifier",
            "Verify 5 posts",
            5,
            "✓",
            4,
            ProgressMetric::EndorsementsGiven,
        ),
        challenge(
            "w4_ch4",
            "Reporter of the Week",
            "Get 2 reports verified",
            2,
            "📊",
            4,
            ProgressMetric::VerifiedReports,
        ),
    ],
];

pub fn active_challenges(today: NaiveDate) -> &'static [Challenge; 4] {
    &WEEKLY_CHALLENGES[challenge_week_index(today)]
}

pub fn evaluate(challenge: &Challenge, counters: &ChallengeCounters) -> ChallengeProgress {
    let value = counters.value(challenge.metric);
    ChallengeProgress {
        challenge: *challenge,
        progress: value.min(challenge.target),
        completed: value >= challenge.target,
    }
}

pub fn active_progress(today: NaiveDate, counters: &ChallengeCounters) -> Vec<ChallengeProgress> {
    active_challenges(today)
        .iter()
        .map(|challenge| evaluate(challenge, counters))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::platform_epoch;
    use chrono::Duration;

    #[test]
    fn catalogue_weeks_match_their_slot() {
        for (index, set) in WEEKLY_CHALLENGES.iter().enumerate() {
            for challenge in set {
                assert_eq!(usize::from(challenge.week), index + 1, "{}", challenge.id);
            }
        }
    }

    #[test]
    fn active_set_follows_rotation() {
        let epoch = platform_epoch();
        assert_eq!(active_challenges(epoch)[0].id, "w1_ch1");
        assert_eq!(active_challenges(epoch + Duration::days(7))[0].id, "w2_ch1");
        assert_eq!(active_challenges(epoch + Duration::days(28))[0].id, "w1_ch1");
    }

    #[test]
    fn progress_is_clamped_and_completion_is_at_least_target() {
        let counters = ChallengeCounters {
            comments_authored: 12,
            streak: 4,
            ..ChallengeCounters::default()
        };
        let week_two = &WEEKLY_CHALLENGES[1];

        let comments = evaluate(&week_two[1], &counters);
        assert_eq!(comments.progress, 10);
        assert!(comments.completed);

        let streak = evaluate(&week_two[2], &counters);
        assert_eq!(streak.progress, 4);
        assert!(!streak.completed);
    }

    #[test]
    fn week_three_volume_challenge_counts_every_verified_habit() {
        let counters = ChallengeCounters {
            verified_habits: 10,
            ..ChallengeCounters::default()
        };
        let progress = evaluate(&WEEKLY_CHALLENGES[2][0], &counters);
        assert_eq!(progress.challenge.id, "w3_ch1");
        assert_eq!(progress.progress, 10);
        assert!(progress.completed);
    }
}
