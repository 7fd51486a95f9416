//! Badge catalogue and the unlock rules evaluated on every dashboard refresh.
//!
//! Unlocking is monotonic: ids are only ever appended to a user's set.

use crate::client::StoreClient;
use crate::errors::StoreError;
use crate::models::{ActivityKind, Habit, Report, VerifiedActivity};
use crate::storage::Collection;
use serde::Serialize;
use tracing::info;

/// Activity figures the badge predicates are evaluated against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivitySnapshot {
    pub habit_count: usize,
    pub report_count: usize,
    pub streak: u32,
    /// Endorsements collected by the user's own resolution evidence.
    pub resolution_verification_count: usize,
    /// Endorsements collected by the user's community habits.
    pub endorsements_received: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Badge {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub condition: fn(&ActivitySnapshot) -> bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BadgeStatus {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub unlocked: bool,
}

pub const BADGES: [Badge; 10] = [
    Badge {
        id: "first_habit",
        title: "First Step",
        description: "Register your first habit",
        icon: "🌱",
        condition: |s| s.habit_count >= 1,
    },
    Badge {
        id: "five_habits",
        title: "Eco Builder",
        description: "Create 5 habits",
        icon: "🏗️",
        condition: |s| s.habit_count >= 5,
    },
    Badge {
        id: "ten_habits",
        title: "Green Specialist",
        description: "Create 10 habits",
        icon: "🌿",
        condition: |s| s.habit_count >= 10,
    },
    Badge {
        id: "seven_day_streak",
        title: "Full Week",
        description: "7 day streak",
        icon: "🔥",
        condition: |s| s.streak >= 7,
    },
    Badge {
        id: "thirty_day_streak",
        title: "Full Month",
        description: "30 day streak",
        icon: "⭐",
        condition: |s| s.streak >= 30,
    },
    Badge {
        id: "five_reports",
        title: "Diligent Reporter",
        description: "5 shared reports",
        icon: "📝",
        condition: |s| s.report_count >= 5,
    },
    Badge {
        id: "ten_reports",
        title: "Active Reporter",
        description: "10 shared reports",
        icon: "📢",
        condition: |s| s.report_count >= 10,
    },
    Badge {
        id: "evidence_verifier",
        title: "Solution Verifier",
        description: "Your resolution evidence has been verified 5 times",
        icon: "✅",
        condition: |s| s.resolution_verification_count >= 5,
    },
    Badge {
        id: "solution_champion",
        title: "Solution Champion",
        description: "Your resolution evidence has been verified 20 times",
        icon: "🌟",
        condition: |s| s.resolution_verification_count >= 20,
    },
    Badge {
        id: "community_champion",
        title: "Community Champion",
        description: "20 verifications received in the community",
        icon: "👑",
        condition: |s| s.endorsements_received >= 20,
    },
];

pub fn badge(id: &str) -> Option<&'static Badge> {
    BADGES.iter().find(|badge| badge.id == id)
}

/// Badges whose predicate holds and that are not yet in `unlocked`, in
/// catalogue order.
pub fn newly_unlocked(unlocked: &[String], snapshot: &ActivitySnapshot) -> Vec<&'static Badge> {
    BADGES
        .iter()
        .filter(|badge| (badge.condition)(snapshot))
        .filter(|badge| !unlocked.iter().any(|id| id == badge.id))
        .collect()
}

/// `unlocked` extended with every newly satisfied badge.
pub fn merge_unlocked(unlocked: &[String], snapshot: &ActivitySnapshot) -> Vec<String> {
    let mut merged = unlocked.to_vec();
    merged.extend(
        newly_unlocked(unlocked, snapshot)
            .into_iter()
            .map(|badge| badge.id.to_string()),
    );
    merged
}

pub fn catalogue_status(unlocked: &[String]) -> Vec<BadgeStatus> {
    BADGES
        .iter()
        .map(|badge| BadgeStatus {
            id: badge.id,
            title: badge.title,
            description: badge.description,
            icon: badge.icon,
            unlocked: unlocked.iter().any(|id| id == badge.id),
        })
        .collect()
}

/// Sum of endorsements on every resolution evidence the user submitted.
pub fn resolution_verification_count(reports: &[Report], nickname: &str) -> usize {
    reports
        .iter()
        .flat_map(|report| report.resolution_evidences.iter())
        .filter(|evidence| evidence.submitter == nickname)
        .map(|evidence| evidence.checks.len())
        .sum()
}

/// Endorsements on the user's live habits plus those recorded for habits
/// already verified and removed.
pub fn endorsements_received(
    user_id: &str,
    habits: &[Habit],
    ledger: &[VerifiedActivity],
) -> usize {
    let live: usize = habits
        .iter()
        .filter(|habit| habit.user_id == user_id)
        .map(|habit| habit.checks.len())
        .sum();
    let archived: usize = ledger
        .iter()
        .filter(|entry| entry.user_id == user_id && entry.kind == ActivityKind::Habit)
        .map(|entry| entry.endorsers.len())
        .sum();
    live + archived
}

pub async fn persist_unlocked(
    client: &StoreClient,
    user_id: &str,
    unlocked: &[String],
) -> Result<(), StoreError> {
    client
        .save_field(Collection::Users, user_id, "unlocked_achievements", unlocked)
        .await?;
    info!("user {user_id} now holds {} achievements", unlocked.len());
    Ok(())
}
