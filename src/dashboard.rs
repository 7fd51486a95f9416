use crate::achievements::{
    self, ActivitySnapshot, BadgeStatus, catalogue_status, endorsements_received, merge_unlocked,
    resolution_verification_count,
};
use crate::challenges::{ChallengeCounters, ChallengeProgress, active_progress};
use crate::client::StoreClient;
use crate::errors::StoreError;
use crate::models::{ActivityKind, Habit, Report, UserRecord, VerifiedActivity};
use crate::personal::{load_user, sync_evidence_counts};
use crate::session::SessionStore;
use crate::stats::{WEEKLY_TARGET, calendar_week_number, current_streak, weekly_progress};
use crate::storage::Collection;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

/// Community state loaded once per refresh.
#[derive(Debug, Clone, Default)]
pub struct CommunityData {
    pub habits: Vec<Habit>,
    pub reports: Vec<Report>,
    pub ledger: Vec<VerifiedActivity>,
}

impl CommunityData {
    pub async fn load(client: &StoreClient) -> Result<Self, StoreError> {
        Ok(Self {
            habits: client.habits().await?,
            reports: client.reports().await?,
            ledger: client.verified_activity().await?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub streak: u32,
    pub weekly_progress: usize,
    pub weekly_target: usize,
    pub week_number: u32,
    pub weekly_badges: Vec<u32>,
    pub challenges: Vec<ChallengeProgress>,
    pub badges: Vec<BadgeStatus>,
    pub newly_unlocked: Vec<String>,
    pub selected_badge: Option<String>,
    pub resolution_verification_count: usize,
    pub endorsements_received: usize,
    pub active_reports: usize,
    pub poll_interval_secs: u64,
}

/// Badge state that changed during a refresh and must be written back.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BadgeChanges {
    pub unlocked: Option<Vec<String>>,
    pub weekly_badges: Option<Vec<u32>>,
}

/// Creation dates of the user's community-verified items.
pub fn verified_dates(user_id: &str, ledger: &[VerifiedActivity]) -> Vec<NaiveDate> {
    ledger
        .iter()
        .filter(|entry| entry.user_id == user_id)
        .map(|entry| entry.created_at.date_naive())
        .collect()
}

pub fn challenge_counters(
    user: &UserRecord,
    community: &CommunityData,
    streak: u32,
) -> ChallengeCounters {
    let own: Vec<&VerifiedActivity> = community
        .ledger
        .iter()
        .filter(|entry| entry.user_id == user.id)
        .collect();
    let verified_habits = own.iter().filter(|e| e.kind == ActivityKind::Habit).count();
    let verified_reports = own.iter().filter(|e| e.kind == ActivityKind::Report).count();

    let nickname = user.nickname.as_str();
    let mut endorsed: HashSet<&str> = HashSet::new();
    endorsed.extend(
        community
            .habits
            .iter()
            .filter(|habit| habit.checks.iter().any(|c| c == nickname))
            .map(|habit| habit.id.as_str()),
    );
    endorsed.extend(
        community
            .reports
            .iter()
            .filter(|report| report.checks.iter().any(|c| c == nickname))
            .map(|report| report.id.as_str()),
    );
    endorsed.extend(
        community
            .ledger
            .iter()
            .filter(|entry| entry.endorsers.iter().any(|e| e == nickname))
            .map(|entry| entry.source_id.as_str()),
    );

    let comments_authored = community
        .habits
        .iter()
        .flat_map(|habit| habit.comments.iter())
        .chain(community.reports.iter().flat_map(|report| report.comments.iter()))
        .filter(|comment| comment.author == nickname)
        .count();

    ChallengeCounters {
        verified_habits: verified_habits as u32,
        verified_reports: verified_reports as u32,
        endorsements_given: endorsed.len() as u32,
        comments_authored: comments_authored as u32,
        streak,
    }
}

pub fn activity_snapshot(
    user: &UserRecord,
    community: &CommunityData,
    streak: u32,
) -> ActivitySnapshot {
    ActivitySnapshot {
        habit_count: user.habits.len(),
        report_count: user.reports.len(),
        streak,
        resolution_verification_count: resolution_verification_count(
            &community.reports,
            &user.nickname,
        ),
        endorsements_received: endorsements_received(
            &user.id,
            &community.habits,
            &community.ledger,
        ),
    }
}

/// Adds `week_number` to the weekly badges once the weekly target is met.
/// `None` when nothing changes.
pub fn award_weekly_badge(
    existing: &[u32],
    progress: usize,
    week_number: u32,
) -> Option<Vec<u32>> {
    if progress < WEEKLY_TARGET || existing.contains(&week_number) {
        return None;
    }
    let mut awarded = existing.to_vec();
    awarded.push(week_number);
    Some(awarded)
}

/// Derives the dashboard for `today` without touching the store.
pub fn build_dashboard_at(
    today: NaiveDate,
    user: &UserRecord,
    community: &CommunityData,
    poll_interval_secs: u64,
) -> (DashboardResponse, BadgeChanges) {
    let dates = verified_dates(&user.id, &community.ledger);
    let streak = current_streak(dates.iter().copied(), today);
    let progress = weekly_progress(dates.iter().copied(), today);
    let week_number = calendar_week_number(today);

    let snapshot = activity_snapshot(user, community, streak);
    let unlocked = merge_unlocked(&user.unlocked_achievements, &snapshot);
    let newly_unlocked = unlocked[user.unlocked_achievements.len()..].to_vec();
    let weekly_awarded = award_weekly_badge(&user.weekly_badges, progress, week_number);
    let weekly_badges = weekly_awarded
        .clone()
        .unwrap_or_else(|| user.weekly_badges.clone());

    let counters = challenge_counters(user, community, streak);
    let active_reports = community
        .reports
        .iter()
        .filter(|report| !report.resolved && !report.has_confirmed_resolution())
        .count();

    let response = DashboardResponse {
        streak,
        weekly_progress: progress,
        weekly_target: WEEKLY_TARGET,
        week_number,
        weekly_badges,
        challenges: active_progress(today, &counters),
        badges: catalogue_status(&unlocked),
        newly_unlocked: newly_unlocked.clone(),
        selected_badge: user.selected_badge.clone(),
        resolution_verification_count: snapshot.resolution_verification_count,
        endorsements_received: snapshot.endorsements_received,
        active_reports,
        poll_interval_secs,
    };
    let changes = BadgeChanges {
        unlocked: (!newly_unlocked.is_empty()).then_some(unlocked),
        weekly_badges: weekly_awarded,
    };
    (response, changes)
}

pub async fn refresh(
    client: &StoreClient,
    sessions: &SessionStore,
    user_id: &str,
    poll_interval_secs: u64,
) -> Result<DashboardResponse, StoreError> {
    refresh_at(
        Utc::now().date_naive(),
        client,
        sessions,
        user_id,
        poll_interval_secs,
    )
    .await
}

/// Loads the user and the community, derives the dashboard and persists any
/// badge or evidence-count changes to the user record and every open session
/// of that user.
pub async fn refresh_at(
    today: NaiveDate,
    client: &StoreClient,
    sessions: &SessionStore,
    user_id: &str,
    poll_interval_secs: u64,
) -> Result<DashboardResponse, StoreError> {
    let _guard = client.write().await;
    let mut user = load_user(client, user_id).await?;
    let community = CommunityData::load(client).await?;

    if sync_evidence_counts(&mut user, &community.habits, &community.ledger) {
        client
            .save_field(Collection::Users, user_id, "habits", &user.habits)
            .await?;
    }

    let (response, changes) = build_dashboard_at(today, &user, &community, poll_interval_secs);

    if let Some(unlocked) = &changes.unlocked {
        achievements::persist_unlocked(client, user_id, unlocked).await?;
    }
    if let Some(weekly) = &changes.weekly_badges {
        client
            .save_field(Collection::Users, user_id, "weekly_badges", weekly)
            .await?;
        info!("user {user_id} earned weekly champion badge #{}", response.week_number);
    }
    if changes != BadgeChanges::default() {
        sessions
            .update_user(user_id, |session| {
                if let Some(unlocked) = &changes.unlocked {
                    session.unlocked_achievements = unlocked.clone();
                }
                if let Some(weekly) = &changes.weekly_badges {
                    session.weekly_badges = weekly.clone();
                }
            })
            .await?;
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Avatar, Category, Comment};
    use chrono::{Duration, NaiveTime};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn user() -> UserRecord {
        UserRecord {
            id: "u1".to_string(),
            nickname: "alice".to_string(),
            password_hash: String::new(),
            avatar: Avatar::default(),
            created_at: Utc::now(),
            selected_badge: None,
            weekly_badges: Vec::new(),
            unlocked_achievements: Vec::new(),
            habits: Vec::new(),
            reports: Vec::new(),
        }
    }

    fn verified(
        user_id: &str,
        kind: ActivityKind,
        date: NaiveDate,
        category: Option<Category>,
    ) -> VerifiedActivity {
        let created_at = date.and_time(NaiveTime::MIN).and_utc();
        VerifiedActivity {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind,
            source_id: uuid::Uuid::new_v4().to_string(),
            category,
            created_at,
            verified_at: created_at,
            endorsers: vec!["x".to_string(), "y".to_string(), "z".to_string()],
        }
    }

    #[test]
    fn streak_comes_from_verified_items_only() {
        let today = day(2026, 3, 11);
        let community = CommunityData {
            ledger: vec![
                verified("u1", ActivityKind::Habit, today, Some(Category::Glass)),
                verified("u1", ActivityKind::Report, today - Duration::days(1), None),
                verified("u1", ActivityKind::Habit, today - Duration::days(2), None),
                verified("u1", ActivityKind::Habit, today - Duration::days(4), None),
                verified("someone", ActivityKind::Habit, today - Duration::days(3), None),
            ],
            ..CommunityData::default()
        };
        let (dashboard, _) = build_dashboard_at(today, &user(), &community, 5);
        assert_eq!(dashboard.streak, 3);
        // 2026-03-07 falls in the previous Sunday-started week.
        assert_eq!(dashboard.weekly_progress, 3);
        assert_eq!(dashboard.endorsements_received, 9);
    }

    #[test]
    fn challenge_counters_use_ledger_and_live_feed() {
        let today = day(2026, 3, 11);
        let mut habit = Habit {
            id: "h-live".to_string(),
            user_id: "u2".to_string(),
            user_nickname: "bob".to_string(),
            user_avatar: Avatar::default(),
            category: Category::Paper,
            description: None,
            image_url: None,
            created_at: Utc::now(),
            checks: vec!["alice".to_string()],
            comments: Vec::new(),
            verified: false,
        };
        habit.comments.push(Comment {
            author: "alice".to_string(),
            text: "nice".to_string(),
            timestamp: Utc::now(),
        });
        let mut endorsed = verified("u2", ActivityKind::Habit, today, None);
        endorsed.endorsers = vec!["alice".to_string(), "c".to_string(), "d".to_string()];
        let community = CommunityData {
            habits: vec![habit],
            reports: Vec::new(),
            ledger: vec![
                endorsed,
                verified("u1", ActivityKind::Habit, today, Some(Category::Plastic)),
                verified("u1", ActivityKind::Habit, today, Some(Category::Metal)),
                verified("u1", ActivityKind::Report, today, None),
            ],
        };
        let counters = challenge_counters(&user(), &community, 1);
        assert_eq!(counters.verified_habits, 2);
        assert_eq!(counters.verified_reports, 1);
        assert_eq!(counters.endorsements_given, 2);
        assert_eq!(counters.comments_authored, 1);
        assert_eq!(counters.streak, 1);
    }

    #[test]
    fn weekly_badge_awarded_once_per_week() {
        assert_eq!(award_weekly_badge(&[], 14, 10), None);
        assert_eq!(award_weekly_badge(&[], 15, 10), Some(vec![10]));
        assert_eq!(award_weekly_badge(&[10], 20, 10), None);
        assert_eq!(award_weekly_badge(&[10], 15, 11), Some(vec![10, 11]));
    }

    #[test]
    fn refresh_reports_only_new_unlocks() {
        let today = day(2026, 3, 11);
        let mut user = user();
        user.unlocked_achievements = vec!["first_habit".to_string()];
        user.reports = (0..5)
            .map(|n| crate::models::PersonalReport {
                id: format!("p{n}"),
                location: "Somewhere".to_string(),
                description: None,
                image_url: "/blobs/p.jpg".to_string(),
                created_at: Utc::now(),
                shared_report_id: format!("r{n}"),
            })
            .collect();
        let (dashboard, changes) = build_dashboard_at(today, &user, &CommunityData::default(), 5);
        assert_eq!(dashboard.newly_unlocked, vec!["five_reports"]);
        assert_eq!(
            changes.unlocked,
            Some(vec!["first_habit".to_string(), "five_reports".to_string()])
        );
        assert!(changes.weekly_badges.is_none());
        assert_eq!(dashboard.challenges.len(), 4);

        user.unlocked_achievements = changes.unlocked.unwrap();
        let (again, changes) = build_dashboard_at(today, &user, &CommunityData::default(), 5);
        assert!(again.newly_unlocked.is_empty());
        assert_eq!(changes, BadgeChanges::default());
        assert!(again.badges.iter().filter(|b| b.unlocked).count() == 2);
    }

    #[test]
    fn fifteen_verified_items_this_week_earn_weekly_badge() {
        let today = day(2026, 3, 11);
        let community = CommunityData {
            ledger: (0..15)
                .map(|_| verified("u1", ActivityKind::Habit, today, None))
                .collect(),
            ..CommunityData::default()
        };
        let (dashboard, changes) = build_dashboard_at(today, &user(), &community, 5);
        let week = calendar_week_number(today);
        assert_eq!(dashboard.weekly_badges, vec![week]);
        assert_eq!(changes.weekly_badges, Some(vec![week]));
    }

    #[tokio::test]
    async fn refresh_updates_every_open_session_of_the_user() {
        use crate::accounts::{login, register};
        use crate::models::{Frequency, NewPersonalHabitRequest, RegisterRequest};
        use crate::personal::create_habit;
        use crate::storage::JsonStore;
        use std::sync::Arc;

        let client = StoreClient::new(Arc::new(JsonStore::in_memory()));
        let sessions = SessionStore::in_memory();
        let user = register(
            &client,
            RegisterRequest {
                nickname: "erin".to_string(),
                password: "secret1".to_string(),
                avatar: serde_json::Value::Null,
            },
        )
        .await
        .unwrap();
        let (phone, _) = login(&client, &sessions, "erin", "secret1").await.unwrap();
        let (laptop, _) = login(&client, &sessions, "erin", "secret1").await.unwrap();
        let today = day(2026, 3, 11);
        create_habit(
            &client,
            &user.id,
            NewPersonalHabitRequest {
                category: Category::Glass,
                description: "jars".to_string(),
                quantity: 1,
                frequency: Frequency::Daily,
            },
            today,
        )
        .await
        .unwrap();

        let dashboard = refresh_at(today, &client, &sessions, &user.id, 5).await.unwrap();
        assert_eq!(dashboard.newly_unlocked, vec!["first_habit"]);
        for token in [&phone, &laptop] {
            let session = sessions.get(token).await.unwrap();
            assert_eq!(session.unlocked_achievements, vec!["first_habit"]);
        }
    }
}
