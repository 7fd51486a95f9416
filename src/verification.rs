use crate::client::StoreClient;
use crate::errors::{AppError, StoreError};
use crate::models::{
    ActivityKind, Habit, Report, ResolutionEvidence, VERIFICATION_THRESHOLD, VerifiedActivity,
};
use crate::storage::Collection;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// What a single endorsement did to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStep {
    AlreadyEndorsed,
    Recorded,
    /// The target's count just reached [`VERIFICATION_THRESHOLD`].
    ThresholdReached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckOutcome {
    AlreadyEndorsed,
    Updated { checks: usize, verified: bool },
    Deleted,
    /// The target no longer exists; callers refresh their view.
    Gone,
}

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("report has no resolution evidence at index {0}")]
    EvidenceIndex(usize),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<VerificationError> for AppError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::EvidenceIndex(_) => AppError::bad_request(err.to_string()),
            VerificationError::Store(err) => err.into(),
        }
    }
}

/// Appends the endorser unless already present. Returns whether it was added.
pub fn endorse(checks: &mut Vec<String>, endorser: &str) -> bool {
    if checks.iter().any(|existing| existing == endorser) {
        return false;
    }
    checks.push(endorser.to_string());
    true
}

pub fn apply_habit_check(habit: &mut Habit, endorser: &str) -> CheckStep {
    if !endorse(&mut habit.checks, endorser) {
        return CheckStep::AlreadyEndorsed;
    }
    habit.verified = habit.checks.len() >= VERIFICATION_THRESHOLD;
    if habit.verified {
        CheckStep::ThresholdReached
    } else {
        CheckStep::Recorded
    }
}

/// Report-level checks mark the report verified but never remove it.
pub fn apply_report_check(report: &mut Report, endorser: &str) -> CheckStep {
    if !endorse(&mut report.checks, endorser) {
        return CheckStep::AlreadyEndorsed;
    }
    let was_verified = report.verified;
    report.verified = report.checks.len() >= VERIFICATION_THRESHOLD;
    if report.verified && !was_verified {
        CheckStep::ThresholdReached
    } else {
        CheckStep::Recorded
    }
}

pub fn apply_evidence_check(
    report: &mut Report,
    index: usize,
    endorser: &str,
) -> Result<CheckStep, VerificationError> {
    let evidence = report
        .resolution_evidences
        .get_mut(index)
        .ok_or(VerificationError::EvidenceIndex(index))?;
    if !endorse(&mut evidence.checks, endorser) {
        return Ok(CheckStep::AlreadyEndorsed);
    }
    let reached = evidence.checks.len() >= VERIFICATION_THRESHOLD;
    report.resolved = report.has_confirmed_resolution();
    Ok(if reached {
        CheckStep::ThresholdReached
    } else {
        CheckStep::Recorded
    })
}

pub async fn check_habit(
    client: &StoreClient,
    habit_id: &str,
    endorser: &str,
) -> Result<CheckOutcome, StoreError> {
    let _guard = client.write().await;
    let Some(mut habit) = client.habit(habit_id).await? else {
        debug!("check on missing habit {habit_id}");
        return Ok(CheckOutcome::Gone);
    };

    let step = apply_habit_check(&mut habit, endorser);
    if step == CheckStep::AlreadyEndorsed {
        return Ok(CheckOutcome::AlreadyEndorsed);
    }

    let saved = client
        .save_checks(
            Collection::SharedHabits,
            &habit.id,
            &habit.checks,
            ("verified", habit.verified),
        )
        .await;
    if let Some(outcome) = gone_if_missing(saved)? {
        return Ok(outcome);
    }

    if step == CheckStep::Recorded {
        return Ok(CheckOutcome::Updated {
            checks: habit.checks.len(),
            verified: habit.verified,
        });
    }

    client
        .record_verified(&VerifiedActivity {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: habit.user_id.clone(),
            kind: ActivityKind::Habit,
            source_id: habit.id.clone(),
            category: Some(habit.category),
            created_at: habit.created_at,
            verified_at: Utc::now(),
            endorsers: habit.checks.clone(),
        })
        .await?;
    client
        .delete(Collection::SharedHabits, &habit.id, None)
        .await?;
    info!(
        "habit {} verified by {} endorsers and removed",
        habit.id,
        habit.checks.len()
    );
    Ok(CheckOutcome::Deleted)
}

pub async fn check_report(
    client: &StoreClient,
    report_id: &str,
    endorser: &str,
) -> Result<CheckOutcome, StoreError> {
    let _guard = client.write().await;
    let Some(mut report) = client.report(report_id).await? else {
        debug!("check on missing report {report_id}");
        return Ok(CheckOutcome::Gone);
    };

    let step = apply_report_check(&mut report, endorser);
    if step == CheckStep::AlreadyEndorsed {
        return Ok(CheckOutcome::AlreadyEndorsed);
    }

    let saved = client
        .save_checks(
            Collection::SharedReports,
            &report.id,
            &report.checks,
            ("verified", report.verified),
        )
        .await;
    if let Some(outcome) = gone_if_missing(saved)? {
        return Ok(outcome);
    }

    if step == CheckStep::ThresholdReached {
        client
            .record_verified(&VerifiedActivity {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: report.user_id.clone(),
                kind: ActivityKind::Report,
                source_id: report.id.clone(),
                category: None,
                created_at: report.created_at,
                verified_at: Utc::now(),
                endorsers: report.checks.clone(),
            })
            .await?;
        info!("report {} verified by the community", report.id);
    }

    Ok(CheckOutcome::Updated {
        checks: report.checks.len(),
        verified: report.verified,
    })
}

pub async fn check_evidence(
    client: &StoreClient,
    report_id: &str,
    index: usize,
    endorser: &str,
) -> Result<CheckOutcome, VerificationError> {
    let _guard = client.write().await;
    let Some(mut report) = client.report(report_id).await? else {
        debug!("evidence check on missing report {report_id}");
        return Ok(CheckOutcome::Gone);
    };

    let step = apply_evidence_check(&mut report, index, endorser)?;
    if step == CheckStep::AlreadyEndorsed {
        return Ok(CheckOutcome::AlreadyEndorsed);
    }

    let saved = client
        .save_evidences(&report.id, &report.resolution_evidences, report.resolved)
        .await;
    if let Some(outcome) = gone_if_missing(saved)? {
        return Ok(outcome);
    }

    if step == CheckStep::ThresholdReached {
        client
            .delete(Collection::SharedReports, &report.id, None)
            .await?;
        info!(
            "report {} resolved through evidence #{index} and removed",
            report.id
        );
        return Ok(CheckOutcome::Deleted);
    }

    Ok(CheckOutcome::Updated {
        checks: report.resolution_evidences[index].checks.len(),
        verified: false,
    })
}

/// Appends resolution evidence to a report. `None` when the report is gone.
pub async fn add_resolution_evidence(
    client: &StoreClient,
    report_id: &str,
    submitter: &str,
    image_url: &str,
    description: Option<String>,
) -> Result<Option<ResolutionEvidence>, StoreError> {
    let _guard = client.write().await;
    let Some(mut report) = client.report(report_id).await? else {
        debug!("evidence for missing report {report_id}");
        return Ok(None);
    };

    let evidence = ResolutionEvidence {
        submitter: submitter.to_string(),
        image_url: image_url.to_string(),
        description: description.filter(|text| !text.trim().is_empty()),
        timestamp: Utc::now(),
        checks: Vec::new(),
    };
    report.resolution_evidences.push(evidence.clone());

    match client
        .save_evidences(&report.id, &report.resolution_evidences, report.resolved)
        .await
    {
        Ok(()) => Ok(Some(evidence)),
        Err(StoreError::NotFound { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

fn gone_if_missing(result: Result<(), StoreError>) -> Result<Option<CheckOutcome>, StoreError> {
    match result {
        Ok(()) => Ok(None),
        Err(StoreError::NotFound { .. }) => Ok(Some(CheckOutcome::Gone)),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{NewHabit, NewReport};
    use crate::models::{Avatar, Category};
    use crate::storage::JsonStore;
    use std::sync::Arc;

    fn client() -> StoreClient {
        StoreClient::new(Arc::new(JsonStore::in_memory()))
    }

    async fn seed_habit(client: &StoreClient) -> Habit {
        client
            .create_habit(NewHabit {
                user_id: "owner-id".to_string(),
                user_nickname: "owner".to_string(),
                user_avatar: Avatar::default(),
                category: Category::Glass,
                description: Some("jars".to_string()),
                image_url: None,
            })
            .await
            .unwrap()
    }

    async fn seed_report(client: &StoreClient) -> Report {
        client
            .create_report(NewReport {
                user_id: "owner-id".to_string(),
                user_nickname: "owner".to_string(),
                user_avatar: Avatar::default(),
                location: "Riverside park".to_string(),
                description: None,
                image_url: "/blobs/site.jpg".to_string(),
            })
            .await
            .unwrap()
    }

    #[test]
    fn endorse_ignores_repeat_endorser() {
        let mut checks = vec!["alice".to_string()];
        assert!(!endorse(&mut checks, "alice"));
        assert!(endorse(&mut checks, "bob"));
        assert_eq!(checks, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn habit_verified_flag_tracks_check_count() {
        let client = client();
        let mut habit = seed_habit(&client).await;
        let steps = [
            ("alice", false),
            ("alice", false),
            ("bob", false),
            ("carol", true),
        ];
        for (endorser, expected) in steps {
            apply_habit_check(&mut habit, endorser);
            assert_eq!(habit.verified, expected);
            assert_eq!(habit.verified, habit.checks.len() >= VERIFICATION_THRESHOLD);
        }
    }

    #[tokio::test]
    async fn third_distinct_endorsement_deletes_habit() {
        let client = client();
        let habit = seed_habit(&client).await;

        let first = check_habit(&client, &habit.id, "alice").await.unwrap();
        assert_eq!(first, CheckOutcome::Updated { checks: 1, verified: false });
        let repeat = check_habit(&client, &habit.id, "alice").await.unwrap();
        assert_eq!(repeat, CheckOutcome::AlreadyEndorsed);
        let stored = client.habit(&habit.id).await.unwrap().unwrap();
        assert_eq!(stored.checks, vec!["alice"]);

        let second = check_habit(&client, &habit.id, "bob").await.unwrap();
        assert_eq!(second, CheckOutcome::Updated { checks: 2, verified: false });
        assert!(client.habit(&habit.id).await.unwrap().is_some());

        let third = check_habit(&client, &habit.id, "carol").await.unwrap();
        assert_eq!(third, CheckOutcome::Deleted);
        assert!(client.habit(&habit.id).await.unwrap().is_none());

        let ledger = client.verified_activity().await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].user_id, "owner-id");
        assert_eq!(ledger[0].kind, ActivityKind::Habit);
        assert_eq!(ledger[0].category, Some(Category::Glass));
        assert_eq!(ledger[0].endorsers, vec!["alice", "bob", "carol"]);

        let late = check_habit(&client, &habit.id, "dave").await.unwrap();
        assert_eq!(late, CheckOutcome::Gone);
    }

    #[tokio::test]
    async fn report_checks_never_delete_report() {
        let client = client();
        let report = seed_report(&client).await;
        for endorser in ["alice", "bob", "carol", "dave"] {
            let outcome = check_report(&client, &report.id, endorser).await.unwrap();
            assert!(matches!(outcome, CheckOutcome::Updated { .. }));
        }
        let stored = client.report(&report.id).await.unwrap().expect("report kept");
        assert_eq!(stored.checks.len(), 4);
        assert!(stored.verified);
        assert!(!stored.resolved);

        let ledger = client.verified_activity().await.unwrap();
        assert_eq!(ledger.len(), 1, "verification recorded once");
        assert_eq!(ledger[0].kind, ActivityKind::Report);
    }

    #[tokio::test]
    async fn third_evidence_endorsement_deletes_report() {
        let client = client();
        let report = seed_report(&client).await;
        add_resolution_evidence(&client, &report.id, "erin", "/blobs/clean.jpg", None)
            .await
            .unwrap()
            .expect("report exists");

        check_evidence(&client, &report.id, 0, "alice").await.unwrap();
        check_evidence(&client, &report.id, 0, "bob").await.unwrap();
        let stored = client.report(&report.id).await.unwrap().unwrap();
        assert!(stored.checks.is_empty());
        assert_eq!(stored.resolution_evidences[0].checks.len(), 2);
        assert!(!stored.resolved);

        let outcome = check_evidence(&client, &report.id, 0, "carol").await.unwrap();
        assert_eq!(outcome, CheckOutcome::Deleted);
        assert!(client.report(&report.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn evidence_endorsement_is_deduplicated() {
        let client = client();
        let report = seed_report(&client).await;
        let description = Some("done".into());
        add_resolution_evidence(&client, &report.id, "erin", "/blobs/clean.jpg", description)
            .await
            .unwrap();
        check_evidence(&client, &report.id, 0, "alice").await.unwrap();
        let outcome = check_evidence(&client, &report.id, 0, "alice").await.unwrap();
        assert_eq!(outcome, CheckOutcome::AlreadyEndorsed);
    }

    #[tokio::test]
    async fn evidence_index_out_of_range_is_rejected() {
        let client = client();
        let report = seed_report(&client).await;
        let err = check_evidence(&client, &report.id, 2, "alice").await.unwrap_err();
        assert!(matches!(err, VerificationError::EvidenceIndex(2)));
    }

    #[tokio::test]
    async fn concurrent_endorsements_are_not_lost() {
        let client = client();
        let report = seed_report(&client).await;
        let mut tasks = Vec::new();
        for endorser in ["a1", "a2", "a3", "a4", "a5", "a6"] {
            let client = client.clone();
            let id = report.id.clone();
            tasks.push(tokio::spawn(async move {
                check_report(&client, &id, endorser).await.unwrap()
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        let stored = client.report(&report.id).await.unwrap().unwrap();
        assert_eq!(stored.checks.len(), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_third_endorsers_delete_habit_once() {
        let client = client();
        let habit = seed_habit(&client).await;
        check_habit(&client, &habit.id, "alice").await.unwrap();
        check_habit(&client, &habit.id, "bob").await.unwrap();

        let mut tasks = Vec::new();
        for endorser in ["carol", "dave", "erin", "frank"] {
            let client = client.clone();
            let id = habit.id.clone();
            tasks.push(tokio::spawn(async move {
                check_habit(&client, &id, endorser).await.unwrap()
            }));
        }
        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap());
        }

        let deleted = outcomes.iter().filter(|o| **o == CheckOutcome::Deleted).count();
        let gone = outcomes.iter().filter(|o| **o == CheckOutcome::Gone).count();
        assert_eq!((deleted, gone), (1, 3));
        assert!(client.habit(&habit.id).await.unwrap().is_none());

        let ledger = client.verified_activity().await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].source_id, habit.id);
        assert_eq!(ledger[0].endorsers.len(), 3);
    }
}
