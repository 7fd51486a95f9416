use crate::client::{NewHabit, NewReport, StoreClient};
use crate::errors::{AppError, StoreError};
use crate::models::{
    ActivityKind, EvidenceRequest, Habit, NewPersonalHabitRequest, NewReportRequest,
    PersonalEvidence, PersonalHabit, PersonalReport, Report, UserRecord, VERIFICATION_THRESHOLD,
    VerifiedActivity,
};
use crate::session::Session;
use crate::stats::period_streak;
use crate::storage::Collection;
use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PersonalError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PersonalError> for AppError {
    fn from(err: PersonalError) -> Self {
        match err {
            PersonalError::Validation(message) => AppError::bad_request(message),
            PersonalError::Store(err) => err.into(),
        }
    }
}

pub async fn load_user(client: &StoreClient, user_id: &str) -> Result<UserRecord, StoreError> {
    client
        .user(user_id)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            collection: Collection::Users.name(),
            id: user_id.to_string(),
        })
}

pub async fn create_habit(
    client: &StoreClient,
    user_id: &str,
    request: NewPersonalHabitRequest,
    today: NaiveDate,
) -> Result<PersonalHabit, PersonalError> {
    if request.quantity == 0 {
        return Err(PersonalError::Validation(
            "target quantity must be at least 1".to_string(),
        ));
    }

    let _guard = client.write().await;
    let mut user = load_user(client, user_id).await?;
    let description = match request.description.trim() {
        "" => request.category.action_description().to_string(),
        text => text.to_string(),
    };
    let habit = PersonalHabit {
        id: uuid::Uuid::new_v4().to_string(),
        category: request.category,
        description,
        quantity: request.quantity,
        frequency: request.frequency,
        streak: 0,
        completed_dates: vec![today],
        evidence: Vec::new(),
        created_at: Utc::now(),
    };
    user.habits.push(habit.clone());
    client
        .save_field(Collection::Users, user_id, "habits", &user.habits)
        .await?;
    Ok(habit)
}

pub async fn delete_habit(
    client: &StoreClient,
    user_id: &str,
    habit_id: &str,
) -> Result<bool, StoreError> {
    let _guard = client.write().await;
    let mut user = load_user(client, user_id).await?;
    let before = user.habits.len();
    user.habits.retain(|habit| habit.id != habit_id);
    if user.habits.len() == before {
        return Ok(false);
    }
    client
        .save_field(Collection::Users, user_id, "habits", &user.habits)
        .await?;
    Ok(true)
}

/// Marks the habit done today and recomputes its streak for its frequency.
pub async fn complete_habit(
    client: &StoreClient,
    user_id: &str,
    habit_id: &str,
    today: NaiveDate,
) -> Result<Option<PersonalHabit>, StoreError> {
    let _guard = client.write().await;
    let mut user = load_user(client, user_id).await?;
    let Some(habit) = user.habits.iter_mut().find(|habit| habit.id == habit_id) else {
        return Ok(None);
    };
    if !habit.completed_dates.contains(&today) {
        habit.completed_dates.push(today);
        habit.completed_dates.sort();
    }
    habit.streak = period_streak(&habit.completed_dates, today, habit.frequency);
    let updated = habit.clone();
    client
        .save_field(Collection::Users, user_id, "habits", &user.habits)
        .await?;
    Ok(Some(updated))
}

/// Records evidence locally and shares the habit with the community.
/// `None` when the personal habit does not exist.
pub async fn attach_evidence(
    client: &StoreClient,
    session: &Session,
    habit_id: &str,
    request: EvidenceRequest,
) -> Result<Option<(PersonalHabit, Habit)>, PersonalError> {
    let image_url = request.image_url.trim().to_string();
    if image_url.is_empty() {
        return Err(PersonalError::Validation(
            "evidence requires an image".to_string(),
        ));
    }

    let _guard = client.write().await;
    let mut user = load_user(client, &session.user_id).await?;
    let Some(habit) = user.habits.iter_mut().find(|habit| habit.id == habit_id) else {
        return Ok(None);
    };

    let shared = client
        .create_habit(NewHabit {
            user_id: session.user_id.clone(),
            user_nickname: session.nickname.clone(),
            user_avatar: session.avatar.clone(),
            category: habit.category,
            description: Some(habit.description.clone()),
            image_url: Some(image_url.clone()),
        })
        .await?;
    habit.evidence.push(PersonalEvidence {
        image_url,
        description: request.description.unwrap_or_default().trim().to_string(),
        date: shared.created_at,
        verification_count: 0,
        shared_habit_id: Some(shared.id.clone()),
    });
    let updated = habit.clone();
    if let Err(err) = client
        .save_field(Collection::Users, &session.user_id, "habits", &user.habits)
        .await
    {
        discard_shared(client, Collection::SharedHabits, &shared.id).await;
        return Err(err.into());
    }
    info!("habit {} shared by {}", shared.id, session.nickname);
    Ok(Some((updated, shared)))
}

pub async fn file_report(
    client: &StoreClient,
    session: &Session,
    request: NewReportRequest,
) -> Result<(PersonalReport, Report), PersonalError> {
    let location = request.location.trim().to_string();
    let image_url = request.image_url.trim().to_string();
    if location.is_empty() {
        return Err(PersonalError::Validation(
            "report requires a location".to_string(),
        ));
    }
    if image_url.is_empty() {
        return Err(PersonalError::Validation(
            "report requires an image".to_string(),
        ));
    }
    let description = request
        .description
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());

    let _guard = client.write().await;
    let mut user = load_user(client, &session.user_id).await?;
    let shared = client
        .create_report(NewReport {
            user_id: session.user_id.clone(),
            user_nickname: session.nickname.clone(),
            user_avatar: session.avatar.clone(),
            location: location.clone(),
            description: description.clone(),
            image_url: image_url.clone(),
        })
        .await?;
    let personal = PersonalReport {
        id: uuid::Uuid::new_v4().to_string(),
        location,
        description,
        image_url,
        created_at: shared.created_at,
        shared_report_id: shared.id.clone(),
    };
    user.reports.push(personal.clone());
    if let Err(err) = client
        .save_field(Collection::Users, &session.user_id, "reports", &user.reports)
        .await
    {
        discard_shared(client, Collection::SharedReports, &shared.id).await;
        return Err(err.into());
    }
    info!("report {} filed by {}", shared.id, session.nickname);
    Ok((personal, shared))
}

/// Removes a community row whose owner's record could not be saved.
async fn discard_shared(client: &StoreClient, collection: Collection, id: &str) {
    if let Err(err) = client.delete(collection, id, None).await {
        warn!("failed to remove orphaned {} row {id}: {err}", collection.name());
    }
}

/// Drops the personal copy and, if still present, the community report.
pub async fn withdraw_report(
    client: &StoreClient,
    user_id: &str,
    report_id: &str,
) -> Result<bool, StoreError> {
    let _guard = client.write().await;
    let mut user = load_user(client, user_id).await?;
    let Some(position) = user.reports.iter().position(|report| report.id == report_id) else {
        return Ok(false);
    };
    let removed = user.reports.remove(position);
    client
        .delete(
            Collection::SharedReports,
            &removed.shared_report_id,
            Some(user_id),
        )
        .await?;
    client
        .save_field(Collection::Users, user_id, "reports", &user.reports)
        .await?;
    Ok(true)
}

/// Copies community check counts onto the user's local evidence entries.
/// Returns whether anything changed.
pub fn sync_evidence_counts(
    user: &mut UserRecord,
    habits: &[Habit],
    ledger: &[VerifiedActivity],
) -> bool {
    let mut changed = false;
    for evidence in user.habits.iter_mut().flat_map(|habit| habit.evidence.iter_mut()) {
        let Some(shared_id) = evidence.shared_habit_id.as_deref() else {
            continue;
        };
        let count = if let Some(live) = habits.iter().find(|habit| habit.id == shared_id) {
            live.checks.len()
        } else if ledger
            .iter()
            .any(|entry| entry.kind == ActivityKind::Habit && entry.source_id == shared_id)
        {
            VERIFICATION_THRESHOLD
        } else {
            evidence.verification_count
        };
        if count != evidence.verification_count {
            evidence.verification_count = count;
            changed = true;
        }
    }
    changed
}
