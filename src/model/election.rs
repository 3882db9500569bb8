//! The election state record and the operations that drive its lifecycle.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use rocket::http::Status;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::user::{fields as user_fields, Role, User};
use crate::store::{
    from_document, to_document, Batch, Collection, Filter, Store, StoredRecord, Update,
};

/// Key of the election record within the settings collection.
pub const ELECTION_SETTINGS_KEY: &str = "election";

mod fields {
    pub const IS_ACTIVE: &str = "isActive";
    pub const IS_COMPLETED: &str = "isCompleted";
    pub const START_TIME: &str = "startTime";
    pub const END_TIME: &str = "endTime";
    pub const FROZEN_REMAINING: &str = "frozenRemaining";
}

/// Process-wide election settings, loaded and persisted as one record.
///
/// `is_active` and `is_completed` are never both true.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElectionState {
    pub is_active: bool,
    pub is_completed: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds left on the clock when the election was paused.
    /// Present only between a pause and the next resume.
    pub frozen_remaining: Option<i64>,
}

impl ElectionState {
    /// Has any part of a schedule been set?
    pub fn has_schedule(&self) -> bool {
        self.start_time.is_some() || self.end_time.is_some() || self.frozen_remaining.is_some()
    }
}

impl StoredRecord for ElectionState {
    const COLLECTION: Collection = Collection::Settings;

    fn key(&self) -> String {
        ELECTION_SETTINGS_KEY.to_string()
    }
}

fn timestamp(time: Option<DateTime<Utc>>) -> Value {
    time.map(|t| Value::String(t.to_rfc3339()))
        .unwrap_or(Value::Null)
}

/// Create the default election record if there is none.
///
/// This operation is idempotent.
pub async fn ensure_exists(store: &dyn Store) -> Result<()> {
    let defaults = ElectionState::default();
    match store
        .insert(Collection::Settings, &defaults.key(), to_document(&defaults)?)
        .await
    {
        Ok(()) => {
            info!("Initialised election settings");
            Ok(())
        }
        Err(Error::DuplicateKey { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Apply a partial update to the election record, creating it first if absent.
async fn update_settings(store: &dyn Store, update: Update) -> Result<()> {
    match store
        .update(Collection::Settings, ELECTION_SETTINGS_KEY, update.clone())
        .await
    {
        Err(e) if e.status() == Status::NotFound => {
            ensure_exists(store).await?;
            store
                .update(Collection::Settings, ELECTION_SETTINGS_KEY, update)
                .await
        }
        result => result,
    }
}

/// Read the current election state. A missing record yields the defaults.
pub async fn get_status(store: &dyn Store) -> Result<ElectionState> {
    store
        .get(Collection::Settings, ELECTION_SETTINGS_KEY)
        .await?
        .map(from_document)
        .transpose()
        .map(Option::unwrap_or_default)
}

/// Overwrite the active flag. Setting active while completed is not
/// prevented here.
pub async fn set_active(store: &dyn Store, is_active: bool) -> Result<()> {
    info!("Setting election active: {is_active}");
    update_settings(store, Update::new().set(fields::IS_ACTIVE, is_active)).await
}

/// Overwrite the scheduled window. `start < end` is not checked.
pub async fn set_times(
    store: &dyn Store,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<()> {
    info!("Setting election window: {start:?} to {end:?}");
    let update = Update::new()
        .set(fields::START_TIME, timestamp(start))
        .set(fields::END_TIME, timestamp(end));
    update_settings(store, update).await
}

/// Overwrite the completed flag. Completing also deactivates.
pub async fn set_completed(store: &dyn Store, is_completed: bool) -> Result<()> {
    info!("Setting election completed: {is_completed}");
    let mut update = Update::new().set(fields::IS_COMPLETED, is_completed);
    if is_completed {
        update = update.set(fields::IS_ACTIVE, false);
    }
    update_settings(store, update).await
}

/// The end time `remaining_ms` after `now`, or `None` if it is not
/// representable.
fn end_after(now: DateTime<Utc>, remaining_ms: i64) -> Option<DateTime<Utc>> {
    now.checked_add_signed(Duration::milliseconds(remaining_ms))
}

/// Stop the election and freeze the remaining time, as supplied by the caller.
///
/// The remainder must be non-negative and small enough that resuming now
/// gives a representable end time.
pub async fn pause(store: &dyn Store, remaining_ms: i64) -> Result<()> {
    if remaining_ms < 0 {
        return Err(Error::bad_request("Remaining time must not be negative."));
    }
    if end_after(Utc::now(), remaining_ms).is_none() {
        return Err(Error::bad_request("Remaining time is too large."));
    }
    info!("Pausing election with {remaining_ms}ms remaining");
    let update = Update::new()
        .set(fields::IS_ACTIVE, false)
        .set(fields::FROZEN_REMAINING, remaining_ms);
    update_settings(store, update).await
}

/// Restart the election, extending the end time by the frozen remainder if
/// paused. Returns `false` (and changes nothing) if there is no schedule.
pub async fn resume(store: &dyn Store) -> Result<bool> {
    resume_at(store, Utc::now()).await
}

/// [`resume`] with an explicit current time.
pub async fn resume_at(store: &dyn Store, now: DateTime<Utc>) -> Result<bool> {
    let state = get_status(store).await?;
    if !state.has_schedule() {
        debug!("Resume requested with no schedule; ignoring");
        return Ok(false);
    }

    let end_time = match state.frozen_remaining {
        Some(remaining) => Some(
            end_after(now, remaining)
                .ok_or_else(|| Error::bad_request("Remaining time is too large."))?,
        ),
        None => state.end_time,
    };
    info!("Resuming election, ending at {end_time:?}");

    // One record, so one write covers the flag and the schedule together.
    let update = Update::new()
        .set(fields::IS_ACTIVE, true)
        .set(fields::END_TIME, timestamp(end_time))
        .delete(fields::FROZEN_REMAINING);
    update_settings(store, update).await?;
    Ok(true)
}

/// Deactivate and un-complete the election, and clear the voting fields of
/// every voter and contestant, in one batch. Returns the number of users
/// cleared.
pub async fn reset(store: &dyn Store) -> Result<usize> {
    ensure_exists(store).await?;
    let users = store.query(Collection::Users, &Filter::all()).await?;

    let mut batch = Batch::new();
    batch.update(
        Collection::Settings,
        ELECTION_SETTINGS_KEY,
        Update::new()
            .set(fields::IS_ACTIVE, false)
            .set(fields::IS_COMPLETED, false),
    );
    let mut cleared = 0;
    for doc in users {
        let user: User = from_document(doc)?;
        if matches!(user.role, Role::Voter | Role::Contestant) {
            batch.update(
                Collection::Users,
                user.reg_num,
                Update::new()
                    .set(user_fields::HAS_VOTED, false)
                    .set(user_fields::VOTED_FOR, Value::Null)
                    .delete(user_fields::VOTED_AT),
            );
            cleared += 1;
        }
    }

    store.commit(batch).await?;
    info!("Election reset; cleared votes of {cleared} users");
    Ok(cleared)
}
