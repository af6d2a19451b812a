use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::activities_repo::{self, FeedFilterParams};
use crate::database::attendances_repo::{self, NewAttendance};
use crate::database::users_repo;
use crate::error::AppError;
use crate::models::{ActivityRow, AttendeeRow};
use crate::services::identity_service::CallerIdentity;

pub const DEFAULT_PAGE_LIMIT: i64 = 3;

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(default)]
    pub is_going: bool,
    #[serde(default)]
    pub is_host: bool,
    pub start_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFilter {
    All,
    Going,
    Hosting,
}

impl FeedFilter {
    /// Only the two exclusive flag combinations filter; both or neither
    /// leaves the feed unfiltered.
    pub fn from_flags(is_going: bool, is_host: bool) -> Self {
        match (is_going, is_host) {
            (true, false) => FeedFilter::Going,
            (false, true) => FeedFilter::Hosting,
            _ => FeedFilter::All,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedFilter::All => "all",
            FeedFilter::Going => "going",
            FeedFilter::Hosting => "hosting",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeView {
    pub username: String,
    pub display_name: String,
    pub image: Option<String>,
    pub is_host: bool,
    pub following: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityView {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub date: String,
    pub city: Option<String>,
    pub venue: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub attendees: Vec<AttendeeView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitiesEnvelope {
    pub activities: Vec<ActivityView>,
    pub activity_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewActivityInput {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub date: String,
    pub city: Option<String>,
    pub venue: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Fields left out keep their stored value.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub date: Option<String>,
    pub city: Option<String>,
    pub venue: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

pub async fn list_feed(
    pool: &SqlitePool,
    caller: Option<&CallerIdentity>,
    query: &FeedQuery,
) -> Result<ActivitiesEnvelope, AppError> {
    list_feed_at(pool, caller, query, Utc::now()).await
}

/// Feed evaluated against an explicit "now", which is the default start cutoff.
pub async fn list_feed_at(
    pool: &SqlitePool,
    caller: Option<&CallerIdentity>,
    query: &FeedQuery,
    now: DateTime<Utc>,
) -> Result<ActivitiesEnvelope, AppError> {
    let limit = non_negative("limit", query.limit.unwrap_or(DEFAULT_PAGE_LIMIT))?;
    let offset = non_negative("offset", query.offset.unwrap_or(0))?;
    let start_at = match query.start_date.as_deref() {
        Some(raw) => parse_timestamp(raw)?,
        None => now,
    };

    let filter = FeedFilter::from_flags(query.is_going, query.is_host);
    if query.is_going && query.is_host {
        debug!("isGoing and isHost both set, feed left unfiltered");
    }

    let start_at = to_db_cutoff(start_at);
    let caller_username = caller.map(CallerIdentity::as_str);
    let params = FeedFilterParams {
        start_at: &start_at,
        mode: filter.as_str(),
        caller_username,
    };

    // Count and page read the same snapshot.
    let mut tx = pool.begin().await?;
    let activity_count = activities_repo::count_feed(&mut *tx, &params).await?;
    let rows = activities_repo::list_feed_page(&mut *tx, &params, limit, offset).await?;

    let mut activities = Vec::with_capacity(rows.len());
    for row in rows {
        activities.push(project_activity(&mut tx, row, caller_username).await?);
    }
    tx.commit().await?;

    debug!(
        filter = filter.as_str(),
        limit,
        offset,
        returned = activities.len(),
        activity_count,
        "feed built"
    );

    Ok(ActivitiesEnvelope {
        activities,
        activity_count,
    })
}

pub async fn load_activity(
    pool: &SqlitePool,
    activity_id: &str,
    caller: Option<&CallerIdentity>,
) -> Result<ActivityView, AppError> {
    let mut conn = pool.acquire().await?;
    let Some(row) = activities_repo::load_activity_by_id(&mut *conn, activity_id).await? else {
        return Err(AppError::NotFound("activity"));
    };
    project_activity(&mut conn, row, caller.map(CallerIdentity::as_str)).await
}

/// Creates the activity together with its creator's host attendance.
pub async fn create_activity(
    pool: &SqlitePool,
    caller: &CallerIdentity,
    input: NewActivityInput,
    now: DateTime<Utc>,
) -> Result<ActivityView, AppError> {
    let title = required("title", &input.title)?;
    let category = required("category", &input.category)?;
    let scheduled_at = parse_timestamp(&input.date)?;

    let mut tx = pool.begin().await?;
    let Some(user) = users_repo::load_user_by_username(&mut *tx, caller.as_str()).await? else {
        return Err(AppError::Unauthenticated);
    };

    let row = ActivityRow {
        activity_id: Uuid::new_v4().to_string(),
        title,
        description: input.description,
        category,
        scheduled_at: to_db_timestamp(scheduled_at),
        city: input.city,
        venue: input.venue,
        latitude: input.latitude,
        longitude: input.longitude,
    };
    activities_repo::insert_activity(&mut *tx, &row).await?;
    attendances_repo::insert_attendance(
        &mut *tx,
        NewAttendance {
            activity_id: &row.activity_id,
            user_id: &user.user_id,
            is_host: true,
            joined_at: &to_db_timestamp(now),
        },
    )
    .await?;

    let view = project_activity(&mut tx, row, Some(caller.as_str())).await?;
    tx.commit().await?;

    info!(activity_id = %view.id, host = %caller, "activity created");
    Ok(view)
}

pub async fn edit_activity(
    pool: &SqlitePool,
    activity_id: &str,
    caller: &CallerIdentity,
    patch: ActivityPatch,
    now: DateTime<Utc>,
) -> Result<ActivityView, AppError> {
    let mut tx = pool.begin().await?;
    let Some(mut row) = activities_repo::load_activity_by_id(&mut *tx, activity_id).await? else {
        return Err(AppError::NotFound("activity"));
    };

    if parse_timestamp(&row.scheduled_at)? < now {
        return Err(AppError::validation("past activities cannot be changed"));
    }

    if let Some(title) = patch.title {
        row.title = required("title", &title)?;
    }
    if let Some(category) = patch.category {
        row.category = required("category", &category)?;
    }
    if let Some(date) = patch.date {
        let scheduled_at = parse_timestamp(&date)?;
        if scheduled_at < now {
            return Err(AppError::validation("an activity cannot be moved into the past"));
        }
        row.scheduled_at = to_db_timestamp(scheduled_at);
    }
    row.description = patch.description.or(row.description);
    row.city = patch.city.or(row.city);
    row.venue = patch.venue.or(row.venue);
    row.latitude = patch.latitude.or(row.latitude);
    row.longitude = patch.longitude.or(row.longitude);

    activities_repo::update_activity(&mut *tx, &row).await?;
    let view = project_activity(&mut tx, row, Some(caller.as_str())).await?;
    tx.commit().await?;

    info!(activity_id, "activity updated");
    Ok(view)
}

pub async fn delete_activity(pool: &SqlitePool, activity_id: &str) -> Result<(), AppError> {
    let removed = activities_repo::delete_activity(pool, activity_id).await?;
    if removed == 0 {
        return Err(AppError::NotFound("activity"));
    }
    info!(activity_id, "activity deleted");
    Ok(())
}

pub async fn attend(
    pool: &SqlitePool,
    activity_id: &str,
    caller: &CallerIdentity,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    if activities_repo::load_activity_by_id(&mut *tx, activity_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound("activity"));
    }
    let Some(user) = users_repo::load_user_by_username(&mut *tx, caller.as_str()).await? else {
        return Err(AppError::Unauthenticated);
    };
    if attendances_repo::load_attendance(&mut *tx, activity_id, &user.user_id)
        .await?
        .is_some()
    {
        return Err(AppError::validation("already attending this activity"));
    }

    let inserted = attendances_repo::insert_attendance(
        &mut *tx,
        NewAttendance {
            activity_id,
            user_id: &user.user_id,
            is_host: false,
            joined_at: &to_db_timestamp(now),
        },
    )
    .await;
    match inserted {
        Ok(_) => {}
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(AppError::validation("already attending this activity"));
        }
        Err(e) => return Err(e.into()),
    }
    tx.commit().await?;

    info!(activity_id, attendee = %caller, "attendance added");
    Ok(())
}

/// Leaving an activity one does not attend is a no-op.
pub async fn unattend(
    pool: &SqlitePool,
    activity_id: &str,
    caller: &CallerIdentity,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    if activities_repo::load_activity_by_id(&mut *tx, activity_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound("activity"));
    }
    let Some(user) = users_repo::load_user_by_username(&mut *tx, caller.as_str()).await? else {
        return Err(AppError::Unauthenticated);
    };
    let Some(attendance) =
        attendances_repo::load_attendance(&mut *tx, activity_id, &user.user_id).await?
    else {
        return Ok(());
    };
    if attendance.is_host == 1 {
        return Err(AppError::validation(
            "the host cannot leave their own activity",
        ));
    }

    attendances_repo::delete_guest_attendance(&mut *tx, activity_id, &user.user_id).await?;
    tx.commit().await?;

    info!(activity_id, attendee = %caller, "attendance removed");
    Ok(())
}

// Attendee flags are per caller and resolved here, never stored.
async fn project_activity(
    conn: &mut SqliteConnection,
    row: ActivityRow,
    caller_username: Option<&str>,
) -> Result<ActivityView, AppError> {
    let attendees =
        attendances_repo::list_attendees(&mut *conn, &row.activity_id, caller_username).await?;
    Ok(build_view(row, attendees))
}

fn build_view(row: ActivityRow, attendees: Vec<AttendeeRow>) -> ActivityView {
    ActivityView {
        id: row.activity_id,
        title: row.title,
        description: row.description,
        category: row.category,
        date: row.scheduled_at,
        city: row.city,
        venue: row.venue,
        latitude: row.latitude,
        longitude: row.longitude,
        attendees: attendees
            .into_iter()
            .map(|a| AttendeeView {
                username: a.username,
                display_name: a.display_name,
                image: a.image_url,
                is_host: a.is_host == 1,
                following: a.is_following == 1,
            })
            .collect(),
    }
}

fn non_negative(name: &str, value: i64) -> Result<i64, AppError> {
    if value < 0 {
        return Err(AppError::validation(format!("{name} must not be negative")));
    }
    Ok(value)
}

fn required(name: &str, value: &str) -> Result<String, AppError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(AppError::validation(format!("{name} is required")));
    }
    Ok(v.to_string())
}

/// Accepts RFC 3339, or a naive date/date-time read as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, AppError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }
    Err(AppError::validation(format!("invalid date: {raw}")))
}

/// Stored dates keep millisecond precision, truncating anything finer.
pub fn to_db_timestamp(dt: DateTime<Utc>) -> String {
    let sub_milli = i64::from(dt.nanosecond() % 1_000_000);
    (dt - Duration::nanoseconds(sub_milli)).to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

// Rounds up, so an activity stored to the millisecond is never earlier than
// the instant the caller asked for.
fn to_db_cutoff(dt: DateTime<Utc>) -> String {
    let sub_milli = i64::from(dt.nanosecond() % 1_000_000);
    let dt = if sub_milli == 0 {
        dt
    } else {
        dt + Duration::nanoseconds(1_000_000 - sub_milli)
    };
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
