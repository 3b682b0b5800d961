//! Inspection session persistence
//!
//! The persisted record is the source of truth for resumption: the full
//! aggregate (session row, steps, signatures) is saved after every
//! mutation so an interrupted session resumes at the last known cursor
//! with all completed steps, descriptions, and approvals intact.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use vchk_common::{Error, Result};

use crate::db::{signatures, steps};
use crate::models::session::{
    ConditionRating, Geolocation, InspectionKind, InspectionSession, SessionState,
};
use crate::utils::retry_on_lock;
use crate::workflow::sequencer::StepSequencer;

const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Save the full session aggregate (session row + steps + signatures)
///
/// Upserts throughout, so a retried save is idempotent.
pub async fn save_session(pool: &SqlitePool, session: &InspectionSession) -> Result<()> {
    // Prepare all data BEFORE acquiring a database connection
    let session_id = session.session_id.to_string();
    let subject_id = session.subject_id.to_string();
    let kind = serde_json::to_string(&session.kind)
        .map_err(|e| Error::Internal(format!("Failed to serialize kind: {}", e)))?;
    let state = serde_json::to_string(&session.state)
        .map_err(|e| Error::Internal(format!("Failed to serialize state: {}", e)))?;
    let condition = session
        .condition
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to serialize condition: {}", e)))?;
    let fuel_level = session.fuel_level.map(|f| f as i64);
    let odometer_km = session.odometer_km.map(|o| o as i64);
    let (latitude, longitude, address) = match &session.geolocation {
        Some(geo) => (Some(geo.latitude), Some(geo.longitude), geo.address.clone()),
        None => (None, None, None),
    };
    let cursor = session.sequencer.cursor() as i64;
    let highest_reached = session.sequencer.highest_reached() as i64;
    let started_at = session.started_at.to_rfc3339();
    let locked_at = session.locked_at.map(|dt| dt.to_rfc3339());
    let updated_at = session.updated_at.to_rfc3339();

    retry_on_lock("save_session", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let mut tx = pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            r#"
            INSERT INTO inspection_sessions (
                session_id, subject_id, kind, state, condition,
                fuel_level, odometer_km, notes, latitude, longitude, address,
                cursor, highest_reached, started_at, locked_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                state = excluded.state,
                condition = excluded.condition,
                fuel_level = excluded.fuel_level,
                odometer_km = excluded.odometer_km,
                notes = excluded.notes,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                address = excluded.address,
                cursor = excluded.cursor,
                highest_reached = excluded.highest_reached,
                locked_at = excluded.locked_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&session_id)
        .bind(&subject_id)
        .bind(&kind)
        .bind(&state)
        .bind(&condition)
        .bind(fuel_level)
        .bind(odometer_km)
        .bind(&session.notes)
        .bind(latitude)
        .bind(longitude)
        .bind(&address)
        .bind(cursor)
        .bind(highest_reached)
        .bind(&started_at)
        .bind(&locked_at)
        .bind(&updated_at)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        steps::save_steps(&mut tx, session.session_id, session.sequencer.steps()).await?;
        signatures::save_signatures(
            &mut tx,
            session.session_id,
            [&session.operator_signature, &session.counterparty_signature],
        )
        .await?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    })
    .await
}

/// Load a session aggregate from the database
pub async fn load_session(pool: &SqlitePool, session_id: Uuid) -> Result<Option<InspectionSession>> {
    let row = sqlx::query(
        r#"
        SELECT session_id, subject_id, kind, state, condition,
               fuel_level, odometer_km, notes, latitude, longitude, address,
               cursor, highest_reached, started_at, locked_at, updated_at
        FROM inspection_sessions
        WHERE session_id = ?
        "#,
    )
    .bind(session_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(session_from_row(pool, row).await?)),
        None => Ok(None),
    }
}

/// Find the open (non-locked) session for a subject+kind pair, if any
///
/// At most one such session exists per the `start` invariant.
pub async fn find_open_session(
    pool: &SqlitePool,
    subject_id: Uuid,
    kind: InspectionKind,
) -> Result<Option<InspectionSession>> {
    let kind_json = serde_json::to_string(&kind)
        .map_err(|e| Error::Internal(format!("Failed to serialize kind: {}", e)))?;

    let row = sqlx::query(
        r#"
        SELECT session_id, subject_id, kind, state, condition,
               fuel_level, odometer_km, notes, latitude, longitude, address,
               cursor, highest_reached, started_at, locked_at, updated_at
        FROM inspection_sessions
        WHERE subject_id = ? AND kind = ? AND state != '"locked"'
        ORDER BY started_at DESC
        LIMIT 1
        "#,
    )
    .bind(subject_id.to_string())
    .bind(&kind_json)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(session_from_row(pool, row).await?)),
        None => Ok(None),
    }
}

/// List sessions, optionally filtered by subject, newest first
pub async fn list_sessions(
    pool: &SqlitePool,
    subject_id: Option<Uuid>,
) -> Result<Vec<InspectionSession>> {
    let rows = match subject_id {
        Some(subject) => {
            sqlx::query(
                r#"
                SELECT session_id, subject_id, kind, state, condition,
                       fuel_level, odometer_km, notes, latitude, longitude, address,
                       cursor, highest_reached, started_at, locked_at, updated_at
                FROM inspection_sessions
                WHERE subject_id = ?
                ORDER BY started_at DESC
                "#,
            )
            .bind(subject.to_string())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                r#"
                SELECT session_id, subject_id, kind, state, condition,
                       fuel_level, odometer_km, notes, latitude, longitude, address,
                       cursor, highest_reached, started_at, locked_at, updated_at
                FROM inspection_sessions
                ORDER BY started_at DESC
                "#,
            )
            .fetch_all(pool)
            .await?
        }
    };

    let mut sessions = Vec::with_capacity(rows.len());
    for row in rows {
        sessions.push(session_from_row(pool, row).await?);
    }
    Ok(sessions)
}

/// Durably mark a session locked
///
/// Guarded so a concurrent or repeated call cannot double-lock: returns
/// true only when this call performed the transition. The caller treats
/// `false` as "already locked".
pub async fn set_locked(
    pool: &SqlitePool,
    session_id: Uuid,
    locked_at: DateTime<Utc>,
) -> Result<bool> {
    let session_id = session_id.to_string();
    let locked_at = locked_at.to_rfc3339();

    let result = retry_on_lock("set_locked", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            UPDATE inspection_sessions
            SET state = '"locked"',
                locked_at = ?,
                updated_at = ?
            WHERE session_id = ? AND state != '"locked"'
            "#,
        )
        .bind(&locked_at)
        .bind(&locked_at)
        .bind(&session_id)
        .execute(pool)
        .await
        .map_err(Error::Database)
    })
    .await?;

    Ok(result.rows_affected() == 1)
}

async fn session_from_row(
    pool: &SqlitePool,
    row: sqlx::sqlite::SqliteRow,
) -> Result<InspectionSession> {
    let session_id_str: String = row.get("session_id");
    let session_id = Uuid::parse_str(&session_id_str)
        .map_err(|e| Error::Internal(format!("Failed to parse session_id: {}", e)))?;

    let subject_id_str: String = row.get("subject_id");
    let subject_id = Uuid::parse_str(&subject_id_str)
        .map_err(|e| Error::Internal(format!("Failed to parse subject_id: {}", e)))?;

    let kind: String = row.get("kind");
    let kind: InspectionKind = serde_json::from_str(&kind)
        .map_err(|e| Error::Internal(format!("Failed to deserialize kind: {}", e)))?;

    let state: String = row.get("state");
    let state: SessionState = serde_json::from_str(&state)
        .map_err(|e| Error::Internal(format!("Failed to deserialize state: {}", e)))?;

    let condition: Option<String> = row.get("condition");
    let condition: Option<ConditionRating> = condition
        .map(|c| serde_json::from_str(&c))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize condition: {}", e)))?;

    let started_at: String = row.get("started_at");
    let started_at = chrono::DateTime::parse_from_rfc3339(&started_at)
        .map_err(|e| Error::Internal(format!("Failed to parse started_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    let locked_at: Option<String> = row.get("locked_at");
    let locked_at = locked_at
        .map(|s| chrono::DateTime::parse_from_rfc3339(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to parse locked_at: {}", e)))?
        .map(|dt| dt.with_timezone(&chrono::Utc));

    let updated_at: String = row.get("updated_at");
    let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| Error::Internal(format!("Failed to parse updated_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    let geolocation = match (
        row.get::<Option<f64>, _>("latitude"),
        row.get::<Option<f64>, _>("longitude"),
    ) {
        (Some(latitude), Some(longitude)) => Some(Geolocation {
            latitude,
            longitude,
            address: row.get("address"),
        }),
        _ => None,
    };

    let step_list = steps::load_steps(pool, session_id).await?;
    let (operator_signature, counterparty_signature) =
        signatures::load_signatures(pool, session_id).await?;

    let cursor = row.get::<i64, _>("cursor") as usize;
    let highest_reached = row.get::<i64, _>("highest_reached") as usize;

    Ok(InspectionSession {
        session_id,
        subject_id,
        kind,
        state,
        condition,
        fuel_level: row.get::<Option<i64>, _>("fuel_level").map(|f| f as u8),
        odometer_km: row.get::<Option<i64>, _>("odometer_km").map(|o| o as u64),
        notes: row.get("notes"),
        geolocation,
        sequencer: StepSequencer::from_parts(step_list, cursor, highest_reached),
        operator_signature,
        counterparty_signature,
        started_at,
        locked_at,
        updated_at,
    })
}
