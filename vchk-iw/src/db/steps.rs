//! Photo step persistence

use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;
use vchk_common::{Error, Result};

use crate::models::step::{DamageVerdict, PhotoStep, StepKind};

/// Upsert all steps for a session (called inside the session save transaction)
pub async fn save_steps(
    conn: &mut SqliteConnection,
    session_id: Uuid,
    steps: &[PhotoStep],
) -> Result<()> {
    let session_id = session_id.to_string();

    for (position, step) in steps.iter().enumerate() {
        let kind = serde_json::to_string(&step.kind)
            .map_err(|e| Error::Internal(format!("Failed to serialize step kind: {}", e)))?;
        let verdict = step
            .verdict
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::Internal(format!("Failed to serialize verdict: {}", e)))?;
        let capture_token = step.capture_token.map(|t| t.to_string());
        let captured_at = step.captured_at.map(|dt| dt.to_rfc3339());

        sqlx::query(
            r#"
            INSERT INTO photo_steps (
                session_id, position, kind, required, capture_token,
                local_asset, remote_url, ai_description, description_approved,
                verdict, captured_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id, position) DO UPDATE SET
                kind = excluded.kind,
                required = excluded.required,
                capture_token = excluded.capture_token,
                local_asset = excluded.local_asset,
                remote_url = excluded.remote_url,
                ai_description = excluded.ai_description,
                description_approved = excluded.description_approved,
                verdict = excluded.verdict,
                captured_at = excluded.captured_at
            "#,
        )
        .bind(&session_id)
        .bind(position as i64)
        .bind(&kind)
        .bind(step.required as i64)
        .bind(&capture_token)
        .bind(&step.local_asset)
        .bind(&step.remote_url)
        .bind(&step.ai_description)
        .bind(step.description_approved as i64)
        .bind(&verdict)
        .bind(&captured_at)
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;
    }

    Ok(())
}

/// Load all steps for a session, in catalogue order
pub async fn load_steps(pool: &SqlitePool, session_id: Uuid) -> Result<Vec<PhotoStep>> {
    let rows = sqlx::query(
        r#"
        SELECT kind, required, capture_token, local_asset, remote_url,
               ai_description, description_approved, verdict, captured_at
        FROM photo_steps
        WHERE session_id = ?
        ORDER BY position
        "#,
    )
    .bind(session_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut steps = Vec::with_capacity(rows.len());
    for row in rows {
        let kind: String = row.get("kind");
        let kind: StepKind = serde_json::from_str(&kind)
            .map_err(|e| Error::Internal(format!("Failed to deserialize step kind: {}", e)))?;

        let verdict: Option<String> = row.get("verdict");
        let verdict: Option<DamageVerdict> = verdict
            .map(|v| serde_json::from_str(&v))
            .transpose()
            .map_err(|e| Error::Internal(format!("Failed to deserialize verdict: {}", e)))?;

        let capture_token: Option<String> = row.get("capture_token");
        let capture_token = capture_token
            .map(|t| Uuid::parse_str(&t))
            .transpose()
            .map_err(|e| Error::Internal(format!("Failed to parse capture token: {}", e)))?;

        let captured_at: Option<String> = row.get("captured_at");
        let captured_at = captured_at
            .map(|s| chrono::DateTime::parse_from_rfc3339(&s))
            .transpose()
            .map_err(|e| Error::Internal(format!("Failed to parse captured_at: {}", e)))?
            .map(|dt| dt.with_timezone(&chrono::Utc));

        steps.push(PhotoStep {
            kind,
            required: row.get::<i64, _>("required") != 0,
            capture_token,
            local_asset: row.get("local_asset"),
            remote_url: row.get("remote_url"),
            ai_description: row.get("ai_description"),
            description_approved: row.get::<i64, _>("description_approved") != 0,
            verdict,
            captured_at,
        });
    }

    Ok(steps)
}

/// Roll back uploads interrupted by a service restart
///
/// A step with a local asset but no remote URL was mid-upload when the
/// process died; its background task is gone and will never complete.
/// Clearing the marker re-prompts the operator to capture again, the
/// same recovery the pipeline applies on terminal failure.
pub async fn recover_interrupted_uploads(pool: &SqlitePool) -> Result<usize> {
    let result = sqlx::query(
        r#"
        UPDATE photo_steps
        SET local_asset = NULL,
            capture_token = NULL,
            captured_at = NULL
        WHERE remote_url IS NULL AND local_asset IS NOT NULL
        "#,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected() as usize)
}
