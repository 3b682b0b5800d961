//! Signature persistence

use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;
use vchk_common::{Error, Result};

use crate::models::signature::{Signature, SignerRole};

/// Upsert a session's signatures (called inside the session save transaction)
pub async fn save_signatures(
    conn: &mut SqliteConnection,
    session_id: Uuid,
    signatures: [&Option<Signature>; 2],
) -> Result<()> {
    let session_id = session_id.to_string();

    for signature in signatures.into_iter().flatten() {
        sqlx::query(
            r#"
            INSERT INTO signatures (session_id, role, data, signed_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(session_id, role) DO UPDATE SET
                data = excluded.data,
                signed_at = excluded.signed_at
            "#,
        )
        .bind(&session_id)
        .bind(signature.role.as_str())
        .bind(&signature.data)
        .bind(signature.signed_at.to_rfc3339())
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;
    }

    Ok(())
}

/// Load a session's signatures as (operator, counterparty)
pub async fn load_signatures(
    pool: &SqlitePool,
    session_id: Uuid,
) -> Result<(Option<Signature>, Option<Signature>)> {
    let rows = sqlx::query(
        r#"
        SELECT role, data, signed_at
        FROM signatures
        WHERE session_id = ?
        "#,
    )
    .bind(session_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut operator = None;
    let mut counterparty = None;

    for row in rows {
        let role: String = row.get("role");
        let role = match role.as_str() {
            "operator" => SignerRole::Operator,
            "counterparty" => SignerRole::Counterparty,
            other => {
                return Err(Error::Internal(format!("Unknown signer role: {}", other)));
            }
        };

        let signed_at: String = row.get("signed_at");
        let signed_at = chrono::DateTime::parse_from_rfc3339(&signed_at)
            .map_err(|e| Error::Internal(format!("Failed to parse signed_at: {}", e)))?
            .with_timezone(&chrono::Utc);

        let signature = Signature {
            role,
            data: row.get("data"),
            signed_at,
        };

        match role {
            SignerRole::Operator => operator = Some(signature),
            SignerRole::Counterparty => counterparty = Some(signature),
        }
    }

    Ok((operator, counterparty))
}
