//! Credential Store: root Signal credentials plus a typed key/value store
//! for per-type Signal keys, with binary-safe JSON serialisation via
//! [`wagate_core::serde::Base64Bytes`].

use std::collections::HashMap;

use diesel::prelude::*;
use diesel::Connection;
use wagate_core::error::GatewayResult;
use wagate_core::types::{CredentialDump, Creds, SignalKey};

use crate::connect;
use crate::schema::whatsapp_credentials;
use crate::schema::whatsapp_sessions;

#[derive(Queryable, Debug, Clone)]
struct DbSignalKey {
    key_type: String,
    key_id: String,
    value: serde_json::Value,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = whatsapp_credentials)]
struct NewDbSignalKey<'a> {
    session_id: i64,
    key_type: &'a str,
    key_id: &'a str,
    value: serde_json::Value,
}

pub fn load_creds(session_id: i64) -> GatewayResult<Option<Creds>> {
    let raw: Option<serde_json::Value> = whatsapp_sessions::table
        .find(session_id)
        .select(whatsapp_sessions::creds)
        .first(&mut connect()?)?;
    Ok(match raw {
        Some(value) => Some(serde_json::from_value(value)?),
        None => None,
    })
}

/// Per-call atomic: a single `UPDATE` statement, so interleaved rapid-fire
/// rotations cannot tear a partially-written credential blob.
pub fn save_creds(session_id: i64, creds: &Creds) -> GatewayResult<()> {
    let value = serde_json::to_value(creds)?;
    diesel::update(whatsapp_sessions::table.find(session_id))
        .set((
            whatsapp_sessions::creds.eq(value),
            whatsapp_sessions::updated_at.eq(chrono::Utc::now()),
        ))
        .execute(&mut connect()?)?;
    Ok(())
}

/// Returns an entry (possibly `None`) for every requested id.
pub fn load_keys(
    session_id: i64,
    key_type: &str,
    ids: &[String],
) -> GatewayResult<HashMap<String, Option<serde_json::Value>>> {
    let rows: Vec<DbSignalKey> = whatsapp_credentials::table
        .filter(whatsapp_credentials::session_id.eq(session_id))
        .filter(whatsapp_credentials::key_type.eq(key_type))
        .filter(whatsapp_credentials::key_id.eq_any(ids))
        .select((
            whatsapp_credentials::key_type,
            whatsapp_credentials::key_id,
            whatsapp_credentials::value,
        ))
        .load(&mut connect()?)?;

    let mut found: HashMap<String, serde_json::Value> =
        rows.into_iter().map(|row| (row.key_id, row.value)).collect();

    Ok(ids
        .iter()
        .map(|id| (id.clone(), found.remove(id)))
        .collect())
}

/// `values`: key type -> (keyId -> value-or-null). Upserts every present
/// value and deletes every null one in a single transaction per call.
pub fn set_keys(
    session_id: i64,
    values: &HashMap<String, HashMap<String, Option<serde_json::Value>>>,
) -> GatewayResult<()> {
    let conn = &mut connect()?;
    conn.transaction(|conn| {
        for (key_type, by_id) in values {
            for (key_id, value) in by_id {
                match value {
                    Some(value) => {
                        diesel::insert_into(whatsapp_credentials::table)
                            .values(&NewDbSignalKey {
                                session_id,
                                key_type,
                                key_id,
                                value: value.clone(),
                            })
                            .on_conflict((
                                whatsapp_credentials::session_id,
                                whatsapp_credentials::key_type,
                                whatsapp_credentials::key_id,
                            ))
                            .do_update()
                            .set(whatsapp_credentials::value.eq(value.clone()))
                            .execute(conn)?;
                    }
                    None => {
                        diesel::delete(
                            whatsapp_credentials::table
                                .filter(whatsapp_credentials::session_id.eq(session_id))
                                .filter(whatsapp_credentials::key_type.eq(key_type.as_str()))
                                .filter(whatsapp_credentials::key_id.eq(key_id.as_str())),
                        )
                        .execute(conn)?;
                    }
                }
            }
        }
        Ok::<_, diesel::result::Error>(())
    })?;
    Ok(())
}

/// Deletes every subordinate key and nulls the root credential blob,
/// atomically. Used by `logout`.
pub fn clear_session_data(session_id: i64) -> GatewayResult<()> {
    let conn = &mut connect()?;
    conn.transaction(|conn| {
        diesel::delete(whatsapp_credentials::table.filter(whatsapp_credentials::session_id.eq(session_id)))
            .execute(conn)?;
        diesel::update(whatsapp_sessions::table.find(session_id))
            .set((
                whatsapp_sessions::creds.eq(Option::<serde_json::Value>::None),
                whatsapp_sessions::updated_at.eq(chrono::Utc::now()),
            ))
            .execute(conn)?;
        Ok::<_, diesel::result::Error>(())
    })?;
    Ok(())
}

/// Read-only export for diagnostics.
pub fn get_credential_dump(session_id: i64) -> GatewayResult<CredentialDump> {
    let creds = load_creds(session_id)?;
    let rows: Vec<DbSignalKey> = whatsapp_credentials::table
        .filter(whatsapp_credentials::session_id.eq(session_id))
        .select((
            whatsapp_credentials::key_type,
            whatsapp_credentials::key_id,
            whatsapp_credentials::value,
        ))
        .load(&mut connect()?)?;
    let keys = rows
        .into_iter()
        .map(|row| SignalKey {
            key_type: row.key_type,
            key_id: row.key_id,
            value: row.value,
        })
        .collect();
    Ok(CredentialDump { creds, keys })
}
