//! Session Lock: a durable single-owner lease keyed by `apiKey`, backed by
//! one conditional upsert per `acquire` so the create/refresh/steal/deny
//! decision is made in a single serialisable statement rather than a
//! read-then-write race.

use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use diesel::QueryableByName;
use wagate_core::error::GatewayResult;

use crate::connect;
use crate::schema::whatsapp_session_locks;

pub const TTL_SECONDS: i64 = 5 * 60;

#[derive(QueryableByName)]
struct AcquiredRow {
    #[diesel(sql_type = Text)]
    #[allow(dead_code)]
    api_key: String,
}

/// Atomically creates the row if absent, refreshes it if already owned by
/// `owner_id`, steals it if stale, or leaves it untouched otherwise. Returns
/// whether `owner_id` holds the lock afterwards.
pub fn acquire(api_key: &str, owner_id: &str, ttl_seconds: i64) -> GatewayResult<bool> {
    let conn = &mut connect()?;
    let rows: Vec<AcquiredRow> = diesel::sql_query(
        "INSERT INTO whatsapp_session_locks (api_key, owner_id, acquired_at) \
         VALUES ($1, $2, now()) \
         ON CONFLICT (api_key) DO UPDATE \
         SET owner_id = excluded.owner_id, acquired_at = excluded.acquired_at \
         WHERE whatsapp_session_locks.owner_id = excluded.owner_id \
            OR whatsapp_session_locks.acquired_at < now() - ($3 || ' seconds')::interval \
         RETURNING whatsapp_session_locks.api_key",
    )
    .bind::<Text, _>(api_key)
    .bind::<Text, _>(owner_id)
    .bind::<BigInt, _>(ttl_seconds)
    .load(conn)?;

    Ok(!rows.is_empty())
}

/// Refreshes `acquiredAt` only if `owner_id` currently holds the lock;
/// silent no-op otherwise.
pub fn touch(api_key: &str, owner_id: &str) -> GatewayResult<()> {
    diesel::update(
        whatsapp_session_locks::table
            .filter(whatsapp_session_locks::api_key.eq(api_key))
            .filter(whatsapp_session_locks::owner_id.eq(owner_id)),
    )
    .set(whatsapp_session_locks::acquired_at.eq(Utc::now()))
    .execute(&mut connect()?)?;
    Ok(())
}

/// Deletes the lock row only if `owner_id` currently holds it.
pub fn release(api_key: &str, owner_id: &str) -> GatewayResult<()> {
    diesel::delete(
        whatsapp_session_locks::table
            .filter(whatsapp_session_locks::api_key.eq(api_key))
            .filter(whatsapp_session_locks::owner_id.eq(owner_id)),
    )
    .execute(&mut connect()?)?;
    Ok(())
}

/// Deletes every row owned by `owner_id`, used on graceful shutdown.
pub fn release_all(owner_id: &str) -> GatewayResult<()> {
    diesel::delete(whatsapp_session_locks::table.filter(whatsapp_session_locks::owner_id.eq(owner_id)))
        .execute(&mut connect()?)?;
    Ok(())
}

pub fn get_owner(api_key: &str) -> GatewayResult<Option<String>> {
    let owner = whatsapp_session_locks::table
        .find(api_key)
        .select(whatsapp_session_locks::owner_id)
        .first(&mut connect()?)
        .optional()?;
    Ok(owner)
}
