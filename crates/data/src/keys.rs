//! Tenant Key Registry: generate, list, validate, and revoke API keys.

use chrono::Utc;
use diesel::prelude::*;
use rand::RngCore;
use wagate_core::error::{GatewayError, GatewayResult};
use wagate_core::types::ApiKey;

use crate::connect;
use crate::schema::api_keys;

const KEY_PREFIX: &str = "wak_";
const KEY_BYTES: usize = 24; // 192 bits of entropy.
const GENERATE_ATTEMPTS: u8 = 5;

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = api_keys, primary_key(key))]
struct DbApiKey {
    key: String,
    label: Option<String>,
    is_active: bool,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl From<DbApiKey> for ApiKey {
    fn from(row: DbApiKey) -> Self {
        ApiKey {
            key: row.key,
            label: row.label,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = api_keys)]
struct NewDbApiKey<'a> {
    key: &'a str,
    label: Option<&'a str>,
    is_active: bool,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

/// Newest-first list of every registered key, active or not.
pub fn list() -> GatewayResult<Vec<ApiKey>> {
    let rows: Vec<DbApiKey> = api_keys::table
        .order(api_keys::created_at.desc())
        .load(&mut connect()?)?;
    Ok(rows.into_iter().map(ApiKey::from).collect())
}

/// Generates a fresh key, retrying on the (astronomically unlikely) chance of
/// a unique-constraint collision up to [`GENERATE_ATTEMPTS`] times.
pub fn generate(label: Option<&str>) -> GatewayResult<ApiKey> {
    for _ in 0..GENERATE_ATTEMPTS {
        let key = random_key();
        let now = Utc::now();
        let conn = &mut connect()?;
        let inserted = diesel::insert_into(api_keys::table)
            .values(&NewDbApiKey {
                key: &key,
                label,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .on_conflict(api_keys::key)
            .do_nothing()
            .execute(conn)?;

        if inserted == 1 {
            return Ok(ApiKey {
                key,
                label: label.map(str::to_owned),
                is_active: true,
                created_at: now,
                updated_at: now,
            });
        }
    }
    Err(GatewayError::KeyExhaustion)
}

fn random_key() -> String {
    let mut buf = [0u8; KEY_BYTES];
    rand::rng().fill_bytes(&mut buf);
    let mut out = String::with_capacity(KEY_PREFIX.len() + KEY_BYTES * 2);
    out.push_str(KEY_PREFIX);
    for byte in buf {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Trims whitespace and resolves an active key, or uniformly signals
/// `NotRegistered` for both a missing and a deactivated key.
pub fn assert_active(key: &str) -> GatewayResult<ApiKey> {
    let trimmed = key.trim();
    let row: Option<DbApiKey> = api_keys::table
        .find(trimmed)
        .first(&mut connect()?)
        .optional()?;
    match row {
        Some(row) if row.is_active => Ok(ApiKey::from(row)),
        _ => Err(GatewayError::KeyNotRegistered),
    }
}

/// Flips `isActive` off; returns `None` when the key does not exist.
pub fn deactivate(key: &str) -> GatewayResult<Option<ApiKey>> {
    let conn = &mut connect()?;
    let now = Utc::now();
    let updated: Option<DbApiKey> = diesel::update(api_keys::table.find(key))
        .set((api_keys::is_active.eq(false), api_keys::updated_at.eq(now)))
        .get_result(conn)
        .optional()?;
    Ok(updated.map(ApiKey::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_key_has_prefix_and_hex_body() {
        let key = random_key();
        assert!(key.starts_with(KEY_PREFIX));
        let body = &key[KEY_PREFIX.len()..];
        assert_eq!(body.len(), KEY_BYTES * 2);
        assert!(body.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn random_key_is_not_trivially_repeated() {
        assert_ne!(random_key(), random_key());
    }
}
