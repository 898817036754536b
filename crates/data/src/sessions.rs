//! The `WhatsappSession` row: the Supervisor's durable anchor for one
//! tenant's lifecycle state. Not a named component of its own, but shared
//! plumbing between the Credential Store and the Supervisor, so it lives in
//! the data crate rather than duplicated in both.

use chrono::Utc;
use diesel::prelude::*;
use wagate_core::error::GatewayResult;
use wagate_core::types::SessionStatus;

use crate::connect;
use crate::schema::whatsapp_sessions;

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = whatsapp_sessions)]
pub struct DbSession {
    pub id: i64,
    pub api_key: String,
    pub display_name: Option<String>,
    pub status: String,
    pub creds: Option<serde_json::Value>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

impl DbSession {
    pub fn status(&self) -> SessionStatus {
        self.status.parse().unwrap_or(SessionStatus::Error)
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = whatsapp_sessions)]
struct NewDbSession<'a> {
    api_key: &'a str,
    display_name: Option<&'a str>,
    status: &'a str,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

/// Upserts the session row for `api_key`: creates it DISCONNECTED on first
/// sight, otherwise only refreshes `displayName` when a new one is supplied.
pub fn upsert(api_key: &str, display_name: Option<&str>) -> GatewayResult<DbSession> {
    let conn = &mut connect()?;
    let now = Utc::now();
    let initial_status = SessionStatus::Disconnected.to_string();
    let row: DbSession = diesel::insert_into(whatsapp_sessions::table)
        .values(&NewDbSession {
            api_key,
            display_name,
            status: &initial_status,
            created_at: now,
            updated_at: now,
        })
        .on_conflict(whatsapp_sessions::api_key)
        .do_update()
        .set((
            whatsapp_sessions::display_name.eq(diesel::dsl::sql::<diesel::sql_types::Nullable<diesel::sql_types::Text>>(
                "coalesce(excluded.display_name, whatsapp_sessions.display_name)",
            )),
            whatsapp_sessions::updated_at.eq(now),
        ))
        .get_result(conn)?;
    Ok(row)
}

pub fn find_by_api_key(api_key: &str) -> GatewayResult<Option<DbSession>> {
    let row = whatsapp_sessions::table
        .filter(whatsapp_sessions::api_key.eq(api_key))
        .first(&mut connect()?)
        .optional()?;
    Ok(row)
}

pub fn list() -> GatewayResult<Vec<DbSession>> {
    let rows = whatsapp_sessions::table
        .order(whatsapp_sessions::created_at.desc())
        .load(&mut connect()?)?;
    Ok(rows)
}

/// Sessions with status CONNECTED or DISCONNECTED and a stored credential
/// blob: the warm-up candidate set for `warmSessions`.
pub fn list_warmup_candidates() -> GatewayResult<Vec<DbSession>> {
    let connected = SessionStatus::Connected.to_string();
    let disconnected = SessionStatus::Disconnected.to_string();
    let rows: Vec<DbSession> = whatsapp_sessions::table
        .filter(whatsapp_sessions::status.eq_any([connected, disconnected]))
        .filter(whatsapp_sessions::creds.is_not_null())
        .load(&mut connect()?)?;
    Ok(rows)
}

pub fn set_status(session_id: i64, status: SessionStatus) -> GatewayResult<()> {
    diesel::update(whatsapp_sessions::table.find(session_id))
        .set((
            whatsapp_sessions::status.eq(status.to_string()),
            whatsapp_sessions::updated_at.eq(Utc::now()),
        ))
        .execute(&mut connect()?)?;
    Ok(())
}
