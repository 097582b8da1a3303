//! Redis-backed transient store for invocation lifecycle records (§4.B).

use chrono::Utc;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tmi_common::{InvocationId, UserId};
use tracing::warn;

use crate::error::{Error, Result};
use crate::invocation::{ACTIVE_POINTER_TTL_SECS, INVOCATION_TTL_SECS, Invocation};

fn invocation_key(id: InvocationId) -> String {
    format!("addon:invocation:{}", id.as_uuid())
}

fn active_key(user_id: UserId) -> String {
    format!("addon:active:{}", user_id.as_uuid())
}

#[derive(Clone)]
pub struct InvocationStore {
    conn: ConnectionManager,
}

impl InvocationStore {
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn insert(&mut self, invocation: &Invocation) -> Result<()> {
        let blob = serde_json::to_string(invocation)?;
        let key = invocation_key(invocation.id);
        let active = active_key(invocation.invoked_by_uuid);

        redis::pipe()
            .set_ex(&key, &blob, INVOCATION_TTL_SECS)
            .set_ex(&active, invocation.id.as_uuid().to_string(), ACTIVE_POINTER_TTL_SECS)
            .query_async::<()>(&mut self.conn)
            .await?;
        Ok(())
    }

    pub async fn get(&mut self, id: InvocationId) -> Result<Invocation> {
        let blob: Option<String> = self.conn.get(invocation_key(id)).await?;
        let blob = blob.ok_or(Error::NotFound(id.as_uuid()))?;
        Ok(serde_json::from_str(&blob)?)
    }

    pub async fn save(&mut self, invocation: &Invocation) -> Result<()> {
        let blob = serde_json::to_string(invocation)?;
        self.conn.set_ex::<_, _, ()>(invocation_key(invocation.id), blob, INVOCATION_TTL_SECS).await?;
        Ok(())
    }

    /// The single active (non-terminal) invocation a user currently has outstanding, if any.
    pub async fn active_for_user(&mut self, user_id: UserId) -> Result<Option<Invocation>> {
        let raw: Option<String> = self.conn.get(active_key(user_id)).await?;
        let Some(raw) = raw else { return Ok(None) };
        let Ok(uuid) = raw.parse() else { return Ok(None) };
        match self.get(InvocationId::from_uuid(uuid)).await {
            Ok(inv) if !inv.status.is_terminal() => Ok(Some(inv)),
            Ok(_) => Ok(None),
            Err(Error::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn count_active_for_user(&mut self, user_id: UserId) -> Result<u64> {
        Ok(u64::from(self.active_for_user(user_id).await?.is_some()))
    }

    /// Count of non-terminal invocations currently outstanding for `addon_id`
    /// (§4.B `CountActive(addon_id)`), across all users.
    pub async fn count_active(&mut self, addon_id: &str) -> Result<u64> {
        let matching = self
            .scan_all(|inv| inv.addon_id == addon_id && !inv.status.is_terminal())
            .await?;
        Ok(matching.len() as u64)
    }

    /// Up to `limit` non-terminal invocations for `user_id`, most recent
    /// first (§4.B `ListActiveForUser(user_uuid, limit)`).
    pub async fn list_active_for_user(&mut self, user_id: UserId, limit: usize) -> Result<Vec<Invocation>> {
        let mut matching = self
            .scan_all(|inv| inv.invoked_by_uuid == user_id && !inv.status.is_terminal())
            .await?;
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        Ok(matching)
    }

    /// Apply a status update and persist it, clearing the user's active-pointer
    /// key once the invocation reaches a terminal status (§4.B invariants).
    pub async fn update_status(
        &mut self,
        id: InvocationId,
        status: crate::invocation::InvocationStatus,
        status_percent: i32,
        status_message: Option<String>,
    ) -> Result<Invocation> {
        let mut invocation = self.get(id).await?;
        invocation.apply_status_update(status, status_percent, status_message, Utc::now())?;
        self.save(&invocation).await?;
        if invocation.status.is_terminal() {
            let key = active_key(invocation.invoked_by_uuid);
            let pointed: Option<String> = self.conn.get(&key).await?;
            if pointed.as_deref() == Some(invocation.id.as_uuid().to_string().as_str()) {
                let _: () = self.conn.del(&key).await?;
            }
        }
        Ok(invocation)
    }

    /// Scan all invocation records and return the non-terminal ones whose
    /// `last_activity_at` has exceeded the staleness timeout.
    ///
    /// `SCAN`-and-filter per §4.B: there is no secondary index by staleness,
    /// so this walks every `addon:invocation:*` key. Acceptable at the scale
    /// this core targets; a busier deployment would want a sorted-set index.
    pub async fn list_stale(&mut self) -> Result<Vec<Invocation>> {
        let now = Utc::now();
        self.scan_all(|inv| inv.is_stale(now)).await
    }

    /// List invocations visible to `user_id` (§6 `GET /invocations`):
    /// everything when `is_admin`, otherwise only invocations the caller
    /// made, optionally filtered by `status`. Same SCAN-and-filter approach
    /// as `list_stale` — there is no secondary index by owner either.
    pub async fn list_for_user(
        &mut self,
        user_id: UserId,
        is_admin: bool,
        status: Option<crate::invocation::InvocationStatus>,
    ) -> Result<Vec<Invocation>> {
        let mut matching = self
            .scan_all(|inv| {
                (is_admin || inv.invoked_by_uuid == user_id) && status.is_none_or(|s| s == inv.status)
            })
            .await?;
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn scan_all(&mut self, mut predicate: impl FnMut(&Invocation) -> bool) -> Result<Vec<Invocation>> {
        let mut matched = Vec::new();
        let mut cursor = 0u64;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg("addon:invocation:*")
                .arg("COUNT")
                .arg(200)
                .query_async(&mut self.conn)
                .await?;

            for key in keys {
                let blob: Option<String> = self.conn.get(&key).await?;
                let Some(blob) = blob else { continue };
                match serde_json::from_str::<Invocation>(&blob) {
                    Ok(inv) if predicate(&inv) => matched.push(inv),
                    Ok(_) => {}
                    Err(err) => warn!(%key, %err, "failed to decode invocation record during scan"),
                }
            }

            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        Ok(matched)
    }
}
