//! Visit-event consumer: materialises click/PV/UV/UIP counters.
//!
//! Grounded on
//! `original_source/internal/link_stats/adapter/link_stats_repository.go`'s
//! `SaveLinkStats`: a per-shortUri lock held for the whole handler, `SADD`
//! on two sets to derive "first visit today" flags, seven
//! upsert-with-increment writes plus one access-log append, and a rollup
//! onto the `link` row's lifetime counters.

use async_trait::async_trait;
use chrono::{Datelike, Timelike};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::domain::VisitEvent;
use crate::eventbus::{EventBusError, EventListener};
use crate::geo::GeoLocator;
use crate::lock::Locker;

/// Go's original passes `-1` ("until released") for this lock; Redis `SET
/// NX EX` requires a positive TTL, so this is a long upper bound instead —
/// a crashed consumer still releases the shard within an hour rather than
/// holding it forever.
const GID_UPDATE_LOCK_TTL: Duration = Duration::from_secs(3600);

fn uv_set_key(short_uri: &str) -> String {
    format!("linkStatsUv:{short_uri}")
}

fn uip_set_key(short_uri: &str) -> String {
    format!("linkStatsUip:{short_uri}")
}

fn gid_update_lock_key(short_uri: &str) -> String {
    format!("lockGidUpdate:{short_uri}")
}

pub struct StatsSink<K, L> {
    pool: PgPool,
    kv: Arc<K>,
    locker: Arc<L>,
    geo: Arc<dyn GeoLocator>,
}

impl<K, L> StatsSink<K, L>
where
    K: crate::safecache::KvStore,
    L: Locker,
{
    pub fn new(pool: PgPool, kv: Arc<K>, locker: Arc<L>, geo: Arc<dyn GeoLocator>) -> Self {
        Self {
            pool,
            kv,
            locker,
            geo,
        }
    }

    pub async fn record(&self, event: &VisitEvent) -> Result<(), EventBusError> {
        let lock_key = gid_update_lock_key(&event.short_uri);
        let token = self
            .locker
            .acquire(&lock_key, GID_UPDATE_LOCK_TTL)
            .await
            .map_err(|err| EventBusError::Transport(err.to_string()))?
            .ok_or_else(|| EventBusError::Transport(format!("could not acquire {lock_key}")))?;

        let result = self.record_locked(event).await;

        if let Err(err) = self.locker.release(&lock_key, &token).await {
            error!(?err, lock_key, "failed to release gid-update lock");
        }

        result
    }

    async fn record_locked(&self, event: &VisitEvent) -> Result<(), EventBusError> {
        let is_new_uv = self
            .kv
            .sadd(&uv_set_key(&event.short_uri), &event.uv_token)
            .await
            .map_err(|err| EventBusError::Transport(err.to_string()))?;
        let is_new_uip = self
            .kv
            .sadd(&uip_set_key(&event.short_uri), &event.remote_addr)
            .await
            .map_err(|err| EventBusError::Transport(err.to_string()))?;
        let uv_flag = i32::from(is_new_uv);
        let uip_flag = i32::from(is_new_uip);

        let date = event.current_date.date_naive();
        let hour = event.current_date.hour() as i32;
        let week_day = event.current_date.weekday().number_from_monday() as i32;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| EventBusError::Transport(err.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO link_access_stat (short_uri, date, hour, week, pv, uv, uip)
            VALUES ($1, $2, $3, $4, 1, $5, $6)
            ON CONFLICT (short_uri, date, hour) DO UPDATE SET
                pv = link_access_stat.pv + 1,
                uv = link_access_stat.uv + EXCLUDED.uv,
                uip = link_access_stat.uip + EXCLUDED.uip
            "#,
        )
        .bind(&event.short_uri)
        .bind(date)
        .bind(hour)
        .bind(week_day)
        .bind(uv_flag)
        .bind(uip_flag)
        .execute(&mut *tx)
        .await
        .map_err(|err| EventBusError::Transport(err.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO link_stats_today (short_uri, date, today_pv, today_uv, today_uip)
            VALUES ($1, $2, 1, $3, $4)
            ON CONFLICT (short_uri, date) DO UPDATE SET
                today_pv = link_stats_today.today_pv + 1,
                today_uv = link_stats_today.today_uv + EXCLUDED.today_uv,
                today_uip = link_stats_today.today_uip + EXCLUDED.today_uip
            "#,
        )
        .bind(&event.short_uri)
        .bind(date)
        .bind(uv_flag)
        .bind(uip_flag)
        .execute(&mut *tx)
        .await
        .map_err(|err| EventBusError::Transport(err.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO link_os_stat (os, short_uri, date, cnt)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (os, short_uri, date) DO UPDATE SET cnt = link_os_stat.cnt + 1
            "#,
        )
        .bind(&event.os)
        .bind(&event.short_uri)
        .bind(date)
        .execute(&mut *tx)
        .await
        .map_err(|err| EventBusError::Transport(err.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO link_browser_stat (browser, short_uri, date, cnt)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (browser, short_uri, date) DO UPDATE SET cnt = link_browser_stat.cnt + 1
            "#,
        )
        .bind(&event.browser)
        .bind(&event.short_uri)
        .bind(date)
        .execute(&mut *tx)
        .await
        .map_err(|err| EventBusError::Transport(err.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO link_device_stat (device, short_uri, date, cnt)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (device, short_uri, date) DO UPDATE SET cnt = link_device_stat.cnt + 1
            "#,
        )
        .bind(&event.device)
        .bind(&event.short_uri)
        .bind(date)
        .execute(&mut *tx)
        .await
        .map_err(|err| EventBusError::Transport(err.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO link_network_stat (network, short_uri, date, cnt)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (network, short_uri, date) DO UPDATE SET cnt = link_network_stat.cnt + 1
            "#,
        )
        .bind(&event.network)
        .bind(&event.short_uri)
        .bind(date)
        .execute(&mut *tx)
        .await
        .map_err(|err| EventBusError::Transport(err.to_string()))?;

        // A lookup failure falls back to the "unknown" bucket rather than
        // skipping the row, keeping the per-dimension counters' sum equal to
        // total_pv.
        let location = self
            .geo
            .locate(&event.remote_addr)
            .await
            .unwrap_or(crate::geo::Location {
                province: "unknown".to_string(),
                city: "unknown".to_string(),
                country: "unknown".to_string(),
            });

        sqlx::query(
            r#"
            INSERT INTO link_locale_stat (short_uri, date, province, city, country, cnt)
            VALUES ($1, $2, $3, $4, $5, 1)
            ON CONFLICT (short_uri, date, province) DO UPDATE SET cnt = link_locale_stat.cnt + 1
            "#,
        )
        .bind(&event.short_uri)
        .bind(date)
        .bind(&location.province)
        .bind(&location.city)
        .bind(&location.country)
        .execute(&mut *tx)
        .await
        .map_err(|err| EventBusError::Transport(err.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO link_access_log
                (short_uri, user_agent, remote_addr, os, browser, device, network, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&event.short_uri)
        .bind(&event.user_agent)
        .bind(&event.remote_addr)
        .bind(&event.os)
        .bind(&event.browser)
        .bind(&event.device)
        .bind(&event.network)
        .bind(event.current_date)
        .execute(&mut *tx)
        .await
        .map_err(|err| EventBusError::Transport(err.to_string()))?;

        sqlx::query(
            r#"
            UPDATE link SET
                total_pv = total_pv + 1,
                total_uv = total_uv + $1,
                total_uip = total_uip + $2
            WHERE short_uri = $3
            "#,
        )
        .bind(uv_flag)
        .bind(uip_flag)
        .bind(&event.short_uri)
        .execute(&mut *tx)
        .await
        .map_err(|err| EventBusError::Transport(err.to_string()))?;

        tx.commit()
            .await
            .map_err(|err| EventBusError::Transport(err.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl<K, L> EventListener for StatsSink<K, L>
where
    K: crate::safecache::KvStore,
    L: Locker,
{
    async fn process(&self, body: &[u8]) -> Result<(), EventBusError> {
        let event: VisitEvent = serde_json::from_slice(body)?;
        self.record(&event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Stats;

    #[test]
    fn idempotent_sadd_flags_compose_with_stats_record_visit() {
        // This mirrors the at-least-once caveat in spec §4.8: a retried
        // message sees is_new_uv/is_new_uip both false on the second
        // attempt, so only pv keeps incrementing — non-idempotent by
        // design, matching `Stats::record_visit`'s own contract.
        let mut stats = Stats::default();
        stats.record_visit(true, true);
        stats.record_visit(false, false);
        assert_eq!(stats.total_pv, 2);
        assert_eq!(stats.total_uv, 1);
        assert_eq!(stats.total_uip, 1);
    }
}
