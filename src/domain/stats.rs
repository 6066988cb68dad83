//! Click/PV/UV/UIP aggregate.
//!
//! Grounded on `original_source/internal/link_stats/domain/link_stats/link_stats.go`'s
//! `UnmarshalStatsFromDB`: counters are constructed, never mutated field by
//! field, and the constructor itself enforces non-negativity so an
//! out-of-range row can never silently become a valid aggregate.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("stats counter must be non-negative, got {0}")]
pub struct NegativeCounter(i64);

/// Click/PV/UV/UIP counters for one short link, split into lifetime and
/// today buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub click_num: i64,
    pub total_pv: i64,
    pub total_uv: i64,
    pub total_uip: i64,
    pub today_pv: i64,
    pub today_uv: i64,
    pub today_uip: i64,
}

impl Stats {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        click_num: i64,
        total_pv: i64,
        total_uv: i64,
        total_uip: i64,
        today_pv: i64,
        today_uv: i64,
        today_uip: i64,
    ) -> Result<Self, NegativeCounter> {
        for value in [
            click_num, total_pv, total_uv, total_uip, today_pv, today_uv, today_uip,
        ] {
            if value < 0 {
                return Err(NegativeCounter(value));
            }
        }
        Ok(Self {
            click_num,
            total_pv,
            total_uv,
            total_uip,
            today_pv,
            today_uv,
            today_uip,
        })
    }

    /// Increment applied when processing one `VisitEvent`: PV always, UV/UIP
    /// only when the caller has already established idempotency (the
    /// `SADD`-based flag in the stats sink returned "newly added").
    pub fn record_visit(&mut self, is_new_uv: bool, is_new_uip: bool) {
        self.click_num += 1;
        self.total_pv += 1;
        self.today_pv += 1;
        if is_new_uv {
            self.total_uv += 1;
            self.today_uv += 1;
        }
        if is_new_uip {
            self.total_uip += 1;
            self.today_uip += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_counter() {
        assert!(Stats::new(-1, 0, 0, 0, 0, 0, 0).is_err());
    }

    #[test]
    fn record_visit_always_bumps_pv_conditionally_bumps_uv_uip() {
        let mut stats = Stats::default();
        stats.record_visit(true, false);
        assert_eq!(stats.click_num, 1);
        assert_eq!(stats.total_pv, 1);
        assert_eq!(stats.total_uv, 1);
        assert_eq!(stats.total_uip, 0);

        stats.record_visit(false, false);
        assert_eq!(stats.total_pv, 2);
        assert_eq!(stats.total_uv, 1);
    }
}
