//! Refresh priority: how overdue a work is for another resolution pass.
//!
//! Newer works are refreshed more often than old ones. A score above zero
//! means the work is overdue; the larger, the more overdue.

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{OaStatus, Work};

/// Tuning constants for [`refresh_priority`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityConfig {
    /// Fixed score for works already gold or hybrid with a resolved DOI.
    pub settled_score: f64,
    /// Interval for works whose publication date is still ahead.
    pub unpublished_interval_days: i64,
    /// The interval is the work's age divided by this.
    pub age_divisor: i32,
    /// Interval multiplier for `component` records.
    pub component_multiplier: i32,
    pub min_interval_days: i64,
    pub max_interval_days: i64,
    /// Delayed-OA journals: the publication date is moved forward in steps
    /// of this many months, up to `delayed_oa_max_steps` times.
    pub delayed_oa_step_months: u32,
    pub delayed_oa_max_steps: u32,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            settled_score: -1.555,
            unpublished_interval_days: 365,
            age_divisor: 6,
            component_multiplier: 2,
            min_interval_days: 2,
            max_interval_days: 365,
            delayed_oa_step_months: 6,
            delayed_oa_max_steps: 8,
        }
    }
}

/// The publication date as seen by the refresh schedule. Closed and green
/// works in journals with a known embargo restart their clock when the
/// embargo ends.
fn effective_published(work: &Work, oa_status: OaStatus, today: NaiveDate, cfg: &PriorityConfig) -> NaiveDate {
    let mut published = work.published_date();
    if !matches!(oa_status, OaStatus::Closed | OaStatus::Green) {
        return published;
    }
    let scraped_landing_page = work
        .stored_scrape
        .as_ref()
        .is_some_and(|s| s.metadata_url.is_some());
    if scraped_landing_page {
        return published;
    }

    let policy = &work.journal_policy;
    if let Some(embargo) = policy.embargo_days {
        if published + Duration::days(embargo) < today {
            published += Duration::days(embargo);
        }
    } else if policy.delayed_oa {
        let step = Months::new(cfg.delayed_oa_step_months);
        let mut shifts = 0;
        while shifts < cfg.delayed_oa_max_steps {
            match (published.checked_add_months(step), today.checked_sub_months(step)) {
                (Some(next), Some(limit)) if published < limit => published = next,
                _ => break,
            }
            shifts += 1;
        }
    }
    published
}

/// Score how overdue `work` is for a refresh at `now`, given the OA status
/// of its latest resolution.
pub fn refresh_priority(work: &Work, oa_status: OaStatus, now: DateTime<Utc>, cfg: &PriorityConfig) -> f64 {
    let today = now.date_naive();

    let settled = matches!(work.current_oa_status, Some(OaStatus::Gold | OaStatus::Hybrid))
        && work.resolved_doi_status.is_some();
    if settled {
        return cfg.settled_score;
    }

    let mut interval = if work.published_date() > today {
        Duration::days(cfg.unpublished_interval_days)
    } else {
        let age = today - effective_published(work, oa_status, today, cfg);
        age / cfg.age_divisor.max(1)
    };
    if work.genre() == "component" {
        interval = interval * cfg.component_multiplier;
    }
    let interval = interval.clamp(
        Duration::days(cfg.min_interval_days),
        Duration::days(cfg.max_interval_days),
    );

    let last_refresh = work.last_refresh.unwrap_or(DateTime::UNIX_EPOCH);
    let since_last = now - last_refresh;
    (since_last - interval).num_seconds() as f64 / interval.num_seconds() as f64
}
