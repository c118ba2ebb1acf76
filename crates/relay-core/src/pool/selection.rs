//! Account selection policy and pool stats rollup.

use regex::Regex;
use serde::Serialize;

use relay_types::models::{Account, AccountStatus};

/// Models whose quota matters for "is this account still useful".
pub(crate) const CORE_MODEL_PATTERN: &str = r"(?i)sonnet|opus|pro|flash";

/// An account below this remaining fraction is treated as exhausted.
const MIN_REMAINING_FRACTION: f64 = 0.05;

/// Aggregate pool health for dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Enabled accounts (invalid ones included — they stay visible)
    pub total: usize,
    /// Accounts ready to serve core models
    pub active: usize,
    /// Enabled accounts currently not usable
    pub limited: usize,
}

/// Whether the account has quota headroom for `model`.
///
/// The specific model's quota wins when known; otherwise any core model's
/// quota counts. An account with no quota data at all passes — the first
/// real request will correct the optimism.
fn has_headroom(account: &Account, model: &str, core: &Regex) -> bool {
    if let Some(quota) = account.subscription.model_quota(model) {
        return quota.remaining_fraction > MIN_REMAINING_FRACTION;
    }

    let mut saw_core = false;
    for quota in &account.subscription.models {
        if core.is_match(&quota.name) {
            saw_core = true;
            if quota.remaining_fraction > MIN_REMAINING_FRACTION {
                return true;
            }
        }
    }
    !saw_core
}

fn least_recently_used<'a>(candidates: &[&'a Account]) -> Option<&'a Account> {
    candidates.iter().min_by_key(|a| a.last_used.unwrap_or(0)).copied()
}

/// Pick the next account for `model`, or `None` when the pool is empty.
///
/// Policy: enabled and valid accounts only; prefer healthy (`ok`)
/// accounts with quota headroom, least-recently-used first; fall back to
/// `unknown` and then `limited` status tiers.
pub(crate) fn pick(accounts: &[Account], model: &str, core: &Regex) -> Option<String> {
    let selectable: Vec<&Account> = accounts.iter().filter(|a| a.is_selectable()).collect();

    let healthy: Vec<&Account> = selectable
        .iter()
        .filter(|a| a.status == AccountStatus::Ok && has_headroom(a, model, core))
        .copied()
        .collect();
    if let Some(account) = least_recently_used(&healthy) {
        return Some(account.email.clone());
    }

    for tier in [AccountStatus::Unknown, AccountStatus::Limited] {
        let fallback: Vec<&Account> =
            selectable.iter().filter(|a| a.status == tier).copied().collect();
        if let Some(account) = least_recently_used(&fallback) {
            tracing::debug!("No healthy account, falling back to {:?} tier", tier);
            return Some(account.email.clone());
        }
    }

    None
}

/// Roll up pool health over enabled accounts.
///
/// `active` means `ok` with headroom on some core model; when an account
/// reports no core-model quota at all, any model's fraction counts.
pub(crate) fn rollup(accounts: &[Account], core: &Regex) -> PoolStats {
    let enabled: Vec<&Account> = accounts.iter().filter(|a| a.enabled).collect();

    let mut active = 0;
    for account in &enabled {
        if account.is_invalid || account.status != AccountStatus::Ok {
            continue;
        }
        let quotas = &account.subscription.models;
        let core_quotas: Vec<_> = quotas.iter().filter(|q| core.is_match(&q.name)).collect();
        let is_active = if core_quotas.is_empty() {
            quotas.iter().any(|q| q.remaining_fraction > MIN_REMAINING_FRACTION)
        } else {
            core_quotas.iter().any(|q| q.remaining_fraction > MIN_REMAINING_FRACTION)
        };
        if is_active {
            active += 1;
        }
    }

    PoolStats { total: enabled.len(), active, limited: enabled.len() - active }
}
