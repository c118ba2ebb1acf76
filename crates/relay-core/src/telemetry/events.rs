//! Synthetic interaction events and editor metrics for heartbeats.

use rand::Rng;
use serde_json::{json, Value};

/// Activity gap under which the user is treated as actively typing.
const TYPING_WINDOW_MS: i64 = 15_000;

fn backdated_time(max_backdate_ms: i64) -> String {
    let backdate = rand::thread_rng().gen_range(0..=max_backdate_ms);
    (chrono::Utc::now() - chrono::Duration::milliseconds(backdate)).to_rfc3339()
}

/// Generate plausibly-human interaction events for one heartbeat.
///
/// Recent real activity produces a burst of typing; an idle gap produces
/// sparse scroll/hover noise, occasionally with a window focus change —
/// the liveness-gap mitigation.
pub(crate) fn interaction_events(ms_since_activity: i64) -> Vec<Value> {
    let mut rng = rand::thread_rng();
    let mut events = Vec::new();

    if ms_since_activity < TYPING_WINDOW_MS {
        let count = rng.gen_range(3..=8);
        for _ in 0..count {
            events.push(json!({
                "event_type": "TYPING",
                "ui_element": "EDITOR_PANE",
                "event_time": backdated_time(5_000),
            }));
        }
        return events;
    }

    let count = rng.gen_range(1..=3);
    for _ in 0..count {
        let event_type = if rng.gen_bool(0.6) { "SCROLL" } else { "MOUSE_OVER" };
        events.push(json!({
            "event_type": event_type,
            "ui_element": "EDITOR_PANE",
            "event_time": backdated_time(10_000),
        }));
    }

    if rng.gen_bool(0.1) {
        let event_type = if rng.gen_bool(0.5) { "WINDOW_FOCUS" } else { "WINDOW_BLUR" };
        events.push(json!({
            "event_type": event_type,
            "ui_element": "IDE_WINDOW",
            "event_time": backdated_time(10_000),
        }));
    }

    events
}

/// Latency a real completion round-trip would show.
pub(crate) fn plausible_latency_ms() -> u64 {
    100 + rand::thread_rng().gen_range(0..600)
}

/// Randomized code-assist acceptance metrics.
pub(crate) fn code_assist_metrics() -> Value {
    let mut rng = rand::thread_rng();
    let shown: u32 = rng.gen_range(1..=3);
    let accepted: u32 = if rng.gen_bool(0.7) { 1 } else { 0 };
    let accept_rate =
        if shown > 0 { f64::from(accepted) / f64::from(shown) } else { 0.0 };
    let interaction_type = if accepted == 1 { "ACCEPT" } else { "DISMISS" };

    json!({
        "completions_shown": shown,
        "completions_accepted": accepted,
        "accept_rate": accept_rate,
        "latency_ms": plausible_latency_ms(),
        "interaction_type": interaction_type,
    })
}
