// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rule evaluation: sliding windows, the four evaluator families, the rule
//! registry, and shared runtime state.
//!
//! Every evaluator consumes its own dispatcher target, borrows one rule
//! snapshot per iteration, and emits [`AlarmIntent`]s gated by debounce and
//! the open-alarm dedup check.

pub mod lastdata;
pub mod offline;
pub mod registry;
pub mod roc;
pub mod runtime;
pub mod threshold;
pub mod volatility;
pub mod window;

use tokio::sync::mpsc;

use crate::model::{AlarmIntent, AlarmRule};
use crate::store::AlarmStore;
use runtime::RuleRuntime;

/// Debounce default applied when a rule carries none; protects the store
/// from re-query storms.
pub const DEFAULT_DEBOUNCE_MS: i64 = 60_000;

/// Effective debounce for a rule.
fn debounce_ms(rule: &AlarmRule) -> i64 {
    if rule.debounce_ms > 0 {
        rule.debounce_ms
    } else {
        DEFAULT_DEBOUNCE_MS
    }
}

/// Shared emission gate: debounce, then open-alarm dedup, then send.
///
/// An open alarm for the code records a debounce stamp so the store is not
/// re-queried on every matching sample. Returns true when an intent was
/// sent.
pub(crate) async fn try_emit(
    runtime: &RuleRuntime,
    store: &dyn AlarmStore,
    intents: &mpsc::Sender<AlarmIntent>,
    rule: &AlarmRule,
    device_id: &str,
    tag_id: &str,
    ts: i64,
    value: f64,
) -> bool {
    let code = rule.code();
    if runtime.debounced(&code, ts, debounce_ms(rule)) {
        return false;
    }

    match store.has_open_by_code(&code).await {
        Ok(true) => {
            runtime.note_emission(&code, ts);
            return false;
        }
        Ok(false) => {}
        Err(e) => {
            tracing::warn!(code = %code, err = %e, "open-alarm check failed, suppressing emit");
            return false;
        }
    }

    let intent = AlarmIntent {
        device_id: device_id.to_owned(),
        tag_id: tag_id.to_owned(),
        ts,
        severity: rule.severity,
        code: code.clone(),
        message: rule.render_message(device_id, tag_id, value),
    };
    if intents.send(intent).await.is_err() {
        tracing::debug!(code = %code, "alarm sink gone, intent dropped");
        return false;
    }
    runtime.note_emission(&code, ts);
    true
}
