// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::*;
use crate::store::memory::MemoryLastSeenStore;

#[test]
fn note_is_max_merge() {
    let t = LastDataTracker::new();
    t.note("d", "tag", 1_000);
    t.note("d", "tag", 500); // out-of-order arrival
    assert_eq!(t.get("d", "tag"), Some(1_000));

    t.note("d", "tag", 2_000);
    assert_eq!(t.get("d", "tag"), Some(2_000));
    assert_eq!(t.get("d", "other"), None);
}

#[test]
fn entries_for_tag_lists_devices() {
    let t = LastDataTracker::new();
    t.note("d1", "tag", 1_000);
    t.note("d2", "tag", 2_000);
    t.note("d1", "other", 3_000);

    let mut entries = t.entries_for_tag("tag");
    entries.sort();
    assert_eq!(entries, vec![("d1".to_owned(), 1_000), ("d2".to_owned(), 2_000)]);
}

#[tokio::test]
async fn flush_drains_pending_and_persists() {
    let t = LastDataTracker::new();
    let store = Arc::new(MemoryLastSeenStore::new());
    t.note("d", "tag", 1_000);

    flush(&t, store.as_ref()).await;
    assert_eq!(store.get("d", "tag").await, Some(1_000));
    assert!(t.take_pending().is_empty());
}

#[tokio::test]
async fn failed_flush_reenqueues_updates() {
    let t = LastDataTracker::new();
    let store = Arc::new(MemoryLastSeenStore::new());
    store.set_fail_upserts(true);
    t.note("d", "tag", 1_000);

    flush(&t, store.as_ref()).await;
    assert_eq!(store.get("d", "tag").await, None);

    // A newer observation arrives before the retry; the max wins.
    t.note("d", "tag", 1_500);
    store.set_fail_upserts(false);
    flush(&t, store.as_ref()).await;
    assert_eq!(store.get("d", "tag").await, Some(1_500));
}
