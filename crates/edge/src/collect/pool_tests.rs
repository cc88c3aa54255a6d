// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::*;
use crate::collect::client::TagRead;
use crate::model::{PlcFamily, Protocol, TagDescriptor};

struct FakeHandle;

#[async_trait]
impl ProtocolHandle for FakeHandle {
    async fn read_batch(&mut self, _tags: &[TagDescriptor]) -> Result<Vec<TagRead>, ProtocolError> {
        Ok(Vec::new())
    }
}

struct FakeClient {
    connects: AtomicUsize,
    fail_no_route: AtomicBool,
}

impl FakeClient {
    fn new() -> Arc<Self> {
        Arc::new(Self { connects: AtomicUsize::new(0), fail_no_route: AtomicBool::new(false) })
    }
}

#[async_trait]
impl ProtocolClient for FakeClient {
    async fn connect(
        &self,
        endpoint: &EndpointDescriptor,
    ) -> Result<Box<dyn ProtocolHandle>, ProtocolError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_no_route.load(Ordering::SeqCst) {
            return Err(ProtocolError::NoRoute(endpoint.host.clone()));
        }
        Ok(Box::new(FakeHandle))
    }
}

fn endpoint(family: PlcFamily, max_connections: usize) -> EndpointDescriptor {
    EndpointDescriptor {
        endpoint_id: "ep-1".to_owned(),
        protocol: Protocol::Cip,
        host: "10.0.0.5".to_owned(),
        port: 44818,
        cip_path: Some("1,0".to_owned()),
        family,
        security_policy: None,
        username: None,
        password: None,
        max_connections,
    }
}

#[tokio::test]
async fn clamp_limits_concurrent_handles_per_family() {
    let client = FakeClient::new();
    let pool = ConnectionPool::new(client, None);
    let ep = endpoint(PlcFamily::Micro800, 10); // clamped to 2

    let h1 = pool.acquire(&ep).await.unwrap();
    let _h2 = pool.acquire(&ep).await.unwrap();
    match pool.acquire(&ep).await.map(|_| ()) {
        Err(PoolError::Busy { limit, .. }) => assert_eq!(limit, 2),
        other => panic!("expected Busy, got {other:?}"),
    }

    // Releasing frees a slot.
    pool.release(&ep.endpoint_id, h1, true);
    assert!(pool.acquire(&ep).await.is_ok());
}

#[tokio::test]
async fn released_handle_is_reused_without_reconnect() {
    let client = FakeClient::new();
    let pool = ConnectionPool::new(Arc::clone(&client) as Arc<dyn ProtocolClient>, None);
    let ep = endpoint(PlcFamily::Generic, 4);

    let h = pool.acquire(&ep).await.unwrap();
    pool.release(&ep.endpoint_id, h, true);
    let _h = pool.acquire(&ep).await.unwrap();
    assert_eq!(client.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unhealthy_release_discards_handle() {
    let client = FakeClient::new();
    let pool = ConnectionPool::new(Arc::clone(&client) as Arc<dyn ProtocolClient>, None);
    let ep = endpoint(PlcFamily::Generic, 4);

    let h = pool.acquire(&ep).await.unwrap();
    pool.release(&ep.endpoint_id, h, false);
    let _h = pool.acquire(&ep).await.unwrap();
    assert_eq!(client.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn faulted_endpoint_fails_fast_until_backoff_expires() {
    let client = FakeClient::new();
    let pool = ConnectionPool::new(Arc::clone(&client) as Arc<dyn ProtocolClient>, None);
    let ep = endpoint(PlcFamily::Generic, 4);

    client.fail_no_route.store(true, Ordering::SeqCst);
    // First failure: step 0 backoff is zero, so the endpoint faults but the
    // next acquire may retry immediately; the second failure opens a 1 s
    // window.
    assert!(pool.acquire(&ep).await.is_err());
    assert!(pool.acquire(&ep).await.is_err());
    let connects_so_far = client.connects.load(Ordering::SeqCst);
    assert_eq!(connects_so_far, 2);

    // Inside the window, acquire fails without dialing.
    match pool.acquire(&ep).await.map(|_| ()) {
        Err(PoolError::Faulted { retry_in_ms, .. }) => assert!(retry_in_ms > 0),
        other => panic!("expected Faulted, got {other:?}"),
    }
    assert_eq!(client.connects.load(Ordering::SeqCst), connects_so_far);

    // Past the window, the dial is retried and success resets the backoff.
    tokio::time::advance(Duration::from_millis(1_100)).await;
    client.fail_no_route.store(false, Ordering::SeqCst);
    let h = pool.acquire(&ep).await.unwrap();
    pool.release(&ep.endpoint_id, h, true);
    assert_eq!(pool.condition(&ep.endpoint_id), Some(EndpointCondition::Connected));
}

#[tokio::test(start_paused = true)]
async fn backoff_schedule_advances_and_caps() {
    let client = FakeClient::new();
    let pool = ConnectionPool::new(client, None);
    let ep = endpoint(PlcFamily::Generic, 4);

    // Seed the slot.
    let h = pool.acquire(&ep).await.unwrap();
    pool.release(&ep.endpoint_id, h, true);

    let mut seen = Vec::new();
    for _ in 0..9 {
        seen.push(pool.mark_faulted(&ep.endpoint_id, "test"));
        // Step out of the window so the next fault measures the next step.
        tokio::time::advance(Duration::from_secs(61)).await;
    }
    assert_eq!(seen, vec![0, 1_000, 2_000, 5_000, 10_000, 30_000, 60_000, 60_000, 60_000]);
}

#[tokio::test(start_paused = true)]
async fn condition_transitions_publish_events_once() {
    use crate::events::{EdgeEvent, EventHub};

    let client = FakeClient::new();
    let events = Arc::new(EventHub::new());
    let mut rx = events.subscribe();
    let pool = ConnectionPool::new(
        Arc::clone(&client) as Arc<dyn ProtocolClient>,
        Some(events),
    );
    let ep = endpoint(PlcFamily::Generic, 4);

    // First success: the slot is born Connected, no transition.
    let h = pool.acquire(&ep).await.unwrap();
    pool.release(&ep.endpoint_id, h, true);
    assert!(rx.try_recv().is_err());

    // Repeated faults publish the Faulted transition exactly once.
    pool.mark_faulted(&ep.endpoint_id, "no route");
    pool.mark_faulted(&ep.endpoint_id, "no route");
    match rx.try_recv().unwrap() {
        EdgeEvent::EndpointStateChanged { endpoint_id, state } => {
            assert_eq!(endpoint_id, "ep-1");
            assert_eq!(state, "faulted");
        }
        other => panic!("expected EndpointStateChanged, got {other:?}"),
    }
    assert!(rx.try_recv().is_err());

    // Recovery (past the backoff window) publishes the Connected
    // transition.
    tokio::time::advance(Duration::from_millis(1_100)).await;
    let h = pool.acquire(&ep).await.unwrap();
    pool.release(&ep.endpoint_id, h, true);
    match rx.try_recv().unwrap() {
        EdgeEvent::EndpointStateChanged { state, .. } => assert_eq!(state, "connected"),
        other => panic!("expected EndpointStateChanged, got {other:?}"),
    }

    // A timeout degrades and publishes once.
    pool.mark_degraded(&ep.endpoint_id, "timeout");
    pool.mark_degraded(&ep.endpoint_id, "timeout");
    match rx.try_recv().unwrap() {
        EdgeEvent::EndpointStateChanged { state, .. } => assert_eq!(state, "degraded"),
        other => panic!("expected EndpointStateChanged, got {other:?}"),
    }
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn reap_drops_idle_endpoints_only() {
    let client = FakeClient::new();
    let pool = ConnectionPool::new(client, None);
    let idle_ep = endpoint(PlcFamily::Generic, 4);
    let mut busy_ep = endpoint(PlcFamily::Generic, 4);
    busy_ep.endpoint_id = "ep-2".to_owned();

    let h = pool.acquire(&idle_ep).await.unwrap();
    pool.release(&idle_ep.endpoint_id, h, true);
    let _held = pool.acquire(&busy_ep).await.unwrap();

    tokio::time::advance(Duration::from_secs(301)).await;
    assert_eq!(pool.reap(), 1);
    assert!(pool.condition(&idle_ep.endpoint_id).is_none());
    assert!(pool.condition(&busy_ep.endpoint_id).is_some());
}
