//! Integration tests for the RPC runtime across two documents on one bus.

use photon_core::rpc::{ApiHandler, CallContext, EventSink, MethodTable, RpcEndpoint, RpcHost};
use photon_core::transport::{ChannelTransport, MessageBus, Origin, OriginAllowList, Window};
use photon_core::{PhotonError, Result};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SHELL: &str = "https://shell.example";
const APP: &str = "https://notes.example";

struct Harness {
    bus: MessageBus,
    shell: RpcEndpoint,
    app: RpcEndpoint,
}

/// Host shell publishing `host`, with one app frame embedded under it.
fn harness(host: RpcHost) -> Harness {
    let bus = MessageBus::new();
    let shell_origin = Origin::parse(SHELL).unwrap();
    let app_origin = Origin::parse(APP).unwrap();

    let shell_window = bus.open_window(shell_origin.clone(), None);
    let app_window = bus.open_window(app_origin.clone(), Some(shell_window.id()));

    let shell = RpcEndpoint::spawn(
        ChannelTransport::new(shell_window, OriginAllowList::new([app_origin])),
        host,
    );
    let app = RpcEndpoint::spawn(
        ChannelTransport::new(app_window, OriginAllowList::new([shell_origin])),
        RpcHost::new(),
    );
    Harness { bus, shell, app }
}

fn constant(value: Value, hits: Arc<AtomicUsize>) -> MethodTable {
    MethodTable::new().method("get", move |_, _| {
        let value = value.clone();
        let hits = hits.clone();
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        }
    })
}

#[tokio::test(start_paused = true)]
async fn test_replies_correlate_in_reverse_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let seen = order.clone();
    let host = RpcHost::new();
    host.set(
        "timer",
        MethodTable::new().method("after", move |_, args| {
            let seen = seen.clone();
            async move {
                let label = args.first().cloned().unwrap_or(Value::Null);
                let ms = args.get(1).and_then(Value::as_u64).unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                seen.lock().unwrap().push(label.clone());
                Ok(label)
            }
        }),
    );
    let h = harness(host);
    let api = h.app.request_parent("timer").unwrap();

    let (a, b) = tokio::join!(
        api.call("after", vec![json!("a"), json!(100)]),
        api.call("after", vec![json!("b"), json!(10)]),
    );

    assert_eq!(a.unwrap(), json!("a"));
    assert_eq!(b.unwrap(), json!("b"));
    assert_eq!(*order.lock().unwrap(), vec![json!("b"), json!("a")]);
    assert_eq!(h.app.pending_calls(), 0);
}

#[tokio::test]
async fn test_replaced_capability_routes_to_second_only() {
    let first_hits = Arc::new(AtomicUsize::new(0));
    let second_hits = Arc::new(AtomicUsize::new(0));
    let host = RpcHost::new();
    host.set("x", constant(json!(1), first_hits.clone()));
    host.set("x", constant(json!(2), second_hits.clone()));
    let h = harness(host);

    let result = h.app.request_parent("x").unwrap().call("get", vec![]).await.unwrap();

    assert_eq!(result, json!(2));
    assert_eq!(first_hits.load(Ordering::SeqCst), 0);
    assert_eq!(second_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_handler_error_surfaces_message() {
    let host = RpcHost::new();
    host.set(
        "photon-os",
        MethodTable::new().method("apps_launchApp", |_, _| async {
            Err::<Value, _>(PhotonError::Other("boom".to_string()))
        }),
    );
    let h = harness(host);

    let err = h
        .app
        .request_parent("photon-os")
        .unwrap()
        .call("apps_launchApp", vec![json!({})])
        .await
        .unwrap_err();

    assert!(matches!(err, PhotonError::Remote { .. }));
    assert_eq!(err.to_string(), "boom");
}

#[tokio::test]
async fn test_unknown_method_is_no_such_capability() {
    let host = RpcHost::new();
    host.set("x", constant(json!(1), Arc::new(AtomicUsize::new(0))));
    let h = harness(host);

    let err = h.app.request_parent("x").unwrap().call("put", vec![]).await.unwrap_err();
    assert!(matches!(
        err,
        PhotonError::NoSuchCapability { ref api, ref method } if api == "x" && method == "put"
    ));

    let err = h.app.request_parent("y").unwrap().call("get", vec![]).await.unwrap_err();
    assert!(matches!(err, PhotonError::NoSuchCapability { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_clears_pending_call() {
    let host = RpcHost::new();
    host.set(
        "stuck",
        MethodTable::new().method("wait", |_, _| std::future::pending::<Result<Value>>()),
    );
    let h = harness(host);
    let api = h
        .app
        .request_parent("stuck")
        .unwrap()
        .with_timeout(Duration::from_millis(50));

    let err = api.call("wait", vec![]).await.unwrap_err();

    assert!(matches!(err, PhotonError::Timeout(_)));
    assert_eq!(h.app.pending_calls(), 0);
}

#[tokio::test]
async fn test_panicking_handler_reports_error() {
    let host = RpcHost::new();
    host.set(
        "fragile",
        MethodTable::new().method("explode", |_, _| async {
            if true {
                panic!("handler bug");
            }
            Ok(Value::Null)
        }),
    );
    let h = harness(host);
    let api = h.app.request_parent("fragile").unwrap();

    let err = api.call("explode", vec![]).await.unwrap_err();
    assert!(matches!(err, PhotonError::Remote { .. }));

    // The host keeps serving after a panic.
    let err = api.call("missing", vec![]).await.unwrap_err();
    assert!(matches!(err, PhotonError::NoSuchCapability { .. }));
}

#[tokio::test]
async fn test_unmatched_reply_is_ignored() {
    let host = RpcHost::new();
    host.set("x", constant(json!(7), Arc::new(AtomicUsize::new(0))));
    let h = harness(host);

    // A stray window sharing the shell's origin sends a reply nobody asked for.
    let stray: Window = h.bus.open_window(Origin::parse(SHELL).unwrap(), None);
    h.bus.post(
        stray.id(),
        h.app.local_id(),
        json!({"kind": "response", "requestId": 999, "result": 1}),
    );
    h.bus.post(stray.id(), h.app.local_id(), json!({"type": "not-rpc"}));

    let result = h.app.request_parent("x").unwrap().call("get", vec![]).await.unwrap();
    assert_eq!(result, json!(7));
    assert_eq!(h.app.pending_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disallowed_origin_gets_no_reply() {
    let host = RpcHost::new();
    host.set("x", constant(json!(1), Arc::new(AtomicUsize::new(0))));
    let h = harness(host);

    let evil_window = h
        .bus
        .open_window(Origin::parse("https://evil.example").unwrap(), Some(h.shell.local_id()));
    let evil = RpcEndpoint::spawn(
        ChannelTransport::new(evil_window, OriginAllowList::any()),
        RpcHost::new(),
    );

    let err = evil
        .request_parent("x")
        .unwrap()
        .with_timeout(Duration::from_millis(100))
        .call("get", vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, PhotonError::Timeout(_)));
}

#[tokio::test]
async fn test_request_parent_without_parent_fails() {
    let h = harness(RpcHost::new());
    assert!(matches!(
        h.shell.request_parent("x"),
        Err(PhotonError::Config { .. })
    ));
}

#[tokio::test]
async fn test_call_to_closed_window_times_out() {
    let bus = MessageBus::new();
    let origin = Origin::parse(APP).unwrap();
    let window = bus.open_window(origin.clone(), None);
    let target = bus.open_window(origin.clone(), None);
    let target_id = target.id();
    drop(target);

    let endpoint = RpcEndpoint::spawn(
        ChannelTransport::new(window, OriginAllowList::new([origin])),
        RpcHost::new(),
    );
    let err = endpoint
        .request("x", target_id)
        .with_timeout(Duration::from_millis(20))
        .call("get", vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, PhotonError::Timeout(_)));
}

/// Publishes two events during subscribe, before the acknowledgment.
struct Ticker {
    unsubscribed: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl ApiHandler for Ticker {
    async fn call(&self, ctx: &CallContext, method: &str, _args: Vec<Value>) -> Result<Value> {
        Err(ctx.no_such_capability(method))
    }

    async fn subscribe(&self, ctx: &CallContext, topic: &str, sink: EventSink) -> Result<()> {
        if topic != "ticks" {
            return Err(ctx.no_such_capability(topic));
        }
        sink.emit(json!(1));
        sink.emit(json!(2));
        Ok(())
    }

    async fn unsubscribe(&self, _ctx: &CallContext, _topic: &str, _id: u64) -> Result<()> {
        self.unsubscribed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_subscription_buffers_early_events() {
    let unsubscribed = Arc::new(AtomicUsize::new(0));
    let host = RpcHost::new();
    host.set(
        "ticker",
        Ticker {
            unsubscribed: unsubscribed.clone(),
        },
    );
    let h = harness(host);
    let api = h.app.request_parent("ticker").unwrap();

    let mut sub = api.subscribe("ticks").await.unwrap();
    assert_eq!(sub.next_event().await, Some(json!(1)));
    assert_eq!(sub.next_event().await, Some(json!(2)));

    sub.cancel().await.unwrap();
    assert_eq!(unsubscribed.load(Ordering::SeqCst), 1);

    let err = api.subscribe("other").await.unwrap_err();
    assert!(matches!(err, PhotonError::NoSuchCapability { .. }));
}

#[tokio::test]
async fn test_dropped_subscription_notifies_publisher_once() {
    let unsubscribed = Arc::new(AtomicUsize::new(0));
    let host = RpcHost::new();
    host.set(
        "ticker",
        Ticker {
            unsubscribed: unsubscribed.clone(),
        },
    );
    let h = harness(host);
    let api = h.app.request_parent("ticker").unwrap();

    let cancelled = api.subscribe("ticks").await.unwrap();
    cancelled.cancel().await.unwrap();
    assert_eq!(unsubscribed.load(Ordering::SeqCst), 1);

    let dropped = api.subscribe("ticks").await.unwrap();
    drop(dropped);
    for _ in 0..50 {
        if unsubscribed.load(Ordering::SeqCst) == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(unsubscribed.load(Ordering::SeqCst), 2);
    assert_eq!(h.app.pending_calls(), 0);
}
