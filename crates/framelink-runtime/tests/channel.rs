#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]


use std::time::Duration;

use futures_util::future::join_all;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use framelink_core::error::ChannelError;
use framelink_runtime::channel::{handler_fn, ChannelState, HandlerError, Incoming, Role};

use harness::{fast, Contexts};

#[tokio::test]
async fn handshake_establishes_both_sides() {
    let ctx = Contexts::new();
    let (host, plugin) = ctx.connect(fast()).await;

    assert_eq!(host.role(), Role::Initiator);
    assert_eq!(plugin.role(), Role::Responder);
    assert_eq!(plugin.state(), ChannelState::Established);
    assert_eq!(host.id(), plugin.id());
    assert_eq!(ctx.host_router.channel_count(), 0);
    assert_eq!(ctx.plugin_router.channel_count(), 1);
}

#[tokio::test]
async fn request_before_established_fails_fast() {
    let ctx = Contexts::new();
    let host = ctx.host_channel(fast());

    let err = host
        .request("params", json!({}), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert_eq!(err, ChannelError::NotEstablished);
    assert_eq!(err.code().as_str(), "channel-closed");
    assert_eq!(host.pending_requests(), 0);

    let err = host.send("hello", Value::Null).unwrap_err();
    assert_eq!(err, ChannelError::NotEstablished);
}

#[tokio::test(start_paused = true)]
async fn syn_lost_before_responder_attached_is_retried() {
    let ctx = Contexts::new();
    let host = ctx.host_channel(fast());

    let starter = host.clone();
    let start = tokio::spawn(async move { starter.start().await });

    // First syn(s) hit the plugin router before any channel exists there.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(host.state(), ChannelState::SynSent);
    let plugin = ctx.plugin_channel(&host, fast());

    start.await.unwrap().expect("handshake completes on retry");
    assert_eq!(host.state(), ChannelState::Established);
    plugin
        .wait_established(Duration::from_secs(1))
        .await
        .unwrap();
    assert!(ctx.plugin_router.stats().unrouted >= 1);
}

#[tokio::test(start_paused = true)]
async fn handshake_timeout_closes_channel() {
    let ctx = Contexts::new();
    let host = ctx.host_channel(fast());

    let err = host.start().await.unwrap_err();
    assert_eq!(err, ChannelError::HandshakeTimeout { timeout_ms: 1000 });
    assert_eq!(err.code().as_str(), "handshake-timeout");
    assert_eq!(host.state(), ChannelState::Closed);
    assert_eq!(ctx.host_router.channel_count(), 0);

    // Starting again is refused.
    assert_eq!(host.start().await.unwrap_err(), ChannelError::ChannelClosed);

    // Retries kept posting syn for the whole window.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(ctx.plugin_router.stats().unrouted >= 5);
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_resolve_to_their_own_responses() {
    let ctx = Contexts::new();
    let (host, plugin) = ctx.connect(fast()).await;

    // Later requests answer sooner, so responses arrive in reverse order.
    plugin
        .on(
            "echo",
            handler_fn(|msg: Incoming| async move {
                let n = msg.payload["n"].as_u64().unwrap();
                tokio::time::sleep(Duration::from_millis(200 - n * 10)).await;
                Ok::<Value, HandlerError>(json!({ "n": n }))
            }),
        )
        .unwrap();

    let calls = (0..16u64).map(|n| {
        let host = host.clone();
        async move {
            host.request("echo", json!({ "n": n }), Duration::from_secs(5))
                .await
                .map(|v| (n, v))
        }
    });

    for res in join_all(calls).await {
        let (n, v) = res.unwrap();
        assert_eq!(v, json!({ "n": n }));
    }
    assert_eq!(host.pending_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn late_response_is_ignored() {
    let ctx = Contexts::new();
    let (host, plugin) = ctx.connect(fast()).await;

    plugin
        .on(
            "slow",
            handler_fn(|_msg: Incoming| async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok::<Value, HandlerError>(json!("late"))
            }),
        )
        .unwrap();
    plugin
        .on(
            "fast",
            handler_fn(|_msg: Incoming| async move { Ok::<Value, HandlerError>(json!("fast")) }),
        )
        .unwrap();

    let err = host
        .request("slow", Value::Null, Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ChannelError::RequestTimeout {
            name: "slow".into(),
            timeout_ms: 100
        }
    );
    assert_eq!(host.pending_requests(), 0);

    // Let the late response arrive; nothing to resolve any more.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(host.pending_requests(), 0);
    assert_eq!(host.state(), ChannelState::Established);

    let v = host
        .request("fast", Value::Null, Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(v, json!("fast"));
}

#[tokio::test]
async fn two_channels_on_one_router_never_cross_talk() {
    let ctx = Contexts::new();
    let (host_a, plugin_a) = ctx.connect(fast()).await;
    let (host_b, plugin_b) = ctx.connect(fast()).await;
    assert_ne!(host_a.id(), host_b.id());
    assert_eq!(ctx.host_router.channel_count(), 2);

    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    for (plugin, tx) in [(&plugin_a, tx_a), (&plugin_b, tx_b)] {
        plugin
            .on(
                "note",
                handler_fn(move |msg: Incoming| {
                    let tx = tx.clone();
                    async move {
                        tx.send(msg.payload).unwrap();
                        Ok::<Value, HandlerError>(Value::Null)
                    }
                }),
            )
            .unwrap();
    }
    plugin_a
        .on(
            "who",
            handler_fn(|_m: Incoming| async move { Ok::<Value, HandlerError>(json!("a")) }),
        )
        .unwrap();
    plugin_b
        .on(
            "who",
            handler_fn(|_m: Incoming| async move { Ok::<Value, HandlerError>(json!("b")) }),
        )
        .unwrap();

    for i in 0..20 {
        host_a.send("note", json!(["a", i])).unwrap();
        host_b.send("note", json!(["b", i])).unwrap();
    }

    for i in 0..20 {
        assert_eq!(rx_a.recv().await.unwrap(), json!(["a", i]));
        assert_eq!(rx_b.recv().await.unwrap(), json!(["b", i]));
    }

    let who = Duration::from_secs(1);
    let (a, b) = tokio::join!(
        host_a.request("who", Value::Null, who),
        host_b.request("who", Value::Null, who)
    );
    assert_eq!(a.unwrap(), json!("a"));
    assert_eq!(b.unwrap(), json!("b"));
    assert!(rx_a.try_recv().is_err());
    assert!(rx_b.try_recv().is_err());
}

#[tokio::test]
async fn close_rejects_pending_requests_and_later_calls() {
    let ctx = Contexts::new();
    let (host, plugin) = ctx.connect(fast()).await;

    plugin
        .on(
            "never",
            handler_fn(|_msg: Incoming| async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<Value, HandlerError>(Value::Null)
            }),
        )
        .unwrap();

    let first = tokio::spawn({
        let host = host.clone();
        async move { host.request("never", json!(1), Duration::from_secs(30)).await }
    });
    let second = tokio::spawn({
        let host = host.clone();
        async move { host.request("never", json!(2), Duration::from_secs(30)).await }
    });
    while host.pending_requests() < 2 {
        tokio::task::yield_now().await;
    }

    host.close();
    host.close();

    assert_eq!(first.await.unwrap().unwrap_err(), ChannelError::ChannelClosed);
    assert_eq!(second.await.unwrap().unwrap_err(), ChannelError::ChannelClosed);
    assert_eq!(host.state(), ChannelState::Closed);
    assert_eq!(host.pending_requests(), 0);
    assert_eq!(ctx.host_router.channel_count(), 0);

    assert_eq!(
        host.send("after", Value::Null).unwrap_err(),
        ChannelError::ChannelClosed
    );
    assert_eq!(
        host.request("after", Value::Null, Duration::from_secs(1))
            .await
            .unwrap_err(),
        ChannelError::ChannelClosed
    );
}

#[tokio::test]
async fn handler_error_is_returned_as_message_only() {
    let ctx = Contexts::new();
    let (host, plugin) = ctx.connect(fast()).await;

    plugin
        .on(
            "fail",
            handler_fn(|_msg: Incoming| async move { Err::<Value, _>(HandlerError::new("group not found")) }),
        )
        .unwrap();

    let err = host
        .request("fail", Value::Null, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert_eq!(err, ChannelError::Handler("group not found".into()));
    assert_eq!(err.code().as_str(), "handler-error");
}

#[tokio::test]
async fn handler_panic_is_contained() {
    let ctx = Contexts::new();
    let (host, plugin) = ctx.connect(fast()).await;

    plugin
        .on(
            "boom",
            handler_fn(|msg: Incoming| async move {
                if msg.payload.is_null() {
                    panic!("handler blew up");
                }
                Ok::<Value, HandlerError>(Value::Null)
            }),
        )
        .unwrap();
    plugin
        .on(
            "ping",
            handler_fn(|_msg: Incoming| async move { Ok::<Value, HandlerError>(json!("pong")) }),
        )
        .unwrap();

    let err = host
        .request("boom", Value::Null, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert_eq!(err, ChannelError::Handler("handler panicked".into()));

    assert_eq!(plugin.state(), ChannelState::Established);
    let v = host
        .request("ping", Value::Null, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(v, json!("pong"));
}

#[tokio::test]
async fn request_without_handler_is_answered_with_error() {
    let ctx = Contexts::new();
    let (host, _plugin) = ctx.connect(fast()).await;

    let err = host
        .request("missing", Value::Null, Duration::from_secs(30))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ChannelError::Handler("no handler registered for 'missing'".into())
    );
}

#[tokio::test]
async fn send_handlers_run_in_arrival_order_and_off_removes() {
    let ctx = Contexts::new();
    let (host, plugin) = ctx.connect(fast()).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let first = {
        let tx = tx.clone();
        plugin
            .on(
                "tick",
                handler_fn(move |msg: Incoming| {
                    let tx = tx.clone();
                    async move {
                        assert!(!msg.expects_reply);
                        tx.send(("first", msg.payload)).unwrap();
                        Ok::<Value, HandlerError>(Value::Null)
                    }
                }),
            )
            .unwrap()
    };
    plugin
        .on(
            "tick",
            handler_fn(move |msg: Incoming| {
                let tx = tx.clone();
                async move {
                    tx.send(("second", msg.payload)).unwrap();
                    Ok::<Value, HandlerError>(Value::Null)
                }
            }),
        )
        .unwrap();

    for i in 0..5 {
        host.send("tick", json!(i)).unwrap();
    }
    for i in 0..5 {
        assert_eq!(rx.recv().await.unwrap(), ("first", json!(i)));
        assert_eq!(rx.recv().await.unwrap(), ("second", json!(i)));
    }

    assert!(plugin.off("tick", first));
    assert!(!plugin.off("tick", first));
    host.send("tick", json!(99)).unwrap();
    assert_eq!(rx.recv().await.unwrap(), ("second", json!(99)));
}

#[tokio::test]
async fn destroyed_peer_window_closes_channel() {
    let ctx = Contexts::new();
    let (host, _plugin) = ctx.connect(fast()).await;

    ctx.plugin.close();
    assert_eq!(
        host.send("hello", Value::Null).unwrap_err(),
        ChannelError::ChannelClosed
    );
    assert_eq!(host.state(), ChannelState::Closed);
}

#[tokio::test]
async fn destroying_the_peer_window_rejects_pending_requests() {
    let ctx = Contexts::new();
    let (host, plugin) = ctx.connect(fast()).await;

    let (started_tx, mut started) = mpsc::unbounded_channel();
    plugin
        .on(
            "slow",
            handler_fn(move |_msg: Incoming| {
                let started_tx = started_tx.clone();
                async move {
                    started_tx.send(()).unwrap();
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<Value, HandlerError>(Value::Null)
                }
            }),
        )
        .unwrap();

    let pending = tokio::spawn({
        let host = host.clone();
        async move {
            host.request("slow", Value::Null, Duration::from_secs(30))
                .await
        }
    });
    started.recv().await.unwrap();
    assert_eq!(host.pending_requests(), 1);

    // No further post from the host: the channel must notice on its own.
    ctx.plugin.close();
    let outcome = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("rejected well before the request deadline")
        .unwrap();

    assert_eq!(outcome.unwrap_err(), ChannelError::ChannelClosed);
    assert_eq!(host.state(), ChannelState::Closed);
    assert_eq!(host.pending_requests(), 0);
    assert_eq!(ctx.host_router.channel_count(), 0);
}

#[tokio::test]
async fn send_handler_may_request_on_its_own_channel() {
    let ctx = Contexts::new();
    let (host, plugin) = ctx.connect(fast()).await;

    host.on(
        "answer",
        handler_fn(|_msg: Incoming| async move { Ok::<Value, HandlerError>(json!(42)) }),
    )
    .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let asker = plugin.clone();
    plugin
        .on(
            "poke",
            handler_fn(move |_msg: Incoming| {
                let asker = asker.clone();
                let tx = tx.clone();
                async move {
                    let answer = asker
                        .request("answer", Value::Null, Duration::from_millis(500))
                        .await;
                    tx.send(answer).unwrap();
                    Ok::<Value, HandlerError>(Value::Null)
                }
            }),
        )
        .unwrap();

    host.send("poke", Value::Null).unwrap();
    assert_eq!(rx.recv().await.unwrap(), Ok(json!(42)));

    // Later sends still arrive while and after the first handler waited.
    host.send("poke", Value::Null).unwrap();
    assert_eq!(rx.recv().await.unwrap(), Ok(json!(42)));
}

#[tokio::test]
async fn disposing_the_router_closes_its_channels() {
    let ctx = Contexts::new();
    let (host, _plugin) = ctx.connect(fast()).await;

    ctx.host_router.dispose();
    tokio::time::timeout(Duration::from_secs(1), host.closed())
        .await
        .expect("channel closes with its router");
    assert_eq!(host.state(), ChannelState::Closed);
}

#[tokio::test]
async fn early_application_message_is_dropped() {
    let ctx = Contexts::new();
    let host = ctx.host_channel(fast());
    let plugin = ctx.plugin_channel(&host, fast());

    let (tx, mut rx) = mpsc::unbounded_channel();
    plugin
        .on(
            "early",
            handler_fn(move |msg: Incoming| {
                let tx = tx.clone();
                async move {
                    tx.send(msg.payload).unwrap();
                    Ok::<Value, HandlerError>(Value::Null)
                }
            }),
        )
        .unwrap();

    // Injected straight into the plugin window, before any handshake.
    let env = framelink_core::protocol::Envelope::send(host.id().clone(), "early", json!(1));
    ctx.plugin
        .deliver(harness::HOST_URL, framelink_core::protocol::encode(&env).unwrap());

    host.start().await.unwrap();
    plugin
        .wait_established(Duration::from_secs(1))
        .await
        .unwrap();
    host.send("early", json!(2)).unwrap();

    assert_eq!(rx.recv().await.unwrap(), json!(2));
    assert!(rx.try_recv().is_err());
}
