#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]


use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use url::Url;

use framelink_core::error::ChannelError;
use framelink_core::protocol::ServiceUrls;
use framelink_runtime::channel::{handler_fn, HandlerError, Incoming};
use framelink_runtime::config;
use framelink_runtime::dom::{FrameElement, HostNode, MemoryDocument, MemoryNode};
use framelink_runtime::panel::{HostRuntime, Panel, CONTAINER_CLASS};
use framelink_runtime::plugin::{FrameQuery, Iframer, IframerConfig, InProcessPlugin, Lifecycle};
use framelink_runtime::policy::OriginAllowlist;
use framelink_runtime::transport::{ChannelRouter, MemoryWindow, Window};
use framelink_runtime::ui::UI;

use harness::fast;

const HOST: &str = "https://host.example/narrative/";

fn services() -> ServiceUrls {
    ServiceUrls {
        groups_service_url: "https://host.example/services/groups".into(),
        user_profile_service_url: "https://host.example/services/user_profile/rpc".into(),
        workspace_service_url: "https://host.example/services/ws".into(),
    }
}

fn iframer_config() -> IframerConfig {
    IframerConfig {
        base_url: Url::parse(HOST).unwrap(),
        plugin_path: "modules/plugins/organizations/iframe_root/index.html".into(),
        params: services(),
        channel: fast(),
    }
}

/// Host window, its document (optionally running the plugin in every frame)
/// and the host router.
fn host(plugin: Option<InProcessPlugin>) -> (MemoryWindow, MemoryDocument, ChannelRouter) {
    let window = MemoryWindow::new(HOST).unwrap();
    let doc = match plugin {
        Some(p) => MemoryDocument::with_loader(window.clone(), Arc::new(p)),
        None => MemoryDocument::new(window.clone()),
    };
    let router = ChannelRouter::attach(window.handle(), OriginAllowlist::single(HOST).unwrap()).unwrap();
    (window, doc, router)
}

#[tokio::test]
async fn start_hands_params_to_the_plugin_and_resolves_with_its_ack() {
    let mut plugin = InProcessPlugin::new(fast());
    let mut delivered = plugin.subscribe();
    let (_window, doc, router) = host(Some(plugin));
    let body: MemoryNode = doc.body();

    let iframer = Iframer::new(router.clone(), body.handle(), iframer_config());
    let ack = tokio::time::timeout(Duration::from_millis(2000), iframer.start())
        .await
        .expect("within 2000 ms")
        .unwrap();

    assert_eq!(ack, json!({ "ack": true }));
    assert_eq!(iframer.lifecycle(), Lifecycle::Running);
    assert_eq!(body.frame_count(), 1);

    let params = delivered.recv().await.unwrap();
    assert_eq!(params.params, services());
    assert_eq!(params.parent_host, "https://host.example");
    assert!(params.frame_id.starts_with("frame_"));

    let frame = iframer.frame().unwrap();
    assert_eq!(frame.frame_id(), params.frame_id);
    assert!(frame
        .src()
        .as_str()
        .starts_with("https://host.example/narrative/modules/plugins/organizations/iframe_root/index.html?"));
    let query = FrameQuery::from_url(frame.src()).unwrap();
    assert_eq!(query.channel_id, params.channel_id);
    assert_eq!(query.parent_host, params.parent_host);
    assert_eq!(iframer.channel().unwrap().id(), &params.channel_id);
}

#[tokio::test]
async fn running_plugin_serves_further_requests() {
    let plugin = InProcessPlugin::new(fast()).handle(
        "groups/count",
        handler_fn(|msg: Incoming| async move {
            assert!(msg.expects_reply);
            Ok::<Value, HandlerError>(json!({ "count": 3 }))
        }),
    );
    let (_window, doc, router) = host(Some(plugin));

    let iframer = Iframer::new(router, doc.body().handle(), iframer_config());
    iframer.start().await.unwrap();

    let channel = iframer.channel().unwrap();
    let v = channel
        .request("groups/count", Value::Null, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(v, json!({ "count": 3 }));
}

#[tokio::test(start_paused = true)]
async fn silent_plugin_times_out_and_leaves_no_iframe() {
    let (_window, doc, router) = host(None);
    let body = doc.body();

    let iframer = Iframer::new(router.clone(), body.handle(), iframer_config());
    let err = iframer.start().await.unwrap_err();

    assert_eq!(err, ChannelError::HandshakeTimeout { timeout_ms: 1000 });
    assert_eq!(body.frame_count(), 0);
    assert_eq!(body.child_count(), 0);
    assert!(iframer.frame().is_none());
    assert!(iframer.channel().is_none());
    assert_eq!(iframer.lifecycle(), Lifecycle::Stopped);
    assert_eq!(router.channel_count(), 0);

    // Still safe afterwards.
    iframer.stop();
}

#[tokio::test]
async fn stop_is_idempotent_and_destroys_the_frame() {
    let (_window, doc, router) = host(Some(InProcessPlugin::new(fast())));
    let body = doc.body();

    let iframer = Iframer::new(router.clone(), body.handle(), iframer_config());
    iframer.stop();
    assert_eq!(iframer.lifecycle(), Lifecycle::Idle);

    iframer.start().await.unwrap();
    let frame = iframer.frame().unwrap();
    let channel = iframer.channel().unwrap();
    assert!(iframer.start().await.is_err());

    iframer.stop();
    iframer.stop();

    assert_eq!(iframer.lifecycle(), Lifecycle::Stopped);
    assert_eq!(body.frame_count(), 0);
    assert!(!frame.is_attached());
    assert!(frame.content_window().is_closed());
    assert!(iframer.channel().is_none());
    assert_eq!(
        channel.send("after", Value::Null).unwrap_err(),
        ChannelError::ChannelClosed
    );
    assert_eq!(router.channel_count(), 0);
}

#[tokio::test]
async fn stop_during_start_fails_that_start() {
    let (_window, doc, router) = host(None);
    let body = doc.body();
    let iframer = Arc::new(Iframer::new(router, body.handle(), iframer_config()));

    let starting = tokio::spawn({
        let iframer = Arc::clone(&iframer);
        async move { iframer.start().await }
    });
    while iframer.frame().is_none() {
        tokio::task::yield_now().await;
    }

    iframer.stop();
    let err = starting.await.unwrap().unwrap_err();
    assert_eq!(err, ChannelError::ChannelClosed);
    assert_eq!(body.frame_count(), 0);
    assert_eq!(iframer.lifecycle(), Lifecycle::Stopped);
}

const PANEL_CONFIG: &str = r#"
version: 1
host:
  url: "https://host.example/narrative/"
channel:
  handshake_timeout_ms: 1000
  handshake_retry_ms: 100
  request_timeout_ms: 1000
plugin:
  path: "modules/plugins/organizations/iframe_root/index.html"
  services:
    groups_url: "https://host.example/services/groups"
    user_profile_url: "https://host.example/services/user_profile/rpc"
    workspace_url: "https://host.example/services/ws"
"#;

#[tokio::test]
async fn panel_titles_the_page_and_relays_the_plugin_title() {
    let cfg = config::load_from_str(PANEL_CONFIG).unwrap();
    let window = MemoryWindow::new(&cfg.host.url).unwrap();
    let plugin = InProcessPlugin::new(fast()).with_title("Organizations (3)");
    let doc = MemoryDocument::with_loader(window.clone(), Arc::new(plugin));
    let runtime = HostRuntime::attach(cfg, window.handle()).unwrap();

    let (tx, mut titles) = mpsc::unbounded_channel();
    runtime.bus().subscribe(UI, "setTitle", move |v| {
        tx.send(v.clone()).unwrap();
    });

    let panel = Panel::new(runtime.clone());
    let body = doc.body();
    panel.attach(body.handle()).unwrap();
    let container = panel.container().unwrap();
    assert_eq!(container.class_name(), Some(CONTAINER_CLASS));

    let ack = panel.start().await.unwrap();
    assert_eq!(ack, json!({ "ack": true }));
    assert_eq!(container.frame_count(), 1);

    assert_eq!(titles.recv().await.unwrap(), json!("Organizations"));
    assert_eq!(titles.recv().await.unwrap(), json!("Organizations (3)"));

    panel.stop();
    panel.stop();
    assert!(!container.is_attached());
    assert_eq!(body.child_count(), 0);
    assert_eq!(body.frame_count(), 0);
    assert_eq!(runtime.router().channel_count(), 0);
}

#[tokio::test]
async fn panel_needs_a_container_before_start() {
    let cfg = config::load_from_str(PANEL_CONFIG).unwrap();
    let window = MemoryWindow::new(&cfg.host.url).unwrap();
    let runtime = HostRuntime::attach(cfg, window.handle()).unwrap();

    let panel = Panel::new(runtime);
    let err = panel.start().await.unwrap_err();
    assert!(matches!(err, ChannelError::Internal(_)));
}

#[tokio::test]
async fn host_runtime_config_lookup() {
    let cfg = config::load_from_str(PANEL_CONFIG).unwrap();
    let window = MemoryWindow::new(&cfg.host.url).unwrap();
    let runtime = HostRuntime::attach(cfg, window.handle()).unwrap();

    assert_eq!(
        runtime.config("services.Groups.url").as_deref(),
        Some("https://host.example/services/groups")
    );
    assert_eq!(
        runtime.config("services.UserProfile.url").as_deref(),
        Some("https://host.example/services/user_profile/rpc")
    );
    assert_eq!(
        runtime.config("services.Workspace.url").as_deref(),
        Some("https://host.example/services/ws")
    );
    assert_eq!(runtime.config("services.Nope.url"), None);
    assert_eq!(runtime.base_url().as_str(), HOST);
}

#[tokio::test]
async fn host_runtime_rejects_foreign_window() {
    let cfg = config::load_from_str(PANEL_CONFIG).unwrap();
    let window = MemoryWindow::new("https://elsewhere.example/").unwrap();
    let err = HostRuntime::attach(cfg, window.handle()).err().unwrap();
    assert_eq!(err.code().as_str(), "bad-config");
}
