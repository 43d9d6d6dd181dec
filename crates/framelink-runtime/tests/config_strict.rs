#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use framelink_runtime::channel::ChannelConfig;
use framelink_runtime::config;

const MINIMAL: &str = r#"
version: 1
host:
  url: "https://host.example/"
plugin:
  path: "plugin/index.html"
  services:
    groups_url: "https://host.example/services/groups"
    user_profile_url: "https://host.example/services/user_profile/rpc"
    workspace_url: "https://host.example/services/ws"
"#;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
host:
  url: "https://host.example/"
channel:
  handshake_timout_ms: 100 # typo should fail
plugin:
  path: "plugin/index.html"
  services:
    groups_url: "https://host.example/g"
    user_profile_url: "https://host.example/u"
    workspace_url: "https://host.example/w"
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "bad-config");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str(MINIMAL).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.plugin.title, "Organizations");
    assert!(!cfg.host.allow_wildcard_origin);

    let ch = ChannelConfig::from(&cfg.channel);
    assert_eq!(ch.handshake_timeout, Duration::from_millis(5000));
    assert_eq!(ch.handshake_retry, Duration::from_millis(250));
    assert_eq!(ch.request_timeout, Duration::from_millis(10000));
}

#[test]
fn unsupported_version_rejected() {
    let bad = MINIMAL.replace("version: 1", "version: 2");
    let err = config::load_from_str(&bad).expect_err("must fail");
    assert!(err.to_string().contains("version"));
}

#[test]
fn retry_longer_than_handshake_rejected() {
    let bad = MINIMAL.replace(
        "plugin:\n",
        "channel:\n  handshake_timeout_ms: 1000\n  handshake_retry_ms: 2000\nplugin:\n",
    );
    let err = config::load_from_str(&bad).expect_err("must fail");
    assert!(err.to_string().contains("handshake_retry_ms"));
}

#[test]
fn service_url_must_parse() {
    let bad = MINIMAL.replace("https://host.example/services/ws", "not a url");
    let err = config::load_from_str(&bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "bad-config");
    assert!(err.to_string().contains("workspace_url"));
}

#[test]
fn sample_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../framelink.yaml");
    let cfg = config::load_from_file(path).expect("sample config must load");
    assert_eq!(cfg.plugin.title, "Organizations");
}
