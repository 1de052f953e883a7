#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use tablesync_gateway::config::{self, OwnershipPolicy};

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
gateway:
  listen: "0.0.0.0:8080"
sessions:
  ownershp: explicit # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.gateway.ws_path, "/websocket");
    assert_eq!(cfg.sessions.ownership, OwnershipPolicy::Explicit);
    assert!(cfg.sessions.garbage_ttl_ms.is_none());
    assert!(cfg.gateway.strict_catalog);
}

#[test]
fn ownership_policy_parses_snake_case() {
    let cfg = config::load_from_str(
        r#"
version: 1
sessions:
  ownership: reclaim_on_rejoin
  garbage_ttl_ms: 300000
limits:
  tokens_per_board: 10
"#,
    )
    .expect("must parse");
    assert_eq!(cfg.sessions.ownership, OwnershipPolicy::ReclaimOnRejoin);
    assert_eq!(cfg.sessions.garbage_ttl_ms, Some(300000));
    assert_eq!(cfg.limits.tokens_per_board, 10);
}

#[test]
fn rejects_out_of_range_values() {
    let idle_below_ping = r#"
version: 1
gateway:
  ping_interval_ms: 30000
  idle_timeout_ms: 20000
"#;
    assert!(config::load_from_str(idle_below_ping).is_err());

    let bad_path = r#"
version: 1
gateway:
  ws_path: "websocket"
"#;
    assert!(config::load_from_str(bad_path).is_err());

    assert!(config::load_from_str("version: 2\n").is_err());
}

#[test]
fn shipped_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../tablesync.yaml");
    let cfg = config::load_from_file(path).expect("shipped config must load");
    assert_eq!(cfg.limits.tokens_per_board, 200);
    assert!(!cfg.sessions.disable_permissions);
}
