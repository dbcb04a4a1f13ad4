//! Inventory loading from JSON and YAML files.

use std::io::Write;

use fanout::inventory::{ConnectionMethod, Inventory, OsKind};
use pretty_assertions::assert_eq;

const JSON_INVENTORY: &str = r#"[
    {
        "hostname": "web01",
        "ip": "192.0.2.10",
        "dns": "web01.internal",
        "location": "fra1",
        "user": "admin",
        "password": "secret",
        "connection_method": "ssh",
        "port": 22,
        "active": true,
        "grade": "critical",
        "os": "linux",
        "tunnel_routes": [
            {"name": "direct", "hops": [{"ip": "192.0.2.10", "user": "admin", "method": "ssh"}]},
            {"name": "via-bastion", "active": false, "hops": [
                {"ip": "198.51.100.1", "user": "jump", "method": "ssh", "port": 2222},
                {"ip": "192.0.2.10", "user": "admin", "method": "ssh"}
            ]}
        ],
        "file_transfer_protocol": "sftp",
        "config": {"timeout": 5, "client_id": "ops"}
    },
    {
        "hostname": "win01",
        "ip": "192.0.2.20",
        "user": "administrator",
        "password": "secret",
        "connection_method": "custom",
        "port": 445,
        "tool": "wmiexec",
        "os": "windows",
        "tunnel_routes": [
            {"name": "direct", "hops": [{"ip": "192.0.2.20"}]}
        ]
    }
]"#;

fn write_temp(content: &str, extension: &str) -> tempfile::TempPath {
    let mut file = tempfile::Builder::new()
        .suffix(&format!(".{}", extension))
        .tempfile()
        .expect("tempfile");
    file.write_all(content.as_bytes()).expect("write");
    file.into_temp_path()
}

#[test]
fn loads_original_schema_json() {
    let path = write_temp(JSON_INVENTORY, "json");
    let inventory = Inventory::from_file(&path).expect("inventory should load");

    assert_eq!(inventory.len(), 2);

    let web = inventory.get("web01").expect("web01 exists");
    assert_eq!(web.addr, "192.0.2.10");
    assert_eq!(web.method, ConnectionMethod::Ssh);
    assert_eq!(web.routes.len(), 2);
    assert!(web.routes[0].is_active());
    assert!(!web.routes[1].is_active());
    assert_eq!(web.routes[1].hops.len(), 2);
    assert_eq!(web.options.client_tag.as_deref(), Some("ops"));

    let win = inventory.get("win01").expect("win01 exists");
    assert_eq!(win.method, ConnectionMethod::Winexec);
    assert_eq!(win.os, OsKind::Windows);
    assert_eq!(win.tool.as_deref(), Some("wmiexec"));
}

#[test]
fn loads_yaml_inventory() {
    let yaml = r#"
- hostname: db01
  ip: 192.0.2.30
  user: postgres
  connection_method: ssh
  routes:
    - name: direct
      hops:
        - addr: 192.0.2.30
"#;
    let path = write_temp(yaml, "yaml");
    let inventory = Inventory::from_file(&path).expect("inventory should load");

    assert_eq!(inventory.len(), 1);
    let db = inventory.get("db01").expect("db01 exists");
    assert_eq!(db.routes[0].hops[0].addr, "192.0.2.30");
}

#[test]
fn rejects_unknown_connection_method() {
    let bad = r#"[{"hostname": "x", "ip": "1.2.3.4", "user": "u", "connection_method": "telnet"}]"#;
    let path = write_temp(bad, "json");
    assert!(Inventory::from_file(&path).is_err());
}

#[test]
fn missing_file_is_a_read_error() {
    let err = Inventory::from_file("definitely/not/here.json").expect_err("must fail");
    assert!(err.to_string().contains("failed to read"));
}

#[test]
fn selection_from_loaded_file_matches_names() {
    let path = write_temp(JSON_INVENTORY, "json");
    let inventory = Inventory::from_file(&path).expect("inventory should load");

    let selection = inventory.select("win01,ghost01");
    assert_eq!(selection.hosts.len(), 1);
    assert_eq!(selection.hosts[0].hostname, "win01");
    assert_eq!(selection.missing, vec!["ghost01".to_string()]);

    let all = inventory.select("all");
    assert_eq!(all.hosts.len(), 2);
}
