use herald::config::Config;
use std::path::PathBuf;

#[test]
fn test_config_defaults() {
    let cfg = Config::default();

    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
    assert_eq!(cfg.limits.initial_buffer, 1024);
    assert_eq!(cfg.limits.max_buffer, 1024 * 1024);
    assert_eq!(cfg.broadcast.log_path, PathBuf::from("broadcast.log"));
}

#[test]
fn test_config_from_yaml() {
    let yaml = r#"
server:
  listen_addr: "0.0.0.0:3000"
static_files:
  document_root: "/srv/www"
  not_found_page: "/srv/www/404.html"
broadcast:
  log_path: "/var/lib/herald/chat.log"
logging:
  access_log: "/var/log/herald/access.log"
  error_log: "/var/log/herald/error.log"
limits:
  max_buffer: 65536
"#;
    let cfg = Config::from_yaml_str(yaml).unwrap();

    assert_eq!(cfg.server.listen_addr, "0.0.0.0:3000");
    assert_eq!(cfg.static_files.document_root, PathBuf::from("/srv/www"));
    assert_eq!(cfg.broadcast.log_path, PathBuf::from("/var/lib/herald/chat.log"));
    assert_eq!(cfg.logging.error_log, PathBuf::from("/var/log/herald/error.log"));
    assert_eq!(cfg.limits.max_buffer, 65536);
    // Unset keys keep their defaults
    assert_eq!(cfg.limits.initial_buffer, 1024);
}

#[test]
fn test_config_partial_yaml() {
    let cfg = Config::from_yaml_str("server:\n  listen_addr: \"127.0.0.1:9000\"\n").unwrap();

    assert_eq!(cfg.server.listen_addr, "127.0.0.1:9000");
    assert_eq!(cfg.logging.access_log, PathBuf::from("access.log"));
}

#[test]
fn test_config_rejects_initial_buffer_above_max() {
    let yaml = "limits:\n  initial_buffer: 4096\n  max_buffer: 1024\n";

    assert!(Config::from_yaml_str(yaml).is_err());
}

#[test]
fn test_config_rejects_unknown_types() {
    assert!(Config::from_yaml_str("limits:\n  max_buffer: lots\n").is_err());
}

#[test]
fn test_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("herald.yaml");
    std::fs::write(&path, "static_files:\n  document_root: \"./public\"\n").unwrap();

    let cfg = Config::from_file(&path).unwrap();
    assert_eq!(cfg.static_files.document_root, PathBuf::from("./public"));

    assert!(Config::from_file(dir.path().join("missing.yaml")).is_err());
}

#[test]
fn test_config_listen_env_override() {
    // Only this test touches the environment.
    unsafe {
        std::env::remove_var("HERALD_CONFIG");
        std::env::set_var("LISTEN", "0.0.0.0:5000");
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:5000");

    unsafe {
        std::env::remove_var("LISTEN");
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
}
