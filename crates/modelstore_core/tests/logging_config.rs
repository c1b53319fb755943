use modelstore_core::config::LoggingConfig;
use modelstore_core::{default_log_level, init_from_config, logging_status};

#[test]
fn directory_without_level_starts_at_build_default() {
    let temp = tempfile::tempdir().unwrap();
    let log_dir = temp.path().join("logs");

    let started = init_from_config(&LoggingConfig {
        level: None,
        dir: Some(log_dir.clone()),
    })
    .unwrap();
    assert!(started);

    let (active_level, active_dir) = logging_status().unwrap();
    assert_eq!(active_level, default_log_level());
    assert_eq!(active_dir, log_dir);
    assert!(log_dir.is_dir());
}
