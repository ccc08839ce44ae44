use placegraph_core::{ConfigError, ConfigManager, Placetype, PlacegraphConfig, PlacetypeRole};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_configuration() {
    let config = PlacegraphConfig::default();
    assert!(ConfigManager::validate_config(&config).is_ok());
    assert_eq!(config.resolver.ensure_roles, PlacetypeRole::ALL.to_vec());
    assert_eq!(config.cascade.concurrency, 8);
}

#[test]
fn test_config_serialization() {
    let mut config = PlacegraphConfig::default();
    config.cascade.buffer = Some(0.001);
    config.storage.data_root = Some("/usr/local/data".into());

    let toml = toml::to_string(&config).unwrap();
    let from_toml: PlacegraphConfig = toml::from_str(&toml).unwrap();
    assert_eq!(from_toml.cascade.buffer, Some(0.001));
    assert_eq!(
        from_toml.resolver.skip_placetypes,
        config.resolver.skip_placetypes
    );
    assert_eq!(
        from_toml.storage.data_root.as_deref(),
        Some(std::path::Path::new("/usr/local/data"))
    );
}

#[test]
fn test_partial_file_keeps_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("placegraph.toml");
    fs::write(
        &config_path,
        r#"
[resolver]
skip_placetypes = ["address"]
ensure_roles = ["common"]

[cascade]
strict = true
"#,
    )
    .unwrap();

    let manager = ConfigManager::from_path(&config_path).unwrap();
    let config = manager.config();
    assert_eq!(config.resolver.skip_placetypes, vec![Placetype::new("address")]);
    assert_eq!(config.resolver.ensure_roles, vec![PlacetypeRole::Common]);
    assert_eq!(config.resolver.disambiguating_placetype.as_str(), "county");
    assert!(config.cascade.strict);
    assert_eq!(manager.config_path(), Some(config_path.as_path()));
}

#[test]
fn test_config_file_persistence() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nested").join("config.toml");

    ConfigManager::create_default_config(&config_path).unwrap();
    assert!(config_path.exists());

    let loaded = ConfigManager::from_path(&config_path).unwrap().into_config();
    assert_eq!(
        loaded.cascade.point_placetypes,
        PlacegraphConfig::default().cascade.point_placetypes
    );
}

#[test]
fn test_missing_and_malformed_files() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");
    assert!(matches!(
        ConfigManager::from_path(&missing),
        Err(ConfigError::NotFound(_))
    ));

    let broken = temp_dir.path().join("broken.toml");
    fs::write(&broken, "[cascade\nstrict = ").unwrap();
    assert!(matches!(
        ConfigManager::from_path(&broken),
        Err(ConfigError::ParseError(_))
    ));

    let invalid = temp_dir.path().join("invalid.toml");
    fs::write(&invalid, "[logging]\nformat = \"xml\"\n").unwrap();
    assert!(matches!(
        ConfigManager::from_path(&invalid),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn test_environment_overrides() {
    std::env::set_var("PLACEGRAPH_PER_PAGE", "25");

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("env.toml");
    fs::write(&config_path, "[cascade]\nper_page = 100\n").unwrap();

    let config = ConfigManager::from_path(&config_path).unwrap().into_config();
    assert_eq!(config.cascade.per_page, 25);

    // Clean up
    std::env::remove_var("PLACEGRAPH_PER_PAGE");
}
