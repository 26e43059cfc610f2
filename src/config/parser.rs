use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use kibble_ingest::config::load_config;
///
/// let config = load_config(Path::new("kibble.toml")).unwrap();
/// println!("Max records per run: {}", config.run.max_records);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Each run records this hash so the run history shows which configuration
/// produced which submissions.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[user-agent]
crawler-name = "KibbleBot"
crawler-version = "1.0"
contact-url = "https://example.org/bot"
contact-email = "bot@example.org"

[storage]
database-path = "./kibble.db"

[sources.api]
base-url = "https://api.example/cgi/search.pl"
query = { json = "1", tag_0 = "dog-food" }

[sources.catalog-a]
listing-url = "https://shop-a.example/hundefutter?page={page}"
product-link-selector = "a.product-link"

[sources.catalog-b]
listing-url = "https://shop-b.example/dog/p/{page}"
product-link-selector = ".tile a"
max-details-per-batch = 12
"#;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_minimal_config_applies_defaults() {
        let file = create_temp_config(MINIMAL);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.run.max_records, 200);
        assert_eq!(config.run.record_delay_ms, 1500);
        assert_eq!(config.run.checkpoint_every, 10);
        assert_eq!(config.sources.api.page_size, 50);
        assert_eq!(config.sources.api.first_page, 1);
        assert_eq!(config.sources.api.query.get("tag_0").unwrap(), "dog-food");
        assert_eq!(config.sources.catalog_a.max_details_per_batch, 48);
        assert_eq!(config.sources.catalog_b.max_details_per_batch, 12);
        assert!(config.sources.catalog_a.respect_robots);
    }

    #[test]
    fn test_run_section_overrides() {
        let content = format!(
            "[run]\ntime-budget-secs = 120\nsafety-margin-secs = 10\nmax-records = 5\nlease-ttl-secs = 300\n{}",
            MINIMAL
        );
        let file = create_temp_config(&content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.run.time_budget_secs, 120);
        assert_eq!(config.run.max_records, 5);
        assert_eq!(config.run.working_window().as_secs(), 110);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/kibble.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = format!("[run]\nmax-records = 0\n{}", MINIMAL);
        let file = create_temp_config(&content);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_config_hash_tracks_content() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        assert_eq!(hash1, compute_config_hash(file1.path()).unwrap());
        assert_eq!(hash1.len(), 64);
        assert_ne!(hash1, compute_config_hash(file2.path()).unwrap());
    }
}
