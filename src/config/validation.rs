use crate::config::types::{
    ApiSourceConfig, CatalogSourceConfig, Config, RunConfig, StorageConfig, UserAgentConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_run_config(&config.run)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    validate_api_source(&config.sources.api)?;
    validate_catalog_source("catalog-a", &config.sources.catalog_a)?;
    validate_catalog_source("catalog-b", &config.sources.catalog_b)?;
    validate_progress(config)?;
    Ok(())
}

/// Checks that every source can make progress within one working window
///
/// A whole API page, or a catalog listing plus one detail page, must be
/// fetchable and resolvable before the window closes; otherwise every run
/// would stop on the same batch.
fn validate_progress(config: &Config) -> Result<(), ConfigError> {
    let run = &config.run;
    let window = run.working_window();
    let timeout = run.fetch_timeout();
    let delay = run.record_delay();

    let api_batch = timeout + delay * config.sources.api.page_size;
    if api_batch > window {
        return Err(ConfigError::Validation(format!(
            "an api page ({}s fetch + {} records at {}ms) does not fit the {}s working window",
            run.fetch_timeout_secs,
            config.sources.api.page_size,
            run.record_delay_ms,
            window.as_secs()
        )));
    }

    for (name, catalog) in [
        ("catalog-a", &config.sources.catalog_a),
        ("catalog-b", &config.sources.catalog_b),
    ] {
        let first_record = timeout * 2 + catalog.request_spacing() + delay;
        if first_record > window {
            return Err(ConfigError::Validation(format!(
                "{}: a listing and one detail page ({}s each) do not fit the {}s working window",
                name,
                run.fetch_timeout_secs,
                window.as_secs()
            )));
        }
    }

    Ok(())
}

/// Validates run budget configuration
fn validate_run_config(config: &RunConfig) -> Result<(), ConfigError> {
    if config.time_budget_secs == 0 {
        return Err(ConfigError::Validation(
            "time-budget-secs must be > 0".to_string(),
        ));
    }

    if config.safety_margin_secs >= config.time_budget_secs {
        return Err(ConfigError::Validation(format!(
            "safety-margin-secs ({}) must be smaller than time-budget-secs ({})",
            config.safety_margin_secs, config.time_budget_secs
        )));
    }

    if config.max_records < 1 {
        return Err(ConfigError::Validation(format!(
            "max-records must be >= 1, got {}",
            config.max_records
        )));
    }

    if config.checkpoint_every < 1 {
        return Err(ConfigError::Validation(format!(
            "checkpoint-every must be >= 1, got {}",
            config.checkpoint_every
        )));
    }

    if config.record_delay_ms > 60_000 {
        return Err(ConfigError::Validation(format!(
            "record-delay-ms must be <= 60000ms, got {}ms",
            config.record_delay_ms
        )));
    }

    if config.fetch_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "fetch-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.max_fetch_failures < 1 {
        return Err(ConfigError::Validation(
            "max-fetch-failures must be >= 1".to_string(),
        ));
    }

    // A lease that expires mid-run would let a second run start against the same state
    if config.lease_ttl_secs <= config.time_budget_secs {
        return Err(ConfigError::Validation(format!(
            "lease-ttl-secs ({}) must exceed time-budget-secs ({})",
            config.lease_ttl_secs, config.time_budget_secs
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_api_source(config: &ApiSourceConfig) -> Result<(), ConfigError> {
    validate_http_url("sources.api.base-url", &config.base_url)?;

    if config.page_size < 1 || config.page_size > 1000 {
        return Err(ConfigError::Validation(format!(
            "sources.api.page-size must be between 1 and 1000, got {}",
            config.page_size
        )));
    }

    Ok(())
}

fn validate_catalog_source(name: &str, config: &CatalogSourceConfig) -> Result<(), ConfigError> {
    if !config.listing_url.contains("{page}") {
        return Err(ConfigError::Validation(format!(
            "sources.{}.listing-url must contain a {{page}} placeholder",
            name
        )));
    }
    validate_http_url(
        &format!("sources.{}.listing-url", name),
        &config.listing_url_for(config.first_page),
    )?;

    let mut selectors = vec![
        ("product-link-selector", config.product_link_selector.as_str()),
        ("brand-selector", config.brand_selector.as_str()),
        ("name-selector", config.name_selector.as_str()),
        ("ean-selector", config.ean_selector.as_str()),
        ("nutrient-table-selector", config.nutrient_table_selector.as_str()),
        ("image-selector", config.image_selector.as_str()),
    ];
    if let Some(additives) = &config.additives_table_selector {
        selectors.push(("additives-table-selector", additives.as_str()));
    }
    for (field, selector) in selectors {
        Selector::parse(selector).map_err(|e| {
            ConfigError::InvalidSelector(format!("sources.{}.{} '{}': {}", name, field, selector, e))
        })?;
    }

    if config.max_details_per_batch < 1 {
        return Err(ConfigError::Validation(format!(
            "sources.{}.max-details-per-batch must be >= 1",
            name
        )));
    }

    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
