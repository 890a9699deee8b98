use anyhow::Result;
use metrelay_config::Config;
use metrelay_statsd::MetricsClientConfig;

/// Validates settings that deserialize fine but cannot work at runtime.
pub fn check_config(config: &Config) -> Result<()> {
    if config.max_packet_size() == 0 {
        anyhow::bail!("`ingest.max_packet_size` must be greater than zero");
    }

    let rate = config.metrics_sample_rate();
    if !(0.0..=1.0).contains(&rate) {
        anyhow::bail!("`metrics.sample_rate` must be between 0 and 1, got {rate}");
    }

    if config.transform_config().rules.is_empty() {
        metrelay_log::warn!(
            "no transform rules configured in {}, metrics will not be forwarded",
            config.file_path().display()
        );
    }

    Ok(())
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    if config.path().as_os_str().is_empty() {
        metrelay_log::info!("launching relay without config folder");
    } else {
        metrelay_log::info!(
            "launching relay from config folder {}",
            config.path().display()
        );
    }

    let transform = config.transform_config();
    metrelay_log::info!("  upstream: {}", config.upstream_descriptor());
    metrelay_log::info!("  statsd: udp://{}", config.ingest_addr());
    if config.status_enabled() {
        metrelay_log::info!("  status: http://{}", config.status_addr());
    } else {
        metrelay_log::info!("  status: -");
    }
    metrelay_log::info!("  flush interval: {}s", config.flush_interval().as_secs());
    metrelay_log::info!("  rules: {}", transform.rules.len());
    metrelay_log::info!("  metrics limit: {}", transform.metrics_limit);
    metrelay_log::info!("  log level: {}", config.logging().level);
}

/// Initialize the metric system.
pub fn init_metrics(config: &Config) -> Result<()> {
    let Some(host) = config.statsd_addr() else {
        return Ok(());
    };

    let mut default_tags = config.metrics_default_tags().clone();
    if let Some(hostname_tag) = config.metrics_hostname_tag()
        && let Some(hostname) = hostname::get().ok().and_then(|s| s.into_string().ok())
    {
        default_tags.insert(hostname_tag.to_owned(), hostname);
    }

    metrelay_statsd::init(MetricsClientConfig {
        prefix: config.metrics_prefix(),
        host,
        default_tags,
        default_sample_rate: config.metrics_sample_rate().into(),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_check_default_config() {
        let config = Config::from_json_value(json!({})).unwrap();
        assert!(check_config(&config).is_ok());
    }

    #[test]
    fn test_check_zero_packet_size() {
        let config = Config::from_json_value(json!({"ingest": {"max_packet_size": 0}})).unwrap();
        assert!(check_config(&config).is_err());
    }

    #[test]
    fn test_check_sample_rate() {
        let config = Config::from_json_value(json!({"metrics": {"sample_rate": 2.0}})).unwrap();
        assert!(check_config(&config).is_err());
    }
}
