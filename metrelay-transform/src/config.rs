use serde::{Deserialize, Serialize};

use crate::rule::Rule;

/// Default maximum number of fields per event.
pub const DEFAULT_METRICS_LIMIT: usize = 150;

/// Configuration of the transform.
///
/// This is constructed once at startup and never changes while flushing.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Rules in evaluation order.
    pub rules: Vec<Rule>,

    /// Maximum number of fields in a single event.
    ///
    /// Events with more fields are not sent. Defaults to `150`. Also accepted as `metricsLimit`.
    #[serde(alias = "metricsLimit")]
    pub metrics_limit: usize,

    /// Send a `StatsdLimitErrorSample` record in place of every event that exceeds
    /// `metrics_limit`.
    ///
    /// Defaults to `true`. Also accepted as `sendLimitErrors`.
    #[serde(alias = "sendLimitErrors")]
    pub send_limit_errors: bool,

    /// Log rejected rule matches and every composed payload at info level.
    pub debug: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            metrics_limit: DEFAULT_METRICS_LIMIT,
            send_limit_errors: true,
            debug: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: TransformConfig = serde_json::from_str("{}").unwrap();
        assert!(config.rules.is_empty());
        assert_eq!(config.metrics_limit, 150);
        assert!(config.send_limit_errors);
        assert!(!config.debug);
    }

    #[test]
    fn test_camel_case_keys() {
        let config: TransformConfig =
            serde_json::from_str(r#"{"metricsLimit": 3, "sendLimitErrors": false}"#).unwrap();
        assert_eq!(config.metrics_limit, 3);
        assert!(!config.send_limit_errors);
    }

    #[test]
    fn test_invalid_rule_fails_config() {
        let result = serde_json::from_str::<TransformConfig>(
            r#"{"rules": [{
                "matchExpression": "[",
                "metricSchema": "{metricName}",
                "entityType": "t",
                "entityName": "n",
                "eventType": "Sample"
            }]}"#,
        );

        let error = result.unwrap_err().to_string();
        assert!(error.contains("invalid match expression"), "{error}");
    }
}
