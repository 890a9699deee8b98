use std::collections::BTreeMap;
use std::env;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use metrelay_log::LogConfig;
use metrelay_transform::TransformConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::upstream::UpstreamDescriptor;

/// Defines the source of a config error
#[derive(Debug, Default)]
enum ConfigErrorSource {
    /// An error occurring independently.
    #[default]
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field override (an env var, or a CLI parameter).
    FieldOverride(String),
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            source: ConfigErrorSource::None,
            kind,
            cause: None,
        }
    }

    #[inline]
    fn wrap<E>(inner: E, kind: ConfigErrorKind) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            source: ConfigErrorSource::None,
            kind,
            cause: Some(Box::new(inner)),
        }
    }

    #[inline]
    fn for_field<E>(inner: E, field: &'static str) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::wrap(inner, ConfigErrorKind::InvalidValue).field(field)
    }

    #[inline]
    fn file<P: AsRef<Path>>(mut self, p: P) -> Self {
        self.source = ConfigErrorSource::File(p.as_ref().to_path_buf());
        self
    }

    #[inline]
    fn field(mut self, name: &'static str) -> Self {
        self.source = ConfigErrorSource::FieldOverride(name.to_owned());
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            ConfigErrorSource::None => self.kind.fmt(f),
            ConfigErrorSource::File(file_name) => {
                write!(f, "{} (file {})", self.kind, file_name.display())
            }
            ConfigErrorSource::FieldOverride(name) => write!(f, "{} (field {})", self.kind, name),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}

/// Indicates config related errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Failed to save a file.
    #[error("could not write config file")]
    CouldNotWriteFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config file")]
    BadJson,
    /// Invalid config value
    #[error("invalid config value")]
    InvalidValue,
}

enum ConfigFormat {
    Yaml,
}

impl ConfigFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yml",
        }
    }
}

trait ConfigObject: DeserializeOwned + Serialize {
    /// The format in which to serialize this configuration.
    fn format() -> ConfigFormat;

    /// The basename of the config file.
    fn name() -> &'static str;

    /// The full filename of the config file, including the file extension.
    fn path(base: &Path) -> PathBuf {
        base.join(format!("{}.{}", Self::name(), Self::format().extension()))
    }

    /// Loads the config file from a file within the given directory location.
    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let f = fs::File::open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path))?;

        match Self::format() {
            ConfigFormat::Yaml => serde_yaml::from_reader(io::BufReader::new(f))
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(&path)),
        }
    }

    /// Writes the configuration object to the given writer.
    fn write<W: Write>(&self, writer: &mut W) -> Result<(), ConfigError> {
        match Self::format() {
            ConfigFormat::Yaml => serde_yaml::to_writer(writer, self)
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile)),
        }
    }

    /// Writes the configuration to a file within the given directory location.
    fn save(&self, base: &Path) -> Result<(), ConfigError> {
        let path = Self::path(base);

        fs::create_dir_all(base)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile).file(base))?;

        let mut f = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile).file(&path))?;

        self.write(&mut f).map_err(|e| e.file(&path))?;
        f.write_all(b"\n").ok();

        Ok(())
    }
}

/// Structure used to hold information about configuration overrides via
/// CLI parameters or environment variables
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// Host name of the collector.
    pub upstream_host: Option<String>,
    /// Port of the collector.
    pub upstream_port: Option<String>,
    /// The UDP port for statsd ingestion.
    pub ingest_port: Option<String>,
    /// The log level.
    pub log_level: Option<String>,
}

/// Controls HTTP requests to the collector.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Http {
    /// Timeout for a whole upstream request in seconds.
    ///
    /// A request that does not complete in time is aborted and its payload is dropped.
    timeout: u64,
    /// Timeout for establishing connections with the upstream in seconds.
    connection_timeout: u64,
}

impl Default for Http {
    fn default() -> Self {
        Http {
            timeout: 5,
            connection_timeout: 3,
        }
    }
}

/// Controls the statsd listener and snapshot aggregation.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Ingest {
    /// The host the UDP listener binds to.
    host: IpAddr,
    /// The port the UDP listener binds to.
    port: u16,
    /// Seconds between two flush cycles.
    flush_interval: u64,
    /// Percentiles computed for every timer, e.g. `90` for the 90th percentile.
    percent_thresholds: Vec<f64>,
    /// Drop gauges after every flush instead of reporting their last value again.
    delete_gauges: bool,
    /// Maximum size of a single UDP datagram in bytes.
    max_packet_size: usize,
}

impl Default for Ingest {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8125,
            flush_interval: 10,
            percent_thresholds: vec![90.0],
            delete_gauges: false,
            max_packet_size: 8192,
        }
    }
}

/// Controls the HTTP status endpoint.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Status {
    /// Serve `/api/status` and `/api/health`.
    enabled: bool,
    /// The host the status server binds to.
    host: IpAddr,
    /// The port the status server binds to.
    port: u16,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            enabled: true,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8126,
        }
    }
}

/// Control the metrics.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Metrics {
    /// Hostname and port of the statsd server.
    ///
    /// Defaults to `None`, which disables internal metrics.
    statsd: Option<String>,
    /// Common prefix that should be added to all metrics.
    ///
    /// Defaults to `"metrelay"`.
    prefix: String,
    /// Default tags to apply to all metrics.
    default_tags: BTreeMap<String, String>,
    /// Tag name to report the hostname to for each metric. Defaults to not sending such a tag.
    hostname_tag: Option<String>,
    /// Global sample rate for all emitted metrics between `0.0` and `1.0`.
    ///
    /// Defaults to `1.0`, which reports every metric.
    sample_rate: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: None,
            prefix: "metrelay".into(),
            default_tags: BTreeMap::new(),
            hostname_tag: None,
            sample_rate: 1.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct ConfigValues {
    #[serde(default)]
    upstream: UpstreamDescriptor,
    #[serde(default)]
    http: Http,
    #[serde(default)]
    transform: TransformConfig,
    #[serde(default)]
    ingest: Ingest,
    #[serde(default)]
    status: Status,
    #[serde(default)]
    logging: LogConfig,
    #[serde(default)]
    metrics: Metrics,
}

impl ConfigObject for ConfigValues {
    fn format() -> ConfigFormat {
        ConfigFormat::Yaml
    }

    fn name() -> &'static str {
        "config"
    }
}

/// Config struct.
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("values", &self.values)
            .finish()
    }
}

impl Config {
    /// Loads a config from a given config folder.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = absolute(path.as_ref());

        Ok(Config {
            values: ConfigValues::load(&path)?,
            path,
        })
    }

    /// Creates a default config for the given config folder without reading any file.
    pub fn default_at<P: AsRef<Path>>(path: P) -> Config {
        Config {
            values: ConfigValues::default(),
            path: absolute(path.as_ref()),
        }
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        Ok(Config {
            values: serde_json::from_value(value)
                .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?,
            path: PathBuf::new(),
        })
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters)
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        let upstream = &mut self.values.upstream;

        if let Some(host) = overrides.upstream_host {
            if host.is_empty() {
                return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("upstream_host"));
            }
            upstream.host = host;
        }

        if let Some(port) = overrides.upstream_port {
            upstream.port = port
                .parse()
                .map_err(|err| ConfigError::for_field(err, "upstream_port"))?;
        }

        if let Some(port) = overrides.ingest_port {
            self.values.ingest.port = port
                .parse()
                .map_err(|err| ConfigError::for_field(err, "ingest_port"))?;
        }

        if let Some(level) = overrides.log_level {
            self.values.logging.level = level
                .parse()
                .map_err(|err| ConfigError::for_field(err, "log_level"))?;
        }

        Ok(self)
    }

    /// Checks if the config is already initialized.
    pub fn config_exists<P: AsRef<Path>>(path: P) -> bool {
        fs::metadata(ConfigValues::path(path.as_ref())).is_ok()
    }

    /// Writes the config values to `config.yml` in the config folder.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.values.save(&self.path)
    }

    /// Returns the path of the config folder.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the config file within the config folder.
    pub fn file_path(&self) -> PathBuf {
        ConfigValues::path(&self.path)
    }

    /// Dumps out a YAML string of the values.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile))
    }

    /// Returns the collector that receives payloads.
    pub fn upstream_descriptor(&self) -> &UpstreamDescriptor {
        &self.values.upstream
    }

    /// Returns the timeout for a whole upstream request.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.values.http.timeout)
    }

    /// Returns the connection timeout for upstream requests.
    pub fn http_connection_timeout(&self) -> Duration {
        Duration::from_secs(self.values.http.connection_timeout)
    }

    /// Returns the configuration of the transform, including its rules.
    pub fn transform_config(&self) -> &TransformConfig {
        &self.values.transform
    }

    /// Returns the socket address of the statsd listener.
    pub fn ingest_addr(&self) -> SocketAddr {
        SocketAddr::new(self.values.ingest.host, self.values.ingest.port)
    }

    /// Returns the interval between flush cycles.
    ///
    /// Intervals below one second are raised to one second.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.values.ingest.flush_interval.max(1))
    }

    /// Returns the percentiles computed for timers.
    pub fn percent_thresholds(&self) -> &[f64] {
        &self.values.ingest.percent_thresholds
    }

    /// Returns `true` if gauges are dropped after every flush.
    pub fn delete_gauges(&self) -> bool {
        self.values.ingest.delete_gauges
    }

    /// Returns the maximum size of a statsd datagram.
    pub fn max_packet_size(&self) -> usize {
        self.values.ingest.max_packet_size
    }

    /// Returns `true` if the status server should run.
    pub fn status_enabled(&self) -> bool {
        self.values.status.enabled
    }

    /// Returns the socket address of the status server.
    pub fn status_addr(&self) -> SocketAddr {
        SocketAddr::new(self.values.status.host, self.values.status.port)
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the address of the statsd server for internal metrics, if configured.
    pub fn statsd_addr(&self) -> Option<&str> {
        self.values.metrics.statsd.as_deref()
    }

    /// Returns the prefix for internal metrics.
    pub fn metrics_prefix(&self) -> &str {
        &self.values.metrics.prefix
    }

    /// Returns the default tags for internal metrics.
    pub fn metrics_default_tags(&self) -> &BTreeMap<String, String> {
        &self.values.metrics.default_tags
    }

    /// Returns the name of the hostname tag for internal metrics, if configured.
    pub fn metrics_hostname_tag(&self) -> Option<&str> {
        self.values.metrics.hostname_tag.as_deref()
    }

    /// Returns the sample rate for internal metrics.
    pub fn metrics_sample_rate(&self) -> f64 {
        self.values.metrics.sample_rate
    }
}

fn absolute(path: &Path) -> PathBuf {
    env::current_dir()
        .map(|x| x.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use metrelay_log::Level;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_json_value(serde_json::json!({})).unwrap();

        assert_eq!(
            config.upstream_descriptor().url(),
            "http://localhost:8001/v1/data"
        );
        assert_eq!(config.http_timeout(), Duration::from_secs(5));
        assert_eq!(config.http_connection_timeout(), Duration::from_secs(3));
        assert_eq!(config.transform_config().metrics_limit, 150);
        assert!(config.transform_config().send_limit_errors);
        assert_eq!(config.ingest_addr(), "127.0.0.1:8125".parse().unwrap());
        assert_eq!(config.flush_interval(), Duration::from_secs(10));
        assert_eq!(config.percent_thresholds(), [90.0]);
        assert_eq!(config.status_addr(), "127.0.0.1:8126".parse().unwrap());
        assert!(config.status_enabled());
        assert_eq!(config.statsd_addr(), None);
        assert_eq!(config.metrics_prefix(), "metrelay");
    }

    #[test]
    fn test_yaml_rules() {
        let yaml = r###"
upstream:
    host: collector.internal
    port: 9000
transform:
    metrics_limit: 20
    debug: true
    rules:
      - matchExpression: ".*redis.*"
        metricSchema: "{app}.{service}.{metricName}"
        entityType: "Redis Cluster"
        entityName: "{app}"
        eventType: "RedisSample"
        labels:
            role: "{service}"
ingest:
    flush_interval: 30
    percent_thresholds: [50, 99.5]
logging:
    level: debug
"###;

        let values: ConfigValues = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(values.upstream.host, "collector.internal");
        assert_eq!(values.upstream.port, 9000);
        assert_eq!(values.upstream.path, "/v1/data");
        assert_eq!(values.transform.rules.len(), 1);
        assert_eq!(values.transform.rules[0].event_type(), "RedisSample");
        assert_eq!(values.transform.metrics_limit, 20);
        assert!(values.transform.debug);
        assert_eq!(values.ingest.flush_interval, 30);
        assert_eq!(values.ingest.percent_thresholds, [50.0, 99.5]);
        assert_eq!(values.logging.level, Level::Debug);
    }

    #[test]
    fn test_yaml_invalid_rule() {
        let yaml = r###"
transform:
    rules:
      - matchExpression: "(unclosed"
        metricSchema: "{metricName}"
        entityType: "t"
        entityName: "n"
        eventType: "Sample"
"###;

        let error = serde_yaml::from_str::<ConfigValues>(yaml).unwrap_err();
        assert!(error.to_string().contains("invalid match expression"));
    }

    #[test]
    fn test_apply_override() {
        let mut config = Config::from_json_value(serde_json::json!({})).unwrap();

        config
            .apply_override(OverridableConfig {
                upstream_host: Some("10.1.2.3".to_owned()),
                upstream_port: Some("9001".to_owned()),
                ingest_port: Some("9125".to_owned()),
                log_level: Some("TRACE".to_owned()),
            })
            .unwrap();

        assert_eq!(
            config.upstream_descriptor().url(),
            "http://10.1.2.3:9001/v1/data"
        );
        assert_eq!(config.ingest_addr().port(), 9125);
        assert_eq!(config.logging().level, Level::Trace);
    }

    #[test]
    fn test_apply_override_invalid_port() {
        let mut config = Config::from_json_value(serde_json::json!({})).unwrap();

        let error = config
            .apply_override(OverridableConfig {
                upstream_port: Some("http".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
        assert_eq!(error.to_string(), "invalid config value (field upstream_port)");
        assert!(error.source().is_some());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("nested");

        assert!(!Config::config_exists(&folder));
        Config::default_at(&folder).save().unwrap();
        assert!(Config::config_exists(&folder));

        let config = Config::from_path(&folder).unwrap();
        assert_eq!(config.path(), folder);
        assert_eq!(config.flush_interval(), Duration::from_secs(10));
        assert!(config.transform_config().rules.is_empty());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let error = Config::from_path(dir.path()).unwrap_err();

        assert_eq!(error.kind(), ConfigErrorKind::CouldNotOpenFile);
        assert!(error.to_string().starts_with("could not open config file (file "));
    }

    #[test]
    fn test_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.yml"), "ingest: [").unwrap();

        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadYaml);
    }
}
