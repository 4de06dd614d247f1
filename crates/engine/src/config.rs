use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Converts to the persistence layer's pool configuration.
    pub fn to_pool_config(&self) -> persistence::db::DatabaseConfig {
        persistence::db::DatabaseConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            connect_timeout_secs: self.connect_timeout_secs,
            idle_timeout_secs: self.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Tracking engine tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Default polling cadence for couriers without explicit settings.
    #[serde(default = "default_update_interval_ms")]
    pub default_update_interval_ms: u64,

    /// Default accuracy gate for couriers without explicit settings.
    #[serde(default = "default_accuracy_threshold_meters")]
    pub default_accuracy_threshold_meters: f64,

    /// Cadence of the event queue drain task.
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,

    /// Maximum events dispatched per drain tick.
    #[serde(default = "default_drain_batch_size")]
    pub drain_batch_size: usize,

    /// Radius of the origin (store) proximity geofence.
    #[serde(default = "default_origin_radius_meters")]
    pub origin_radius_meters: f64,

    /// Radius of the destination (customer) proximity geofence.
    #[serde(default = "default_destination_radius_meters")]
    pub destination_radius_meters: f64,

    /// Inner radius around the destination that counts as "reached".
    #[serde(default = "default_arrival_radius_meters")]
    pub arrival_radius_meters: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            default_update_interval_ms: default_update_interval_ms(),
            default_accuracy_threshold_meters: default_accuracy_threshold_meters(),
            drain_interval_ms: default_drain_interval_ms(),
            drain_batch_size: default_drain_batch_size(),
            origin_radius_meters: default_origin_radius_meters(),
            destination_radius_meters: default_destination_radius_meters(),
            arrival_radius_meters: default_arrival_radius_meters(),
        }
    }
}

// Default value functions
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}
fn default_update_interval_ms() -> u64 {
    5_000
}
fn default_accuracy_threshold_meters() -> f64 {
    100.0
}
fn default_drain_interval_ms() -> u64 {
    1_000
}
fn default_drain_batch_size() -> usize {
    10
}
fn default_origin_radius_meters() -> f64 {
    100.0
}
fn default_destination_radius_meters() -> f64 {
    200.0
}
fn default_arrival_radius_meters() -> f64 {
    50.0
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with CT__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("CT").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(config::ConfigError::Message)?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides, without relying
    /// on config files.
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [database]
            url = "postgres://localhost/courier_tracking_test"

            [logging]
            level = "debug"
            format = "pretty"

            [tracking]
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        let config = builder.build()?;
        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(config::ConfigError::Message)?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err("database.url must not be empty".into());
        }
        let t = &self.tracking;
        if t.default_update_interval_ms == 0 {
            return Err("tracking.default_update_interval_ms must be positive".into());
        }
        if t.drain_interval_ms == 0 {
            return Err("tracking.drain_interval_ms must be positive".into());
        }
        if t.drain_batch_size == 0 {
            return Err("tracking.drain_batch_size must be positive".into());
        }
        if t.origin_radius_meters <= 0.0 || t.destination_radius_meters <= 0.0 {
            return Err("tracking geofence radii must be positive".into());
        }
        if t.arrival_radius_meters <= 0.0 || t.arrival_radius_meters > t.destination_radius_meters
        {
            return Err(
                "tracking.arrival_radius_meters must be positive and within the destination radius"
                    .into(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::load_for_test(&[]).unwrap();
        assert_eq!(config.tracking.default_update_interval_ms, 5_000);
        assert_eq!(config.tracking.default_accuracy_threshold_meters, 100.0);
        assert_eq!(config.tracking.drain_interval_ms, 1_000);
        assert_eq!(config.tracking.drain_batch_size, 10);
        assert_eq!(config.tracking.origin_radius_meters, 100.0);
        assert_eq!(config.tracking.destination_radius_meters, 200.0);
        assert_eq!(config.tracking.arrival_radius_meters, 50.0);
    }

    #[test]
    fn test_override() {
        let config =
            Config::load_for_test(&[("tracking.drain_batch_size", "25")]).unwrap();
        assert_eq!(config.tracking.drain_batch_size, 25);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let result = Config::load_for_test(&[("tracking.default_update_interval_ms", "0")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_arrival_radius_beyond_destination() {
        let result = Config::load_for_test(&[("tracking.arrival_radius_meters", "500")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_empty_database_url() {
        let result = Config::load_for_test(&[("database.url", "")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_to_pool_config() {
        let config = Config::load_for_test(&[]).unwrap();
        let pool = config.database.to_pool_config();
        assert_eq!(pool.max_connections, 20);
        assert_eq!(pool.min_connections, 5);
    }
}
