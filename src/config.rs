//! Pool configuration options

use std::collections::HashMap;
use std::time::Duration;

use crate::errors::{PoolError, PoolResult};

/// Configuration for pool capacity and staleness bounds
///
/// # Examples
///
/// ```
/// use respool::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::new()
///     .with_max_open(50)
///     .with_max_idle(10)
///     .with_max_idle_time(Duration::from_secs(300));
///
/// assert_eq!(config.max_open, 50);
/// assert_eq!(config.max_idle, 10);
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of live handles, busy and idle combined
    pub max_open: usize,

    /// Maximum number of idle handles kept for reuse
    pub max_idle: usize,

    /// Idle staleness bound; `None` disables the check
    pub max_idle_time: Option<Duration>,

    /// Total-life staleness bound; `None` disables the check
    pub max_life_time: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open: 10,
            max_idle: 1,
            max_idle_time: Some(Duration::from_secs(600)),
            max_life_time: Some(Duration::from_secs(3600)),
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cap on total live handles
    pub fn with_max_open(mut self, n: usize) -> Self {
        self.max_open = n;
        self
    }

    /// Set the cap on kept idle handles
    pub fn with_max_idle(mut self, n: usize) -> Self {
        self.max_idle = n;
        self
    }

    /// Set the idle staleness bound; zero disables the check
    pub fn with_max_idle_time(mut self, d: Duration) -> Self {
        self.max_idle_time = (!d.is_zero()).then_some(d);
        self
    }

    /// Set the total-life staleness bound; zero disables the check
    pub fn with_max_life_time(mut self, d: Duration) -> Self {
        self.max_life_time = (!d.is_zero()).then_some(d);
        self
    }

    /// Build a configuration from a string key/value map.
    ///
    /// Recognised keys: `maxOpen`, `maxIdle`, `maxIdleTime`, `maxLifeTime`.
    /// Unknown keys are ignored; absent keys take the defaults. Malformed
    /// values fail with [`PoolError::InvalidConfig`].
    ///
    /// # Examples
    ///
    /// ```
    /// use respool::PoolConfig;
    /// use std::collections::HashMap;
    /// use std::time::Duration;
    ///
    /// let mut options = HashMap::new();
    /// options.insert("maxOpen".to_string(), "5".to_string());
    /// options.insert("maxIdleTime".to_string(), "30s".to_string());
    ///
    /// let config = PoolConfig::from_map(&options).unwrap();
    /// assert_eq!(config.max_open, 5);
    /// assert_eq!(config.max_idle_time, Some(Duration::from_secs(30)));
    /// ```
    pub fn from_map(options: &HashMap<String, String>) -> PoolResult<Self> {
        let mut config = Self::default();
        if let Some(value) = options.get("maxOpen") {
            config.max_open = value
                .parse::<i64>()
                .ok()
                .filter(|n| *n >= 1)
                .map(|n| n as usize)
                .ok_or_else(|| PoolError::InvalidConfig(format!("maxOpen: {value}")))?;
        }
        if let Some(value) = options.get("maxIdle") {
            let n = value
                .parse::<i64>()
                .map_err(|_| PoolError::InvalidConfig(format!("maxIdle: {value}")))?;
            config.max_idle = n.max(0) as usize;
        }
        if let Some(value) = options.get("maxIdleTime") {
            config.max_idle_time = parse_duration(value)
                .map_err(|reason| PoolError::InvalidConfig(format!("maxIdleTime: {reason}")))?;
        }
        if let Some(value) = options.get("maxLifeTime") {
            config.max_life_time = parse_duration(value)
                .map_err(|reason| PoolError::InvalidConfig(format!("maxLifeTime: {reason}")))?;
        }
        Ok(config)
    }

    /// Reject capacities a pool cannot be built with.
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_open == 0 {
            return Err(PoolError::InvalidConfig(
                "max_open must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Keeping more idle handles than can ever exist is meaningless.
    pub(crate) fn clamped(mut self) -> Self {
        if self.max_idle > self.max_open {
            self.max_idle = self.max_open;
        }
        self
    }
}

/// Parse a duration string (e.g. "30s", "10m", "1h", bare integer = seconds).
/// Returns `None` for "off", "0" and negative values, all of which disable
/// the corresponding check.
fn parse_duration(s: &str) -> Result<Option<Duration>, String> {
    let s = s.trim().to_lowercase();

    if s == "off" || s == "0" || s.is_empty() || s.starts_with('-') {
        return Ok(None);
    }

    let (num_str, unit) = if let Some(rest) = s.strip_suffix('s') {
        (rest, 1u64)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, 60)
    } else if let Some(rest) = s.strip_suffix('h') {
        (rest, 3600)
    } else {
        // Bare integer is seconds.
        return s
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| format!("invalid duration: {s}"));
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| format!("invalid number: {num_str}"))?;

    Ok(Some(Duration::from_secs(num * unit)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_open, 10);
        assert_eq!(config.max_idle, 1);
        assert_eq!(config.max_idle_time, Some(Duration::from_secs(600)));
        assert_eq!(config.max_life_time, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_builder_zero_disables_ttls() {
        let config = PoolConfig::new()
            .with_max_idle_time(Duration::ZERO)
            .with_max_life_time(Duration::ZERO);
        assert_eq!(config.max_idle_time, None);
        assert_eq!(config.max_life_time, None);
    }

    #[test]
    fn test_from_map_defaults_and_overrides() {
        let config = PoolConfig::from_map(&HashMap::new()).unwrap();
        assert_eq!(config.max_open, 10);
        assert_eq!(config.max_idle, 1);

        let mut options = HashMap::new();
        options.insert("maxOpen".to_string(), "5".to_string());
        options.insert("maxIdle".to_string(), "2".to_string());
        options.insert("maxIdleTime".to_string(), "1h".to_string());
        options.insert("maxLifeTime".to_string(), "0".to_string());
        options.insert("somethingElse".to_string(), "ignored".to_string());

        let config = PoolConfig::from_map(&options).unwrap();
        assert_eq!(config.max_open, 5);
        assert_eq!(config.max_idle, 2);
        assert_eq!(config.max_idle_time, Some(Duration::from_secs(3600)));
        assert_eq!(config.max_life_time, None);
    }

    #[test]
    fn test_from_map_rejects_malformed_values() {
        for (key, value) in [
            ("maxOpen", "0"),
            ("maxOpen", "ten"),
            ("maxIdle", "2.5"),
            ("maxIdleTime", "10x"),
            ("maxLifeTime", "h"),
        ] {
            let mut options = HashMap::new();
            options.insert(key.to_string(), value.to_string());
            assert!(
                PoolConfig::from_map(&options).is_err(),
                "{key}={value} should be rejected"
            );
        }
    }

    #[test]
    fn test_from_map_clamps_negative_max_idle() {
        let mut options = HashMap::new();
        options.insert("maxIdle".to_string(), "-3".to_string());
        let config = PoolConfig::from_map(&options).unwrap();
        assert_eq!(config.max_idle, 0);
    }

    #[test]
    fn test_validate_and_clamp() {
        assert!(PoolConfig::new().with_max_open(0).validate().is_err());
        assert!(PoolConfig::default().validate().is_ok());

        let config = PoolConfig::new()
            .with_max_open(10)
            .with_max_idle(11)
            .clamped();
        assert_eq!(config.max_idle, 10);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("off").unwrap(), None);
        assert_eq!(parse_duration("0").unwrap(), None);
        assert_eq!(parse_duration("-5s").unwrap(), None);

        assert_eq!(
            parse_duration("30s").unwrap(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_duration("10m").unwrap(),
            Some(Duration::from_secs(600))
        );
        assert_eq!(
            parse_duration("1h").unwrap(),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(
            parse_duration("120").unwrap(),
            Some(Duration::from_secs(120))
        );

        assert!(parse_duration("12d").is_err());
        assert!(parse_duration("s").is_err());
    }
}
