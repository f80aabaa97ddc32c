use std::path::PathBuf;

/// Process configuration, read from `WASHDESK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// Compact the journal on startup once it holds more records than
    /// this. 0 disables compaction.
    pub compact_threshold: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?} as a number")]
    NotANumber { var: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
        }
    }
}

fn parse_num<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::NotANumber { var, value })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a config from any variable source. Unset variables take their
    /// defaults; set but unparsable numbers are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(bind) = lookup("WASHDESK_BIND") {
            config.bind = bind;
        }
        if let Some(port) = lookup("WASHDESK_PORT") {
            config.port = parse_num("WASHDESK_PORT", port)?;
        }
        if let Some(dir) = lookup("WASHDESK_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(port) = lookup("WASHDESK_METRICS_PORT") {
            config.metrics_port = Some(parse_num("WASHDESK_METRICS_PORT", port)?);
        }
        if let Some(threshold) = lookup("WASHDESK_COMPACT_THRESHOLD") {
            config.compact_threshold = parse_num("WASHDESK_COMPACT_THRESHOLD", threshold)?;
        }
        Ok(config)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("washdesk.wal")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.addr(), "0.0.0.0:8080");
        assert_eq!(config.journal_path(), PathBuf::from("./data/washdesk.wal"));
    }

    #[test]
    fn overrides() {
        let config = Config::from_lookup(lookup(&[
            ("WASHDESK_BIND", "127.0.0.1"),
            ("WASHDESK_PORT", "9000"),
            ("WASHDESK_DATA_DIR", "/var/lib/washdesk"),
            ("WASHDESK_METRICS_PORT", "9100"),
            ("WASHDESK_COMPACT_THRESHOLD", "0"),
        ]))
        .unwrap();
        assert_eq!(config.addr(), "127.0.0.1:9000");
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.compact_threshold, 0);
        assert_eq!(
            config.journal_path(),
            PathBuf::from("/var/lib/washdesk/washdesk.wal")
        );
    }

    #[test]
    fn bad_number_is_an_error() {
        let err = Config::from_lookup(lookup(&[("WASHDESK_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::NotANumber { var: "WASHDESK_PORT", .. }));
        assert!(err.to_string().contains("eighty"));
    }
}
