use chrono::Duration;
use serde::Deserialize;
use std::path::PathBuf;

/// Which session storage backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Durable, shareable between processes
    Sqlite,
    /// Ephemeral, single process
    Memory,
}

impl BackendKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" => Some(BackendKind::Sqlite),
            "memory" => Some(BackendKind::Memory),
            _ => None,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: PathBuf,
    /// Port the server listens on
    pub port: u16,
    /// Session storage backend
    pub backend: BackendKind,
    /// Seconds a session survives without writes (0 = forever)
    pub session_ttl_secs: u64,
    /// Namespace prefix for session storage keys
    pub key_prefix: String,
    /// Compare-and-swap attempts before an update gives up
    pub max_commit_retries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("client-sync")
                .join("sessions.db"),
            port: 8080,
            backend: BackendKind::Sqlite,
            session_ttl_secs: 60 * 60 * 24,
            key_prefix: "clientsync".to_string(),
            max_commit_retries: 8,
        }
    }
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        // Start with defaults
        let mut config = Self::default();

        // Try to load from config file
        let path = config_path
            .or_else(|| std::env::var("CLIENT_SYNC_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            config = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;
        }

        // Apply environment variable overrides
        if let Ok(db_path) = std::env::var("CLIENT_SYNC_DATABASE_PATH") {
            config.database_path = PathBuf::from(db_path);
        }
        if let Ok(port) = std::env::var("CLIENT_SYNC_PORT") {
            config.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("CLIENT_SYNC_PORT", port))?;
        }
        if let Ok(backend) = std::env::var("CLIENT_SYNC_BACKEND") {
            config.backend = BackendKind::parse(&backend)
                .ok_or(ConfigError::InvalidEnv("CLIENT_SYNC_BACKEND", backend))?;
        }
        if let Ok(ttl) = std::env::var("CLIENT_SYNC_SESSION_TTL") {
            config.session_ttl_secs = ttl
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("CLIENT_SYNC_SESSION_TTL", ttl))?;
        }
        if let Ok(prefix) = std::env::var("CLIENT_SYNC_KEY_PREFIX") {
            config.key_prefix = prefix;
        }

        Ok(config)
    }

    /// Default config file path: ~/.config/client-sync/config.yaml
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("client-sync")
            .join("config.yaml")
    }

    /// Session time-to-live, `None` when sessions never expire.
    pub fn session_ttl(&self) -> Option<Duration> {
        match self.session_ttl_secs {
            0 => None,
            secs => Some(Duration::seconds(secs.min(i64::MAX as u64) as i64)),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidEnv(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    e
                )
            }
            ConfigError::InvalidEnv(name, value) => {
                write!(f, "Invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.database_path.to_string_lossy().contains("sessions.db"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.backend, BackendKind::Sqlite);
        assert_eq!(config.session_ttl(), Some(Duration::days(1)));
        assert_eq!(config.key_prefix, "clientsync");
    }

    #[test]
    fn test_load_no_file_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.max_commit_retries, 8);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "database_path: /custom/path/sessions.sqlite").unwrap();
        writeln!(file, "backend: memory").unwrap();
        writeln!(file, "session_ttl_secs: 0").unwrap();
        writeln!(file, "max_commit_retries: 3").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(
            config.database_path,
            PathBuf::from("/custom/path/sessions.sqlite")
        );
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.session_ttl(), None);
        assert_eq!(config.max_commit_retries, 3);
    }

    #[test]
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "key_prefix: fromfile").unwrap();

        // Set env var
        std::env::set_var("CLIENT_SYNC_KEY_PREFIX", "fromenv");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.key_prefix, "fromenv");

        // Clean up
        std::env::remove_var("CLIENT_SYNC_KEY_PREFIX");
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(Some(config_path));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!(BackendKind::parse("SQLite"), Some(BackendKind::Sqlite));
        assert_eq!(BackendKind::parse("memory"), Some(BackendKind::Memory));
        assert_eq!(BackendKind::parse("redis"), None);
    }
}
