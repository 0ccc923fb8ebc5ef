//! Configuration for signing and validation.

use std::path::PathBuf;
use std::time::Duration;

/// Default time allowed for one engine process before it is killed.
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default tolerance when matching a descriptor to a record by timestamp.
pub const DEFAULT_RECORD_TOLERANCE: Duration = Duration::from_secs(2);

/// Algorithm assumed when neither the engine output nor the key names one.
pub const DEFAULT_ALGORITHM: &str = "ML-DSA-44";

/// External signing engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the engine executable.
    pub executable: PathBuf,

    /// Directory where per-call temporary artifacts are created.
    pub work_dir: PathBuf,

    /// Upper bound on a single engine invocation.
    pub timeout: Duration,

    /// Algorithm used when it cannot be detected from key material.
    pub default_algorithm: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("pqc-cli")
    }
}

impl EngineConfig {
    /// Create an engine configuration for the given executable.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            work_dir: std::env::temp_dir().join("pqsign"),
            timeout: DEFAULT_ENGINE_TIMEOUT,
            default_algorithm: DEFAULT_ALGORITHM.to_string(),
        }
    }

    /// Set the artifact directory.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the fallback algorithm name.
    pub fn with_default_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.default_algorithm = algorithm.into();
        self
    }
}

/// Top-level configuration used by the command-line front end.
#[derive(Debug, Clone)]
pub struct PqSignConfig {
    /// Engine settings.
    pub engine: EngineConfig,

    /// Root directory of the local file storage.
    pub storage_root: PathBuf,

    /// Directory holding per-signer key pairs.
    pub key_dir: PathBuf,

    /// JSON file backing the signature record repository.
    pub repository_file: PathBuf,

    /// Timestamp tolerance for signer + time window lookups.
    pub record_tolerance: Duration,
}

impl Default for PqSignConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PqSignConfig {
    /// Create configuration rooted at `./pqsign-data`.
    pub fn new() -> Self {
        Self::with_home(PathBuf::from("pqsign-data"))
    }

    /// Create configuration with every data path under `home`.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            engine: EngineConfig::default().with_work_dir(home.join("tmp")),
            storage_root: home.join("documents"),
            key_dir: home.join("keys"),
            repository_file: home.join("records.json"),
            record_tolerance: DEFAULT_RECORD_TOLERANCE,
        }
    }

    /// Build configuration from `PQSIGN_*` environment variables.
    ///
    /// Unset variables keep their defaults; an unparsable timeout is ignored
    /// with a warning.
    pub fn from_env() -> Self {
        let mut config = match std::env::var_os("PQSIGN_HOME") {
            Some(home) => Self::with_home(PathBuf::from(home)),
            None => Self::new(),
        };

        if let Some(exe) = std::env::var_os("PQSIGN_ENGINE") {
            config.engine.executable = PathBuf::from(exe);
        }
        if let Some(dir) = std::env::var_os("PQSIGN_WORK_DIR") {
            config.engine.work_dir = PathBuf::from(dir);
        }
        if let Ok(algorithm) = std::env::var("PQSIGN_ALGORITHM") {
            config.engine.default_algorithm = algorithm;
        }
        if let Ok(secs) = std::env::var("PQSIGN_ENGINE_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) => config.engine.timeout = Duration::from_secs(secs),
                Err(_) => log::warn!("Ignoring invalid PQSIGN_ENGINE_TIMEOUT_SECS={}", secs),
            }
        }

        config
    }

    /// Replace the engine settings.
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Set the record lookup tolerance.
    pub fn with_record_tolerance(mut self, tolerance: Duration) -> Self {
        self.record_tolerance = tolerance;
        self
    }
}
