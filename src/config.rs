use crate::{
    aof::FsyncPolicy,
    bytes::{lex, parse, Output},
    evict::{self, Policy},
};
use logos::Logos;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The default number of databases in the selector.
pub const DEFAULT_DATABASES: usize = 16;

/// The snapshot file name inside `dir`.
pub const DUMP_FILENAME: &str = "dump.rdb";

/// The append-only log file name inside `dir`.
pub const AOF_FILENAME: &str = "appendonly.aof";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown config key '{}'", Output(.0.as_bytes()))]
    UnknownKey(String),

    #[error("invalid value for '{key}': {reason}")]
    Invalid {
        key: &'static str,
        reason: &'static str,
    },

    #[error("missing value for '{}'", Output(.0.as_bytes()))]
    MissingValue(String),
}

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
enum ConfigKey {
    #[regex(b"(?i:port)")]
    Port,

    #[regex(b"(?i:bind)")]
    Bind,

    #[regex(b"(?i:databases)")]
    Databases,

    #[regex(b"(?i:maxmemory)")]
    Maxmemory,

    #[regex(b"(?i:maxmemory-policy)")]
    MaxmemoryPolicy,

    #[regex(b"(?i:maxmemory-samples)")]
    MaxmemorySamples,

    #[regex(b"(?i:save)")]
    Save,

    #[regex(b"(?i:appendonly)")]
    Appendonly,

    #[regex(b"(?i:appendfsync)")]
    Appendfsync,

    #[regex(b"(?i:dir)")]
    Dir,

    #[regex(b"(?i:loglevel)")]
    Loglevel,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
enum YesNo {
    #[regex(b"(?i:yes)")]
    Yes,

    #[regex(b"(?i:no)")]
    No,
}

fn yes_no(value: &[u8], key: &'static str) -> Result<bool, ConfigError> {
    match lex(value) {
        Some(YesNo::Yes) => Ok(true),
        Some(YesNo::No) => Ok(false),
        None => Err(ConfigError::Invalid {
            key,
            reason: "argument must be 'yes' or 'no'",
        }),
    }
}

/// Parse a byte count, accepting `kb`/`mb`/`gb` (powers of 1024) and
/// `k`/`m`/`g` (powers of 1000) suffixes.
fn memory(value: &[u8], key: &'static str) -> Result<usize, ConfigError> {
    let error = ConfigError::Invalid {
        key,
        reason: "argument must be a memory size",
    };
    let text = std::str::from_utf8(value).map_err(|_| error)?;
    let text = text.trim().to_ascii_lowercase();

    let (digits, unit) = match text.find(|c: char| !c.is_ascii_digit()) {
        Some(at) => text.split_at(at),
        None => (&text[..], ""),
    };

    let error = ConfigError::Invalid {
        key,
        reason: "argument must be a memory size",
    };
    let base: usize = digits.parse().map_err(|_| error)?;

    let scale = match unit {
        "" | "b" => 1,
        "k" => 1000,
        "kb" => 1024,
        "m" => 1000 * 1000,
        "mb" => 1024 * 1024,
        "g" => 1000 * 1000 * 1000,
        "gb" => 1024 * 1024 * 1024,
        _ => {
            return Err(ConfigError::Invalid {
                key,
                reason: "argument must be a memory size",
            })
        }
    };

    Ok(base.saturating_mul(scale))
}

/// Server configuration: a flat key/value file plus command line
/// overrides.
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind: Vec<String>,
    pub databases: usize,
    pub maxmemory: usize,
    pub maxmemory_policy: Policy,
    pub maxmemory_samples: usize,
    /// Snapshot triggers: `(seconds, changes)` pairs.
    pub save_points: Vec<(u64, u64)>,
    pub appendonly: bool,
    pub appendfsync: FsyncPolicy,
    pub dir: PathBuf,
    pub loglevel: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 6379,
            bind: vec!["127.0.0.1".to_string()],
            databases: DEFAULT_DATABASES,
            maxmemory: 0,
            maxmemory_policy: Policy::NoEviction,
            maxmemory_samples: evict::DEFAULT_SAMPLES,
            save_points: Vec::new(),
            appendonly: false,
            appendfsync: FsyncPolicy::EverySec,
            dir: PathBuf::from("."),
            loglevel: "notice".to_string(),
        }
    }
}

impl Config {
    /// Parse a config file: one `key value...` per line, `#` comments.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let mut config = Config::default();
        let text = std::fs::read_to_string(path)?;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((key, value)) => (key, value.trim()),
                None => return Err(ConfigError::MissingValue(line.to_string())),
            };
            config.apply(key, value)?;
        }
        Ok(config)
    }

    /// Apply one option. Used for both file lines and `--key value`
    /// command line overrides.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let Some(key) = lex::<ConfigKey>(key.as_bytes()) else {
            return Err(ConfigError::UnknownKey(key.to_string()));
        };
        let bytes = value.as_bytes();

        match key {
            ConfigKey::Port => {
                self.port = parse(bytes).ok_or(ConfigError::Invalid {
                    key: "port",
                    reason: "argument must be a port number",
                })?;
            }
            ConfigKey::Bind => {
                self.bind = value.split_whitespace().map(str::to_string).collect();
                if self.bind.is_empty() {
                    return Err(ConfigError::Invalid {
                        key: "bind",
                        reason: "at least one address is required",
                    });
                }
            }
            ConfigKey::Databases => {
                let databases: usize = parse(bytes).ok_or(ConfigError::Invalid {
                    key: "databases",
                    reason: "argument must be a positive integer",
                })?;
                if databases == 0 {
                    return Err(ConfigError::Invalid {
                        key: "databases",
                        reason: "argument must be a positive integer",
                    });
                }
                self.databases = databases;
            }
            ConfigKey::Maxmemory => {
                self.maxmemory = memory(bytes, "maxmemory")?;
            }
            ConfigKey::MaxmemoryPolicy => {
                self.maxmemory_policy =
                    Policy::parse(bytes).ok_or(ConfigError::Invalid {
                        key: "maxmemory-policy",
                        reason: "unknown eviction policy",
                    })?;
            }
            ConfigKey::MaxmemorySamples => {
                let samples: usize = parse(bytes).ok_or(ConfigError::Invalid {
                    key: "maxmemory-samples",
                    reason: "argument must be a positive integer",
                })?;
                self.maxmemory_samples = samples.max(1);
            }
            ConfigKey::Save => {
                // An empty value clears the schedule; numbers accumulate
                // as (seconds, changes) pairs.
                if value.is_empty() {
                    self.save_points.clear();
                    return Ok(());
                }
                let numbers: Option<Vec<u64>> =
                    value.split_whitespace().map(|n| n.parse().ok()).collect();
                let numbers = numbers.ok_or(ConfigError::Invalid {
                    key: "save",
                    reason: "arguments must be '<seconds> <changes>' pairs",
                })?;
                if numbers.len() % 2 != 0 {
                    return Err(ConfigError::Invalid {
                        key: "save",
                        reason: "arguments must be '<seconds> <changes>' pairs",
                    });
                }
                for pair in numbers.chunks_exact(2) {
                    self.save_points.push((pair[0], pair[1]));
                }
            }
            ConfigKey::Appendonly => {
                self.appendonly = yes_no(bytes, "appendonly")?;
            }
            ConfigKey::Appendfsync => {
                self.appendfsync =
                    FsyncPolicy::parse(bytes).ok_or(ConfigError::Invalid {
                        key: "appendfsync",
                        reason: "argument must be 'always', 'everysec' or 'no'",
                    })?;
            }
            ConfigKey::Dir => {
                self.dir = PathBuf::from(value);
            }
            ConfigKey::Loglevel => {
                self.loglevel = value.to_ascii_lowercase();
            }
        }

        Ok(())
    }

    pub fn dump_path(&self) -> PathBuf {
        self.dir.join(DUMP_FILENAME)
    }

    pub fn aof_path(&self) -> PathBuf {
        self.dir.join(AOF_FILENAME)
    }

    /// Map `loglevel` onto a tracing env-filter directive.
    pub fn tracing_filter(&self) -> &'static str {
        match self.loglevel.as_str() {
            "debug" => "debug",
            "verbose" => "debug",
            "notice" => "info",
            "warning" => "warn",
            "error" => "error",
            _ => "info",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.port, 6379);
        assert_eq!(config.databases, 16);
        assert_eq!(config.maxmemory, 0);
        assert_eq!(config.maxmemory_policy, Policy::NoEviction);
        assert!(!config.appendonly);
    }

    #[test]
    fn apply_options() {
        let mut config = Config::default();
        config.apply("port", "6380").unwrap();
        config.apply("MAXMEMORY", "100mb").unwrap();
        config.apply("maxmemory-policy", "allkeys-lru").unwrap();
        config.apply("appendonly", "yes").unwrap();
        config.apply("appendfsync", "always").unwrap();
        config.apply("save", "900 1 300 10").unwrap();

        assert_eq!(config.port, 6380);
        assert_eq!(config.maxmemory, 100 * 1024 * 1024);
        assert_eq!(config.maxmemory_policy, Policy::AllkeysLru);
        assert!(config.appendonly);
        assert_eq!(config.appendfsync, FsyncPolicy::Always);
        assert_eq!(config.save_points, vec![(900, 1), (300, 10)]);
    }

    #[test]
    fn rejections() {
        let mut config = Config::default();
        assert!(config.apply("bogus", "1").is_err());
        assert!(config.apply("port", "not-a-port").is_err());
        assert!(config.apply("databases", "0").is_err());
        assert!(config.apply("maxmemory-policy", "sometimes").is_err());
        assert!(config.apply("save", "900").is_err());
        assert!(config.apply("appendonly", "maybe").is_err());
    }

    #[test]
    fn memory_units() {
        assert_eq!(memory(b"100", "maxmemory").unwrap(), 100);
        assert_eq!(memory(b"1kb", "maxmemory").unwrap(), 1024);
        assert_eq!(memory(b"1k", "maxmemory").unwrap(), 1000);
        assert_eq!(memory(b"2mb", "maxmemory").unwrap(), 2 * 1024 * 1024);
        assert_eq!(memory(b"1gb", "maxmemory").unwrap(), 1024 * 1024 * 1024);
        assert!(memory(b"five", "maxmemory").is_err());
    }

    #[test]
    fn load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.conf");
        std::fs::write(
            &path,
            "# comment\n\nport 7000\nsave 60 100\nloglevel warning\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.save_points, vec![(60, 100)]);
        assert_eq!(config.tracing_filter(), "warn");
    }
}
