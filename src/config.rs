use std::{collections::HashMap, io, path::Path};

use thiserror::Error;

use crate::{backtest::EngineConfig, types::AssetConfig};

/// Errors from loading `key=value` configuration files.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("key not found: `{0}`")]
    MissingKey(String),
    #[error("failed to parse key `{key}` with value `{value}`")]
    Parse { key: String, value: String },
}

/// Reads plain `key=value` configuration files. Lines starting with `#` and blank lines are
/// skipped; when a key occurs more than once, the last occurrence wins.
pub struct ConfigReader {
    constants: HashMap<String, String>,
}

impl ConfigReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        let mut constants = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                constants.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Ok(Self { constants })
    }

    pub fn has(&self, key: &str) -> bool {
        self.constants.contains_key(key)
    }

    pub fn get_str(&self, key: &str) -> Result<&str, ConfigError> {
        self.constants
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, ConfigError> {
        let value = self.get_str(key)?;
        value.parse().map_err(|_| ConfigError::Parse {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn get_u64(&self, key: &str) -> Result<u64, ConfigError> {
        let value = self.get_str(key)?;
        value.parse().map_err(|_| ConfigError::Parse {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn get_usize(&self, key: &str) -> Result<usize, ConfigError> {
        let value = self.get_str(key)?;
        value.parse().map_err(|_| ConfigError::Parse {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Reads an integer flag: `0` is false, anything else is true.
    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigError> {
        Ok(self.get_u64(key)? != 0)
    }
}

/// Loads a per-asset configuration file.
pub fn read_asset_config<P: AsRef<Path>>(path: P) -> Result<AssetConfig, ConfigError> {
    let reader = ConfigReader::open(path)?;
    Ok(AssetConfig {
        book_update_file: reader.get_str("book_update_file")?.to_string(),
        trade_file: reader.get_str("trade_file")?.to_string(),
        tick_size: reader.get_f64("tick_size")?,
        lot_size: reader.get_f64("lot_size")?,
        contract_multiplier: reader.get_f64("contract_multiplier")?,
        is_inverse: reader.get_bool("is_inverse")?,
        maker_fee: reader.get_f64("maker_fee")?,
        taker_fee: reader.get_f64("taker_fee")?,
        name: reader.get_str("name").unwrap_or_default().to_string(),
    })
}

/// Loads the engine configuration file.
pub fn read_engine_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let reader = ConfigReader::open(path)?;
    Ok(EngineConfig {
        initial_cash: reader.get_f64("initial_cash")?,
        order_entry_latency: reader.get_u64("order_entry_latency_us")?,
        order_response_latency: reader.get_u64("order_response_latency_us")?,
        market_feed_latency: reader.get_u64("market_feed_latency_us")?,
    })
}

/// The main loop's step width and iteration count.
#[derive(Clone, Debug)]
pub struct BacktestConfig {
    pub elapse_us: u64,
    pub iterations: u64,
}

pub fn read_backtest_config<P: AsRef<Path>>(path: P) -> Result<BacktestConfig, ConfigError> {
    let reader = ConfigReader::open(path)?;
    Ok(BacktestConfig {
        elapse_us: reader.get_u64("elapse_us")?,
        iterations: reader.get_u64("iterations")?,
    })
}

/// Equity sampling configuration.
#[derive(Clone, Debug)]
pub struct RecorderConfig {
    pub interval_us: u64,
    pub output_file: String,
}

pub fn read_recorder_config<P: AsRef<Path>>(path: P) -> Result<RecorderConfig, ConfigError> {
    let reader = ConfigReader::open(path)?;
    Ok(RecorderConfig {
        interval_us: reader.get_u64("interval_us")?,
        output_file: reader.get_str("output_file")?.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("lobsim_cfg_{}_{}", std::process::id(), name));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_comments_and_last_occurrence_wins() {
        let path = write_temp(
            "basic.txt",
            "# a comment\n\
             tick_size=0.5\n\
             \n\
             tick_size=0.25\n\
             name=BTCUSDT\n",
        );
        let reader = ConfigReader::open(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(reader.get_f64("tick_size").unwrap(), 0.25);
        assert_eq!(reader.get_str("name").unwrap(), "BTCUSDT");
        assert!(reader.has("tick_size"));
        assert!(!reader.has("lot_size"));
        assert!(matches!(
            reader.get_f64("lot_size"),
            Err(ConfigError::MissingKey(_))
        ));
        assert!(matches!(
            reader.get_u64("name"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn loads_typed_configs() {
        let path = write_temp(
            "engine.txt",
            "initial_cash=5000\n\
             order_entry_latency_us=25000\n\
             order_response_latency_us=10000\n\
             market_feed_latency_us=50000\n",
        );
        let config = read_engine_config(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.initial_cash, 5000.0);
        assert_eq!(config.order_entry_latency, 25_000);
        assert_eq!(config.order_response_latency, 10_000);
        assert_eq!(config.market_feed_latency, 50_000);

        let path = write_temp(
            "backtest.txt",
            "elapse_us=1000000\niterations=86400\n",
        );
        let config = read_backtest_config(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.elapse_us, 1_000_000);
        assert_eq!(config.iterations, 86_400);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            ConfigReader::open("/definitely/not/here.txt"),
            Err(ConfigError::Io { .. })
        ));
    }
}
