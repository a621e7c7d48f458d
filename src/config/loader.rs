//! Locating, reading and overriding the configuration.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use crate::line::BaudRate;
use std::path::{Path, PathBuf};

/// Explicit config file, checked before any default location.
const CONFIG_PATH_VAR: &str = "ASYNC_SERIAL_CONFIG";

/// Config file picked up from the working directory.
const LOCAL_CONFIG_FILE: &str = "async-serial.toml";

const PORT_PATH_VAR: &str = "ASYNC_SERIAL_PORT_PATH";
const PORT_BAUD_VAR: &str = "ASYNC_SERIAL_PORT_BAUD";
const PORT_MODE_VAR: &str = "ASYNC_SERIAL_PORT_MODE";
const LOG_LEVEL_VAR: &str = "ASYNC_SERIAL_LOG_LEVEL";

/// A validated configuration and the file it came from, if any.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub config_path: Option<PathBuf>,
    pub config: Config,
}

impl ConfigLoader {
    /// Load from the first config file found, or from defaults.
    ///
    /// Environment overrides are applied on top, then the result is
    /// validated.
    pub fn load() -> ConfigResult<Self> {
        Self::assemble(resolve_config_path())
    }

    /// Load from `path`, which must exist.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::assemble(Some(path.as_ref().to_path_buf()))
    }

    fn assemble(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = match &config_path {
            Some(path) => read_config(path)?,
            None => Config::default(),
        };
        apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(Self {
            config_path,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }
}

/// The first existing file among `$ASYNC_SERIAL_CONFIG`, `./async-serial.toml`
/// and [`get_default_config_path`].
pub fn resolve_config_path() -> Option<PathBuf> {
    std::env::var_os(CONFIG_PATH_VAR)
        .map(PathBuf::from)
        .into_iter()
        .chain(Some(PathBuf::from(LOCAL_CONFIG_FILE)))
        .chain(get_default_config_path())
        .find(|candidate| candidate.is_file())
}

/// `async-serial/config.toml` under `$XDG_CONFIG_HOME`, or `~/.config`.
pub fn get_default_config_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;
    Some(base.join("async-serial").join("config.toml"))
}

fn read_config(path: &Path) -> ConfigResult<Config> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Overlay `ASYNC_SERIAL_*` values returned by `lookup` onto `config`.
fn apply_env_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> ConfigResult<()> {
    if let Some(path) = lookup(PORT_PATH_VAR) {
        config.port.path = Some(path);
    }
    if let Some(value) = lookup(PORT_BAUD_VAR) {
        let bps: u32 = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::bad_override(PORT_BAUD_VAR, &value, "not a number"))?;
        config.port.baud =
            BaudRate::try_from(bps).map_err(|source| ConfigError::UnsupportedBaud {
                origin: PORT_BAUD_VAR.to_string(),
                source,
            })?;
    }
    if let Some(value) = lookup(PORT_MODE_VAR) {
        config.port.mode = value.parse().map_err(|reason: String| {
            ConfigError::bad_override(PORT_MODE_VAR, &value, reason)
        })?;
    }
    if let Some(level) = lookup(LOG_LEVEL_VAR) {
        config.logging.level = level;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::{OpenMode, UnsupportedBaudRate};
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::collections::HashMap;
    use std::env;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| vars.get(var).cloned()
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut config = Config::default();
        apply_env_overrides(
            &mut config,
            overrides(&[
                (PORT_PATH_VAR, "/dev/ttyACM1"),
                (PORT_BAUD_VAR, "57600"),
                (PORT_MODE_VAR, "ro"),
                (LOG_LEVEL_VAR, "debug"),
            ]),
        )
        .unwrap();

        assert_eq!(config.port.path.as_deref(), Some("/dev/ttyACM1"));
        assert_eq!(config.port.baud, BaudRate::B57600);
        assert_eq!(config.port.mode, OpenMode::ReadOnly);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_bad_overrides_are_reported() {
        let mut config = Config::default();
        let result = apply_env_overrides(&mut config, overrides(&[(PORT_BAUD_VAR, "fast")]));
        assert!(matches!(
            result,
            Err(ConfigError::BadOverride { var, .. }) if var == PORT_BAUD_VAR
        ));

        let result = apply_env_overrides(&mut config, overrides(&[(PORT_BAUD_VAR, "31250")]));
        match result {
            Err(ConfigError::UnsupportedBaud { source, .. }) => {
                assert_eq!(source, UnsupportedBaudRate(31250))
            }
            other => panic!("Expected unsupported baud, got: {:?}", other),
        }

        let result = apply_env_overrides(&mut config, overrides(&[(PORT_MODE_VAR, "sideways")]));
        assert!(matches!(
            result,
            Err(ConfigError::BadOverride { var, .. }) if var == PORT_MODE_VAR
        ));
        assert_eq!(config.port.baud, BaudRate::B9600);
    }

    #[test]
    #[serial]
    fn test_load_uses_explicit_file_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("serial.toml");
        std::fs::write(&path, "[port]\npath = \"/dev/ttyUSB3\"\nbaud = 230400\n").unwrap();

        env::set_var(CONFIG_PATH_VAR, &path);
        env::set_var(PORT_MODE_VAR, "write-only");
        let loaded = ConfigLoader::load();
        env::remove_var(CONFIG_PATH_VAR);
        env::remove_var(PORT_MODE_VAR);

        let loader = loaded.unwrap();
        assert_eq!(loader.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(loader.config().port.path.as_deref(), Some("/dev/ttyUSB3"));
        assert_eq!(loader.config().port.baud, BaudRate::B230400);
        assert_eq!(loader.config().port.mode, OpenMode::WriteOnly);
    }

    #[test]
    #[serial]
    fn test_load_from_reports_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[port]\nbaud = 31250\n").unwrap();

        match ConfigLoader::load_from(&path) {
            Err(ConfigError::Malformed { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("Expected malformed config, got: {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigLoader::load_from(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Unreadable { .. })));
    }
}
