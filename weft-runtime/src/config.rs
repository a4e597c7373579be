use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use config::{Config, ConfigError, Environment, File, FileFormat};

use crate::error::PropertyError;
use crate::schedule::{parse_time_of_day, TimeWindow};
use crate::time_unit::TimeUnit;

/// Load config from a specific TOML file, with `WEFT__...` environment overrides
pub fn load_toml_config<P: AsRef<Path>>(path: P) -> Result<Config, PropertyError> {
    load_config(path.as_ref(), FileFormat::Toml)
}

/// Load config from a specific YAML file, with `WEFT__...` environment overrides
pub fn load_yaml_config<P: AsRef<Path>>(path: P) -> Result<Config, PropertyError> {
    load_config(path.as_ref(), FileFormat::Yaml)
}

fn load_config(path: &Path, format: FileFormat) -> Result<Config, PropertyError> {
    let config = Config::builder()
        .add_source(File::from(path).format(format))
        .add_source(Environment::with_prefix("WEFT").prefix_separator("__").separator("__"))
        .build()?;
    Ok(config)
}

/// Resolve config placeholder like ${modules.sensor.interval} or ${modules.sensor.interval:100ms}
pub fn resolve_config_value(value: &str, config: &Config) -> Result<String, PropertyError> {
    let Some(inner) = value.strip_prefix("${").and_then(|v| v.strip_suffix('}')) else {
        return Ok(value.to_string());
    };

    match inner.split_once(':') {
        Some((key, default_value)) => match config.get_string(key) {
            Ok(resolved) => Ok(resolved),
            Err(_) => Ok(default_value.to_string()),
        },
        None => config.get_string(inner).map_err(|e| match e {
            ConfigError::NotFound(_) => PropertyError::Missing {
                key: inner.to_string(),
            },
            other => other.into(),
        }),
    }
}

/// Read-only view on the configuration section of one module (`modules.<id>`).
///
/// Values may be placeholders referring to any key of the whole configuration.
#[derive(Debug, Clone)]
pub struct Properties {
    root: Arc<Config>,
    scope: String,
}

impl Properties {
    pub fn new(root: Arc<Config>, module_id: &str) -> Self {
        Self {
            root,
            scope: format!("modules.{module_id}"),
        }
    }

    pub fn empty() -> Self {
        Self {
            root: Arc::new(Config::default()),
            scope: "modules".to_string(),
        }
    }

    fn path(&self, key: &str) -> String {
        format!("{}.{}", self.scope, key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.root.get_string(&self.path(key)).is_ok()
    }

    pub fn get_string(&self, key: &str) -> Result<String, PropertyError> {
        let raw = self.root.get_string(&self.path(key)).map_err(|e| match e {
            ConfigError::NotFound(_) => PropertyError::Missing {
                key: key.to_string(),
            },
            other => other.into(),
        })?;
        resolve_config_value(&raw, &self.root)
    }

    pub fn get<T>(&self, key: &str) -> Result<T, PropertyError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.get_string(key)?;
        raw.trim().parse().map_err(|e: T::Err| PropertyError::Invalid {
            key: key.to_string(),
            reason: e.to_string(),
            value: raw,
        })
    }

    /// Like [`Properties::get`], but falls back to `default` when the key is not set.
    pub fn get_or<T>(&self, key: &str, default: T) -> Result<T, PropertyError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            Err(PropertyError::Missing { .. }) => Ok(default),
            other => other,
        }
    }

    /// Interval such as `"500ms"`, `"5s"`, `"10hz"` or a bare number of milliseconds.
    pub fn get_duration(&self, key: &str) -> Result<Duration, PropertyError> {
        let raw = self.get_string(key)?;
        TimeUnit::parse_interval(&raw).ok_or_else(|| PropertyError::Invalid {
            key: key.to_string(),
            value: raw,
            reason: "expected a duration like 500ms, 5s, 2m, 1h, 1d or a frequency like 10hz".to_string(),
        })
    }

    pub fn get_time_of_day(&self, key: &str) -> Result<NaiveTime, PropertyError> {
        let raw = self.get_string(key)?;
        parse_time_of_day(&raw).ok_or_else(|| PropertyError::Invalid {
            key: key.to_string(),
            value: raw,
            reason: "expected HH:MM or HH:MM:SS".to_string(),
        })
    }

    pub fn get_time_window(&self, key: &str) -> Result<TimeWindow, PropertyError> {
        let raw = self.get_string(key)?;
        raw.parse().map_err(|e: crate::error::ScheduleError| PropertyError::Invalid {
            key: key.to_string(),
            reason: e.to_string(),
            value: raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(toml: &str) -> Arc<Config> {
        Arc::new(
            Config::builder()
                .add_source(File::from_str(toml, FileFormat::Toml))
                .build()
                .unwrap(),
        )
    }

    const SAMPLE: &str = r#"
        [defaults]
        rate = "250ms"

        [modules.sensor]
        interval = "${defaults.rate}"
        fallback = "${defaults.missing:2s}"
        threshold = 21.5
        window = "08:00-18:30"
        wake = "07:15"
        label = "kitchen"
        broken = "soon"
    "#;

    #[test]
    fn properties_are_scoped_to_the_module() {
        let props = Properties::new(config(SAMPLE), "sensor");
        assert_eq!(props.get_string("label").unwrap(), "kitchen");
        assert!(props.contains("threshold"));
        assert!(!props.contains("rate"));

        let other = Properties::new(config(SAMPLE), "display");
        assert!(matches!(other.get_string("label"), Err(PropertyError::Missing { .. })));
    }

    #[test]
    fn typed_values_and_placeholders() {
        let props = Properties::new(config(SAMPLE), "sensor");
        assert_eq!(props.get::<f64>("threshold").unwrap(), 21.5);
        assert_eq!(props.get_or("retries", 3u32).unwrap(), 3);
        assert_eq!(props.get_duration("interval").unwrap(), Duration::from_millis(250));
        assert_eq!(props.get_duration("fallback").unwrap(), Duration::from_secs(2));
        assert!(matches!(props.get_duration("broken"), Err(PropertyError::Invalid { .. })));
        assert!(matches!(props.get::<u32>("label"), Err(PropertyError::Invalid { .. })));
    }

    #[test]
    fn times_of_day_and_windows() {
        let props = Properties::new(config(SAMPLE), "sensor");
        assert_eq!(
            props.get_time_of_day("wake").unwrap(),
            NaiveTime::from_hms_opt(7, 15, 0).unwrap()
        );
        let window = props.get_time_window("window").unwrap();
        assert_eq!(window.to_string(), "08:00:00-18:30:00");
        assert!(props.get_time_window("label").is_err());
    }

    #[test]
    fn unresolvable_placeholder_is_missing() {
        let root = config("[a]\nb = 1");
        assert!(matches!(
            resolve_config_value("${nope}", &root),
            Err(PropertyError::Missing { .. })
        ));
        assert_eq!(resolve_config_value("${a.b}", &root).unwrap(), "1");
        assert_eq!(resolve_config_value("plain", &root).unwrap(), "plain");
    }
}
