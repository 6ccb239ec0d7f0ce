//! Session configuration
//!
//! A flat property store in the style of the lib5250 `Tn5250Config`: string
//! keys mapping to typed values, filled from the command line or a JSON file
//! and read once when a session starts. Keys prefixed with `env.` are the
//! telnet NEW-ENVIRON variables sent to the host (`env.TERM` is the terminal
//! type).

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult, TN5250Result};

/// Terminal type used when none is configured (24x80 color display)
pub const DEFAULT_TERM: &str = "IBM-3179-2";

/// Code page used when none is configured
pub const DEFAULT_MAP: &str = "37";

/// Telnet port used when the host string has none
pub const DEFAULT_PORT: u16 = 23;

const ENV_PREFIX: &str = "env.";

/// Supported configuration value types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ConfigValue {
    Boolean(bool),
    Integer(i64),
    String(String),
}

impl ConfigValue {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ConfigValue::Integer(i) => Some(*i),
            ConfigValue::String(s) => s.trim().parse().ok(),
            ConfigValue::Boolean(_) => None,
        }
    }

    /// Strings count as false only when they spell it out.
    pub fn as_boolean(&self) -> bool {
        match self {
            ConfigValue::Boolean(b) => *b,
            ConfigValue::Integer(i) => *i != 0,
            ConfigValue::String(s) => !matches!(s.as_str(), "off" | "no" | "0" | "false"),
        }
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Integer(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Boolean(value)
    }
}

/// Configuration for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionConfig {
    properties: HashMap<String, ConfigValue>,
}

impl SessionConfig {
    /// Empty configuration; call [`SessionConfig::apply_defaults`] before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from command line words (program name excluded).
    ///
    /// `+name` sets a boolean, `-name` clears it, `name=value` sets a string
    /// and a bare word names the host to connect to.
    pub fn parse_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Self::new();
        config.apply_args(args);
        config.apply_defaults();
        config
    }

    /// Set the properties named by command line words over the current ones.
    pub fn apply_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            let arg = arg.as_ref();
            if let Some(opt) = arg.strip_prefix('+') {
                self.set(opt, true);
            } else if let Some(opt) = arg.strip_prefix('-') {
                self.set(opt, false);
            } else if let Some((name, value)) = arg.split_once('=') {
                self.set(name, value);
            } else {
                self.set("host", arg);
            }
        }
    }

    /// Fill in the terminal type and code page if they are missing.
    pub fn apply_defaults(&mut self) {
        if self.get_string("env.TERM").is_none() {
            self.set("env.TERM", DEFAULT_TERM);
        }
        if self.get_string("map").is_none() {
            self.set("map", DEFAULT_MAP);
        }
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.properties.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(ConfigValue::as_string)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.properties.get(key).and_then(ConfigValue::as_integer)
    }

    /// Missing keys read as false.
    pub fn get_bool(&self, key: &str) -> bool {
        self.properties.get(key).map(ConfigValue::as_boolean).unwrap_or(false)
    }

    pub fn set<T: Into<ConfigValue>>(&mut self, key: &str, value: T) {
        self.properties.insert(key.to_string(), value.into());
    }

    pub fn unset(&mut self, key: &str) -> Option<ConfigValue> {
        self.properties.remove(key)
    }

    /// Terminal type string sent in TERMINAL-TYPE replies
    pub fn terminal_type(&self) -> &str {
        self.get_string("env.TERM").unwrap_or(DEFAULT_TERM)
    }

    /// Name of the character translation map
    pub fn char_map(&self) -> &str {
        self.get_string("map").unwrap_or(DEFAULT_MAP)
    }

    /// Connect target as `(host, port)`.
    pub fn host_port(&self) -> ConfigResult<(String, u16)> {
        let host = self.get_string("host").ok_or_else(|| ConfigError::MissingRequired {
            parameter: "host".to_string(),
        })?;
        let host = host.strip_prefix("telnet:").unwrap_or(host);
        match host.rsplit_once(':') {
            Some((name, port)) => {
                let port = port.parse::<u16>().map_err(|e| ConfigError::InvalidParameter {
                    parameter: "host".to_string(),
                    value: host.to_string(),
                    reason: e.to_string(),
                })?;
                Ok((name.to_string(), port))
            }
            None => Ok((host.to_string(), DEFAULT_PORT)),
        }
    }

    /// The `env.*` variables with the prefix stripped, sorted by name.
    pub fn environment(&self) -> Vec<(String, String)> {
        let mut vars: Vec<(String, String)> = self
            .properties
            .iter()
            .filter_map(|(key, value)| {
                let name = key.strip_prefix(ENV_PREFIX)?;
                let value = match value {
                    ConfigValue::String(s) => s.clone(),
                    ConfigValue::Integer(i) => i.to_string(),
                    ConfigValue::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
                };
                Some((name.to_string(), value))
            })
            .collect();
        vars.sort();
        vars
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a configuration from JSON, filling in defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut config = Self::new();
        config.merge_json(json)?;
        config.apply_defaults();
        Ok(config)
    }

    /// Merge properties from JSON over the current ones.
    pub fn merge_json(&mut self, json: &str) -> Result<(), serde_json::Error> {
        let loaded: HashMap<String, ConfigValue> = serde_json::from_str(json)?;
        self.properties.extend(loaded);
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> TN5250Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut config = Self::new();
        config.merge_json(&text).map_err(|e| ConfigError::FileError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        config.apply_defaults();
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> TN5250Result<()> {
        let path = path.as_ref();
        let json = self.to_json().map_err(|e| ConfigError::FileError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        fs::write(path, json)?;
        Ok(())
    }
}
