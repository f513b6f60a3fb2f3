//! Configuration file reader.
//!
//! Implements the `key=value` grammar described in spec.md §6: one
//! assignment per line, `#` starts a whole-line comment, and `BIBOUMI_`
//! prefixed environment variables (lowercased, prefix stripped) override
//! whatever the file set.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Parsed gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The component's domain, as seen by the XMPP server.
    pub hostname: String,
    /// The component secret used in the handshake.
    pub password: String,
    /// Override for the XMPP server's IP (skips DNS).
    pub xmpp_server_ip: Option<String>,
    /// `host:port` of the XMPP server to connect to.
    pub port: String,
    /// When set, disables the `server%` / `%server` address grammar: every
    /// Iid talks to this one fixed IRC server.
    pub fixed_irc_server: Option<String>,
    /// Bare JID allowed to run admin-only ad-hoc commands.
    pub admin: Option<String>,
    /// Verbosity, 0 (error) through 3 (trace).
    pub log_level: u8,
    /// Optional log file path; stderr otherwise.
    pub log_file: Option<PathBuf>,
    /// Path to the SQLite archive database.
    pub db_name: PathBuf,
    /// Path to a CA bundle used for IRC TLS verification.
    pub ca_file: Option<PathBuf>,
    /// Directory holding XEP-0050 ad-hoc policy forms, if any.
    pub policy_directory: Option<PathBuf>,
    /// TCP port of the identd companion listener, if enabled.
    pub identd_port: Option<u16>,
    /// Whether IRC realnames may be customized per user.
    pub realname_customization: bool,
    /// Default value of `persistent` for newly joined channels.
    pub persistent_by_default: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hostname: String::new(),
            password: String::new(),
            xmpp_server_ip: None,
            port: "127.0.0.1:5347".to_owned(),
            fixed_irc_server: None,
            admin: None,
            log_level: 1,
            log_file: None,
            db_name: PathBuf::from("biboumi.sqlite"),
            ca_file: None,
            policy_directory: None,
            identd_port: None,
            realname_customization: true,
            persistent_by_default: false,
        }
    }
}

impl Config {
    /// Reads and parses a config file, then applies `BIBOUMI_*` environment
    /// overrides, and validates that the mandatory keys are present.
    pub fn load(path: &Path) -> Result<Config> {
        let mut values = HashMap::new();
        if let Ok(contents) = std::fs::read_to_string(path) {
            parse_into(&contents, &mut values);
        }
        apply_env_overrides(&mut values);

        let mut config = Config::default();
        if let Some(v) = values.remove("hostname") {
            config.hostname = v;
        }
        if let Some(v) = values.remove("password") {
            config.password = v;
        }
        config.xmpp_server_ip = values.remove("xmpp_server_ip");
        if let Some(v) = values.remove("port") {
            config.port = v;
        }
        config.fixed_irc_server = values.remove("fixed_irc_server");
        config.admin = values.remove("admin");
        if let Some(v) = values.remove("log_level") {
            config.log_level = v.parse().unwrap_or(1);
        }
        config.log_file = values.remove("log_file").map(PathBuf::from);
        if let Some(v) = values.remove("db_name") {
            config.db_name = PathBuf::from(v);
        }
        config.ca_file = values.remove("ca_file").map(PathBuf::from);
        config.policy_directory = values.remove("policy_directory").map(PathBuf::from);
        config.identd_port = values
            .remove("identd_port")
            .and_then(|v| v.parse().ok());
        if let Some(v) = values.remove("realname_customization") {
            config.realname_customization = parse_bool(&v);
        }
        if let Some(v) = values.remove("persistent_by_default") {
            config.persistent_by_default = parse_bool(&v);
        }

        if config.hostname.is_empty() {
            return Err(Error::Config("missing mandatory key 'hostname'".into()));
        }
        if config.password.is_empty() {
            return Err(Error::Config("missing mandatory key 'password'".into()));
        }

        Ok(config)
    }

    /// The default config path, under the XDG config home.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("biboumi")
            .join("biboumi.cfg")
    }
}

fn parse_into(contents: &str, values: &mut HashMap<String, String>) {
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            values.insert(key.trim().to_owned(), value.trim().to_owned());
        }
    }
}

fn apply_env_overrides(values: &mut HashMap<String, String>) {
    for (key, value) in std::env::vars() {
        if let Some(suffix) = key.strip_prefix("BIBOUMI_") {
            values.insert(suffix.to_lowercase(), value);
        }
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
