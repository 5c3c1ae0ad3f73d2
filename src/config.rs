//! Configuration loading and types.
//!
//! The bot reads a single TOML file. When the file is missing or empty a
//! sample configuration is written in its place and then loaded, so a first
//! run leaves behind a file to edit.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::github::Templates;

/// Written to disk when no configuration exists yet.
pub const SAMPLE_CONFIG: &str = r##"[website]
addr = "0.0.0.0:8080"

[debug]
debug = false
logfile = ""

[github]
hookpath = "/somethingrandom"

[irc]
addr = "irc.libera.chat:6667"
nick = "sd-bot"
password = ""
channel = "#systemd"
realname = "github.com/sztanpet/sd-bot"

[nickserv]
password = ""

[admin]
state = "admins.state"
bootstrap = "sztanpet"
"##;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Webhook listener.
    #[serde(default)]
    pub website: WebsiteConfig,
    /// Log verbosity.
    #[serde(default)]
    pub debug: DebugConfig,
    /// GitHub webhook path and line templates.
    #[serde(default)]
    pub github: GithubConfig,
    /// IRC server connection.
    pub irc: IrcConfig,
    /// NickServ identification after registration.
    #[serde(default)]
    pub nickserv: NickServConfig,
    /// Authorized-identity store.
    #[serde(default)]
    pub admin: AdminConfig,
}

impl Config {
    /// Load configuration from a TOML file, creating it from
    /// [`SAMPLE_CONFIG`] first if it is missing or empty.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) if !content.is_empty() => content,
            Ok(_) => write_sample(path)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => write_sample(path)?,
            Err(e) => return Err(e.into()),
        };
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

fn write_sample(path: &Path) -> Result<String, ConfigError> {
    std::fs::write(path, SAMPLE_CONFIG)?;
    info!(path = %path.display(), "Wrote sample configuration");
    Ok(SAMPLE_CONFIG.to_owned())
}

/// HTTP listener for webhooks.
#[derive(Debug, Clone, Deserialize)]
pub struct WebsiteConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_website_addr")]
    pub addr: SocketAddr,
}

impl Default for WebsiteConfig {
    fn default() -> Self {
        Self {
            addr: default_website_addr(),
        }
    }
}

fn default_website_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebugConfig {
    /// Log at debug level, including every line on the wire.
    #[serde(default)]
    pub debug: bool,
    /// Append logs to this file instead of stderr. Empty means stderr.
    #[serde(default)]
    pub logfile: PathBuf,
}

impl DebugConfig {
    pub fn log_path(&self) -> Option<&Path> {
        (!self.logfile.as_os_str().is_empty()).then_some(self.logfile.as_path())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    /// Path the webhook is served on. Acts as a shared secret.
    #[serde(default = "default_hookpath")]
    pub hookpath: String,
    /// Line templates, each overridable on its own.
    #[serde(default)]
    pub templates: Templates,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            hookpath: default_hookpath(),
            templates: Templates::default(),
        }
    }
}

fn default_hookpath() -> String {
    "/github".to_string()
}

impl GithubConfig {
    /// The hook path as an axum route, always starting with `/`.
    pub fn route(&self) -> String {
        if self.hookpath.starts_with('/') {
            self.hookpath.clone()
        } else {
            format!("/{}", self.hookpath)
        }
    }
}

/// IRC server connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IrcConfig {
    /// Server address as `host:port`.
    pub addr: String,
    /// Nickname; also used as the username.
    pub nick: String,
    /// Server password sent as PASS. Empty means none.
    #[serde(default)]
    pub password: String,
    /// The channel announcements go to. A missing `#` is added.
    pub channel: String,
    /// Realname field of USER.
    #[serde(default = "default_realname")]
    pub realname: String,
}

fn default_realname() -> String {
    "github.com/sztanpet/sd-bot".to_string()
}

impl IrcConfig {
    /// Server password, if one is configured.
    pub fn server_password(&self) -> Option<&str> {
        Some(self.password.as_str()).filter(|p| !p.is_empty())
    }

    /// Configured channel with its `#` prefix.
    pub fn channel_name(&self) -> String {
        if self.channel.starts_with('#') {
            self.channel.clone()
        } else {
            format!("#{}", self.channel)
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NickServConfig {
    /// Password for `identify`. Empty disables identification.
    #[serde(default)]
    pub password: String,
}

impl NickServConfig {
    pub fn identify_password(&self) -> Option<&str> {
        Some(self.password.as_str()).filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Path of the authorized-identity state file.
    #[serde(default = "default_state_path")]
    pub state: PathBuf,
    /// Account seeded into the set on first run.
    #[serde(default = "default_bootstrap")]
    pub bootstrap: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            state: default_state_path(),
            bootstrap: default_bootstrap(),
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from("admins.state")
}

fn default_bootstrap() -> String {
    "sztanpet".to_string()
}
