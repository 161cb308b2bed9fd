use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Configuration for the intake desk.
///
/// This struct holds where data lives, how duplicates are treated, and how
/// email is sent. SMTP credentials are not part of the file; see
/// [`Credentials`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// Path of the JSON document holding every request.
    pub data_file: PathBuf,

    /// Directory uploaded files are stored in.
    pub upload_dir: PathBuf,

    /// IANA time zone creation and confirmation times are stamped in.
    timezone: Tz,

    /// What to do when a submission matches a previous one.
    pub duplicate_policy: DuplicatePolicy,

    /// Staff addresses alerted when a new request arrives.
    pub staff_recipients: Vec<String>,

    /// Address emails are sent from.
    pub sender: String,

    /// SMTP relay host. Connections use implicit TLS.
    pub smtp_host: String,

    /// SMTP relay port.
    pub smtp_port: u16,

    /// Image embedded inline at the top of HTML emails.
    pub logo: Option<PathBuf>,

    /// Organisation name used in email subjects and signatures.
    pub organisation: String,

    /// Socket address the HTTP server listens on.
    pub listen: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            upload_dir: default_upload_dir(),
            timezone: default_timezone(),
            duplicate_policy: DuplicatePolicy::default(),
            staff_recipients: Vec::new(),
            sender: String::new(),
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            logo: None,
            organisation: default_organisation(),
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
        toml::from_str(&content).map_err(ConfigError::Parse)
    }

    /// Loads the configuration at `path`, or the default configuration if the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or if
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content).map_err(ConfigError::Write)
    }

    /// The time zone timestamps are recorded in.
    #[must_use]
    pub const fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Sets the time zone from an IANA name such as `Europe/Paris`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a known time zone.
    pub fn set_timezone(&mut self, name: &str) -> Result<(), ConfigError> {
        self.timezone = parse_timezone(name)?;
        Ok(())
    }
}

/// How a submission matching an earlier one is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Record the submission and mark it as a likely duplicate.
    #[default]
    Flag,
    /// Refuse the submission and tell the requester it was already received.
    Block,
}

impl FromStr for DuplicatePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "flag" => Ok(Self::Flag),
            "block" => Ok(Self::Block),
            other => Err(ConfigError::InvalidValue {
                key: "duplicate_policy",
                value: other.to_string(),
            }),
        }
    }
}

/// SMTP account credentials, supplied through the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account user name.
    pub username: String,
    /// Account password.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Credentials {
    /// Environment variable holding the SMTP user name.
    pub const USERNAME_VAR: &'static str = "SMTP_USERNAME";
    /// Environment variable holding the SMTP password.
    pub const PASSWORD_VAR: &'static str = "SMTP_PASSWORD";

    /// Read credentials from the environment, after loading any `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env file loaded: {e}");
        }

        let var = |name: &'static str| {
            std::env::var(name).map_err(|_| ConfigError::MissingVariable(name))
        };

        Ok(Self {
            username: var(Self::USERNAME_VAR)?,
            password: var(Self::PASSWORD_VAR)?,
        })
    }
}

/// Errors raised while reading or writing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file: {0}")]
    Read(#[source] std::io::Error),
    /// The config file could not be written.
    #[error("Failed to write config file: {0}")]
    Write(#[source] std::io::Error),
    /// The config file is not valid TOML for this schema.
    #[error("Failed to parse config file: {0}")]
    Parse(#[source] toml::de::Error),
    /// The configuration could not be rendered as TOML.
    #[error("Failed to serialize config: {0}")]
    Serialize(#[source] toml::ser::Error),
    /// A value is not acceptable for its key.
    #[error("invalid value '{value}' for {key}")]
    InvalidValue {
        /// The configuration key.
        key: &'static str,
        /// The rejected value.
        value: String,
    },
    /// A required environment variable is not set.
    #[error("environment variable {0} is not set")]
    MissingVariable(&'static str),
}

fn parse_timezone(name: &str) -> Result<Tz, ConfigError> {
    name.parse::<Tz>().map_err(|_| ConfigError::InvalidValue {
        key: "timezone",
        value: name.to_string(),
    })
}

fn default_data_file() -> PathBuf {
    PathBuf::from("data/data.json")
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("data/uploads")
}

const fn default_timezone() -> Tz {
    chrono_tz::Europe::Paris
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

const fn default_smtp_port() -> u16 {
    465
}

fn default_organisation() -> String {
    "Service des stages".to_string()
}

fn default_listen() -> String {
    "0.0.0.0:5000".to_string()
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the domain
/// type without breaking compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default = "default_data_file")]
        data_file: PathBuf,

        #[serde(default = "default_upload_dir")]
        upload_dir: PathBuf,

        /// IANA name, e.g. `Europe/Paris`.
        #[serde(
            default = "default_timezone",
            serialize_with = "timezone_as_string",
            deserialize_with = "timezone_from_string"
        )]
        timezone: Tz,

        #[serde(default)]
        duplicate_policy: DuplicatePolicy,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        staff_recipients: Vec<String>,

        #[serde(default)]
        sender: String,

        #[serde(default = "default_smtp_host")]
        smtp_host: String,

        #[serde(default = "default_smtp_port")]
        smtp_port: u16,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        logo: Option<PathBuf>,

        #[serde(default = "default_organisation")]
        organisation: String,

        #[serde(default = "default_listen")]
        listen: String,
    },
}

fn timezone_as_string<S>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(tz.name())
}

fn timezone_from_string<'de, D>(deserializer: D) -> Result<Tz, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_timezone(&s).map_err(serde::de::Error::custom)
}

impl From<Versions> for Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                data_file,
                upload_dir,
                timezone,
                duplicate_policy,
                staff_recipients,
                sender,
                smtp_host,
                smtp_port,
                logo,
                organisation,
                listen,
            } => Self {
                data_file,
                upload_dir,
                timezone,
                duplicate_policy,
                staff_recipients,
                sender,
                smtp_host,
                smtp_port,
                logo,
                organisation,
                listen,
            },
        }
    }
}

impl From<Config> for Versions {
    fn from(config: Config) -> Self {
        let Config {
            data_file,
            upload_dir,
            timezone,
            duplicate_policy,
            staff_recipients,
            sender,
            smtp_host,
            smtp_port,
            logo,
            organisation,
            listen,
        } = config;
        Self::V1 {
            data_file,
            upload_dir,
            timezone,
            duplicate_policy,
            staff_recipients,
            sender,
            smtp_host,
            smtp_port,
            logo,
            organisation,
            listen,
        }
    }
}
