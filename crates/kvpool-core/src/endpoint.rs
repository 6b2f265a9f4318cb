//! Endpoint description for the key-value service

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{KvError, Result};

/// Default Redis port
pub const DEFAULT_PORT: u16 = 6379;

/// Where and how to connect
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    /// Host name or address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// ACL username
    pub username: Option<String>,
    /// Password (never logged)
    pub password: Option<String>,
    /// Logical database index
    pub database: u16,
    /// Connect over TLS (`rediss://`)
    pub tls: bool,
}

impl Endpoint {
    /// Create an endpoint for the given host and port with no credentials
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Set the ACL username
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Select a logical database
    pub fn with_database(mut self, database: u16) -> Self {
        self.database = database;
        self
    }

    /// Enable or disable TLS
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Parse a `redis://[user:password@]host[:port][/database]` URL
    ///
    /// `rediss://` selects TLS.
    pub fn from_url(input: &str) -> Result<Self> {
        let url = Url::parse(input)
            .map_err(|e| KvError::Configuration(format!("Invalid endpoint URL: {}", e)))?;

        let tls = match url.scheme() {
            "redis" => false,
            "rediss" => true,
            other => {
                return Err(KvError::Configuration(format!(
                    "Unsupported endpoint scheme: {}",
                    other
                )));
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| KvError::Configuration("Endpoint URL has no host".into()))?
            .to_string();

        let database = match url.path().trim_start_matches('/') {
            "" => 0,
            db => db.parse::<u16>().map_err(|_| {
                KvError::Configuration(format!("Invalid database index in endpoint URL: {}", db))
            })?,
        };

        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            username: Some(decode_userinfo(url.username())?).filter(|u| !u.is_empty()),
            password: url.password().map(decode_userinfo).transpose()?,
            database,
            tls,
        })
    }

    /// Build the connection URL understood by the client library
    ///
    /// Credentials are percent-encoded so reserved characters survive.
    pub fn to_url(&self) -> String {
        let password = self.password.as_deref().map(urlencoding::encode);
        self.render(password.as_deref())
    }

    /// URL with the password masked, safe for logs
    pub fn redacted_url(&self) -> String {
        self.render(self.password.as_ref().map(|_| "***"))
    }

    /// Format the URL around an already-encoded password
    fn render(&self, password: Option<&str>) -> String {
        let scheme = if self.tls { "rediss" } else { "redis" };
        let username = self.username.as_deref().map(urlencoding::encode);
        let credentials = match (username, password) {
            (Some(user), Some(pass)) => format!("{}:{}@", user, pass),
            (None, Some(pass)) => format!(":{}@", pass),
            (Some(user), None) => format!("{}@", user),
            (None, None) => String::new(),
        };
        format!(
            "{}://{}{}:{}/{}",
            scheme, credentials, self.host, self.port, self.database
        )
    }
}

fn decode_userinfo(raw: &str) -> Result<String> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| KvError::Configuration(format!("Invalid credentials in endpoint URL: {}", e)))
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            database: 0,
            tls: false,
        }
    }
}

impl FromStr for Endpoint {
    type Err = KvError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_url(s)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("has_password", &self.password.is_some())
            .field("database", &self.database)
            .field("tls", &self.tls)
            .finish()
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.redacted_url())
    }
}
