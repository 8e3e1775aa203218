//! Administrative connection URL.
//!
//! The broker is configured with one operator-level URL of the form
//! `postgres://host:port/db?user=...&password=...` (a `jdbc:` prefix is
//! tolerated). Tenant-scoped URLs are derived from it by swapping the path
//! segment, and binding URIs reuse its host and port.

use std::fmt;

use pgbroker_core::{BrokerResult, ConfigError, Identifier, InstanceId, Password};
use secrecy::{ExposeSecret, SecretString};
use tokio_postgres::config::Host;

/// Port used when the administrative URL does not name one.
pub const DEFAULT_PORT: u16 = 5432;

const JDBC_PREFIX: &str = "jdbc:";
const SCHEMES: [&str; 2] = ["postgres://", "postgresql://"];

/// Parsed administrative connection URL.
#[derive(Clone)]
pub struct AdminUrl {
    url: SecretString,
    config: tokio_postgres::Config,
    host: String,
    port: u16,
}

impl AdminUrl {
    /// Parse and validate the administrative URL.
    pub fn parse(raw: &str) -> BrokerResult<Self> {
        let url = raw.trim().strip_prefix(JDBC_PREFIX).unwrap_or(raw.trim());

        if !SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
            return Err(invalid("expected a postgres:// or postgresql:// URL").into());
        }

        let config: tokio_postgres::Config = url
            .parse()
            .map_err(|e| invalid(&format!("unparseable connection URL: {}", e)))?;

        let host = match config.get_hosts().first() {
            Some(Host::Tcp(host)) => host.clone(),
            _ => return Err(invalid("URL must name a TCP host").into()),
        };
        let port = config.get_ports().first().copied().unwrap_or(DEFAULT_PORT);

        Ok(Self {
            url: SecretString::new(url.into()),
            config,
            host,
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// User the administrative connection logs in as.
    pub fn user(&self) -> Option<&str> {
        self.config.get_user()
    }

    /// Database the administrative connection is attached to.
    pub fn database(&self) -> Option<&str> {
        self.config.get_dbname()
    }

    /// Driver configuration for the administrative connection.
    pub fn config(&self) -> &tokio_postgres::Config {
        &self.config
    }

    /// URL identical to this one except that the path names `database`.
    ///
    /// Scheme, host, port and query parameters (credentials included) are
    /// preserved.
    pub fn database_url(&self, database: &InstanceId) -> SecretString {
        let url = self.url.expose_secret();
        let (base, query) = match url.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (url, None),
        };

        let authority_start = base.find("://").map(|i| i + 3).unwrap_or(0);
        let authority_end = base[authority_start..]
            .find('/')
            .map(|i| authority_start + i)
            .unwrap_or(base.len());

        let mut rewritten = format!("{}/{}", &base[..authority_end], database.as_str());
        if let Some(query) = query {
            rewritten.push('?');
            rewritten.push_str(query);
        }
        SecretString::new(rewritten.into())
    }

    /// Driver configuration for a connection whose current database is
    /// `database`.
    pub fn scoped_config(&self, database: &InstanceId) -> BrokerResult<tokio_postgres::Config> {
        let url = self.database_url(database);
        let config = url
            .expose_secret()
            .parse()
            .map_err(|e| invalid(&format!("unparseable scoped URL: {}", e)))?;
        Ok(config)
    }

    /// Connection URI handed to an application:
    /// `postgres://{user}:{password}@{host}:{port}/{database}`. IPv6 hosts are
    /// bracketed.
    pub fn binding_uri(
        &self,
        user: &impl Identifier,
        password: &Password,
        database: &InstanceId,
    ) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            user.as_str(),
            password.expose(),
            uri_host(&self.host),
            self.port,
            database.as_str()
        )
    }
}

impl fmt::Debug for AdminUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminUrl")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user())
            .field("database", &self.database())
            .finish_non_exhaustive()
    }
}

fn uri_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: "MASTER_DB_URL".to_string(),
        value: "[REDACTED]".to_string(),
        reason: reason.to_string(),
    }
}
