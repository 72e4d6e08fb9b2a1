//! Connection options.

use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Search path forced after connecting unless disabled.
pub const DEFAULT_SEARCH_PATH: &str = "\"$user\", public";

/// Interval between handshake polls in non-blocking connect.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Connection options for PostgreSQL.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Hostname or IP address. A value starting with `/` is a Unix socket directory.
    ///
    /// Default: `"localhost"`
    pub host: String,

    /// Port number for the PostgreSQL server.
    ///
    /// Default: `5432`
    pub port: u16,

    /// Unix socket path. Takes precedence over `host`.
    ///
    /// Default: `None`
    pub socket: Option<String>,

    /// Username for authentication.
    ///
    /// Default: `""`
    pub user: String,

    /// Database name to use.
    ///
    /// Default: `None`
    pub database: Option<String>,

    /// Password for authentication.
    ///
    /// Default: `None`
    pub password: Option<String>,

    /// Application name to report to the server.
    ///
    /// Default: `None`
    pub application_name: Option<String>,

    /// Additional startup parameters.
    ///
    /// Default: `[]`
    pub params: Vec<(String, String)>,

    /// Search path forced with `set_config` once the session is up. `None` skips the step.
    ///
    /// Default: `Some("\"$user\", public")`
    pub search_path: Option<String>,

    /// Sleep between handshake polls in [`Conn::poll`](crate::sync::Conn::poll).
    ///
    /// Default: `100ms`
    pub poll_interval: Duration,

    /// Upper bound for establishing the socket and, in blocking mode, each handshake read.
    ///
    /// Default: `None`
    pub connect_timeout: Option<Duration>,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            socket: None,
            user: String::new(),
            database: None,
            password: None,
            application_name: None,
            params: Vec::new(),
            search_path: Some(DEFAULT_SEARCH_PATH.to_string()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_timeout: None,
        }
    }
}

impl Opts {
    /// Unix socket path to connect to, if any.
    ///
    /// An explicit `socket` wins; otherwise a `host` starting with `/` names the
    /// socket directory and the file is `<dir>/.s.PGSQL.<port>`.
    pub fn socket_path(&self) -> Option<String> {
        if let Some(socket) = &self.socket {
            return Some(socket.clone());
        }
        if self.host.starts_with('/') {
            let dir = self.host.trim_end_matches('/');
            return Some(format!("{}/.s.PGSQL.{}", dir, self.port));
        }
        None
    }

    /// Apply one `key=value` setting shared by the URL and keyword forms.
    ///
    /// Returns `Ok(false)` if the key is not a known option.
    fn apply(&mut self, key: &str, value: &str) -> Result<bool, Error> {
        match key {
            "host" | "hostaddr" => self.host = value.to_string(),
            "port" => {
                self.port = value
                    .parse()
                    .map_err(|e| Error::InvalidUsage(format!("Invalid port {:?}: {}", value, e)))?;
            }
            "user" => self.user = value.to_string(),
            "password" => self.password = Some(value.to_string()),
            "dbname" => self.database = non_empty(value),
            "application_name" => self.application_name = Some(value.to_string()),
            "search_path" => self.search_path = non_empty(value),
            "connect_timeout" => {
                let secs: u64 = value.parse().map_err(|e| {
                    Error::InvalidUsage(format!("Invalid connect_timeout {:?}: {}", value, e))
                })?;
                // libpq treats 0 as "wait forever"
                self.connect_timeout = (secs > 0).then(|| Duration::from_secs(secs));
            }
            "sslmode" => match value {
                "disable" | "allow" | "prefer" => {}
                "require" | "verify-ca" | "verify-full" => {
                    return Err(Error::Unsupported(format!(
                        "sslmode={} requires TLS, which is not built in",
                        value
                    )));
                }
                _ => {
                    return Err(Error::InvalidUsage(format!(
                        "Invalid sslmode: expected one of ['disable', 'allow', 'prefer'], got {}",
                        value
                    )));
                }
            },
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl TryFrom<&Url> for Opts {
    type Error = Error;

    /// Parse a PostgreSQL connection URL.
    ///
    /// Format: `postgres://[user[:password]@]host[:port][/database][?param1=value1&..]`
    ///
    /// Query parameters that are connection options (`sslmode`, `application_name`,
    /// `connect_timeout`, `search_path`, `host`, ...) configure the connection;
    /// anything else is passed to the server as a startup parameter.
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        if !["postgres", "postgresql", "pg"].contains(&url.scheme()) {
            return Err(Error::InvalidUsage(format!(
                "Invalid scheme: expected 'postgres://', 'postgresql://' or 'pg://', got '{}://'",
                url.scheme()
            )));
        }

        let mut opts = Opts {
            host: url.host_str().unwrap_or("localhost").to_string(),
            port: url.port().unwrap_or(5432),
            user: url.username().to_string(),
            password: url.password().map(|s| s.to_string()),
            database: url.path().strip_prefix('/').and_then(non_empty),
            ..Opts::default()
        };

        for (key, value) in url.query_pairs() {
            if !opts.apply(&key, &value)? {
                opts.params.push((key.to_string(), value.to_string()));
            }
        }

        Ok(opts)
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    /// Parse either a URL (`postgres://...`) or a keyword/value conninfo string
    /// (`host=db port=5432 dbname=app user=alice password='p w'`).
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        if s.contains("://") {
            let url =
                Url::parse(s).map_err(|e| Error::InvalidUsage(format!("Invalid URL: {}", e)))?;
            return Self::try_from(&url);
        }

        let mut opts = Opts::default();
        for (key, value) in parse_conninfo(s)? {
            if !opts.apply(&key, &value)? {
                return Err(Error::InvalidUsage(format!(
                    "Invalid connection option {:?}",
                    key
                )));
            }
        }
        Ok(opts)
    }
}

impl TryFrom<String> for Opts {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::try_from(s.as_str())
    }
}

/// Split a libpq keyword/value string into pairs.
///
/// Whitespace separates pairs and may surround `=`. Values may be single-quoted;
/// inside or outside quotes a backslash escapes the next character.
fn parse_conninfo(s: &str) -> Result<Vec<(String, String)>, Error> {
    let mut pairs = Vec::new();
    let mut chars = s.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
            key.push(c);
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next() != Some('=') {
            return Err(Error::InvalidUsage(format!(
                "Missing \"=\" after {:?} in connection info string",
                key
            )));
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'\'').is_some() {
            loop {
                match chars.next() {
                    Some('\'') => break,
                    Some('\\') => match chars.next() {
                        Some(escaped) => value.push(escaped),
                        None => break,
                    },
                    Some(c) => value.push(c),
                    None => {
                        return Err(Error::InvalidUsage(
                            "Unterminated quoted string in connection info string".into(),
                        ));
                    }
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        value.push(escaped);
                    }
                } else {
                    value.push(c);
                }
            }
        }

        pairs.push((key, value));
    }

    Ok(pairs)
}
