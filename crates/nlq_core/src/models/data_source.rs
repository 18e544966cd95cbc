//! Data source descriptors.

use serde::{Deserialize, Serialize};

/// Database engine behind a data source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    /// PostgreSQL
    #[default]
    Postgres,
    /// Anything served by a custom adapter
    Other(String),
}

/// Additional connection options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionOptions {
    /// Connection timeout in seconds
    pub connect_timeout_secs: u32,
    /// Statement timeout in seconds (None = no timeout)
    pub statement_timeout_secs: Option<u32>,
    /// Read-only mode
    pub read_only: bool,
    /// Application name sent to the server
    pub application_name: String,
    /// Maximum pooled connections
    pub max_connections: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            statement_timeout_secs: None,
            read_only: true,
            application_name: "nlq".to_string(),
            max_connections: 4,
        }
    }
}

/// Where generated SQL runs.
///
/// The password is never serialized and never logged.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    /// Identifier callers refer to
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Engine
    #[serde(default)]
    pub kind: DataSourceKind,
    /// Server hostname or IP
    #[serde(default)]
    pub host: String,
    /// Server port (default 5432)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database name
    #[serde(default)]
    pub database: String,
    /// Login username
    #[serde(default)]
    pub username: String,
    /// Login password
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Additional options
    #[serde(default)]
    pub options: ConnectionOptions,
}

fn default_port() -> u16 {
    5432
}

impl DataSource {
    /// Create a PostgreSQL data source with required fields.
    pub fn postgres(
        id: impl Into<String>,
        host: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: DataSourceKind::Postgres,
            host: host.into(),
            port: default_port(),
            database: database.into(),
            username: username.into(),
            password: None,
            options: ConnectionOptions::default(),
        }
    }

    /// A data source served by a custom adapter.
    pub fn custom(id: impl Into<String>, kind: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: DataSourceKind::Other(kind.into()),
            host: String::new(),
            port: default_port(),
            database: String::new(),
            username: String::new(),
            password: None,
            options: ConnectionOptions::default(),
        }
    }

    /// Set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Validate the descriptor.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Data source id is required".to_string());
        }
        if self.kind == DataSourceKind::Postgres {
            if self.host.is_empty() {
                return Err("Host is required".to_string());
            }
            if self.database.is_empty() || self.database.len() > 63 {
                return Err("Database name must be 1-63 characters".to_string());
            }
            if self.username.is_empty() {
                return Err("Username is required".to_string());
            }
        }
        Ok(())
    }

    /// Get the display connection string (without password).
    pub fn display_url(&self) -> String {
        format!("postgresql://{}@{}:{}/{}", self.username, self.host, self.port, self.database)
    }
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("url", &self.display_url())
            .field("options", &self.options)
            .finish()
    }
}
