use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use sea_orm::DbBackend;

use crate::error::TestDbError;

/// Deployment mode a test database is provisioned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    /// A fresh database per test (isolated, slower startup)
    Isolated,
    /// The pre-configured shared database (faster, requires external setup)
    Shared,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Isolated => "test",
            Environment::Shared => "dev",
        }
    }

    fn var_prefix(self) -> &'static str {
        match self {
            Environment::Isolated => "TESTDB_ISOLATED",
            Environment::Shared => "TESTDB_SHARED",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = TestDbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test" | "isolated" => Ok(Environment::Isolated),
            "dev" | "shared" => Ok(Environment::Shared),
            _ => Err(TestDbError::UnknownEnvironment(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbKind {
    Postgres,
    /// One file per database; host, port and credentials are ignored
    Sqlite,
}

impl DbKind {
    pub fn backend(self) -> DbBackend {
        match self {
            DbKind::Postgres => DbBackend::Postgres,
            DbKind::Sqlite => DbBackend::Sqlite,
        }
    }
}

impl FromStr for DbKind {
    type Err = TestDbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DbKind::Postgres),
            "sqlite" => Ok(DbKind::Sqlite),
            other => Err(TestDbError::config(format!(
                "unsupported database kind '{other}' (expected postgres or sqlite)"
            ))),
        }
    }
}

/// Resolved connection parameters for one database.
///
/// For [`DbKind::Sqlite`] `database` is the path of the database file and
/// sibling files in the same directory are the other databases.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub kind: DbKind,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl ConnectionParams {
    pub fn postgres(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            kind: DbKind::Postgres,
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            database: database.into(),
        }
    }

    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        Self {
            kind: DbKind::Sqlite,
            host: String::new(),
            port: 0,
            user: String::new(),
            password: String::new(),
            database: path.as_ref().display().to_string(),
        }
    }

    /// Connection string understood by `sea_orm::Database::connect`.
    pub fn url(&self) -> String {
        match self.kind {
            DbKind::Postgres => format!(
                "postgresql://{}:{}@{}:{}/{}?sslmode=disable",
                utf8_percent_encode(&self.user, NON_ALPHANUMERIC),
                utf8_percent_encode(&self.password, NON_ALPHANUMERIC),
                self.host,
                self.port,
                self.database
            ),
            DbKind::Sqlite => format!("sqlite://{}?mode=rwc", self.database),
        }
    }

    /// Like [`ConnectionParams::url`], but a missing SQLite file is an open
    /// error instead of being created.
    pub fn existing_url(&self) -> String {
        match self.kind {
            DbKind::Postgres => self.url(),
            DbKind::Sqlite => format!("sqlite://{}?mode=rw", self.database),
        }
    }

    /// [`ConnectionParams::url`] with the password masked, for logs and errors.
    pub fn redacted_url(&self) -> String {
        match self.kind {
            DbKind::Postgres => format!(
                "postgresql://{}:***@{}:{}/{}",
                utf8_percent_encode(&self.user, NON_ALPHANUMERIC),
                self.host,
                self.port,
                self.database
            ),
            DbKind::Sqlite => self.url(),
        }
    }

    /// Parameters for database `name` on the same server (same directory
    /// for SQLite). The receiver is left unchanged.
    pub fn with_database(&self, name: &str) -> Self {
        let database = match self.kind {
            DbKind::Postgres => name.to_string(),
            DbKind::Sqlite => self.sqlite_sibling(name).display().to_string(),
        };
        Self {
            database,
            ..self.clone()
        }
    }

    /// Path of the database file, for SQLite parameters.
    pub fn sqlite_path(&self) -> Option<PathBuf> {
        match self.kind {
            DbKind::Sqlite => Some(PathBuf::from(&self.database)),
            DbKind::Postgres => None,
        }
    }

    fn sqlite_sibling(&self, name: &str) -> PathBuf {
        let base = PathBuf::from(&self.database);
        let dir = base
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        dir.join(format!("{name}.db"))
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

/// Connection parameters per [`Environment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvRegistry {
    isolated: ConnectionParams,
    shared: ConnectionParams,
}

impl Default for EnvRegistry {
    fn default() -> Self {
        Self {
            isolated: ConnectionParams::postgres("localhost", 5432, "postgres", "password", "postgres"),
            shared: ConnectionParams::postgres("localhost", 5433, "postgres", "devpassword", "nova_dev"),
        }
    }
}

impl EnvRegistry {
    pub fn new(isolated: ConnectionParams, shared: ConnectionParams) -> Self {
        Self { isolated, shared }
    }

    /// Defaults overlaid with `TESTDB_<ENV>_{KIND,HOST,PORT,USER,PASSWORD,DATABASE}`.
    pub fn from_env() -> Result<Self, TestDbError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`EnvRegistry::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TestDbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            isolated: overlay(defaults.isolated, Environment::Isolated, &lookup)?,
            shared: overlay(defaults.shared, Environment::Shared, &lookup)?,
        })
    }

    pub fn with_params(mut self, env: Environment, params: ConnectionParams) -> Self {
        match env {
            Environment::Isolated => self.isolated = params,
            Environment::Shared => self.shared = params,
        }
        self
    }

    pub fn params(&self, env: Environment) -> ConnectionParams {
        match env {
            Environment::Isolated => self.isolated.clone(),
            Environment::Shared => self.shared.clone(),
        }
    }

    /// Look up by environment name; unknown names get the isolated parameters.
    pub fn lookup(&self, name: &str) -> ConnectionParams {
        let env = name.parse().unwrap_or(Environment::Isolated);
        self.params(env)
    }
}

fn overlay<F>(
    mut params: ConnectionParams,
    env: Environment,
    lookup: &F,
) -> Result<ConnectionParams, TestDbError>
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = env.var_prefix();
    let var = |name: &str| lookup(&format!("{prefix}_{name}"));

    if let Some(kind) = var("KIND") {
        params.kind = kind.parse()?;
    }
    if let Some(host) = var("HOST") {
        params.host = host;
    }
    if let Some(port) = var("PORT") {
        params.port = port.trim().parse().map_err(|_| {
            TestDbError::config(format!("{prefix}_PORT must be a port number, got '{port}'"))
        })?;
    }
    if let Some(user) = var("USER") {
        params.user = user;
    }
    if let Some(password) = var("PASSWORD") {
        params.password = password;
    }
    if let Some(database) = var("DATABASE") {
        params.database = database;
    }
    Ok(params)
}
