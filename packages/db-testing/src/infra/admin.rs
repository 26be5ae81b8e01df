//! Administrative statements issued on the base connection, and the
//! dedicated per-test connection.

use std::io::ErrorKind;
use std::path::Path;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use tracing::debug;

use crate::config::{ConnectionParams, DbKind};

/// Trivial round trip proving the server answers; returns its version string.
pub async fn server_version(conn: &DatabaseConnection, kind: DbKind) -> Result<String, DbErr> {
    let sql = match kind {
        DbKind::Postgres => "SELECT version() AS version",
        DbKind::Sqlite => "SELECT sqlite_version() AS version",
    };

    let row = conn
        .query_one(Statement::from_string(kind.backend(), sql))
        .await?
        .ok_or_else(|| DbErr::Custom("liveness query returned no rows".to_string()))?;
    let version: String = row.try_get("", "version")?;

    if version.is_empty() {
        return Err(DbErr::Custom("liveness query returned an empty version".to_string()));
    }
    Ok(version)
}

/// Create database `name` next to the base database described by `base`.
pub async fn create_database(
    conn: &DatabaseConnection,
    base: &ConnectionParams,
    name: &str,
) -> Result<(), DbErr> {
    let backend = base.kind.backend();
    match base.kind {
        DbKind::Postgres => {
            conn.execute(Statement::from_string(backend, format!("CREATE DATABASE {name}")))
                .await?;
        }
        DbKind::Sqlite => {
            // Attaching a missing file creates it; detach right away.
            let path = base
                .with_database(name)
                .sqlite_path()
                .ok_or_else(|| DbErr::Custom("sqlite parameters without a path".to_string()))?;
            let path = path.display().to_string().replace('\'', "''");
            conn.execute(Statement::from_string(
                backend,
                format!("ATTACH DATABASE '{path}' AS {name}"),
            ))
            .await?;
            conn.execute(Statement::from_string(backend, format!("DETACH DATABASE {name}")))
                .await?;
        }
    }
    debug!(admin = "create_database", name = name, kind = ?base.kind);
    Ok(())
}

/// Drop database `name`; a database that is already gone is not an error.
pub async fn drop_database(
    conn: &DatabaseConnection,
    base: &ConnectionParams,
    name: &str,
) -> Result<(), DbErr> {
    drop_with(conn, base, name, false).await
}

/// Like [`drop_database`], but Postgres sessions still connected to `name`
/// are terminated first. Used when the owning connections cannot be closed.
pub async fn force_drop_database(
    conn: &DatabaseConnection,
    base: &ConnectionParams,
    name: &str,
) -> Result<(), DbErr> {
    drop_with(conn, base, name, true).await
}

async fn drop_with(
    conn: &DatabaseConnection,
    base: &ConnectionParams,
    name: &str,
    force: bool,
) -> Result<(), DbErr> {
    match base.kind {
        DbKind::Postgres => {
            let sql = if force {
                format!("DROP DATABASE IF EXISTS {name} WITH (FORCE)")
            } else {
                format!("DROP DATABASE IF EXISTS {name}")
            };
            conn.execute(Statement::from_string(base.kind.backend(), sql))
                .await?;
        }
        DbKind::Sqlite => {
            if let Some(path) = base.with_database(name).sqlite_path() {
                remove_if_present(&path).await?;
                for suffix in ["-wal", "-shm", "-journal"] {
                    let mut sidecar = path.clone().into_os_string();
                    sidecar.push(suffix);
                    remove_if_present(Path::new(&sidecar)).await?;
                }
            }
        }
    }
    debug!(admin = "drop_database", name = name, kind = ?base.kind, force = force);
    Ok(())
}

async fn remove_if_present(path: &Path) -> Result<(), DbErr> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DbErr::Custom(format!(
            "failed to remove {}: {e}",
            path.display()
        ))),
    }
}

/// Pool options for a dedicated (per-session) connection to `params`.
///
/// Statement logging follows `verbose`. With `create` unset a missing SQLite
/// file fails the open instead of being created.
pub fn dedicated_options(params: &ConnectionParams, verbose: bool, create: bool) -> ConnectOptions {
    let url = if create {
        params.url()
    } else {
        params.existing_url()
    };
    let mut opt = ConnectOptions::new(url);
    opt.sqlx_logging(verbose);
    opt
}

pub async fn connect(opt: ConnectOptions) -> Result<DatabaseConnection, DbErr> {
    Database::connect(opt).await
}
