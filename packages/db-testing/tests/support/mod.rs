#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use db_testing::{ConnectionCache, ConnectionParams, EnvRegistry, Hook, NameRegistry, Provisioner};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, Schema, Set,
};
use tempfile::TempDir;

pub mod widgets {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "widgets")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub name: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod migrations {
    use sea_orm_migration::prelude::*;

    pub struct Migrator;

    #[async_trait::async_trait]
    impl MigratorTrait for Migrator {
        fn migrations() -> Vec<Box<dyn MigrationTrait>> {
            vec![Box::new(CreateWidgets)]
        }
    }

    #[derive(DeriveMigrationName)]
    pub struct CreateWidgets;

    #[derive(Iden)]
    enum Widgets {
        Table,
        Id,
        Name,
    }

    #[async_trait::async_trait]
    impl MigrationTrait for CreateWidgets {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Widgets::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Widgets::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Widgets::Name).string().not_null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Widgets::Table).to_owned())
                .await
        }
    }
}

/// SQLite-backed environments in a private temp dir, with a private
/// connection cache so counters are per test.
pub struct Suite {
    pub dir: TempDir,
    pub provisioner: Provisioner,
}

impl Suite {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::File::create(dir.path().join("shared.db")).expect("create shared.db");
        let registry = EnvRegistry::new(
            ConnectionParams::sqlite(dir.path().join("base.db")),
            ConnectionParams::sqlite(dir.path().join("shared.db")),
        );
        Self::with_registry(dir, registry)
    }

    /// Shared environment pointing into a directory that does not exist.
    pub fn without_shared() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = EnvRegistry::new(
            ConnectionParams::sqlite(dir.path().join("base.db")),
            ConnectionParams::sqlite(dir.path().join("missing").join("shared.db")),
        );
        Self::with_registry(dir, registry)
    }

    /// Shared environment whose directory exists but whose file was never
    /// created.
    pub fn without_shared_file() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = EnvRegistry::new(
            ConnectionParams::sqlite(dir.path().join("base.db")),
            ConnectionParams::sqlite(dir.path().join("shared.db")),
        );
        Self::with_registry(dir, registry)
    }

    fn with_registry(dir: TempDir, registry: EnvRegistry) -> Self {
        let provisioner = Provisioner::new(registry)
            .with_cache(Arc::new(ConnectionCache::new()))
            .with_names(NameRegistry::with_space(db_testing::NAME_SPACE));
        Self { dir, provisioner }
    }

    pub fn shared_path(&self) -> PathBuf {
        self.dir.path().join("shared.db")
    }

    /// Per-test database files currently present in the suite directory.
    pub fn db_files(&self) -> Vec<String> {
        db_files_in(self.dir.path())
    }
}

pub fn db_files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read suite dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(db_testing::DB_NAME_PREFIX))
        .collect();
    names.sort();
    names
}

pub async fn create_widgets<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let mut stmt = schema.create_table_from_entity(widgets::Entity);
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}

pub async fn insert_widget<C: ConnectionTrait>(db: &C, name: &str) -> Result<widgets::Model, DbErr> {
    widgets::ActiveModel {
        name: Set(name.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
}

pub async fn count_widgets<C: ConnectionTrait>(db: &C) -> Result<u64, DbErr> {
    widgets::Entity::find().count(db).await
}

/// Count widgets through a brand-new connection to `params`.
pub async fn count_fresh(params: &ConnectionParams) -> Result<u64, DbErr> {
    let fresh: DatabaseConnection = Database::connect(params.url()).await?;
    let n = count_widgets(&fresh).await?;
    fresh.close().await?;
    Ok(n)
}

pub fn create_widgets_hook() -> Hook {
    Hook::new(|db| Box::pin(create_widgets(db)))
}

pub fn seed_hook(name: &'static str) -> Hook {
    Hook::new(move |db| {
        Box::pin(async move {
            insert_widget(db, name).await?;
            Ok(())
        })
    })
}
