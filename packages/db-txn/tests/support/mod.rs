#![allow(dead_code)]

use db_txn::{DbResolver, TxContext};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    DbErr, EntityTrait, PaginatorTrait, QueryFilter, Schema, Set,
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

/// File-backed SQLite database in its own temp dir, with the widgets table.
pub async fn sqlite_db() -> Result<(TempDir, DatabaseConnection), DbErr> {
    let dir = tempfile::tempdir().map_err(|e| DbErr::Custom(e.to_string()))?;
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("txn.db").display());

    let mut opt = ConnectOptions::new(url);
    opt.max_connections(4).sqlx_logging(false);
    let db = Database::connect(opt).await?;

    create_widgets(&db).await?;
    Ok((dir, db))
}

pub async fn create_widgets<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let mut stmt = schema.create_table_from_entity(widgets::Entity);
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}

pub async fn count_by_name<C: ConnectionTrait>(db: &C, name: &str) -> Result<u64, DbErr> {
    widgets::Entity::find()
        .filter(widgets::Column::Name.eq(name))
        .count(db)
        .await
}

/// Repository written against a resolver, the way application code is.
#[derive(Clone)]
pub struct WidgetRepo {
    db: DbResolver,
}

impl WidgetRepo {
    pub fn new(db: DbResolver) -> Self {
        Self { db }
    }

    pub async fn insert(&self, ctx: &TxContext, name: &str) -> Result<widgets::Model, DbErr> {
        let db = (self.db)(ctx);
        widgets::ActiveModel {
            name: Set(name.to_string()),
            ..Default::default()
        }
        .insert(&db)
        .await
    }

    pub async fn find_for_update(
        &self,
        ctx: &TxContext,
        id: i32,
    ) -> Result<Option<widgets::Model>, DbErr> {
        let db = (self.db)(ctx);
        db.lock(widgets::Entity::find_by_id(id)).one(&db).await
    }

    pub async fn count(&self, ctx: &TxContext, name: &str) -> Result<u64, DbErr> {
        let db = (self.db)(ctx);
        count_by_name(&db, name).await
    }
}
