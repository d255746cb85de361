#![allow(dead_code)]

use restplan::{FieldKind, MemoryCollection, ModelSchema};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, Database, DatabaseConnection, DbErr};
use sea_orm_migration::prelude::*;
use serde_json::{Value, json};

pub mod task_entity;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    init_tracing();
    let db = Database::connect("sqlite::memory:").await?;

    // Run migrations
    Migrator::up(&db, None).await?;

    Ok(db)
}

/// Seven tasks: five `active` (created 1..=5), two `done`.
pub async fn setup_test_db_with_tasks() -> Result<DatabaseConnection, DbErr> {
    let db = setup_test_db().await?;
    for (title, status, priority, created) in TASKS {
        task_entity::ActiveModel {
            title: Set((*title).to_string()),
            status: Set((*status).to_string()),
            priority: Set(*priority),
            created: Set(*created),
            ..Default::default()
        }
        .insert(&db)
        .await?;
    }
    Ok(db)
}

pub const TASKS: &[(&str, &str, i32, i64)] = &[
    ("write docs", "active", 2, 1),
    ("fix login", "active", 1, 2),
    ("review pr", "active", 3, 3),
    ("deploy", "done", 2, 4),
    ("write tests", "active", 2, 5),
    ("plan sprint", "done", 1, 6),
    ("refactor", "active", 3, 7),
];

pub fn task_schema() -> ModelSchema {
    ModelSchema::new("Task")
        .field("title", FieldKind::String)
        .field("status", FieldKind::String)
        .field("priority", FieldKind::Integer)
        .field("created", FieldKind::Integer)
        .field("amount", FieldKind::Float)
        .field("region", FieldKind::String)
        .field("tags", FieldKind::List)
        .field("address", FieldKind::Map)
}

pub fn task_documents() -> Vec<Value> {
    vec![
        json!({"title": "write docs", "status": "active", "priority": 2, "created": 1,
               "amount": 10.0, "region": "north", "tags": ["docs"],
               "address": {"city": "Oslo", "zip": "0150"}}),
        json!({"title": "fix login", "status": "active", "priority": 1, "created": 2,
               "amount": 5.0, "region": "south", "tags": [],
               "address": {"city": "Bergen", "zip": "5003"}}),
        json!({"title": "review pr", "status": "active", "priority": 3, "created": 3,
               "amount": 7.5, "region": "north", "tags": ["code", "review"],
               "address": {"city": "Oslo", "zip": "0151"}}),
        json!({"title": "deploy", "status": "done", "priority": 2, "created": 4,
               "amount": 20.0, "region": "south", "tags": ["ops"],
               "address": {"city": "Bergen", "zip": "5004"}}),
        json!({"title": "write tests", "status": "active", "priority": 2, "created": 5,
               "amount": 2.5, "region": "north", "tags": [],
               "address": {"city": "Oslo", "zip": "0152"}}),
        json!({"title": "plan sprint", "status": "done", "priority": 1, "created": 6,
               "amount": 1.0, "region": "east", "tags": ["planning"],
               "address": {"city": "Trondheim", "zip": "7010"}}),
        json!({"title": "refactor", "status": "active", "priority": 3, "created": 7,
               "amount": 4.0, "region": "east", "tags": ["code"],
               "address": {"city": "Trondheim", "zip": "7011"}}),
    ]
}

/// Memory collection holding [`task_documents`], ids 1..=7, titles unique.
pub fn task_collection() -> MemoryCollection {
    init_tracing();
    let collection = MemoryCollection::new("tasks").unique("title");
    collection
        .insert_many(task_documents())
        .expect("fixture documents are unique");
    collection
}

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(CreateTaskTable)]
    }
}

pub struct CreateTaskTable;

impl MigrationName for CreateTaskTable {
    fn name(&self) -> &'static str {
        "m20240101_000001_create_task_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for CreateTaskTable {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let table = Table::create()
            .table(TaskTable)
            .if_not_exists()
            .col(
                ColumnDef::new(TaskColumn::Id)
                    .integer()
                    .not_null()
                    .auto_increment()
                    .primary_key(),
            )
            .col(
                ColumnDef::new(TaskColumn::Title)
                    .string()
                    .not_null()
                    .unique_key(),
            )
            .col(ColumnDef::new(TaskColumn::Status).string().not_null())
            .col(ColumnDef::new(TaskColumn::Priority).integer().not_null())
            .col(ColumnDef::new(TaskColumn::Created).big_integer().not_null())
            .col(ColumnDef::new(TaskColumn::Note).string().null())
            .to_owned();

        manager.create_table(table).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TaskTable).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(Debug)]
pub enum TaskColumn {
    Id,
    Title,
    Status,
    Priority,
    Created,
    Note,
}

impl Iden for TaskColumn {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(
            s,
            "{}",
            match self {
                Self::Id => "id",
                Self::Title => "title",
                Self::Status => "status",
                Self::Priority => "priority",
                Self::Created => "created",
                Self::Note => "note",
            }
        )
        .unwrap();
    }
}

pub struct TaskTable;

impl Iden for TaskTable {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "tasks").unwrap();
    }
}
