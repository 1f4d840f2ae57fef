//! # Machines Logger
//!
//! Persistent registry of machine definitions and their tag bindings.
//! [`MachinesLogger`] talks to SQLite directly and is only ever driven by
//! the worker of a [`MachinesLoggerEngine`], which is what callers hold.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::models::{MachineConfig, MachineRecord, MachineUpdate, NewMachine, TagBinding};
use crate::config::DatabaseConfig;
use crate::constants::{machines, params};
use crate::engine::{Action, ActionEngine, ActionHandler, EngineError, EngineResult, EngineStats};
use crate::logging::log_database_operation;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS machines (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        identifier TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL UNIQUE,
        "interval" INTEGER NOT NULL DEFAULT 1,
        description TEXT NOT NULL DEFAULT '',
        classification TEXT NOT NULL DEFAULT '',
        buffer_size INTEGER NOT NULL DEFAULT 10,
        buffer_roll_type TEXT NOT NULL DEFAULT 'backward',
        criticity INTEGER NOT NULL DEFAULT 3,
        priority INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tags_machines (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        tag_name TEXT NOT NULL,
        machine_id INTEGER NOT NULL REFERENCES machines (id) ON DELETE CASCADE,
        default_tag_name TEXT
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_tags_machines_binding
        ON tags_machines (tag_name, machine_id, COALESCE(default_tag_name, ''))
    "#,
];

const MACHINE_COLUMNS: &str = r#"id, identifier, name, "interval", description, classification, buffer_size, buffer_roll_type, criticity, priority"#;

/// Map a failed query to an engine error tagged with the operation
fn sql_error(operation: &'static str) -> impl FnOnce(sqlx::Error) -> EngineError {
    move |error| match error {
        sqlx::Error::RowNotFound => EngineError::not_found("Record", operation),
        other => EngineError::storage(operation, other.to_string()),
    }
}

/// Transactional storage for machines and tag bindings
#[derive(Debug, Clone)]
pub struct MachinesLogger {
    pool: SqlitePool,
}

impl MachinesLogger {
    /// Wrap an existing pool; the schema is not touched
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the configured database and make sure the schema exists
    pub async fn connect(config: &DatabaseConfig) -> EngineResult<Self> {
        let mut max_connections = config.max_connections;
        // Every connection to an in-memory database opens a different database
        if config.url.contains(":memory:") && max_connections > 1 {
            warn!(
                requested = max_connections,
                "In-memory database limited to a single connection"
            );
            max_connections = 1;
        }

        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let logger = Self::new(pool);
        logger.migrate().await?;

        info!(max_connections = max_connections, "Machines logger connected");
        Ok(logger)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the `machines` and `tags_machines` tables if absent
    pub async fn migrate(&self) -> EngineResult<()> {
        let mut tx = self.pool.begin().await.map_err(sql_error("migrate"))?;
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(sql_error("migrate"))?;
        }
        tx.commit().await.map_err(sql_error("migrate"))?;

        debug!("Machines schema is up to date");
        Ok(())
    }

    pub async fn create(&self, machine: NewMachine) -> EngineResult<MachineRecord> {
        let started = Instant::now();
        let mut tx = self.pool.begin().await.map_err(sql_error(machines::CREATE))?;

        let record = sqlx::query_as::<_, MachineRecord>(&format!(
            r#"
            INSERT INTO machines (identifier, name, "interval", description, classification,
                                  buffer_size, buffer_roll_type, criticity, priority)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {MACHINE_COLUMNS}
            "#
        ))
        .bind(&machine.identifier)
        .bind(&machine.name)
        .bind(machine.interval)
        .bind(&machine.description)
        .bind(&machine.classification)
        .bind(machine.buffer_size)
        .bind(&machine.buffer_roll_type)
        .bind(machine.criticity)
        .bind(machine.priority)
        .fetch_one(&mut *tx)
        .await
        .map_err(sql_error(machines::CREATE))?;

        tx.commit().await.map_err(sql_error(machines::CREATE))?;

        log_database_operation(
            machines::CREATE,
            Some("machines"),
            Some(record.id),
            "committed",
            Some(started.elapsed().as_millis() as u64),
            Some(&record.name),
        );
        Ok(record)
    }

    /// Update the supplied fields of the machine named `update.name`
    pub async fn put(&self, update: MachineUpdate) -> EngineResult<MachineRecord> {
        if update.is_empty() {
            return Err(EngineError::validation(format!(
                "put on machine '{}' supplied no fields to update",
                update.name
            )));
        }

        let started = Instant::now();
        let mut tx = self.pool.begin().await.map_err(sql_error(machines::PUT))?;

        let id = find_machine_id(&mut tx, &update.name, machines::PUT).await?;

        let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE machines SET ");
        {
            let mut fields = query.separated(", ");
            if let Some(interval) = update.interval {
                fields.push(r#""interval" = "#).push_bind_unseparated(interval);
            }
            if let Some(description) = update.description {
                fields.push("description = ").push_bind_unseparated(description);
            }
            if let Some(classification) = update.classification {
                fields.push("classification = ").push_bind_unseparated(classification);
            }
            if let Some(buffer_size) = update.buffer_size {
                fields.push("buffer_size = ").push_bind_unseparated(buffer_size);
            }
            if let Some(buffer_roll_type) = update.buffer_roll_type {
                fields.push("buffer_roll_type = ").push_bind_unseparated(buffer_roll_type);
            }
            if let Some(criticity) = update.criticity {
                fields.push("criticity = ").push_bind_unseparated(criticity);
            }
            if let Some(priority) = update.priority {
                fields.push("priority = ").push_bind_unseparated(priority);
            }
        }
        query.push(" WHERE id = ").push_bind(id);

        query
            .build()
            .execute(&mut *tx)
            .await
            .map_err(sql_error(machines::PUT))?;

        let record = sqlx::query_as::<_, MachineRecord>(&format!(
            "SELECT {MACHINE_COLUMNS} FROM machines WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(sql_error(machines::PUT))?;

        tx.commit().await.map_err(sql_error(machines::PUT))?;

        log_database_operation(
            machines::PUT,
            Some("machines"),
            Some(id),
            "committed",
            Some(started.elapsed().as_millis() as u64),
            Some(&update.name),
        );
        Ok(record)
    }

    pub async fn read_all(&self) -> EngineResult<Vec<MachineRecord>> {
        let mut tx = self.pool.begin().await.map_err(sql_error(machines::READ_ALL))?;
        let records = sqlx::query_as::<_, MachineRecord>(&format!(
            "SELECT {MACHINE_COLUMNS} FROM machines ORDER BY id"
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(sql_error(machines::READ_ALL))?;
        tx.commit().await.map_err(sql_error(machines::READ_ALL))?;
        Ok(records)
    }

    /// Runtime configuration of every machine keyed by name
    pub async fn read_config(&self) -> EngineResult<BTreeMap<String, MachineConfig>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(sql_error(machines::READ_CONFIG))?;
        let configs = sqlx::query_as::<_, MachineConfig>(
            r#"
            SELECT name, "interval", buffer_size, buffer_roll_type, criticity, priority
            FROM machines
            ORDER BY id
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(sql_error(machines::READ_CONFIG))?;
        tx.commit().await.map_err(sql_error(machines::READ_CONFIG))?;

        Ok(configs
            .into_iter()
            .map(|config| (config.name.clone(), config))
            .collect())
    }

    pub async fn bind_tag(
        &self,
        tag_name: &str,
        machine_name: &str,
        default_tag_name: Option<&str>,
    ) -> EngineResult<TagBinding> {
        let started = Instant::now();
        let mut tx = self.pool.begin().await.map_err(sql_error(machines::BIND_TAG))?;

        let machine_id = find_machine_id(&mut tx, machine_name, machines::BIND_TAG).await?;

        let existing = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM tags_machines
            WHERE tag_name = ? AND machine_id = ? AND COALESCE(default_tag_name, '') = COALESCE(?, '')
            "#,
        )
        .bind(tag_name)
        .bind(machine_id)
        .bind(default_tag_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(sql_error(machines::BIND_TAG))?;

        if existing > 0 {
            return Err(EngineError::validation(format!(
                "tag '{tag_name}' is already bound to machine '{machine_name}'"
            )));
        }

        let binding = sqlx::query_as::<_, TagBinding>(
            r#"
            INSERT INTO tags_machines (tag_name, machine_id, default_tag_name)
            VALUES (?, ?, ?)
            RETURNING id, tag_name, machine_id, default_tag_name
            "#,
        )
        .bind(tag_name)
        .bind(machine_id)
        .bind(default_tag_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(sql_error(machines::BIND_TAG))?;

        tx.commit().await.map_err(sql_error(machines::BIND_TAG))?;

        log_database_operation(
            machines::BIND_TAG,
            Some("tags_machines"),
            Some(binding.id),
            "committed",
            Some(started.elapsed().as_millis() as u64),
            Some(tag_name),
        );
        Ok(binding)
    }

    /// Remove the one binding matching `tag_name`, `machine_name` and alias
    pub async fn unbind_tag(
        &self,
        tag_name: &str,
        machine_name: &str,
        default_tag_name: Option<&str>,
    ) -> EngineResult<u64> {
        let started = Instant::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(sql_error(machines::UNBIND_TAG))?;

        let machine_id = find_machine_id(&mut tx, machine_name, machines::UNBIND_TAG).await?;

        // The unique binding index makes this match at most one row
        let removed = sqlx::query(
            r#"
            DELETE FROM tags_machines
            WHERE tag_name = ? AND machine_id = ? AND COALESCE(default_tag_name, '') = COALESCE(?, '')
            "#,
        )
        .bind(tag_name)
        .bind(machine_id)
        .bind(default_tag_name)
        .execute(&mut *tx)
        .await
        .map_err(sql_error(machines::UNBIND_TAG))?
        .rows_affected();

        if removed == 0 {
            return Err(EngineError::not_found(
                "TagBinding",
                format!(
                    "{tag_name} -> {machine_name} ({})",
                    default_tag_name.unwrap_or("no alias")
                ),
            ));
        }

        tx.commit().await.map_err(sql_error(machines::UNBIND_TAG))?;

        log_database_operation(
            machines::UNBIND_TAG,
            Some("tags_machines"),
            Some(machine_id),
            "committed",
            Some(started.elapsed().as_millis() as u64),
            Some(tag_name),
        );
        Ok(removed)
    }

    pub async fn read_bindings(&self, machine_name: &str) -> EngineResult<Vec<TagBinding>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(sql_error(machines::READ_BINDINGS))?;

        let machine_id = find_machine_id(&mut tx, machine_name, machines::READ_BINDINGS).await?;

        let bindings = sqlx::query_as::<_, TagBinding>(
            r#"
            SELECT id, tag_name, machine_id, default_tag_name
            FROM tags_machines
            WHERE machine_id = ?
            ORDER BY id
            "#,
        )
        .bind(machine_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(sql_error(machines::READ_BINDINGS))?;

        tx.commit().await.map_err(sql_error(machines::READ_BINDINGS))?;
        Ok(bindings)
    }
}

async fn find_machine_id(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    name: &str,
    operation: &'static str,
) -> EngineResult<i64> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM machines WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut **tx)
        .await
        .map_err(sql_error(operation))?
        .ok_or_else(|| EngineError::not_found("Machine", name))
}

fn text_parameter<'a>(action: &'a Action, key: &str) -> EngineResult<&'a str> {
    action
        .require(key)?
        .as_str()
        .ok_or_else(|| EngineError::validation(format!("parameter '{key}' must be a string")))
}

/// Deserialize the whole parameter map of an action into `T`
fn decode_parameters<T: DeserializeOwned>(action: Action) -> EngineResult<T> {
    let (operation, parameters) = action.into_parts();
    let object: serde_json::Map<String, Value> = parameters.into_iter().collect();
    serde_json::from_value(Value::Object(object)).map_err(|e| {
        EngineError::validation(format!("invalid parameters for '{operation}': {e}"))
    })
}

#[async_trait]
impl ActionHandler for MachinesLogger {
    type Value = Value;
    type Output = Value;

    fn resource_name(&self) -> &'static str {
        "machines_logger"
    }

    fn operations(&self) -> &'static [&'static str] {
        machines::OPERATIONS
    }

    async fn handle(&mut self, action: Action) -> EngineResult<Value> {
        let operation = action.operation().to_string();

        let reply = match operation.as_str() {
            machines::CREATE => serde_json::to_value(self.create(decode_parameters(action)?).await?)?,
            machines::PUT => serde_json::to_value(self.put(decode_parameters(action)?).await?)?,
            machines::READ_ALL => serde_json::to_value(self.read_all().await?)?,
            machines::READ_CONFIG => serde_json::to_value(self.read_config().await?)?,
            machines::BIND_TAG => {
                let tag_name = text_parameter(&action, params::TAG_NAME)?;
                let machine_name = text_parameter(&action, params::MACHINE_NAME)?;
                let default_tag_name = action
                    .parameter(params::DEFAULT_TAG_NAME)
                    .and_then(Value::as_str);
                serde_json::to_value(
                    self.bind_tag(tag_name, machine_name, default_tag_name)
                        .await?,
                )?
            }
            machines::UNBIND_TAG => {
                let tag_name = text_parameter(&action, params::TAG_NAME)?;
                let machine_name = text_parameter(&action, params::MACHINE_NAME)?;
                let default_tag_name = action
                    .parameter(params::DEFAULT_TAG_NAME)
                    .and_then(Value::as_str);
                Value::from(
                    self.unbind_tag(tag_name, machine_name, default_tag_name)
                        .await?,
                )
            }
            machines::READ_BINDINGS => {
                let machine_name = text_parameter(&action, params::MACHINE_NAME)?;
                serde_json::to_value(self.read_bindings(machine_name).await?)?
            }
            _ => {
                return Err(EngineError::UnknownOperation {
                    resource: self.resource_name().to_string(),
                    operation,
                })
            }
        };

        Ok(reply)
    }

    async fn rollback(&mut self) {
        // The failed operation's transaction was dropped without commit
        debug!(resource = "machines_logger", "Transaction rolled back");
    }
}

/// Cloneable handle that routes every logger call through one action engine
#[derive(Debug, Clone)]
pub struct MachinesLoggerEngine {
    engine: ActionEngine<MachinesLogger>,
    submit_timeout: Option<Duration>,
}

impl MachinesLoggerEngine {
    /// Connect to the configured database, migrate it and start the worker
    pub async fn connect(config: &DatabaseConfig) -> EngineResult<Self> {
        let logger = MachinesLogger::connect(config).await?;
        Ok(Self::spawn(logger))
    }

    pub fn spawn(logger: MachinesLogger) -> Self {
        Self {
            engine: ActionEngine::spawn(logger),
            submit_timeout: None,
        }
    }

    /// Give up waiting on queued actions after `timeout`
    pub fn with_submit_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn engine(&self) -> &ActionEngine<MachinesLogger> {
        &self.engine
    }

    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }

    pub async fn create(&self, machine: NewMachine) -> EngineResult<MachineRecord> {
        self.query(encode_action(machines::CREATE, &machine)?).await
    }

    pub async fn put(&self, update: MachineUpdate) -> EngineResult<MachineRecord> {
        self.query(encode_action(machines::PUT, &update)?).await
    }

    pub async fn read_all(&self) -> EngineResult<Vec<MachineRecord>> {
        self.query(Action::new(machines::READ_ALL)).await
    }

    pub async fn read_config(&self) -> EngineResult<BTreeMap<String, MachineConfig>> {
        self.query(Action::new(machines::READ_CONFIG)).await
    }

    pub async fn bind_tag(
        &self,
        tag_name: &str,
        machine_name: &str,
        default_tag_name: Option<&str>,
    ) -> EngineResult<TagBinding> {
        let action = Action::new(machines::BIND_TAG)
            .with_parameter(params::TAG_NAME, tag_name)
            .with_parameter(params::MACHINE_NAME, machine_name)
            .with_parameter(params::DEFAULT_TAG_NAME, default_tag_name);
        self.query(action).await
    }

    /// Returns the number of bindings removed, always one on success
    pub async fn unbind_tag(
        &self,
        tag_name: &str,
        machine_name: &str,
        default_tag_name: Option<&str>,
    ) -> EngineResult<u64> {
        let action = Action::new(machines::UNBIND_TAG)
            .with_parameter(params::TAG_NAME, tag_name)
            .with_parameter(params::MACHINE_NAME, machine_name)
            .with_parameter(params::DEFAULT_TAG_NAME, default_tag_name);
        self.query(action).await
    }

    pub async fn read_bindings(&self, machine_name: &str) -> EngineResult<Vec<TagBinding>> {
        let action =
            Action::new(machines::READ_BINDINGS).with_parameter(params::MACHINE_NAME, machine_name);
        self.query(action).await
    }

    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }

    async fn query<T: DeserializeOwned>(&self, action: Action) -> EngineResult<T> {
        let reply = match self.submit_timeout {
            Some(timeout) => self.engine.submit_with_timeout(action, timeout).await?,
            None => self.engine.submit(action).await?,
        };
        Ok(serde_json::from_value(reply)?)
    }
}

/// Build an action whose parameters are the fields of `arguments`
fn encode_action<T: Serialize>(operation: &str, arguments: &T) -> EngineResult<Action> {
    match serde_json::to_value(arguments)? {
        Value::Object(fields) => Ok(Action::new(operation).with_parameters(fields)),
        other => Err(EngineError::validation(format!(
            "arguments for '{operation}' must serialize to an object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn logger() -> MachinesLogger {
        MachinesLogger::connect(&DatabaseConfig::default())
            .await
            .unwrap()
    }

    fn pump(name: &str) -> NewMachine {
        NewMachine {
            identifier: format!("{name}-id"),
            name: name.to_string(),
            interval: 1,
            description: "feed pump".to_string(),
            classification: "pumps".to_string(),
            buffer_size: 10,
            buffer_roll_type: "backward".to_string(),
            criticity: 3,
            priority: 1,
        }
    }

    #[tokio::test]
    async fn test_create_and_read_all() {
        let logger = logger().await;
        let first = logger.create(pump("pump1")).await.unwrap();
        let second = logger.create(pump("pump2")).await.unwrap();
        assert!(second.id > first.id);

        let records = logger.read_all().await.unwrap();
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["pump1", "pump2"]);
    }

    #[tokio::test]
    async fn test_put_updates_only_supplied_fields() {
        let logger = logger().await;
        logger.create(pump("pump1")).await.unwrap();

        let updated = logger
            .put(MachineUpdate::new("pump1").description("x").priority(0))
            .await
            .unwrap();

        assert_eq!(updated.description, "x");
        assert_eq!(updated.priority, 0);
        assert_eq!(updated.interval, 1);
        assert_eq!(updated.classification, "pumps");
    }

    #[tokio::test]
    async fn test_put_rejects_empty_update_and_unknown_machine() {
        let logger = logger().await;
        logger.create(pump("pump1")).await.unwrap();

        let err = logger.put(MachineUpdate::new("pump1")).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));

        let err = logger
            .put(MachineUpdate::new("ghost").interval(5))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_create_leaves_storage_unchanged() {
        let logger = logger().await;
        logger.create(pump("pump1")).await.unwrap();

        let err = logger.create(pump("pump1")).await.unwrap_err();
        assert!(matches!(err, EngineError::Storage { .. }));
        assert_eq!(logger.read_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_read_config_is_keyed_by_name() {
        let logger = logger().await;
        logger.create(pump("pump1")).await.unwrap();

        let config = logger.read_config().await.unwrap();
        let pump1 = &config["pump1"];
        assert_eq!(pump1.interval, 1);
        assert_eq!(pump1.buffer_roll_type, "backward");
    }

    #[tokio::test]
    async fn test_bind_and_unbind_tag() {
        let logger = logger().await;
        let machine = logger.create(pump("pump1")).await.unwrap();

        let binding = logger
            .bind_tag("sensor.level", "pump1", Some("level"))
            .await
            .unwrap();
        assert_eq!(binding.machine_id, machine.id);
        assert_eq!(binding.default_tag_name.as_deref(), Some("level"));

        let err = logger
            .bind_tag("sensor.level", "pump1", Some("level"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));

        assert_eq!(
            logger
                .unbind_tag("sensor.level", "pump1", Some("level"))
                .await
                .unwrap(),
            1
        );
        assert!(logger.read_bindings("pump1").await.unwrap().is_empty());

        let err = logger
            .unbind_tag("sensor.level", "pump1", Some("level"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_unbind_removes_only_the_matching_alias() {
        let logger = logger().await;
        logger.create(pump("pump1")).await.unwrap();
        logger.bind_tag("sensor.level", "pump1", None).await.unwrap();
        let aliased = logger
            .bind_tag("sensor.level", "pump1", Some("level"))
            .await
            .unwrap();

        assert_eq!(
            logger.unbind_tag("sensor.level", "pump1", None).await.unwrap(),
            1
        );

        let remaining = logger.read_bindings("pump1").await.unwrap();
        assert_eq!(remaining, vec![aliased]);
    }

    #[tokio::test]
    async fn test_bind_unknown_machine_is_not_found() {
        let logger = logger().await;
        let err = logger.bind_tag("sensor.level", "ghost", None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_engine_routes_json_actions() {
        let engine = MachinesLoggerEngine::spawn(logger().await);
        let record = engine.create(pump("pump1")).await.unwrap();
        assert_eq!(record.name, "pump1");

        let updated = engine
            .put(MachineUpdate::new("pump1").interval(0))
            .await
            .unwrap();
        assert_eq!(updated.interval, 0);

        let err = engine
            .engine()
            .submit(Action::new("drop_table"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownOperation { .. }));

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_parameters_are_validation_errors() {
        let engine = MachinesLoggerEngine::spawn(logger().await);
        let action = Action::new(machines::CREATE).with_parameter("name", "pump1");

        let err = engine.engine().submit(action).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
        assert!(engine.read_all().await.unwrap().is_empty());
    }
}
