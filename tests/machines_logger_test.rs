mod common;

use automation_core::config::DatabaseConfig;
use automation_core::engine::EngineError;
use automation_core::logger::{MachineUpdate, MachinesLoggerEngine};
use common::{memory_logger, new_machine};
use std::collections::HashSet;
use tempfile::TempDir;

#[tokio::test]
async fn test_machine_lifecycle_through_engine() {
    let logger = memory_logger().await;

    let pump = logger.create(new_machine("pump1")).await.unwrap();
    logger.create(new_machine("pump2")).await.unwrap();

    let updated = logger
        .put(MachineUpdate::new("pump1").description("x").criticity(0))
        .await
        .unwrap();
    assert_eq!(updated.id, pump.id);
    assert_eq!(updated.description, "x");
    assert_eq!(updated.criticity, 0);
    assert_eq!(updated.classification, pump.classification);
    assert_eq!(updated.buffer_size, pump.buffer_size);

    let config = logger.read_config().await.unwrap();
    assert_eq!(config.len(), 2);
    assert_eq!(config["pump1"].criticity, 0);
    assert_eq!(config["pump2"].criticity, 3);

    let names: Vec<String> = logger
        .read_all()
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.name)
        .collect();
    assert_eq!(names, vec!["pump1", "pump2"]);

    logger.shutdown().await;
}

#[tokio::test]
async fn test_failed_create_rolls_back() {
    let logger = memory_logger().await;
    logger.create(new_machine("pump1")).await.unwrap();

    let mut clash = new_machine("pump1b");
    clash.identifier = "pump1-identifier".to_string();
    let err = logger.create(clash).await.unwrap_err();
    assert!(matches!(err, EngineError::Storage { .. }));

    assert_eq!(logger.read_all().await.unwrap().len(), 1);

    let stats = logger.stats();
    assert_eq!(stats.failed, 1);
    assert!(stats.processed >= 2);
}

#[tokio::test]
async fn test_put_validation() {
    let logger = memory_logger().await;
    logger.create(new_machine("pump1")).await.unwrap();

    let err = logger.put(MachineUpdate::new("pump1")).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));

    let err = logger
        .put(MachineUpdate::new("ghost").priority(2))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_tag_bindings() {
    let logger = memory_logger().await;
    let pump = logger.create(new_machine("pump1")).await.unwrap();

    let level = logger
        .bind_tag("sensor.level", "pump1", None)
        .await
        .unwrap();
    let alias = logger
        .bind_tag("sensor.flow", "pump1", Some("flow"))
        .await
        .unwrap();
    assert_eq!(level.machine_id, pump.id);
    assert_eq!(level.default_tag_name, None);
    assert_eq!(alias.default_tag_name.as_deref(), Some("flow"));

    let err = logger
        .bind_tag("sensor.level", "pump1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));

    let err = logger
        .bind_tag("sensor.level", "ghost", None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    assert_eq!(
        logger
            .unbind_tag("sensor.level", "pump1", None)
            .await
            .unwrap(),
        1
    );
    let remaining: Vec<String> = logger
        .read_bindings("pump1")
        .await
        .unwrap()
        .into_iter()
        .map(|binding| binding.tag_name)
        .collect();
    assert_eq!(remaining, vec!["sensor.flow"]);

    let err = logger
        .unbind_tag("sensor.level", "pump1", None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_unbind_leaves_other_aliases_of_the_same_pair() {
    let logger = memory_logger().await;
    logger.create(new_machine("pump1")).await.unwrap();

    logger.bind_tag("sensor.level", "pump1", None).await.unwrap();
    logger
        .bind_tag("sensor.level", "pump1", Some("level"))
        .await
        .unwrap();
    logger
        .bind_tag("sensor.level", "pump1", Some("tank_level"))
        .await
        .unwrap();

    let removed = logger
        .unbind_tag("sensor.level", "pump1", Some("level"))
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let aliases: Vec<Option<String>> = logger
        .read_bindings("pump1")
        .await
        .unwrap()
        .into_iter()
        .map(|binding| binding.default_tag_name)
        .collect();
    assert_eq!(aliases, vec![None, Some("tank_level".to_string())]);

    let err = logger
        .unbind_tag("sensor.level", "pump1", Some("level"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_concurrent_creates_are_serialized() {
    let logger = memory_logger().await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let logger = logger.clone();
        handles.push(tokio::spawn(async move {
            logger.create(new_machine(&format!("pump{i}"))).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let records = logger.read_all().await.unwrap();
    let ids: HashSet<i64> = records.iter().map(|record| record.id).collect();
    assert_eq!(records.len(), 20);
    assert_eq!(ids.len(), 20);
}

#[tokio::test]
async fn test_file_database_persists_across_connections() {
    let temp_dir = TempDir::new().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite://{}", temp_dir.path().join("machines.db").display()),
        max_connections: 2,
    };

    let logger = MachinesLoggerEngine::connect(&config).await.unwrap();
    logger.create(new_machine("pump1")).await.unwrap();
    logger.bind_tag("sensor.level", "pump1", None).await.unwrap();
    logger.shutdown().await;
    drop(logger);

    let reopened = MachinesLoggerEngine::connect(&config).await.unwrap();
    let records = reopened.read_all().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "pump1");
    assert_eq!(reopened.read_bindings("pump1").await.unwrap().len(), 1);
}
