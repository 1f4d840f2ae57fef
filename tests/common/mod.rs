#![allow(dead_code)]

pub mod machines;
pub mod strategies;

pub use machines::*;

use automation_core::config::DatabaseConfig;
use automation_core::logger::{MachinesLoggerEngine, NewMachine};
use automation_core::tags::{CvtEngine, DataType, TagDefinition};
use std::time::Duration;

/// Fresh table holding the given tags
pub async fn cvt_with_tags(tags: &[(&str, DataType)]) -> CvtEngine {
    let cvt = CvtEngine::new();
    for (name, data_type) in tags {
        cvt.create_tag(TagDefinition::new(*name, *data_type))
            .await
            .expect("tag creation should succeed");
    }
    cvt
}

/// Logger engine over a private in-memory database
pub async fn memory_logger() -> MachinesLoggerEngine {
    MachinesLoggerEngine::connect(&DatabaseConfig::default())
        .await
        .expect("in-memory database should open")
}

pub fn new_machine(name: &str) -> NewMachine {
    NewMachine {
        identifier: format!("{name}-identifier"),
        name: name.to_string(),
        interval: 1,
        description: format!("{name} controller"),
        classification: "pumps".to_string(),
        buffer_size: 10,
        buffer_roll_type: "backward".to_string(),
        criticity: 3,
        priority: 1,
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
