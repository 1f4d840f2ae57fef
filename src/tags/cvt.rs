//! # Current Value Table
//!
//! The authoritative map from tag name to live value. [`CurrentValueTable`]
//! is the protected resource and runs only inside its action engine worker;
//! [`CvtEngine`] is the cloneable handle every producer and consumer uses.
//!
//! Writes, observer (de)attachment and routed reads are serialized. After
//! each mutation the worker republishes the tag into a shared snapshot map so
//! [`CvtEngine::snapshot`] can read without queueing, at the price of
//! possibly missing a write that is still in flight.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::observer::{PushOutcome, TagObserver};
use super::tag::{Tag, TagDefinition, TagValue};
use crate::config::EngineConfig;
use crate::constants::{cvt, params};
use crate::engine::{Action, ActionEngine, ActionHandler, EngineError, EngineResult, EngineStats};
use crate::logging::log_tag_operation;

/// Parameter values accepted by the current value table
#[derive(Debug, Clone)]
pub enum CvtParameter {
    Text(String),
    Value(TagValue),
    Definition(TagDefinition),
    Observer(TagObserver),
}

impl CvtParameter {
    fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Value(_) => "value",
            Self::Definition(_) => "definition",
            Self::Observer(_) => "observer",
        }
    }
}

impl From<&str> for CvtParameter {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CvtParameter {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<TagValue> for CvtParameter {
    fn from(value: TagValue) -> Self {
        Self::Value(value)
    }
}

impl From<TagDefinition> for CvtParameter {
    fn from(value: TagDefinition) -> Self {
        Self::Definition(value)
    }
}

impl From<TagObserver> for CvtParameter {
    fn from(value: TagObserver) -> Self {
        Self::Observer(value)
    }
}

/// Reply payloads of the current value table
#[derive(Debug, Clone)]
pub enum CvtReply {
    Tag(Tag),
    Tags(Vec<Tag>),
    Ack,
}

/// Tag map plus the observers registered per tag name
#[derive(Debug, Default)]
pub struct CurrentValueTable {
    tags: HashMap<String, Tag>,
    observers: HashMap<String, Vec<TagObserver>>,
    published: Arc<DashMap<String, Tag>>,
}

impl CurrentValueTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared map the worker republishes into after every mutation
    pub fn published(&self) -> Arc<DashMap<String, Tag>> {
        Arc::clone(&self.published)
    }

    fn create_tag(&mut self, definition: TagDefinition) -> EngineResult<Tag> {
        if self.tags.contains_key(&definition.name) {
            return Err(EngineError::validation(format!(
                "tag '{}' already exists",
                definition.name
            )));
        }

        let tag = Tag::from_definition(definition)?;
        self.published.insert(tag.name.clone(), tag.clone());
        self.tags.insert(tag.name.clone(), tag.clone());

        let data_type = tag.data_type.to_string();
        log_tag_operation(cvt::CREATE_TAG, &tag.name, "created", Some(&data_type));
        Ok(tag)
    }

    fn lookup(&self, name: &str) -> EngineResult<Tag> {
        self.tags
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::not_found("Tag", name))
    }

    fn write(&mut self, name: &str, value: TagValue) -> EngineResult<Tag> {
        let tag = self
            .tags
            .get_mut(name)
            .ok_or_else(|| EngineError::not_found("Tag", name))?;
        tag.assign(value)?;
        let tag = tag.clone();

        self.published.insert(tag.name.clone(), tag.clone());
        self.notify(&tag);

        Ok(tag)
    }

    /// Push one notification per observer of `tag`, pruning closed ones
    fn notify(&mut self, tag: &Tag) {
        let Some(observers) = self.observers.get_mut(&tag.name) else {
            return;
        };

        let notification = tag.notification();
        observers.retain(|observer| match observer.update(notification.clone()) {
            PushOutcome::Queued => true,
            PushOutcome::DroppedOldest => {
                warn!(
                    tag = %tag.name,
                    observer_id = %observer.id(),
                    dropped = observer.queue().dropped(),
                    "Observer queue full, oldest notification evicted"
                );
                true
            }
            PushOutcome::Closed => {
                debug!(tag = %tag.name, observer_id = %observer.id(), "Pruning closed observer");
                false
            }
        });
    }

    fn attach_observer(&mut self, name: &str, observer: TagObserver) -> EngineResult<()> {
        if !self.tags.contains_key(name) {
            return Err(EngineError::not_found("Tag", name));
        }

        let observers = self.observers.entry(name.to_string()).or_default();
        if observers.iter().any(|existing| existing == &observer) {
            debug!(tag = name, observer_id = %observer.id(), "Observer already attached");
            return Ok(());
        }

        let observer_id = observer.id().to_string();
        observers.push(observer);
        log_tag_operation(cvt::ATTACH_OBSERVER, name, "attached", Some(&observer_id));
        Ok(())
    }

    fn detach_observer(&mut self, name: &str, observer: &TagObserver) {
        let Some(observers) = self.observers.get_mut(name) else {
            return;
        };

        let before = observers.len();
        observers.retain(|existing| existing != observer);
        let detached = observers.len() < before;
        if observers.is_empty() {
            self.observers.remove(name);
        }

        if detached {
            let observer_id = observer.id().to_string();
            log_tag_operation(cvt::DETACH_OBSERVER, name, "detached", Some(&observer_id));
        }
    }

    #[cfg(test)]
    fn observer_count(&self, name: &str) -> usize {
        self.observers.get(name).map_or(0, Vec::len)
    }
}

fn take_text(action: &mut Action<CvtParameter>, key: &str) -> EngineResult<String> {
    match action.take_parameter(key) {
        Some(CvtParameter::Text(text)) => Ok(text),
        Some(other) => Err(wrong_kind(key, "text", &other)),
        None => Err(EngineError::missing_parameter(key)),
    }
}

fn take_value(action: &mut Action<CvtParameter>, key: &str) -> EngineResult<TagValue> {
    match action.take_parameter(key) {
        Some(CvtParameter::Value(value)) => Ok(value),
        Some(other) => Err(wrong_kind(key, "value", &other)),
        None => Err(EngineError::missing_parameter(key)),
    }
}

fn take_definition(action: &mut Action<CvtParameter>, key: &str) -> EngineResult<TagDefinition> {
    match action.take_parameter(key) {
        Some(CvtParameter::Definition(definition)) => Ok(definition),
        Some(other) => Err(wrong_kind(key, "definition", &other)),
        None => Err(EngineError::missing_parameter(key)),
    }
}

fn take_observer(action: &mut Action<CvtParameter>, key: &str) -> EngineResult<TagObserver> {
    match action.take_parameter(key) {
        Some(CvtParameter::Observer(observer)) => Ok(observer),
        Some(other) => Err(wrong_kind(key, "observer", &other)),
        None => Err(EngineError::missing_parameter(key)),
    }
}

fn wrong_kind(key: &str, expected: &str, got: &CvtParameter) -> EngineError {
    EngineError::validation(format!(
        "parameter '{key}' must be a {expected}, got {}",
        got.kind()
    ))
}

#[async_trait]
impl ActionHandler for CurrentValueTable {
    type Value = CvtParameter;
    type Output = CvtReply;

    fn resource_name(&self) -> &'static str {
        "cvt"
    }

    fn operations(&self) -> &'static [&'static str] {
        cvt::OPERATIONS
    }

    async fn handle(&mut self, mut action: Action<CvtParameter>) -> EngineResult<CvtReply> {
        let operation = action.operation().to_string();

        match operation.as_str() {
            cvt::CREATE_TAG => {
                let definition = take_definition(&mut action, params::DEFINITION)?;
                self.create_tag(definition).map(CvtReply::Tag)
            }
            cvt::READ | cvt::GET_TAG_BY_NAME => {
                let name = take_text(&mut action, params::NAME)?;
                self.lookup(&name).map(CvtReply::Tag)
            }
            cvt::WRITE => {
                let name = take_text(&mut action, params::NAME)?;
                let value = take_value(&mut action, params::VALUE)?;
                self.write(&name, value).map(CvtReply::Tag)
            }
            cvt::ATTACH_OBSERVER => {
                let name = take_text(&mut action, params::NAME)?;
                let observer = take_observer(&mut action, params::OBSERVER)?;
                self.attach_observer(&name, observer)?;
                Ok(CvtReply::Ack)
            }
            cvt::DETACH_OBSERVER => {
                let name = take_text(&mut action, params::NAME)?;
                let observer = take_observer(&mut action, params::OBSERVER)?;
                self.detach_observer(&name, &observer);
                Ok(CvtReply::Ack)
            }
            cvt::GET_TAGS => {
                let mut tags: Vec<Tag> = self.tags.values().cloned().collect();
                tags.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(CvtReply::Tags(tags))
            }
            _ => Err(EngineError::UnknownOperation {
                resource: self.resource_name().to_string(),
                operation,
            }),
        }
    }
}

/// Cloneable handle to the process's current value table
#[derive(Debug, Clone)]
pub struct CvtEngine {
    engine: ActionEngine<CurrentValueTable>,
    published: Arc<DashMap<String, Tag>>,
    submit_timeout: Option<Duration>,
}

impl CvtEngine {
    /// Spawn a fresh table with no submit timeout
    pub fn new() -> Self {
        Self::spawn(None)
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        Self::spawn(config.submit_timeout())
    }

    fn spawn(submit_timeout: Option<Duration>) -> Self {
        let table = CurrentValueTable::new();
        let published = table.published();

        Self {
            engine: ActionEngine::spawn(table),
            published,
            submit_timeout,
        }
    }

    /// Underlying action engine, for raw submissions
    pub fn engine(&self) -> &ActionEngine<CurrentValueTable> {
        &self.engine
    }

    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }

    pub async fn create_tag(&self, definition: TagDefinition) -> EngineResult<Tag> {
        let action = Action::new(cvt::CREATE_TAG).with_parameter(params::DEFINITION, definition);
        self.expect_tag(action).await
    }

    pub async fn read(&self, name: &str) -> EngineResult<Tag> {
        let action = Action::new(cvt::READ).with_parameter(params::NAME, name);
        self.expect_tag(action).await
    }

    /// Write a value; observers have been notified once this returns `Ok`
    pub async fn write(&self, name: &str, value: impl Into<TagValue>) -> EngineResult<Tag> {
        let action = Action::new(cvt::WRITE)
            .with_parameter(params::NAME, name)
            .with_parameter(params::VALUE, value.into());
        self.expect_tag(action).await
    }

    pub async fn attach_observer(&self, name: &str, observer: &TagObserver) -> EngineResult<()> {
        let action = Action::new(cvt::ATTACH_OBSERVER)
            .with_parameter(params::NAME, name)
            .with_parameter(params::OBSERVER, observer.clone());
        self.request(action).await.map(|_| ())
    }

    /// Detaching an observer that is not attached is a no-op
    pub async fn detach_observer(&self, name: &str, observer: &TagObserver) -> EngineResult<()> {
        let action = Action::new(cvt::DETACH_OBSERVER)
            .with_parameter(params::NAME, name)
            .with_parameter(params::OBSERVER, observer.clone());
        self.request(action).await.map(|_| ())
    }

    pub async fn get_tag_by_name(&self, name: &str) -> EngineResult<Tag> {
        let action = Action::new(cvt::GET_TAG_BY_NAME).with_parameter(params::NAME, name);
        self.expect_tag(action).await
    }

    pub async fn get_tags(&self) -> EngineResult<Vec<Tag>> {
        match self.request(Action::new(cvt::GET_TAGS)).await? {
            CvtReply::Tags(tags) => Ok(tags),
            other => Err(unexpected_reply(cvt::GET_TAGS, &other)),
        }
    }

    /// Point-in-time read that bypasses the queue
    pub fn snapshot(&self, name: &str) -> Option<Tag> {
        self.published.get(name).map(|entry| entry.value().clone())
    }

    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }

    async fn expect_tag(&self, action: Action<CvtParameter>) -> EngineResult<Tag> {
        let operation = action.operation().to_string();
        match self.request(action).await? {
            CvtReply::Tag(tag) => Ok(tag),
            other => Err(unexpected_reply(&operation, &other)),
        }
    }

    async fn request(&self, action: Action<CvtParameter>) -> EngineResult<CvtReply> {
        match self.submit_timeout {
            Some(timeout) => self.engine.submit_with_timeout(action, timeout).await,
            None => self.engine.submit(action).await,
        }
    }
}

impl Default for CvtEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn unexpected_reply(operation: &str, reply: &CvtReply) -> EngineError {
    EngineError::validation(format!(
        "operation '{operation}' produced an unexpected reply: {reply:?}"
    ))
}
