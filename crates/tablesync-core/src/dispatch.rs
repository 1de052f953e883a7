//! Handler dispatch table.
//!
//! Handlers are grouped in categories and registered explicitly at startup.
//! Each handler is stored type-erased: the payload is deserialized into the
//! handler's declared type before it runs, and a mismatch is a `BadRequest`.
//! Registering the same message name twice fails.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Result, TableSyncError};
use crate::protocol::HandlerOutcome;
use crate::socket::MessageProcessor;

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<HandlerOutcome>> + Send>>;
pub type HandlerFn<C> = Arc<dyn Fn(Value, C) -> HandlerFuture + Send + Sync>;

/// A named group of handlers.
pub trait HandlerCategory<C>: Send + Sync {
    fn category(&self) -> &'static str;
    fn register(&self, handlers: &mut CategoryHandlers<C>);
}

/// Collects the handlers of one category during registration.
pub struct CategoryHandlers<C> {
    entries: Vec<(&'static str, HandlerFn<C>)>,
}

impl<C: Send + 'static> CategoryHandlers<C> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register `handler` for `name`, decoding payloads as `P`.
    pub fn on<P, F, Fut>(&mut self, name: &'static str, handler: F) -> &mut Self
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P, C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerOutcome>> + Send + 'static,
    {
        let erased: HandlerFn<C> = Arc::new(move |payload: Value, ctx: C| -> HandlerFuture {
            match serde_json::from_value::<P>(payload) {
                Ok(p) => Box::pin(handler(p, ctx)),
                Err(e) => Box::pin(std::future::ready(Err(TableSyncError::BadRequest(
                    format!("{name}: invalid payload: {e}"),
                )))),
            }
        });
        self.entries.push((name, erased));
        self
    }
}

struct Registered<C> {
    category: &'static str,
    handler: HandlerFn<C>,
}

pub struct Dispatcher<C> {
    handlers: HashMap<&'static str, Registered<C>>,
}

impl<C: Send + 'static> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send + 'static> Dispatcher<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Add every handler of `category`. Nothing is added if any name is
    /// already taken.
    pub fn register(&mut self, category: &dyn HandlerCategory<C>) -> Result<()> {
        let mut batch = CategoryHandlers::new();
        category.register(&mut batch);

        let mut seen = HashSet::new();
        for (name, _) in &batch.entries {
            if let Some(existing) = self.handlers.get(name) {
                return Err(TableSyncError::Internal(format!(
                    "duplicate handler for '{name}': categories '{}' and '{}'",
                    existing.category,
                    category.category()
                )));
            }
            if !seen.insert(*name) {
                return Err(TableSyncError::Internal(format!(
                    "duplicate handler for '{name}' in category '{}'",
                    category.category()
                )));
            }
        }

        let count = batch.entries.len();
        for (name, handler) in batch.entries {
            self.handlers.insert(
                name,
                Registered {
                    category: category.category(),
                    handler,
                },
            );
        }
        tracing::debug!(category = category.category(), count, "registered handlers");
        Ok(())
    }

    pub fn registered_messages(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn category_of(&self, name: &str) -> Option<&'static str> {
        self.handlers.get(name).map(|r| r.category)
    }

    pub async fn handle(&self, name: &str, payload: Value, ctx: C) -> Result<HandlerOutcome> {
        let handler = match self.handlers.get(name) {
            Some(r) => Arc::clone(&r.handler),
            None => return Err(TableSyncError::UnhandledMessage(name.to_string())),
        };
        handler(payload, ctx).await
    }
}

/// Processor that runs every inbound message through a dispatcher with a
/// fixed context and ignores forwards.
pub struct DispatchProcessor<C> {
    dispatcher: Arc<Dispatcher<C>>,
    ctx: C,
}

impl<C> DispatchProcessor<C> {
    pub fn new(dispatcher: Arc<Dispatcher<C>>, ctx: C) -> Self {
        Self { dispatcher, ctx }
    }
}

#[async_trait]
impl<C: Clone + Send + Sync + 'static> MessageProcessor for DispatchProcessor<C> {
    async fn process(&self, name: &str, payload: Value) -> Result<HandlerOutcome> {
        self.dispatcher.handle(name, payload, self.ctx.clone()).await
    }
}
