//! Handler registry for dynamically registered API commands.
//!
//! Keys are routing strings such as `HomeAutomation.X10/A1/Control.On` or a
//! shorter prefix such as `Automation/Scenes`. The router first looks up the
//! `domain/address/command` key exactly and then falls back to the longest
//! registered key that is a prefix of the full request.

use crate::request::ClientRequest;
use crate::Result;
use async_trait::async_trait;
use mig_core::ResponseData;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Trait for API command handlers.
#[async_trait]
pub trait ApiHandler: Send + Sync {
    /// Handle the request. `Ok(None)` leaves the request unhandled.
    async fn call(&self, request: &ClientRequest) -> Result<Option<ResponseData>>;
}

/// Registry of API handlers by routing key.
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ApiHandler>>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler, replacing any handler with the same key.
    pub async fn register(&self, key: impl Into<String>, handler: Arc<dyn ApiHandler>) {
        let key = key.into();
        debug!("Registering API handler: {}", key);
        let mut handlers = self.handlers.write().await;
        handlers.insert(key, handler);
    }

    /// Unregister a handler. Unknown keys are ignored.
    pub async fn unregister(&self, key: &str) {
        let mut handlers = self.handlers.write().await;
        handlers.remove(key);
    }

    /// Handler registered under exactly `key`.
    pub async fn find_exact(&self, key: &str) -> Option<Arc<dyn ApiHandler>> {
        let handlers = self.handlers.read().await;
        handlers.get(key).cloned()
    }

    /// Handler whose key is the longest prefix of `request`.
    pub async fn find_matching(&self, request: &str) -> Option<Arc<dyn ApiHandler>> {
        let handlers = self.handlers.read().await;
        handlers
            .iter()
            .filter(|(key, _)| !key.is_empty() && request.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, handler)| handler.clone())
    }

    /// List registered keys, sorted.
    pub async fn list(&self) -> Vec<String> {
        let handlers = self.handlers.read().await;
        let mut keys: Vec<String> = handlers.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.handlers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handlers.read().await.is_empty()
    }
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ApiHandler for FnHandler<F>
where
    F: Fn(ClientRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<ResponseData>>> + Send,
{
    async fn call(&self, request: &ClientRequest) -> Result<Option<ResponseData>> {
        (self.0)(request.clone()).await
    }
}

/// Wrap an async closure as an [`ApiHandler`].
///
/// The closure receives an owned copy of the request.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ApiHandler>
where
    F: Fn(ClientRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<ResponseData>>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Helper macro for creating API handlers from closures.
#[macro_export]
macro_rules! api_handler {
    ($f:expr) => {
        $crate::dynamic_api::handler_fn($f)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestContext;
    use mig_core::{Command, ResponseText};

    fn text_handler(value: &'static str) -> Arc<dyn ApiHandler> {
        crate::api_handler!(move |_request: ClientRequest| async move {
            Ok(Some(ResponseData::from(ResponseText::new(value))))
        })
    }

    fn request(routing: &str) -> ClientRequest {
        ClientRequest::new("test", Command::parse(routing), RequestContext::default())
    }

    async fn call(handler: Arc<dyn ApiHandler>, routing: &str) -> ResponseData {
        handler.call(&request(routing)).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_register_find_unregister() {
        let registry = HandlerRegistry::new();
        registry.register("a/b/c", text_handler("abc")).await;

        assert!(registry.find_exact("a/b/c").await.is_some());
        assert!(registry.find_exact("a/b").await.is_none());

        registry.unregister("a/b/c").await;
        assert!(registry.find_exact("a/b/c").await.is_none());
        registry.unregister("a/b/c").await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_find_matching_prefix() {
        let registry = HandlerRegistry::new();
        registry.register("a/b", text_handler("ab")).await;

        let handler = registry.find_matching("a/b/c").await.unwrap();
        assert_eq!(call(handler, "a/b/c").await, ResponseData::from(ResponseText::new("ab")));
        assert!(registry.find_matching("x/y/z").await.is_none());
    }

    #[tokio::test]
    async fn test_longest_prefix_wins() {
        let registry = HandlerRegistry::new();
        registry.register("a", text_handler("a")).await;
        registry.register("a/b/c", text_handler("abc")).await;
        registry.register("a/b", text_handler("ab")).await;

        let handler = registry.find_matching("a/b/c/d").await.unwrap();
        assert_eq!(call(handler, "a/b/c/d").await, ResponseData::from(ResponseText::new("abc")));

        let handler = registry.find_matching("a/x").await.unwrap();
        assert_eq!(call(handler, "a/x").await, ResponseData::from(ResponseText::new("a")));
    }

    #[tokio::test]
    async fn test_register_replaces() {
        let registry = HandlerRegistry::new();
        registry.register("k", text_handler("old")).await;
        registry.register("k", text_handler("new")).await;

        assert_eq!(registry.len().await, 1);
        let handler = registry.find_exact("k").await.unwrap();
        assert_eq!(call(handler, "k/x").await, ResponseData::from(ResponseText::new("new")));
    }

    #[tokio::test]
    async fn test_handler_sees_request_fields() {
        let handler = crate::api_handler!(|request: ClientRequest| async move {
            Ok(Some(ResponseData::from(format!(
                "{}:{}",
                request.command().option(0),
                request.body_text()
            ))))
        });

        let req = request("D/A/Set/hello%20world").with_body("payload");
        let response = handler.call(&req).await.unwrap().unwrap();
        assert_eq!(response.to_text(), "hello world:payload");
    }
}
