use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// What every registered handler, sync or async, reduces to by the time the
/// dispatcher calls it. A sync handler is wrapped in `std::future::ready` at
/// registration time, so sync/async classification happens once, not on
/// every dispatch.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, String>> + Send>>;
type HandlerFn = Box<dyn Fn(Value, Value) -> HandlerFuture + Send + Sync>;

/// Name → handler. Mutable while loops run; a change takes
/// effect on the next dispatched request, since the dispatcher looks the
/// name up fresh for every inbound request frame.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Mutex<HashMap<String, HandlerFn>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a synchronous handler `fn(args, kwargs) -> Result<Value, String>`.
    pub fn set_event<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value, Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        let boxed: HandlerFn = Box::new(move |args, kwargs| {
            let result = handler(args, kwargs);
            Box::pin(std::future::ready(result))
        });
        self.handlers.lock().expect("registry mutex poisoned").insert(name.into(), boxed);
    }

    /// Registers an async handler returning a boxed, `Send` future.
    pub fn set_event_async<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        let boxed: HandlerFn = Box::new(move |args, kwargs| Box::pin(handler(args, kwargs)));
        self.handlers.lock().expect("registry mutex poisoned").insert(name.into(), boxed);
    }

    pub fn remove_event(&self, name: &str) {
        self.handlers.lock().expect("registry mutex poisoned").remove(name);
    }

    /// Looks up `name` and, if present, invokes it, returning the resulting
    /// future for the dispatcher to await outside the registry's lock (the
    /// lock only ever guards the lookup/insert/remove, never a handler's own
    /// execution).
    pub fn dispatch(&self, name: &str, args: Value, kwargs: Value) -> Option<HandlerFuture> {
        let guard = self.handlers.lock().expect("registry mutex poisoned");
        guard.get(name).map(|handler| handler(args, kwargs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sync_handler_round_trips() {
        let registry = HandlerRegistry::new();
        registry.set_event("echo", |args, _kwargs| Ok(args));
        let future = registry.dispatch("echo", Value::from("hi"), Value::Null).unwrap();
        assert_eq!(future.await, Ok(Value::from("hi")));
    }

    #[tokio::test]
    async fn async_handler_round_trips() {
        let registry = HandlerRegistry::new();
        registry.set_event_async("echo", |args, _kwargs| async move { Ok(args) });
        let future = registry.dispatch("echo", Value::from(1), Value::Null).unwrap();
        assert_eq!(future.await, Ok(Value::from(1)));
    }

    #[test]
    fn missing_event_is_a_miss() {
        let registry = HandlerRegistry::new();
        assert!(registry.dispatch("does_not_exist", Value::Null, Value::Null).is_none());
    }

    #[test]
    fn remove_event_takes_effect_immediately() {
        let registry = HandlerRegistry::new();
        registry.set_event("echo", |args, _| Ok(args));
        registry.remove_event("echo");
        assert!(registry.dispatch("echo", Value::Null, Value::Null).is_none());
    }
}
