//! Routes dispatch events to user-registered handlers.
//!
//! The upstream `twilight` crate this runtime borrows its shape from hands
//! callers a `Stream` of decoded events to poll themselves, and the
//! original Gateway source this runtime reimplements validates a handler's
//! shape at registration time via reflection. Neither fits a statically
//! typed registry: this module instead closes over a typed
//! [`EventHandler`] per event name and reports a mismatched payload type at
//! registration time rather than letting it panic mid-dispatch.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{
    any::TypeId,
    collections::HashMap,
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};

/// A typed handler for one dispatch event's payload.
///
/// Implemented directly, or picked up automatically for any
/// `Fn(Payload) -> impl Future<Output = ()>` closure via the blanket impl
/// below.
pub trait EventHandler: Send + Sync + 'static {
    type Payload: DeserializeOwned + Send + 'static;

    fn handle(&self, payload: Self::Payload) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

impl<F, Fut, T> EventHandler for F
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
    T: DeserializeOwned + Send + 'static,
{
    type Payload = T;

    fn handle(&self, payload: T) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(self(payload))
    }
}

/// Registering a handler failed.
#[derive(Debug)]
pub struct DispatcherError {
    kind: DispatcherErrorType,
}

impl DispatcherError {
    pub const fn kind(&self) -> &DispatcherErrorType {
        &self.kind
    }
}

impl Display for DispatcherError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            DispatcherErrorType::HandlerSignatureMismatch { event } => {
                write!(
                    f,
                    "a handler for {event} is already registered with a different payload type"
                )
            }
        }
    }
}

impl Error for DispatcherError {}

#[derive(Debug)]
#[non_exhaustive]
pub enum DispatcherErrorType {
    /// A second handler was registered for an event name that already has a
    /// handler expecting a different payload type.
    HandlerSignatureMismatch { event: Box<str> },
}

/// A handler erased of its concrete payload type, so handlers for different
/// events (and different payload shapes) can share one registry.
trait ErasedHandler: Send + Sync {
    fn call(&self, data: Value) -> Pin<Box<dyn Future<Output = ()> + Send>>;
    fn payload_type(&self) -> TypeId;
}

struct TypedHandler<H: EventHandler>(Arc<H>);

impl<H: EventHandler> ErasedHandler for TypedHandler<H> {
    fn call(&self, data: Value) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let Ok(payload) = serde_json::from_value::<H::Payload>(data) else {
            return Box::pin(async {});
        };

        let handler = Arc::clone(&self.0);
        Box::pin(async move { handler.handle(payload).await })
    }

    fn payload_type(&self) -> TypeId {
        TypeId::of::<H::Payload>()
    }
}

struct EventHandlers {
    payload_type: TypeId,
    handlers: Vec<Box<dyn ErasedHandler>>,
}

/// A registry of named event handlers.
///
/// Each dispatch event name (e.g. `"MESSAGE_CREATE"`) may have any number
/// of handlers, but they must all agree on the same payload type. All of
/// them run concurrently, and none of them can block a dispatch from
/// reaching the others or delay processing of the next frame off the
/// socket.
#[derive(Default)]
pub struct Dispatcher {
    handlers: Mutex<HashMap<Box<str>, EventHandlers>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.lock().expect("dispatcher handlers poisoned");
        f.debug_struct("Dispatcher")
            .field("event_types", &handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for dispatch events named `event`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatcherErrorType::HandlerSignatureMismatch`] if a
    /// handler is already registered for `event` with a different payload
    /// type.
    pub fn register<H>(&self, event: impl Into<Box<str>>, handler: H) -> Result<(), DispatcherError>
    where
        H: EventHandler,
    {
        let event = event.into();
        let erased: Box<dyn ErasedHandler> = Box::new(TypedHandler(Arc::new(handler)));
        let payload_type = erased.payload_type();

        let mut handlers = self.handlers.lock().expect("dispatcher handlers poisoned");

        match handlers.get_mut(&*event) {
            Some(existing) if existing.payload_type != payload_type => {
                return Err(DispatcherError {
                    kind: DispatcherErrorType::HandlerSignatureMismatch { event },
                });
            }
            Some(existing) => existing.handlers.push(erased),
            None => {
                handlers.insert(
                    event,
                    EventHandlers {
                        payload_type,
                        handlers: vec![erased],
                    },
                );
            }
        }

        Ok(())
    }

    /// Fire every handler registered for `event` with `data`, spawning each
    /// one onto the runtime without waiting for it to finish. A payload
    /// that doesn't deserialize as the registered handler's type is
    /// silently skipped for that handler.
    pub fn dispatch(&self, event: impl AsRef<str>, data: Value) {
        let handlers = self.handlers.lock().expect("dispatcher handlers poisoned");

        let Some(registered) = handlers.get(event.as_ref()) else {
            return;
        };

        for callback in &registered.handlers {
            let fut = callback.call(data.clone());
            tokio::spawn(fut);
        }
    }

    /// Number of handlers registered for `event`, for observability/tests.
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers
            .lock()
            .expect("dispatcher handlers poisoned")
            .get(event)
            .map_or(0, |registered| registered.handlers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::Dispatcher;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[derive(Deserialize)]
    struct MessageCreate {
        #[allow(dead_code)]
        content: String,
    }

    #[derive(Deserialize)]
    struct Ready {
        #[allow(dead_code)]
        session_id: String,
    }

    #[tokio::test]
    async fn dispatch_invokes_all_registered_handlers() {
        let dispatcher = Dispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            dispatcher
                .register("MESSAGE_CREATE", move |_payload: MessageCreate| {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                    }
                })
                .unwrap();
        }

        assert_eq!(dispatcher.handler_count("MESSAGE_CREATE"), 3);
        dispatcher.dispatch("MESSAGE_CREATE", json!({ "content": "hi" }));

        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn dispatch_to_unregistered_event_is_a_no_op() {
        let dispatcher = Dispatcher::new();
        dispatcher.dispatch("UNKNOWN", json!(null));
    }

    #[test]
    fn mismatched_payload_type_is_rejected() {
        let dispatcher = Dispatcher::new();

        dispatcher
            .register("READY", |_payload: Ready| async move {})
            .unwrap();

        let err = dispatcher
            .register("READY", |_payload: MessageCreate| async move {})
            .unwrap_err();

        assert!(matches!(
            err.kind(),
            super::DispatcherErrorType::HandlerSignatureMismatch { .. }
        ));
        assert_eq!(dispatcher.handler_count("READY"), 1);
    }
}
