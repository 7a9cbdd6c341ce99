//! Handler system for the Chime framework.
//!
//! Handlers are implemented via blanket implementations for async functions
//! with different arities, similar to Axum's handler system. Every parameter
//! must implement [`FromContext`] and the return value must implement
//! [`IntoEventResult`].
//!
//! # Example
//!
//! ```rust,ignore
//! // No parameters, returns nothing
//! async fn simple() {}
//!
//! // Typed event, returns content
//! async fn pong(ping: EventOf<Ping>) -> &'static str {
//!     "pong"
//! }
//!
//! // Several extractors, fallible
//! async fn echo(msg: Message, ctx: ListenerContext) -> Result<String, MyError> {
//!     Ok(msg.plain_text())
//! }
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::trace;

use crate::context::ListenerContext;
use crate::extractor::FromContext;
use crate::result::{EventResult, IntoEventResult};

// ============================================================================
// Handler Trait
// ============================================================================

/// The core trait for listener handlers.
///
/// # Blanket Implementation
///
/// This trait is automatically implemented for async functions that:
/// - Take 0-4 parameters that implement [`FromContext`]
/// - Return a value that implements [`IntoEventResult`]
///
/// If any parameter cannot be extracted, the handler is not called and the
/// listener yields [`EventResult::Invalid`].
pub trait Handler<T>: Clone + Send + Sync + 'static {
    /// The type of future calling this handler returns.
    type Future: Future<Output = EventResult> + Send + 'static;

    /// Call the handler with the given context.
    fn call(self, ctx: ListenerContext) -> Self::Future;
}

// ============================================================================
// Type erasure
// ============================================================================

/// A type-erased handler that can be stored in a listener.
pub type BoxedHandler = Arc<dyn ErasedHandler>;

/// Type-erased handler trait for dynamic dispatch.
pub trait ErasedHandler: Send + Sync {
    /// Execute the handler with the given context.
    fn invoke(&self, ctx: ListenerContext) -> BoxFuture<'static, EventResult>;
}

/// A wrapper that converts a function into a boxed handler.
pub struct HandlerFn<F, T> {
    f: F,
    _marker: PhantomData<fn() -> T>,
}

impl<F, T> HandlerFn<F, T> {
    /// Creates a new handler function wrapper.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<F: Clone, T> Clone for HandlerFn<F, T> {
    fn clone(&self) -> Self {
        Self {
            f: self.f.clone(),
            _marker: PhantomData,
        }
    }
}

impl<F, T> ErasedHandler for HandlerFn<F, T>
where
    F: Handler<T>,
    T: 'static,
{
    fn invoke(&self, ctx: ListenerContext) -> BoxFuture<'static, EventResult> {
        let f = self.f.clone();
        Box::pin(f.call(ctx))
    }
}

/// Convert a handler function into a boxed handler.
pub fn into_handler<F, T>(f: F) -> BoxedHandler
where
    F: Handler<T>,
    T: 'static,
{
    Arc::new(HandlerFn::new(f))
}

/// A synchronous handler. See [`blocking_handler`].
pub struct BlockingFn<F> {
    f: Arc<F>,
}

impl<F, Out> ErasedHandler for BlockingFn<F>
where
    F: Fn(ListenerContext) -> Out + Send + Sync + 'static,
    Out: IntoEventResult + 'static,
{
    fn invoke(&self, ctx: ListenerContext) -> BoxFuture<'static, EventResult> {
        let f = Arc::clone(&self.f);
        Box::pin(async move { f(ctx).into_event_result() })
    }
}

/// Convert a plain function over the listener context into a boxed handler.
///
/// The function runs on the dispatching task.
pub fn blocking_handler<F, Out>(f: F) -> BoxedHandler
where
    F: Fn(ListenerContext) -> Out + Send + Sync + 'static,
    Out: IntoEventResult + 'static,
{
    Arc::new(BlockingFn { f: Arc::new(f) })
}

// ============================================================================
// Handler implementations for functions (Axum-style)
// ============================================================================

// Implementation for functions with no parameters
impl<F, Fut, Out> Handler<()> for F
where
    F: FnOnce() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Out> + Send + 'static,
    Out: IntoEventResult + 'static,
{
    type Future = BoxFuture<'static, EventResult>;

    fn call(self, _ctx: ListenerContext) -> Self::Future {
        Box::pin(async move { (self)().await.into_event_result() })
    }
}

/// Macro to generate Handler implementations for functions with different arities.
macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<F, Fut, Out, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Out> + Send + 'static,
            Out: IntoEventResult + 'static,
            $( $ty: FromContext + Send + 'static, )*
        {
            type Future = BoxFuture<'static, EventResult>;

            fn call(self, ctx: ListenerContext) -> Self::Future {
                Box::pin(async move {
                    $(
                        let $ty = match $ty::from_context(&ctx) {
                            Ok(value) => value,
                            Err(err) => {
                                trace!(
                                    listener = %ctx.listener_id(),
                                    error = %err,
                                    "Handler parameter not extractable, skipping"
                                );
                                return EventResult::Invalid;
                            }
                        };
                    )*

                    (self)($($ty,)*).await.into_event_result()
                })
            }
        }
    };
}

impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EventContext;
    use crate::extractor::EventOf;
    use chime_core::{BoxedEvent, Event, EventKey, Id, Message, Priority};
    use serde_json::json;
    use std::any::Any;

    static PING: EventKey = EventKey::root("ping");

    #[derive(Clone)]
    struct Ping;

    impl Event for Ping {
        fn key(&self) -> &'static EventKey {
            &PING
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn ctx() -> ListenerContext {
        ListenerContext::new(
            Arc::new(EventContext::new(BoxedEvent::new(Ping))),
            Id::from(1_i64),
            &PING,
            Priority::NORMAL,
        )
    }

    async fn no_params() -> &'static str {
        "pong"
    }

    async fn typed(_ping: EventOf<Ping>, ctx: ListenerContext) -> String {
        format!("pong from {}", ctx.listener_id())
    }

    async fn needs_message(_msg: Message) {}

    async fn fallible() -> Result<(), std::io::Error> {
        Err(std::io::Error::other("nope"))
    }

    #[tokio::test]
    async fn test_function_handlers() {
        let handler = into_handler(no_params);
        assert_eq!(handler.invoke(ctx()).await.content(), Some(&json!("pong")));

        let handler = into_handler(typed);
        assert_eq!(
            handler.invoke(ctx()).await.content(),
            Some(&json!("pong from 1"))
        );
    }

    #[tokio::test]
    async fn test_extraction_failure_is_invalid() {
        let handler = into_handler(needs_message);
        assert!(!handler.invoke(ctx()).await.is_valid());
    }

    #[tokio::test]
    async fn test_error_becomes_failure() {
        let handler = into_handler(fallible);
        let result = handler.invoke(ctx()).await;
        assert_eq!(result.failure().unwrap().message(), "nope");
    }

    #[tokio::test]
    async fn test_blocking_handler() {
        let handler = blocking_handler(|ctx: ListenerContext| ctx.listener_key().name().to_string());
        assert_eq!(handler.invoke(ctx()).await.content(), Some(&json!("ping")));
    }
}
