//! Route handler type erasure.
//!
//! # How handlers are stored
//!
//! Routes of different concrete handler types live side by side in one
//! ordered list, so each handler is hidden behind a trait object
//! (`dyn ErasedHandler`) and shared through an `Arc`.
//!
//! ```text
//! |req, res| Box::pin(async move { … })        ← user writes this
//!        ↓ app.add_route(Method::Get, "/", f)
//! boxed(f)                                      ← erasure
//!        ↓
//! Arc::new(FnHandler(f))                        ← stored as BoxedHandler
//!        ↓
//! handler.call(&mut req, &mut res)  per request ← one vtable dispatch
//! ```
//!
//! A handler borrows the request and response for the duration of its
//! future, which is why it returns a boxed future tied to that borrow rather
//! than an `impl Future`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// A heap-allocated, type-erased future borrowing from its caller for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What handlers and middleware resolve to. Errors travel to the terminal
/// error handler.
pub type HandlerResult = Result<(), Error>;

/// Internal dispatch interface.
#[doc(hidden)]
pub trait ErasedHandler: Send + Sync + 'static {
    fn call<'a>(&'a self, req: &'a mut Request, res: &'a mut Response) -> BoxFuture<'a, HandlerResult>;
}

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn ErasedHandler>;

/// Newtype wrapper bridging a concrete handler function to the trait object.
struct FnHandler<F>(F);

impl<F> ErasedHandler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, req: &'a mut Request, res: &'a mut Response) -> BoxFuture<'a, HandlerResult> {
        (self.0)(req, res)
    }
}

/// Erases a handler function.
///
/// Accepts any `Fn(&mut Request, &mut Response) -> BoxFuture<HandlerResult>`:
///
/// ```rust
/// use restlayer::handler::{boxed, BoxedHandler};
///
/// let hello: BoxedHandler = boxed(|_req, res| Box::pin(async move {
///     res.send("hello");
///     Ok(())
/// }));
/// ```
pub fn boxed<F>(handler: F) -> BoxedHandler
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    Arc::new(FnHandler(handler))
}
