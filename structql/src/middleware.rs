//! Continuation passing resolver logic.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::context::Context;
use crate::error::Error;

/// A composable unit of resolution logic.
///
/// A middleware receives the [`Context`] and the rest of the chain as [`Next`]. It may transform
/// the context before calling `next`, inspect or transform what `next` returns, or return a
/// context without calling `next` at all, which skips everything after it.
pub type Middleware =
    Arc<dyn Fn(Context, Next) -> BoxFuture<'static, Result<Context, Error>> + Send + Sync>;

/// The rest of a middleware chain.
pub struct Next {
    inner: Box<dyn FnOnce(Context) -> BoxFuture<'static, Result<Context, Error>> + Send>,
}

impl Next {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Context, Error>> + Send + 'static,
    {
        Next {
            inner: Box::new(move |context| f(context).boxed()),
        }
    }

    /// The end of a chain: hands the context back unchanged.
    pub fn done() -> Self {
        Next::new(|context| async move { Ok(context) })
    }

    pub fn run(self, context: Context) -> BoxFuture<'static, Result<Context, Error>> {
        (self.inner)(context)
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Next")
    }
}

/// Wraps an async closure into a [`Middleware`].
pub fn from_fn<F, Fut>(f: F) -> Middleware
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Context, Error>> + Send + 'static,
{
    Arc::new(move |context: Context, next: Next| f(context, next).boxed())
}

/// A middleware that sets the current value and continues the chain.
///
/// The closure sees the incoming context. Returning `Ok(None)` leaves the value untouched.
pub fn resolve_with<F, Fut>(f: F) -> Middleware
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<crate::json_ext::Value>, Error>> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |context: Context, next: Next| {
        let f = f.clone();
        async move {
            let context = match f(context.clone()).await? {
                Some(value) => context.with_value(value),
                None => context,
            };
            next.run(context).await
        }
        .boxed()
    })
}

/// Folds `middlewares` right to left: the first one is the outermost and its `next` runs the
/// second, the last one's `next` is `next`.
pub fn compose(middlewares: Vec<Middleware>) -> Middleware {
    if middlewares.len() == 1 {
        return middlewares[0].clone();
    }
    let middlewares: Arc<[Middleware]> = middlewares.into();
    Arc::new(move |context: Context, next: Next| {
        let chain = middlewares.iter().rev().fold(next, |next, middleware| {
            let middleware = middleware.clone();
            Next::new(move |context| middleware(context, next))
        });
        chain.run(context)
    })
}

/// Runs `middleware` to completion against `context`.
pub fn drain(
    middleware: &Middleware,
    context: Context,
) -> BoxFuture<'static, Result<Context, Error>> {
    middleware(context, Next::done())
}
