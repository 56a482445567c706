//! Evaluation callbacks.
//!
//! An operation's work is stored as a boxed [`Callable`]. Closures get a
//! blanket implementation, so builders just pass a closure.

use std::fmt;
use std::sync::Arc;

use crate::eval::EvalContext;

/// Work performed by one operation.
///
/// Callables run on scheduler worker threads, possibly concurrently with
/// other operations of the same data-block, so they must be `Send + Sync`
/// and must only touch evaluated data through the context.
pub trait Callable: Send + Sync {
    fn invoke(&self, ctx: &EvalContext<'_>);
}

impl<F> Callable for F
where
    F: Fn(&EvalContext<'_>) + Send + Sync,
{
    fn invoke(&self, ctx: &EvalContext<'_>) {
        self(ctx)
    }
}

/// Shared handle to a [`Callable`].
#[derive(Clone)]
pub struct EvalCallback(Arc<dyn Callable>);

impl EvalCallback {
    /// Wrap a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&EvalContext<'_>) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn invoke(&self, ctx: &EvalContext<'_>) {
        self.0.invoke(ctx);
    }
}

impl fmt::Debug for EvalCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EvalCallback(..)")
    }
}
