use futures::future::BoxFuture;
use http::{Request, Response};

use super::session::ServerSession;
use crate::error::Result;

/// Application code invoked once per routed request.
///
/// A handler fills in [`ServerSession::response_mut`] and then calls
/// [`ServerSession::write`] exactly once. Returning without writing is a
/// contract violation: the session reports
/// [`SiestaError::ResponseNotWritten`](crate::SiestaError::ResponseNotWritten)
/// and closes the connection. Returning an error does the same with that
/// error.
///
/// Handlers are stored as `Arc<dyn Handler>` in the router and shared by
/// every session.
///
/// ```rust
/// use futures::future::BoxFuture;
/// use http::Request;
/// use siesta::server::{Handler, ServerSession};
///
/// struct Hello;
///
/// impl Handler for Hello {
///     fn handle<'a>(
///         &'a self,
///         _req: Request<String>,
///         session: &'a mut ServerSession,
///     ) -> BoxFuture<'a, siesta::Result<()>> {
///         Box::pin(async move {
///             *session.response_mut().body_mut() = "hello".to_string();
///             session.write().await
///         })
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        req: Request<String>,
        session: &'a mut ServerSession,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Synchronous closures act as handlers: the closure fills the response and
/// the adapter writes it.
impl<F> Handler for F
where
    F: Fn(&Request<String>, &mut Response<String>) + Send + Sync + 'static,
{
    fn handle<'a>(
        &'a self,
        req: Request<String>,
        session: &'a mut ServerSession,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self(&req, session.response_mut());
            session.write().await
        })
    }
}
