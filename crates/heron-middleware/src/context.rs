//! Middleware context types.
//!
//! The [`MiddlewareContext`] carries state through the middleware pipeline.
//! It is separate from [`RequestContext`] so that middleware can enrich it
//! before the final, owned context is handed to the handler.

use heron_core::{RequestContext, RequestId};
use heron_router::Params;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// An unexpected failure reported by a handler.
///
/// The recovery stage turns it into the generic 500 response.
#[derive(Debug, Clone)]
pub struct Fault {
    /// Description of the failure, for logs only.
    pub message: String,
}

/// Context that flows through the middleware pipeline.
///
/// # Example
///
/// ```
/// use heron_middleware::MiddlewareContext;
///
/// let mut ctx = MiddlewareContext::new();
/// ctx.set_route("/users/{id}");
///
/// assert_eq!(ctx.route(), Some("/users/{id}"));
/// assert!(!ctx.is_tls());
/// ```
#[derive(Debug)]
pub struct MiddlewareContext {
    /// Unique identifier for this request.
    request_id: RequestId,

    /// When the request started processing.
    started_at: Instant,

    /// Address of the connected peer.
    remote_addr: Option<SocketAddr>,

    /// Whether the request arrived over TLS.
    tls: bool,

    /// Request-scoped cancellation token.
    cancellation: CancellationToken,

    /// Deadline attached by the timeout stage.
    deadline: Option<Instant>,

    /// Pattern of the matched route.
    route: Option<String>,

    /// Parameters extracted by the router.
    params: Params,

    /// Fault reported by the handler, if any.
    fault: Option<Fault>,

    /// Type-erased extension data.
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MiddlewareContext {
    /// Creates a new middleware context with a fresh request ID.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: RequestId::new(),
            started_at: Instant::now(),
            remote_addr: None,
            tls: false,
            cancellation: CancellationToken::new(),
            deadline: None,
            route: None,
            params: Params::new(),
            fault: None,
            extensions: HashMap::new(),
        }
    }

    /// Creates the context for a request accepted on a connection.
    ///
    /// The request token is a child of `parent`, so cancelling the parent
    /// cancels every request derived from it.
    #[must_use]
    pub fn for_connection(
        remote_addr: Option<SocketAddr>,
        tls: bool,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            remote_addr,
            tls,
            cancellation: parent.child_token(),
            ..Self::new()
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Sets the request ID.
    ///
    /// This should only be called by the request ID stage.
    pub fn set_request_id(&mut self, request_id: RequestId) {
        self.request_id = request_id;
    }

    /// Returns when the request started processing.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Returns the peer address.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Sets the peer address.
    pub fn set_remote_addr(&mut self, remote_addr: SocketAddr) {
        self.remote_addr = Some(remote_addr);
    }

    /// Returns true if the request arrived over TLS.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// Marks the request as received over TLS.
    pub fn set_tls(&mut self, tls: bool) {
        self.tls = tls;
    }

    /// Returns the request-scoped cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Replaces the cancellation token and sets its deadline.
    ///
    /// Used by the timeout stage to narrow the scope of the request.
    pub fn set_cancellation(&mut self, token: CancellationToken, deadline: Instant) {
        self.cancellation = token;
        self.deadline = Some(deadline);
    }

    /// Returns the deadline, if one was attached.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the pattern of the matched route.
    #[must_use]
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    /// Records the matched route pattern.
    ///
    /// This is set by the dispatcher once routing resolved the path.
    pub fn set_route(&mut self, route: impl Into<String>) {
        self.route = Some(route.into());
    }

    /// Returns the extracted path parameters.
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Records the extracted path parameters.
    pub fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// Records a handler fault for the recovery stage.
    pub fn record_fault(&mut self, message: impl Into<String>) {
        self.fault = Some(Fault {
            message: message.into(),
        });
    }

    /// Takes the recorded fault, if any.
    pub fn take_fault(&mut self) -> Option<Fault> {
        self.fault.take()
    }

    /// Stores a typed extension value.
    ///
    /// # Example
    ///
    /// ```
    /// use heron_middleware::MiddlewareContext;
    ///
    /// #[derive(Clone)]
    /// struct Tenant(String);
    ///
    /// let mut ctx = MiddlewareContext::new();
    /// ctx.set_extension(Tenant("acme".to_string()));
    /// assert_eq!(ctx.get_extension::<Tenant>().unwrap().0, "acme");
    /// ```
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// Builds the owned context handed to handlers.
    #[must_use]
    pub fn to_request_context(&self) -> RequestContext {
        RequestContext::new()
            .with_request_id(self.request_id)
            .with_params(self.params.clone())
            .with_route(self.route.clone())
            .with_remote_addr(self.remote_addr)
            .with_cancellation(self.cancellation.clone(), self.deadline)
    }
}

impl Default for MiddlewareContext {
    fn default() -> Self {
        Self::new()
    }
}
