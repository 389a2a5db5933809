//! Ordered middleware pipeline.
//!
//! Global middleware is kept in registration order. The first registered
//! stage is the outermost wrapper: it runs first on the way in and last on
//! the way out. Route-specific middleware is composed by the dispatcher
//! with [`Next::chain`], which places it inside every global stage.
//!
//! ```text
//! request → A → B → dispatcher → C (route) → handler
//! response ← A ← B ←──────────── C ←─────────┘
//! ```

use crate::context::MiddlewareContext;
use crate::middleware::{Endpoint, Middleware, Next};
use crate::types::{Request, Response};
use std::sync::Arc;

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// An immutable, ordered list of global middleware.
///
/// # Example
///
/// ```ignore
/// use heron_middleware::{Pipeline, stages::{RecoveryMiddleware, RequestIdMiddleware}};
///
/// let pipeline = Pipeline::builder()
///     .with(RecoveryMiddleware::new())
///     .with(RequestIdMiddleware::new())
///     .build();
///
/// let response = pipeline.process(&mut ctx, request, &dispatcher).await;
/// ```
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<BoxedMiddleware>,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Processes a request through every stage, then the endpoint.
    pub async fn process(
        &self,
        ctx: &mut MiddlewareContext,
        request: Request,
        endpoint: &dyn Endpoint,
    ) -> Response {
        Next::chain(&self.stages, Next::endpoint(endpoint))
            .run(ctx, request)
            .await
    }

    /// Returns the names of all middleware stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|mw| mw.name()).collect()
    }

    /// Returns the number of middleware stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Builder for constructing a [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<BoxedMiddleware>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage. Stages run in the order they are added.
    #[must_use]
    pub fn with<M: Middleware>(mut self, middleware: M) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Appends an already shared stage.
    #[must_use]
    pub fn with_boxed(mut self, middleware: BoxedMiddleware) -> Self {
        self.stages.push(middleware);
        self
    }

    /// Appends several shared stages in order.
    #[must_use]
    pub fn extend(mut self, middleware: impl IntoIterator<Item = BoxedMiddleware>) -> Self {
        self.stages.extend(middleware);
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::BoxFuture;
    use heron_core::{body, envelope};
    use http::StatusCode;

    struct Named(&'static str);

    impl Middleware for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            next.run_boxed(ctx, request)
        }
    }

    struct Teapot;

    impl Endpoint for Teapot {
        fn call<'a>(
            &'a self,
            _ctx: &'a mut MiddlewareContext,
            _request: Request,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async { envelope::text(StatusCode::IM_A_TEAPOT, "short and stout") })
        }
    }

    #[test]
    fn test_stage_names_keep_registration_order() {
        let pipeline = Pipeline::builder()
            .with(Named("recovery"))
            .with(Named("request_id"))
            .with(Named("logging"))
            .build();

        assert_eq!(pipeline.stage_names(), vec!["recovery", "request_id", "logging"]);
        assert_eq!(pipeline.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_pipeline_calls_endpoint() {
        let pipeline = Pipeline::default();
        assert!(pipeline.is_empty());

        let mut ctx = MiddlewareContext::new();
        let response = pipeline
            .process(&mut ctx, http::Request::new(body::empty()), &Teapot)
            .await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    }
}
