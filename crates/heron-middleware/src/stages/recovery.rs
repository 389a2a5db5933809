//! Panic and fault recovery.
//!
//! The outermost stage of the default chain. A panic anywhere below it, or a
//! fault recorded by the handler, becomes the same generic 500 response; the
//! details only go to the log.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use futures_util::FutureExt;
use heron_core::envelope;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::Once;

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

/// Chains a panic hook that keeps the backtrace of the last panic on the
/// panicking thread, so the recovery stage can log it after unwinding.
fn install_backtrace_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture().to_string();
            LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

fn take_backtrace() -> String {
    LAST_BACKTRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| "<unavailable>".to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

/// Turns panics and handler faults into a single 500 response.
///
/// The response body is always
/// `{"success":false,"error":{"code":"INTERNAL_ERROR","message":"internal server error"}}`.
#[derive(Debug, Clone)]
pub struct RecoveryMiddleware {
    _private: (),
}

impl RecoveryMiddleware {
    /// Creates the middleware and installs the backtrace hook once per process.
    #[must_use]
    pub fn new() -> Self {
        install_backtrace_hook();
        Self { _private: () }
    }
}

impl Default for RecoveryMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for RecoveryMiddleware {
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let method = request.method().clone();
            let path = request.uri().path().to_owned();

            let outcome = AssertUnwindSafe(next.run(ctx, request)).catch_unwind().await;

            match outcome {
                Ok(response) => match ctx.take_fault() {
                    Some(fault) => {
                        tracing::error!(
                            request_id = %ctx.request_id(),
                            method = %method,
                            path = %path,
                            error = %fault.message,
                            "handler fault"
                        );
                        envelope::internal_error()
                    }
                    None => response,
                },
                Err(payload) => {
                    tracing::error!(
                        request_id = %ctx.request_id(),
                        method = %method,
                        path = %path,
                        panic = panic_message(payload.as_ref()),
                        backtrace = %take_backtrace(),
                        "panic while handling request"
                    );
                    envelope::internal_error()
                }
            }
        })
    }
}
