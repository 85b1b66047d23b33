//! Axum-level shared state.

use std::sync::Arc;

use dispatch_core::ServiceContext;

/// Cloned into every handler. `Arc<ServiceContext>` is already cheaply
/// cloneable, so this is a thin wrapper rather than a second `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub(crate) ctx: Arc<ServiceContext>,
}

impl AppState {
    /// Wrap `ctx` for use as axum router state.
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }
}
