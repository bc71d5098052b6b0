//! Application state for Axum handlers.

use repair_desk_core::lifecycle::LifecycleEngine;

/// Application state shared across all HTTP handlers.
///
/// The engine is stateless apart from its store and clock handles, so cloning
/// the state per request is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle engine every handler dispatches to.
    pub engine: LifecycleEngine,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(engine: LifecycleEngine) -> Self {
        Self { engine }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        // Ensure AppState implements Clone (required for Axum)
        fn assert_clone<T: Clone + Send + Sync + 'static>() {}
        assert_clone::<AppState>();
    }
}
