//! Capability-ranked transport selection.

use std::sync::Arc;

use tabcast_core::{Transport, TransportFactory, TransportSelector};

/// A selectable transport backend.
pub trait TransportMethod: Send + Sync {
    /// Short identifier of the backend.
    fn kind(&self) -> &'static str;

    /// Whether the backend works in the current environment.
    fn can_be_used(&self) -> bool;

    /// Create an uninitialized transport.
    fn create(&self) -> Box<dyn Transport>;
}

/// Selector trying methods in rank order.
///
/// The first method whose [`TransportMethod::can_be_used`] holds wins.
#[derive(Clone)]
pub struct MethodChooser {
    methods: Vec<Arc<dyn TransportMethod>>,
}

impl Default for MethodChooser {
    /// Native broadcast first, shared storage as fallback.
    fn default() -> Self {
        let mut methods: Vec<Arc<dyn TransportMethod>> = Vec::new();
        #[cfg(feature = "native")]
        methods.push(Arc::new(crate::native::NativeMethod));
        #[cfg(feature = "storage")]
        methods.push(Arc::new(crate::storage::StorageMethod));
        Self { methods }
    }
}

impl MethodChooser {
    /// Create a chooser over methods in rank order (best first).
    #[must_use]
    pub fn new(methods: Vec<Arc<dyn TransportMethod>>) -> Self {
        Self { methods }
    }

    /// Kinds of the ranked methods.
    #[must_use]
    pub fn kinds(&self) -> Vec<&'static str> {
        self.methods.iter().map(|m| m.kind()).collect()
    }
}

impl TransportSelector for MethodChooser {
    fn select(&self) -> Option<TransportFactory> {
        let Some(method) = self.methods.iter().find(|m| m.can_be_used()) else {
            tracing::debug!(candidates = ?self.kinds(), "no usable transport");
            return None;
        };
        tracing::debug!(kind = method.kind(), "transport selected");

        let method = Arc::clone(method);
        Some(Box::new(move || method.create()))
    }
}

/// Factory for the best transport available with the default ranking.
#[must_use]
pub fn choose_method() -> Option<TransportFactory> {
    MethodChooser::default().select()
}
