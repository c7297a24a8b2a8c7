//! Per-call execution context.

/// Where a call is running.
///
/// A fresh context means "not inside any service". The dispatcher enters
/// a nested context for each call it handles and passes it to the
/// handler, which hands it on to any calls it makes in turn. Leaving is
/// just dropping the value, so every exit path restores the outer state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    depth: usize,
    service_url: Option<String>,
}

impl CallContext {
    /// Context of a plain client, outside any service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a call handled by the service at `service_url`.
    pub fn enter(&self, service_url: &str) -> Self {
        Self {
            depth: self.depth + 1,
            service_url: Some(service_url.to_string()),
        }
    }

    /// Number of service calls on the stack.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether code is running inside a service handler.
    pub fn is_running_service(&self) -> bool {
        self.depth > 0
    }

    /// The innermost service being run, if any.
    pub fn service_url(&self) -> Option<&str> {
        self.service_url.as_deref()
    }

    /// Whether the innermost service is the one at `url`.
    pub fn is_running_as(&self, url: &str) -> bool {
        self.is_running_service() && self.service_url() == Some(url)
    }
}
