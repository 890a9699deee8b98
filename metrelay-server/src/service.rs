use crate::status::SharedStatus;

/// Shared state available to all HTTP endpoints.
#[derive(Clone, Debug)]
pub struct ServiceState {
    status: SharedStatus,
}

impl ServiceState {
    /// Creates the state from the shared flush status.
    pub fn new(status: SharedStatus) -> Self {
        Self { status }
    }

    /// Returns the flush status.
    pub fn status(&self) -> &SharedStatus {
        &self.status
    }
}
