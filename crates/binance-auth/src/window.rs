//! Receive window table

use binance_types::RestCall;
use std::time::Duration;

/// Default receive window for every call kind, in milliseconds
pub const DEFAULT_RECEIVE_WINDOW: u64 = 5000;

/// Per-call receive windows
///
/// One slot per [`RestCall`], so a lookup can never miss. The window for
/// [`RestCall::ListenKey`] is kept for completeness but has no effect:
/// listen-key calls are unsigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveWindows {
    windows_ms: [u64; RestCall::COUNT],
}

impl Default for ReceiveWindows {
    fn default() -> Self {
        Self {
            windows_ms: [DEFAULT_RECEIVE_WINDOW; RestCall::COUNT],
        }
    }
}

impl ReceiveWindows {
    /// Create a table with the default window for every call
    pub fn new() -> Self {
        Self::default()
    }

    /// Window for a call, in milliseconds
    pub fn get(&self, call: RestCall) -> u64 {
        self.windows_ms[call.index()]
    }

    /// Set the window for one call
    ///
    /// Windows beyond `u64::MAX` milliseconds saturate.
    pub fn set(&mut self, call: RestCall, window: Duration) {
        self.windows_ms[call.index()] = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
    }

    /// Builder-style variant of [`ReceiveWindows::set`]
    pub fn with(mut self, call: RestCall, window: Duration) -> Self {
        self.set(call, window);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_call() {
        let windows = ReceiveWindows::default();
        for call in RestCall::ALL {
            assert_eq!(windows.get(call), DEFAULT_RECEIVE_WINDOW);
        }
    }

    #[test]
    fn test_set_affects_only_target_call() {
        let windows = ReceiveWindows::new().with(RestCall::NewOrder, Duration::from_millis(1500));

        assert_eq!(windows.get(RestCall::NewOrder), 1500);
        for call in RestCall::ALL.into_iter().filter(|c| *c != RestCall::NewOrder) {
            assert_eq!(windows.get(call), DEFAULT_RECEIVE_WINDOW);
        }
    }

    #[test]
    fn test_oversized_window_saturates() {
        let windows = ReceiveWindows::new().with(RestCall::AllOrders, Duration::MAX);
        assert_eq!(windows.get(RestCall::AllOrders), u64::MAX);
    }
}
