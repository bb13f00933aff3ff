//! WebSocket close codes used by the client.

/// Close code sent on an explicit disconnect (RFC 6455 normal closure).
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code sent when the liveness monitor gives up on a silent socket.
pub const LIVENESS_TIMEOUT_CLOSURE: u16 = 4000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_code_is_application_range() {
        assert!((4000..5000).contains(&LIVENESS_TIMEOUT_CLOSURE));
    }
}
