/// Classification for retry policy.
///
/// Used by [`RateLimiter::with_backoff`](crate::registry::RateLimiter::with_backoff)
/// to decide whether a failed call is attempted again.
///
/// # Behavior Summary
///
/// | Class | Retried? | Gate re-acquired before retry? |
/// |-------|----------|--------------------------------|
/// | `Never` | No, propagates immediately | - |
/// | `WithBackoff` | Yes, until the attempt budget is spent | Yes |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - unknown entity, malformed response, or terminal failure.
    /// The request is fundamentally invalid and retrying won't help.
    Never,

    /// Retry after an exponentially growing delay.
    ///
    /// Used for transient errors like rate limiting (429), timeouts,
    /// connection failures and 5xx responses.
    WithBackoff,
}
