/// Receives progress notifications from long-running transfers.
pub trait ProgressListener: Send + Sync {
    fn started(&self, description: &str);

    /// `done` units of work out of `total`, when the total is known.
    fn progress(&self, done: u64, total: Option<u64>);

    fn complete(&self);

    /// Polled between objects; returning `true` stops the transfer.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Ignores all notifications.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgress;

impl ProgressListener for NullProgress {
    fn started(&self, _description: &str) {}

    fn progress(&self, _done: u64, _total: Option<u64>) {}

    fn complete(&self) {}
}
