/// Receives the single terminal outcome of a poll.
///
/// `Some(result)` means the server reported a finished result. `None` covers
/// every failure: a server-reported error or an exhausted retry budget.
///
/// The engine only keeps a `Weak` reference, so the delegate's owner decides
/// how long it lives; a delegate dropped before completion simply misses
/// the callback.
pub trait PollDelegate<R>: Send + Sync {
    fn polling_did_finish(&self, result: Option<R>);
}
