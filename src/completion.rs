use tokio::sync::oneshot;

/// A one-shot result slot that moves from pending to settled exactly once.
///
/// Settling again is an invariant violation: it is logged and the value is
/// dropped, the receiver only ever observes the first outcome.
pub(crate) struct Completion<T> {
    label: &'static str,
    tx: Option<oneshot::Sender<T>>,
}

/// Outcome of [`Completion::settle`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Settle<T> {
    Delivered,
    /// The receiver went away; the value is handed back to its producer.
    Orphaned(T),
    Repeated,
}

impl<T> Completion<T> {
    pub(crate) fn new(label: &'static str) -> (Completion<T>, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (Completion { label, tx: Some(tx) }, rx)
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.tx.is_none()
    }

    pub(crate) fn settle(&mut self, value: T) -> Settle<T> {
        match self.tx.take() {
            Some(tx) => match tx.send(value) {
                Ok(()) => Settle::Delivered,
                Err(value) => {
                    log::debug!("{}: receiver went away before completion", self.label);
                    Settle::Orphaned(value)
                }
            },
            None => {
                log::error!("{}: completion settled more than once, dropping the late result", self.label);
                Settle::Repeated
            }
        }
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        if !self.is_settled() {
            log::warn!("{}: dropped while still pending", self.label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_settles_once() {
        let (mut completion, rx) = Completion::new("test");
        assert!(!completion.is_settled());
        assert_eq!(completion.settle(1), Settle::Delivered);
        assert!(completion.is_settled());
        assert_eq!(completion.settle(2), Settle::Repeated);
        assert_eq!(rx.await, Ok(1));
    }

    #[tokio::test]
    async fn test_settle_without_receiver_hands_value_back() {
        let (mut completion, rx) = Completion::new("test");
        drop(rx);
        assert_eq!(completion.settle(7), Settle::Orphaned(7));
        assert!(completion.is_settled());
    }

    #[tokio::test]
    async fn test_dropped_pending_closes_receiver() {
        let (completion, rx) = Completion::<()>::new("test");
        drop(completion);
        assert!(rx.await.is_err());
    }
}
