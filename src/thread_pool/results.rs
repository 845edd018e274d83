use std::time::Duration;

use crossbeam::channel::Receiver;

use crate::task::Completion;

/// Consumer side of a pool's result channel.
///
/// Completions arrive in completion order, which generally differs from
/// submission order; match on `Completion::id` to pair them up. Handles
/// are cheap to clone and every clone competes for the same completions.
///
/// Once the pool has stopped and every completion has been taken,
/// `recv` returns `None` and iteration ends.
pub struct ResultReceiver<R> {
    rx: Receiver<Completion<R>>,
}

impl<R> ResultReceiver<R> {
    pub(crate) fn new(rx: Receiver<Completion<R>>) -> Self {
        Self { rx }
    }

    /// Blocks until the next completion is available.
    ///
    /// Returns `None` when the pool has stopped and no completions remain.
    pub fn recv(&self) -> Option<Completion<R>> {
        self.rx.recv().ok()
    }

    /// Like `recv`, but gives up after `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Completion<R>> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Returns a completion if one is ready, without blocking.
    pub fn try_recv(&self) -> Option<Completion<R>> {
        self.rx.try_recv().ok()
    }

    /// Blocks until `count` completions were received.
    ///
    /// Returns fewer only if the pool stops with nothing left to deliver.
    pub fn collect_n(&self, count: usize) -> Vec<Completion<R>> {
        let mut completions = Vec::with_capacity(count);
        while completions.len() < count {
            match self.recv() {
                Some(completion) => completions.push(completion),
                None => break,
            }
        }
        completions
    }

    /// Number of completions waiting to be received.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` if no completion is waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<R> Clone for ResultReceiver<R> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<R> Iterator for ResultReceiver<R> {
    type Item = Completion<R>;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}
