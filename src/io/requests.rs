use dashmap::{
    mapref::entry::Entry,
    DashMap,
};
use smol::channel::{
    Receiver,
    Sender,
};

use crate::{
    error::Error,
    util::{
        Seq,
        U16Sequence,
    },
};
use message::Response;

pub(crate) type Reply = Result<Response, Error>;

/// Confirmable requests awaiting their response, keyed by message id.
///
/// An entry exists from [`Requests::register`] until the response is
/// correlated, the requester gives up (timeout or write failure; the
/// [`PendingGuard`] cleans up either way), or [`Requests::drain`] rejects
/// everything at teardown.
#[derive(Default)]
pub(crate) struct Requests {
    pending: DashMap<u16, Sender<Reply>>,
    mid:     U16Sequence,
}

impl Requests {
    pub fn register(&self) -> Result<(u16, Receiver<Reply>, PendingGuard<'_>), Error> {
        let mid = self.mid.next();
        let (tx, rx) = smol::channel::bounded(1);

        match self.pending.entry(mid) {
            Entry::Occupied(_) => Err(Error::TooManyInFlight),
            Entry::Vacant(slot) => {
                slot.insert(tx);

                Ok((mid, rx, PendingGuard {
                    pending: &self.pending,
                    mid,
                }))
            },
        }
    }

    pub fn complete(&self, response: Response) {
        match self.pending.remove(&response.mid) {
            Some((_, tx)) => {
                debug_assert_eq!(tx.len(), 0);

                if tx.try_send(Ok(response)).is_err() {
                    tracing::warn!("requester hung up before its response arrived");
                }
            },
            None => {
                tracing::debug!(mid = response.mid, "discarding response with no pending request");
            },
        }
    }

    pub fn fail(&self, mid: u16, error: Error) {
        if let Some((_, tx)) = self.pending.remove(&mid) {
            let _ = tx.try_send(Err(error));
        }
    }

    /// Rejects every outstanding request. Idempotent.
    pub fn drain(&self) {
        self.pending.retain(|_, tx| {
            let _ = tx.try_send(Err(Error::ConnectionClosed));
            false
        });
    }

    #[cfg(test)]
    fn outstanding(&self) -> usize {
        self.pending.len()
    }
}

pub(crate) struct PendingGuard<'a> {
    pending: &'a DashMap<u16, Sender<Reply>>,
    mid:     u16,
}

impl Drop for PendingGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.pending.remove(&self.mid);
    }
}
