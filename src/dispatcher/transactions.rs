//! Pending transaction table.
//!
//! Owned exclusively by the engine task. Ids rotate through 1..=255; an id is
//! never handed out while a transaction holding it is pending, unless every
//! id is in use, in which case the oldest holder of the next id is failed
//! with [`LoupedeckError::TransactionSuperseded`].

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{LoupedeckError, Result};
use crate::model::Correlation;
use crate::protocol::Frame;

/// One outstanding request.
#[derive(Debug)]
pub(crate) struct Transaction {
    pub(crate) command: u8,
    pub(crate) transaction_id: u8,
    pub(crate) deadline: Instant,
    reply: oneshot::Sender<Result<Frame>>,
}

impl Transaction {
    pub(crate) fn new(
        command: u8,
        transaction_id: u8,
        deadline: Instant,
        reply: oneshot::Sender<Result<Frame>>,
    ) -> Self {
        Self {
            command,
            transaction_id,
            deadline,
            reply,
        }
    }

    /// Deliver the outcome. A caller that stopped waiting is ignored.
    pub(crate) fn complete(self, result: Result<Frame>) {
        let _ = self.reply.send(result);
    }

    fn matches(&self, correlation: Correlation, frame: &Frame) -> bool {
        match correlation {
            Correlation::TransactionId => {
                self.transaction_id == frame.transaction_id() && self.command == frame.command()
            }
            Correlation::CommandFifo => self.command == frame.command(),
        }
    }
}

/// Table of outstanding transactions in submission order.
pub(crate) struct TransactionTable {
    correlation: Correlation,
    last_id: u8,
    pending: Vec<Transaction>,
}

impl TransactionTable {
    pub(crate) fn new(correlation: Correlation) -> Self {
        Self {
            correlation,
            last_id: 0,
            pending: Vec::new(),
        }
    }

    /// Pick the id for the next request.
    ///
    /// Returns the id and, if the id space is exhausted, the transaction that
    /// previously held it. The caller must fail that transaction.
    pub(crate) fn allocate(&mut self) -> (u8, Option<Transaction>) {
        if self.correlation == Correlation::CommandFifo {
            return (0, None);
        }

        for _ in 0..u8::MAX {
            let id = self.advance();
            if !self.is_pending(id) {
                return (id, None);
            }
        }

        let id = self.advance();
        let superseded = self
            .pending
            .iter()
            .position(|t| t.transaction_id == id)
            .map(|pos| self.pending.remove(pos));
        (id, superseded)
    }

    fn advance(&mut self) -> u8 {
        self.last_id = if self.last_id == u8::MAX { 1 } else { self.last_id + 1 };
        self.last_id
    }

    pub(crate) fn is_pending(&self, transaction_id: u8) -> bool {
        self.pending.iter().any(|t| t.transaction_id == transaction_id)
    }

    pub(crate) fn insert(&mut self, transaction: Transaction) {
        self.pending.push(transaction);
    }

    /// Remove and return the transaction an inbound frame answers.
    ///
    /// In transaction-id mode a frame with id 0 is never a response. In FIFO
    /// mode the oldest pending request with the frame's command wins.
    pub(crate) fn take_match(&mut self, frame: &Frame) -> Option<Transaction> {
        if self.correlation == Correlation::TransactionId && frame.is_unsolicited() {
            return None;
        }
        let pos = self
            .pending
            .iter()
            .position(|t| t.matches(self.correlation, frame))?;
        Some(self.pending.remove(pos))
    }

    /// Earliest deadline among pending transactions.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|t| t.deadline).min()
    }

    /// Remove every transaction whose deadline has passed.
    pub(crate) fn expire(&mut self, now: Instant) -> Vec<Transaction> {
        let (expired, live) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|t| t.deadline <= now);
        self.pending = live;
        expired
    }

    /// Remove every pending transaction.
    pub(crate) fn drain(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.pending)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Fail every pending transaction with `error`.
    pub(crate) fn fail_all(&mut self, error: &LoupedeckError) {
        for transaction in self.drain() {
            transaction.complete(Err(error.clone()));
        }
    }
}
