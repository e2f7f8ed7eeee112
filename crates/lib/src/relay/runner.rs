//! Relay loop: read new messages, relay each to the backend, deliver non-empty replies,
//! and advance the persisted cursor.
//!
//! Messages are handled strictly one at a time in ascending id order. A failed relay or
//! send is logged and the loop moves on to the next message; the failed message's id is
//! never written as the cursor. What happens to the cursor when a *later* message then
//! succeeds depends on [`CursorAdvance`].

use crate::channels::{InboundMessage, MessageSource, OutboundSender};
use crate::config::CursorAdvance;
use crate::relay::client::Backend;
use crate::relay::cursor::CursorStore;
use std::collections::BTreeSet;
use std::time::Duration;

/// Consecutive cycles a message may hold back the cursor before a warning is logged.
pub const STALL_WARN_CYCLES: u32 = 10;

/// Counts for one relay cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Messages returned by the source.
    pub read: usize,
    /// Messages the backend answered (empty replies included).
    pub relayed: usize,
    /// Replies delivered through the outbound sender.
    pub delivered: usize,
    /// Backend or send failures; these messages are retried on a later cycle unless the
    /// cursor has already moved past them.
    pub failed: usize,
    /// Messages completed on an earlier cycle and not relayed again.
    pub skipped: usize,
}

enum Outcome {
    Replied,
    Silent,
    BackendFailed,
    SendFailed,
}

/// Sequential relay pipeline over a message source, a backend and an outbound sender.
pub struct RelayLoop<S, B, O> {
    source: S,
    backend: B,
    sender: O,
    store: CursorStore,
    advance: CursorAdvance,
    cursor: i64,
    /// In-order mode only: ids above the cursor that completed after an earlier failure.
    completed: BTreeSet<i64>,
    /// Lowest failing id still above the cursor, and for how many cycles in a row.
    stall: Option<(i64, u32)>,
}

impl<S, B, O> RelayLoop<S, B, O>
where
    S: MessageSource,
    B: Backend,
    O: OutboundSender,
{
    /// Build the loop; the cursor is loaded from `store` once, here.
    pub fn new(source: S, backend: B, sender: O, store: CursorStore, advance: CursorAdvance) -> Self {
        let cursor = store.load();
        log::info!("relay: starting after message {}", cursor);
        Self {
            source,
            backend,
            sender,
            store,
            advance,
            cursor,
            completed: BTreeSet::new(),
            stall: None,
        }
    }

    /// Current in-memory cursor (equal to the persisted one unless a save failed).
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Message holding the cursor back and the number of consecutive cycles it has failed.
    pub fn stalled_on(&self) -> Option<(i64, u32)> {
        self.stall
    }

    /// Poll once and process every new message.
    pub async fn run_cycle(&mut self) -> CycleSummary {
        let mut summary = CycleSummary::default();
        let messages = match self.source.read_since(self.cursor) {
            Ok(m) => m,
            Err(e) => {
                log::error!("relay: reading new messages failed: {}", e);
                return summary;
            }
        };
        summary.read = messages.len();

        // Set once a message in this cycle fails; in-order mode stops advancing from there.
        let mut blocked = false;
        let mut first_failure: Option<i64> = None;
        for msg in messages {
            if msg.id <= self.cursor {
                continue;
            }
            if self.completed.contains(&msg.id) {
                summary.skipped += 1;
                if !blocked {
                    self.advance_to(msg.id);
                }
                continue;
            }
            match self.deliver(&msg).await {
                Outcome::Replied => {
                    summary.relayed += 1;
                    summary.delivered += 1;
                    self.complete(msg.id, blocked);
                }
                Outcome::Silent => {
                    summary.relayed += 1;
                    self.complete(msg.id, blocked);
                }
                Outcome::BackendFailed => {
                    summary.failed += 1;
                    blocked = true;
                    first_failure.get_or_insert(msg.id);
                }
                Outcome::SendFailed => {
                    summary.relayed += 1;
                    summary.failed += 1;
                    blocked = true;
                    first_failure.get_or_insert(msg.id);
                }
            }
        }
        self.track_stall(first_failure);
        summary
    }

    /// Run cycles forever, sleeping `interval` between them.
    pub async fn run(&mut self, interval: Duration) {
        loop {
            let summary = self.run_cycle().await;
            if summary.read > 0 {
                log::debug!("relay: cycle finished {:?}", summary);
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn deliver(&self, msg: &InboundMessage) -> Outcome {
        let reply = match self.backend.relay(&msg.conversation_id, &msg.text).await {
            Ok(r) => r,
            Err(e) => {
                log::warn!("relay: backend request for message {} failed: {}", msg.id, e);
                return Outcome::BackendFailed;
            }
        };
        if reply.trim().is_empty() {
            log::debug!("relay: message {} produced no reply", msg.id);
            return Outcome::Silent;
        }
        match self.sender.send(&msg.conversation_id, &reply).await {
            Ok(()) => Outcome::Replied,
            Err(e) => {
                log::warn!("relay: delivering reply for message {} failed: {}", msg.id, e);
                Outcome::SendFailed
            }
        }
    }

    fn track_stall(&mut self, first_failure: Option<i64>) {
        let blocker = first_failure.filter(|&id| id > self.cursor);
        self.stall = match (blocker, self.stall) {
            (Some(id), Some((prev, cycles))) if id == prev => Some((id, cycles + 1)),
            (Some(id), _) => Some((id, 1)),
            (None, _) => None,
        };
        if let Some((id, cycles)) = self.stall {
            if cycles % STALL_WARN_CYCLES == 0 {
                log::warn!(
                    "relay: message {} has failed {} cycles in a row; cursor held at {} ({} later messages done)",
                    id,
                    cycles,
                    self.cursor,
                    self.completed.len()
                );
            }
        }
    }

    fn complete(&mut self, id: i64, blocked: bool) {
        match self.advance {
            CursorAdvance::LatestCompleted => self.advance_to(id),
            CursorAdvance::InOrder if blocked => {
                self.completed.insert(id);
            }
            CursorAdvance::InOrder => self.advance_to(id),
        }
    }

    fn advance_to(&mut self, id: i64) {
        if id <= self.cursor {
            return;
        }
        self.cursor = id;
        self.completed.retain(|&c| c > id);
        if let Err(e) = self.store.save(id) {
            log::error!(
                "relay: persisting cursor {} to {} failed: {}",
                id,
                self.store.path().display(),
                e
            );
        }
    }
}
