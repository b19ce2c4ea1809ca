//! A live connection bound to one identity and one channel.
//!
//! Lifecycle: the gateway produces an `Admitted` session (the "connecting"
//! phase happens before a session exists), the router makes it `Active` when
//! it joins the channel, and it ends `Closed` on disconnect or when the
//! router evicts a member that cannot keep up.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

use crate::directory::ChannelId;
use crate::identity::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Admitted,
    Active,
    Closed,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Admitted,
            1 => SessionState::Active,
            _ => SessionState::Closed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub identity: Identity,
    pub channel: ChannelId,
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(identity: Identity, channel: ChannelId) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("session-{n}"),
            identity,
            channel,
            state: Arc::new(AtomicU8::new(SessionState::Admitted as u8)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Admitted → Active. No effect on a closed session.
    pub(crate) fn activate(&self) -> bool {
        self.state
            .compare_exchange(
                SessionState::Admitted as u8,
                SessionState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Mark closed and wake anything waiting on [`Session::closed`].
    pub fn close(&self) {
        self.state
            .store(SessionState::Closed as u8, Ordering::Release);
        self.cancel.cancel();
    }

    pub fn is_live(&self) -> bool {
        self.state() != SessionState::Closed
    }

    /// Resolves once the session is closed from any side.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }
}
