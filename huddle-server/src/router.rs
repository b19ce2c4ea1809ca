//! Broadcast router.
//!
//! Owns channel membership and relays messages between the members of a
//! channel. The registry maps each channel id to its own [`ChannelSlot`];
//! there is no other shared membership state.
//!
//! Locking rules:
//! - the registry lock is only held to look up, create or retire a slot, and
//!   is always taken before a slot lock, never while holding one;
//! - a slot lock serializes everything that touches that channel's members,
//!   so two inbound messages on one channel are delivered in submission order;
//! - no lock is held across an `.await`. Delivery is a non-blocking
//!   `try_send` into each member's own bounded queue, so a slow member only
//!   ever fills its own queue. A member whose queue overflows is closed.
//!
//! Assistant directives are handed to the orchestrator on a spawned task and
//! the reply is broadcast when it completes, unless the channel emptied first.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::directory::ChannelId;
use crate::events::EventSink;
use crate::message::{InboundMessage, MessageEnvelope, OutboundFrame};
use crate::orchestrator::InvocationOrchestrator;
use crate::session::Session;

/// Case-insensitive token that addresses the assistant.
pub const TRIGGER: &str = "@ai";

/// Default per-member queue depth.
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// Result of [`BroadcastRouter::relay`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Delivered to `recipients` other members; `directive` is set when the
    /// assistant was invoked.
    Relayed {
        recipients: usize,
        directive: Option<String>,
    },
    /// Not relayed: missing body, or the sender is not a current member.
    Dropped,
}

struct Member {
    session: Session,
    outbox: mpsc::Sender<String>,
}

struct ChannelSlot {
    id: ChannelId,
    members: Mutex<HashMap<String, Member>>,
    /// Cancelled when the last member leaves.
    retired: CancellationToken,
}

impl ChannelSlot {
    fn new(id: ChannelId) -> Self {
        Self {
            id,
            members: Mutex::new(HashMap::new()),
            retired: CancellationToken::new(),
        }
    }

    /// Deliver to every member except `sender`. `None` if `sender` is not a
    /// member.
    fn relay_from(&self, sender: &str, line: &str, events: &dyn EventSink) -> Option<usize> {
        let members = self.members.lock();
        if !members.contains_key(sender) {
            return None;
        }
        Some(deliver_all(&members, Some(sender), line, events))
    }

    fn broadcast(&self, line: &str, events: &dyn EventSink) -> usize {
        let members = self.members.lock();
        deliver_all(&members, None, line, events)
    }
}

/// Caller holds the slot lock, so the member set cannot change mid-fan-out.
fn deliver_all(
    members: &HashMap<String, Member>,
    skip: Option<&str>,
    line: &str,
    events: &dyn EventSink,
) -> usize {
    let mut delivered = 0;
    for (session_id, member) in members {
        // Evicted members stay until their socket task leaves.
        if skip == Some(session_id.as_str()) || !member.session.is_live() {
            continue;
        }
        match member.outbox.try_send(line.to_string()) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) => {
                events.warn(
                    "Member send queue full, disconnecting",
                    json!({ "sessionId": session_id }),
                );
                member.session.close();
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
    delivered
}

/// If `body` addresses the assistant, the directive with every trigger
/// token removed and surrounding whitespace trimmed.
pub fn detect_directive(body: &str) -> Option<String> {
    let lower = body.to_ascii_lowercase();
    if !lower.contains(TRIGGER) {
        return None;
    }
    // ASCII lowercasing preserves byte offsets, so indices carry over.
    let mut directive = String::with_capacity(body.len());
    let mut cursor = 0;
    for (idx, _) in lower.match_indices(TRIGGER) {
        directive.push_str(&body[cursor..idx]);
        cursor = idx + TRIGGER.len();
    }
    directive.push_str(&body[cursor..]);
    Some(directive.trim().to_string())
}

pub struct BroadcastRouter {
    channels: Mutex<HashMap<ChannelId, Arc<ChannelSlot>>>,
    orchestrator: Arc<InvocationOrchestrator>,
    events: Arc<dyn EventSink>,
    queue_depth: usize,
}

impl BroadcastRouter {
    pub fn new(orchestrator: Arc<InvocationOrchestrator>, events: Arc<dyn EventSink>) -> Self {
        Self::with_queue_depth(orchestrator, events, DEFAULT_QUEUE_DEPTH)
    }

    pub fn with_queue_depth(
        orchestrator: Arc<InvocationOrchestrator>,
        events: Arc<dyn EventSink>,
        queue_depth: usize,
    ) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            orchestrator,
            events,
            queue_depth: queue_depth.max(1),
        }
    }

    /// Register an admitted session. Returns the queue of serialized frames
    /// destined for it. Joining is silent: no other member is notified.
    pub fn join(&self, session: &Session) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let members = {
            let mut channels = self.channels.lock();
            let slot = channels
                .entry(session.channel.clone())
                .or_insert_with(|| Arc::new(ChannelSlot::new(session.channel.clone())));
            let mut members = slot.members.lock();
            members.insert(
                session.id.clone(),
                Member {
                    session: session.clone(),
                    outbox: tx,
                },
            );
            members.len()
        };
        session.activate();
        self.events.info(
            "User connected to channel",
            json!({
                "channelId": session.channel.as_str(),
                "sessionId": session.id,
                "userId": session.identity.label,
                "members": members,
            }),
        );
        rx
    }

    /// Remove a session. Retires the channel if it was the last member.
    pub fn leave(&self, session: &Session) {
        session.close();
        let remaining = {
            let mut channels = self.channels.lock();
            let Some(slot) = channels.get(&session.channel).cloned() else {
                return;
            };
            let mut members = slot.members.lock();
            if members.remove(&session.id).is_none() {
                return;
            }
            let remaining = members.len();
            drop(members);
            if remaining == 0 {
                channels.remove(&session.channel);
                slot.retired.cancel();
            }
            remaining
        };
        self.events.info(
            "User disconnected from channel",
            json!({
                "channelId": session.channel.as_str(),
                "sessionId": session.id,
                "userId": session.identity.label,
                "remaining": remaining,
            }),
        );
    }

    /// Relay an inbound message to the sender's peers and, if it addresses
    /// the assistant, start an invocation in the background.
    pub fn relay(&self, session: &Session, inbound: InboundMessage) -> RelayOutcome {
        let Some(body) = inbound.body.filter(|b| !b.trim().is_empty()) else {
            self.events.warn(
                "Dropped malformed message: missing body",
                json!({ "sessionId": session.id, "channelId": session.channel.as_str() }),
            );
            return RelayOutcome::Dropped;
        };
        let Some(slot) = self.slot(&session.channel) else {
            return RelayOutcome::Dropped;
        };

        let directive = detect_directive(&body);
        let line = OutboundFrame::ChannelMessage(MessageEnvelope::from_participant(
            &session.identity,
            body,
        ))
        .to_json();
        let Some(recipients) = slot.relay_from(&session.id, &line, self.events.as_ref()) else {
            return RelayOutcome::Dropped;
        };

        if let Some(ref directive) = directive {
            self.dispatch(slot, session, directive.clone());
        }
        RelayOutcome::Relayed {
            recipients,
            directive,
        }
    }

    fn dispatch(&self, slot: Arc<ChannelSlot>, session: &Session, directive: String) {
        self.events.info(
            "AI request received",
            json!({
                "channelId": slot.id.as_str(),
                "promptLength": directive.len(),
                "userId": session.identity.label,
            }),
        );
        let orchestrator = Arc::clone(&self.orchestrator);
        let events = Arc::clone(&self.events);
        tokio::spawn(async move {
            let response = tokio::select! {
                response = orchestrator.invoke(&directive) => response,
                _ = slot.retired.cancelled() => {
                    events.info(
                        "AI request abandoned: channel emptied",
                        json!({ "channelId": slot.id.as_str() }),
                    );
                    return;
                }
            };
            let line = OutboundFrame::ChannelMessage(MessageEnvelope::from_assistant(&response))
                .to_json();
            let delivered = slot.broadcast(&line, events.as_ref());
            events.info(
                "AI response sent",
                json!({
                    "channelId": slot.id.as_str(),
                    "hasFileTree": !response.file_tree.is_empty(),
                    "textLength": response.text.len(),
                    "error": response.error,
                    "delivered": delivered,
                }),
            );
        });
    }

    fn slot(&self, id: &ChannelId) -> Option<Arc<ChannelSlot>> {
        self.channels.lock().get(id).cloned()
    }

    /// Live channels and their member counts, sorted by id.
    pub fn channel_stats(&self) -> Vec<(ChannelId, usize)> {
        let slots: Vec<Arc<ChannelSlot>> = self.channels.lock().values().cloned().collect();
        let mut stats: Vec<_> = slots
            .iter()
            .map(|slot| (slot.id.clone(), slot.members.lock().len()))
            .collect();
        stats.sort();
        stats
    }

    pub fn member_count(&self, id: &ChannelId) -> usize {
        self.slot(id).map_or(0, |slot| slot.members.lock().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_trigger_case_insensitively() {
        assert_eq!(
            detect_directive("@AI build a todo app").as_deref(),
            Some("build a todo app")
        );
        assert_eq!(
            detect_directive("hey @ai   make server.js  ").as_deref(),
            Some("hey    make server.js")
        );
        assert_eq!(detect_directive("@ai").as_deref(), Some(""));
        assert_eq!(detect_directive("no trigger here"), None);
    }

    #[test]
    fn strips_every_occurrence() {
        assert_eq!(
            detect_directive("@ai please @Ai now").as_deref(),
            Some("please  now")
        );
    }

    #[test]
    fn non_ascii_text_survives() {
        assert_eq!(
            detect_directive("@ai créer un serveur ✨").as_deref(),
            Some("créer un serveur ✨")
        );
    }
}
