//! Session gateway: credential and channel checks before a connection is
//! allowed anywhere near the router.
//!
//! Checks run in a fixed order and stop at the first failure, so a
//! connection without a credential never causes a channel lookup.

use std::sync::Arc;

use serde_json::json;

use crate::directory::{ChannelDirectory, ChannelId, LookupError};
use crate::error::AdmissionError;
use crate::events::EventSink;
use crate::identity::IdentityVerifier;
use crate::session::Session;

pub struct SessionGateway {
    verifier: Arc<dyn IdentityVerifier>,
    directory: Arc<dyn ChannelDirectory>,
    events: Arc<dyn EventSink>,
}

impl SessionGateway {
    pub fn new(
        verifier: Arc<dyn IdentityVerifier>,
        directory: Arc<dyn ChannelDirectory>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            verifier,
            directory,
            events,
        }
    }

    /// Produce a bound session or the reason for refusing one.
    pub async fn admit(
        &self,
        credential: Option<&str>,
        channel_ref: Option<&str>,
    ) -> Result<Session, AdmissionError> {
        let result = self.check(credential, channel_ref).await;
        match &result {
            Ok(session) => self.events.info(
                "Connection admitted",
                json!({
                    "sessionId": session.id,
                    "channelId": session.channel.as_str(),
                    "userId": session.identity.label,
                }),
            ),
            Err(e) => self.events.warn(
                "Connection refused",
                json!({ "reason": e.reason(), "error": e.to_string() }),
            ),
        }
        result
    }

    async fn check(
        &self,
        credential: Option<&str>,
        channel_ref: Option<&str>,
    ) -> Result<Session, AdmissionError> {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(AdmissionError::MissingCredential)?;
        let identity = self
            .verifier
            .verify(credential)
            .map_err(|e| AdmissionError::InvalidCredential(e.to_string()))?;

        let channel_ref = channel_ref
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(AdmissionError::MissingChannel)?;
        let channel_id = ChannelId::parse(channel_ref)
            .ok_or_else(|| AdmissionError::InvalidChannel(channel_ref.to_string()))?;

        let record = self
            .directory
            .resolve(&channel_id)
            .await
            .map_err(|e| match e {
                LookupError::NotFound => AdmissionError::ChannelNotFound(channel_id.to_string()),
                LookupError::Unavailable(msg) => AdmissionError::LookupUnavailable(msg),
            })?;
        if !record.admits(&identity) {
            return Err(AdmissionError::NotMember);
        }

        Ok(Session::new(identity, record.id))
    }
}
