//! huddle-server: project-scoped chat channels with an embedded
//! code-generation assistant.
//!
//! A client connects over WebSocket to one channel, authenticated with a
//! JWT. Messages are relayed to the other members of that channel. A
//! message containing `@ai` is also handed to the assistant, whose reply is
//! broadcast to the whole channel as a synthetic `AI` message carrying a
//! JSON description of generated files and run commands.

pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod gateway;
pub mod generation;
pub mod identity;
pub mod message;
pub mod normalize;
pub mod orchestrator;
pub mod policy;
pub mod response;
pub mod router;
pub mod sanitize;
pub mod server;
pub mod session;
pub mod web;
