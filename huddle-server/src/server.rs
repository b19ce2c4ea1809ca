//! Server assembly: builds the shared state from configuration and serves
//! the HTTP/WebSocket router.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::directory::{ChannelDirectory, StaticDirectory};
use crate::events::{EventSink, TracingSink};
use crate::gateway::SessionGateway;
use crate::generation::{GeminiService, GenerationClient, GenerationService};
use crate::identity::{IdentityVerifier, JwtVerifier};
use crate::orchestrator::{InvocationOrchestrator, RetryPolicy};
use crate::router::BroadcastRouter;

/// State shared by every connection and HTTP handler.
pub struct SharedState {
    pub gateway: SessionGateway,
    pub router: BroadcastRouter,
    pub events: Arc<dyn EventSink>,
    pub config: ServerConfig,
}

/// The external services the server depends on. Production builds these
/// from [`ServerConfig`]; tests substitute fakes.
#[derive(Clone)]
pub struct Collaborators {
    pub verifier: Arc<dyn IdentityVerifier>,
    pub directory: Arc<dyn ChannelDirectory>,
    pub generation: Arc<dyn GenerationService>,
    pub events: Arc<dyn EventSink>,
}

impl Collaborators {
    /// JWT verifier, TOML channel directory, Gemini and `tracing` events.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let events: Arc<dyn EventSink> = Arc::new(TracingSink);

        let verifier = JwtVerifier::new(config.jwt_secret.as_deref());
        if !verifier.is_configured() {
            tracing::warn!("JWT_SECRET is not set, every connection will be refused");
        }

        let directory = StaticDirectory::load(&config.channels_file)?;

        let generation = GeminiService::new(config.google_ai_key.clone()).with_model(&config.model);
        if !generation.is_configured() {
            events.error(
                "GOOGLE_AI_KEY is not configured",
                json!({ "hint": "assistant requests will fail until a key is provided" }),
            );
        }

        Ok(Self {
            verifier: Arc::new(verifier),
            directory: Arc::new(directory),
            generation: Arc::new(generation),
            events,
        })
    }
}

pub struct Server {
    config: ServerConfig,
    collaborators: Option<Collaborators>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            collaborators: None,
        }
    }

    /// Create a server with explicit collaborators (for testing).
    pub fn with_collaborators(config: ServerConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators: Some(collaborators),
        }
    }

    fn build_state(&self) -> Result<Arc<SharedState>> {
        let collaborators = match &self.collaborators {
            Some(c) => c.clone(),
            None => Collaborators::from_config(&self.config)?,
        };
        let Collaborators {
            verifier,
            directory,
            generation,
            events,
        } = collaborators;

        let client = GenerationClient::new(generation, self.config.generation_deadline());
        let retry = RetryPolicy {
            max_attempts: self.config.max_attempts.max(1),
            backoff_base: self.config.backoff_base(),
        };
        let orchestrator = Arc::new(InvocationOrchestrator::new(client, retry, Arc::clone(&events)));

        Ok(Arc::new(SharedState {
            gateway: SessionGateway::new(verifier, directory, Arc::clone(&events)),
            router: BroadcastRouter::with_queue_depth(
                orchestrator,
                Arc::clone(&events),
                self.config.member_queue_depth,
            ),
            events,
            config: self.config.clone(),
        }))
    }

    /// Serve until the listener fails.
    pub async fn run(self) -> Result<()> {
        let (addr, handle) = self.start().await?;
        tracing::info!("Serving channels on {addr}");
        handle.await?
    }

    /// Start the server and return the bound address + task handle (for testing).
    pub async fn start(self) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let addr = listener.local_addr()?;
        tracing::info!("HTTP/WebSocket listener on {addr}");

        let state = self.build_state()?;
        let router = crate::web::router(state);

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await?;
            Ok(())
        });

        Ok((addr, handle))
    }
}
