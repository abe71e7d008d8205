// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Publish Actor
//!
//! A `PublishActor` publishes one message type to one logical queue. `start`
//! provisions the actor's topology and opens a dedicated publish channel;
//! `stop` closes it. Publishing is fire-and-forget: one write per call, no
//! broker confirmation awaited, no retry.
//!
//! Concurrent publishes are serialized by the actor: the publish channel lives
//! behind an async mutex held for the duration of each write, so an actor can
//! be shared behind an `Arc` by any number of tasks.

use crate::{
    channel::{AmqpChannel, ConnectionProvider},
    config::ActorConfig,
    delay::PERSISTENT_DELIVERY_MODE,
    errors::AmqpError,
    otel::with_trace_context,
    topology::{ActorTopology, Provisioner},
};
use lapin::{types::ShortString, BasicProperties};
use serde::Serialize;
use std::{marker::PhantomData, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Content type of every encoded payload
pub const JSON_CONTENT_TYPE: &str = "application/json";

enum ActorState {
    Created,
    Started(Arc<dyn AmqpChannel>),
    Stopped,
}

/// Publishes messages of type `M` to the queue derived from its name.
pub struct PublishActor<M> {
    name: String,
    config: ActorConfig,
    connection: Arc<dyn ConnectionProvider>,
    topology: ActorTopology,
    state: Mutex<ActorState>,
    _message: PhantomData<fn(&M)>,
}

impl<M> PublishActor<M>
where
    M: Serialize + Send + Sync,
{
    /// Creates an unstarted actor and derives its topology.
    ///
    /// No broker call is made until [`PublishActor::start`].
    ///
    /// # Parameters
    /// * `name` - Logical actor name, appended to the config prefix to form the queue name
    /// * `config` - Exchange, prefix and delay settings
    /// * `connection` - Provider of the admin and publish channels
    ///
    /// # Returns
    /// A new actor in the created state
    pub fn new(name: &str, config: ActorConfig, connection: Arc<dyn ConnectionProvider>) -> Self {
        let topology = ActorTopology::derive(&config, name);

        PublishActor {
            name: name.to_owned(),
            config,
            connection,
            topology,
            state: Mutex::new(ActorState::Created),
            _message: PhantomData,
        }
    }

    /// Returns the logical actor name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the primary queue name, `<prefix>.<name>`.
    pub fn queue_name(&self) -> &str {
        &self.topology.queue
    }

    /// Returns the exchange and queue names this actor provisions.
    pub fn topology(&self) -> &ActorTopology {
        &self.topology
    }

    pub async fn is_started(&self) -> bool {
        matches!(*self.state.lock().await, ActorState::Started(_))
    }

    /// Provisions the topology, then opens the publish channel.
    ///
    /// On failure the actor stays unstarted and the error is returned as is.
    /// A stopped actor may be started again; it is provisioned anew.
    pub async fn start(&self) -> Result<(), AmqpError> {
        let mut state = self.state.lock().await;

        if let ActorState::Started(_) = *state {
            return Err(AmqpError::AlreadyStarted);
        }

        if let Err(err) = self.config.validate() {
            error!(error = err.to_string(), actor = self.name, "invalid actor configuration");
            return Err(err);
        }

        debug!(actor = self.name, queue = self.queue_name(), "provisioning topology");
        Provisioner::new(self.connection.as_ref(), &self.topology)
            .install()
            .await?;

        let channel = match self.connection.new_channel().await {
            Ok(channel) => channel,
            Err(err) => {
                error!(
                    error = err.to_string(),
                    actor = self.name,
                    queue = self.queue_name(),
                    "failure to open publish channel"
                );
                return Err(err);
            }
        };

        *state = ActorState::Started(channel);
        info!(actor = self.name, queue = self.queue_name(), "publish actor started");

        Ok(())
    }

    /// Closes the publish channel.
    ///
    /// The actor is stopped afterwards even when closing fails; the failure is
    /// still returned.
    pub async fn stop(&self) -> Result<(), AmqpError> {
        let mut state = self.state.lock().await;

        let channel = match std::mem::replace(&mut *state, ActorState::Stopped) {
            ActorState::Started(channel) => channel,
            previous => {
                *state = previous;
                return Err(AmqpError::NotStarted);
            }
        };

        if let Err(err) = channel.close().await {
            error!(
                error = err.to_string(),
                actor = self.name,
                queue = self.queue_name(),
                "error closing publisher"
            );
            return Err(err);
        }

        info!(actor = self.name, queue = self.queue_name(), "publish actor stopped");
        Ok(())
    }

    /// Publishes a persistent message to the primary exchange.
    pub async fn publish(&self, message: &M) -> Result<(), AmqpError> {
        self.publish_with_properties(
            message,
            BasicProperties::default().with_delivery_mode(PERSISTENT_DELIVERY_MODE),
        )
        .await
    }

    /// Publishes to the primary exchange with caller supplied properties.
    pub async fn publish_with_properties(
        &self,
        message: &M,
        properties: BasicProperties,
    ) -> Result<(), AmqpError> {
        let payload = self.encode(message)?;
        self.send(&self.topology.exchange, &payload, properties)
            .await
    }

    /// Publishes a message to be delivered after `delay_ms` milliseconds.
    ///
    /// An actor not configured as delayed still publishes; the outcome then
    /// depends on its delay type and is logged as a warning. A delay beyond
    /// the signed 64-bit range fails with `PublishingError` and sends nothing.
    pub async fn publish_with_delay(&self, message: &M, delay_ms: u64) -> Result<(), AmqpError> {
        info!(
            actor = self.name,
            delay_ms, "publishing message to exchange with delay"
        );

        if !self.config.delayed {
            warn!(
                actor = self.name,
                queue = self.queue_name(),
                "publishing delayed message to non-delayed queue"
            );
        }

        let payload = self.encode(message)?;
        let (exchange, properties) = match self
            .topology
            .delay
            .delayed_delivery(&self.topology.exchange, delay_ms)
        {
            Ok(delivery) => delivery,
            Err(err) => {
                error!(
                    error = err.to_string(),
                    actor = self.name,
                    delay_ms,
                    "delay out of range"
                );
                return Err(err);
            }
        };

        self.send(exchange, &payload, properties).await
    }

    fn encode(&self, message: &M) -> Result<Vec<u8>, AmqpError> {
        serde_json::to_vec(message).map_err(|err| {
            error!(
                error = err.to_string(),
                actor = self.name,
                "failure to serialize message"
            );
            AmqpError::SerializationError(err.to_string())
        })
    }

    async fn send(
        &self,
        exchange: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), AmqpError> {
        let state = self.state.lock().await;

        let channel = match &*state {
            ActorState::Started(channel) => channel,
            _ => {
                error!(actor = self.name, "publishing on a publish actor that is not started");
                return Err(AmqpError::NotStarted);
            }
        };

        let properties = enrich(properties);

        if let Err(err) = channel
            .publish(exchange, &self.topology.queue, payload, properties)
            .await
        {
            error!(
                error = err.to_string(),
                actor = self.name,
                queue = self.queue_name(),
                exchange,
                "failure to publish message"
            );
            return Err(err);
        }

        Ok(())
    }
}

/// Fills the properties the caller left unset: message id, content type and
/// trace context headers.
fn enrich(properties: BasicProperties) -> BasicProperties {
    let headers = with_trace_context(properties.headers().clone());

    let mut properties = properties;
    if properties.message_id().is_none() {
        properties =
            properties.with_message_id(ShortString::from(Uuid::new_v4().to_string()));
    }
    if properties.content_type().is_none() {
        properties = properties.with_content_type(ShortString::from(JSON_CONTENT_TYPE));
    }

    match headers {
        Some(headers) => properties.with_headers(headers),
        None => properties,
    }
}
