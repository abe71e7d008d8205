// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! In-memory broker that behaves like RabbitMQ for declarations: identical
//! re-declarations are no-ops, conflicting ones fail, bindings need an
//! existing exchange and publishing to an unknown exchange fails.

#![allow(dead_code)]

use async_trait::async_trait;
use lapin::BasicProperties;
use publish_actor::{
    channel::{AmqpChannel, ConnectionProvider},
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::QueueDefinition,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

#[derive(Debug, Clone)]
pub struct Published {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub properties: BasicProperties,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Declared {
    Exchange(String),
    Queue(String),
}

#[derive(Default)]
pub struct BrokerState {
    pub exchanges: Vec<ExchangeDefinition>,
    pub queues: Vec<QueueDefinition>,
    pub bindings: Vec<(String, String, String)>,
    pub log: Vec<Declared>,
    pub published: Vec<Published>,
}

impl BrokerState {
    pub fn exchange(&self, name: &str) -> Option<&ExchangeDefinition> {
        self.exchanges.iter().find(|e| e.name() == name)
    }

    pub fn queue(&self, name: &str) -> Option<&QueueDefinition> {
        self.queues.iter().find(|q| q.name() == name)
    }

    pub fn exchange_names(&self) -> Vec<&str> {
        self.exchanges.iter().map(|e| e.name()).collect()
    }

    pub fn queue_names(&self) -> Vec<&str> {
        self.queues.iter().map(|q| q.name()).collect()
    }
}

pub struct FakeChannel {
    broker: Arc<Mutex<BrokerState>>,
    closed: AtomicBool,
}

impl FakeChannel {
    fn new(broker: Arc<Mutex<BrokerState>>) -> Self {
        FakeChannel {
            broker,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), AmqpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AmqpError::ChannelError("channel is closed".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl AmqpChannel for FakeChannel {
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        self.ensure_open()?;
        let mut broker = self.broker.lock().unwrap();

        match broker.exchange(def.name()).cloned() {
            Some(existing) if &existing == def => {}
            Some(_) => {
                return Err(AmqpError::DeclareExchangeError(
                    def.name().to_owned(),
                    "PRECONDITION_FAILED - inequivalent arg".to_owned(),
                ))
            }
            None => broker.exchanges.push(def.clone()),
        }

        broker.log.push(Declared::Exchange(def.name().to_owned()));
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), AmqpError> {
        self.ensure_open()
            .map_err(|err| AmqpError::PublishingError(err.to_string()))?;
        let mut broker = self.broker.lock().unwrap();

        if broker.exchange(exchange).is_none() {
            return Err(AmqpError::PublishingError(format!(
                "NOT_FOUND - no exchange '{exchange}'"
            )));
        }

        broker.published.push(Published {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            payload: payload.to_vec(),
            properties,
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), AmqpError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(AmqpError::ChannelCloseError(
                "channel already closed".to_owned(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct FakeBroker {
    state: Arc<Mutex<BrokerState>>,
    admin: Arc<FakeChannel>,
    channels: Arc<Mutex<Vec<Arc<FakeChannel>>>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(BrokerState::default()));
        FakeBroker {
            admin: Arc::new(FakeChannel::new(state.clone())),
            state,
            channels: Arc::new(Mutex::new(vec![])),
        }
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap()
    }

    pub fn provider(&self) -> Arc<dyn ConnectionProvider> {
        Arc::new(self.clone())
    }

    /// Closes every publish channel, as a lost connection would.
    pub fn drop_publish_channels(&self) {
        for channel in self.channels.lock().unwrap().iter() {
            channel.closed.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ConnectionProvider for FakeBroker {
    async fn new_channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError> {
        let channel = Arc::new(FakeChannel::new(self.state.clone()));
        self.channels.lock().unwrap().push(channel.clone());
        Ok(channel)
    }

    async fn channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError> {
        Ok(self.admin.clone())
    }

    async fn ensure(&self, queue: &QueueDefinition) -> Result<(), AmqpError> {
        let mut broker = self.state.lock().unwrap();

        match broker.queue(queue.name()).cloned() {
            Some(existing) if existing.dead_letter_exchange() == queue.dead_letter_exchange() => {}
            Some(_) => {
                return Err(AmqpError::DeclareQueueError(
                    queue.name().to_owned(),
                    "PRECONDITION_FAILED - inequivalent arg 'x-dead-letter-exchange'".to_owned(),
                ))
            }
            None => broker.queues.push(queue.clone()),
        }

        if broker.exchange(queue.bound_exchange()).is_none() {
            return Err(AmqpError::BindingExchangeToQueueError(
                queue.bound_exchange().to_owned(),
                queue.name().to_owned(),
            ));
        }

        let binding = (
            queue.bound_exchange().to_owned(),
            queue.binding_key().to_owned(),
            queue.name().to_owned(),
        );
        if !broker.bindings.contains(&binding) {
            broker.bindings.push(binding);
        }

        broker.log.push(Declared::Queue(queue.name().to_owned()));
        Ok(())
    }
}
