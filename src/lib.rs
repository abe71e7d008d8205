// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod otel;

pub mod channel;
pub mod config;
pub mod delay;
pub mod errors;
pub mod exchange;
pub mod publisher;
pub mod queue;
pub mod topology;

pub use config::{ActorConfig, DelayType};
pub use errors::AmqpError;
pub use publisher::PublishActor;
