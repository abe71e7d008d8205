// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions
//!
//! A `QueueDefinition` describes one durable queue together with the binding
//! that feeds it: the exchange it is bound to, the routing key of the binding
//! and the declaration arguments (dead-lettering and replication). It is the
//! unit the connection provider's `ensure` operation declares.

use crate::exchange::ha_params;
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use std::collections::BTreeMap;

/// Argument naming the exchange that receives rejected or expired messages
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";

/// Builds the declaration arguments that dead-letter into `dead_letter_exchange`.
///
/// The dead-letter routing key is left unset so expired or rejected messages
/// keep the routing key they were published with.
pub fn dead_letter_args(dead_letter_exchange: &str) -> FieldTable {
    let mut args = ha_params();
    args.insert(
        ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
        AMQPValue::LongString(LongString::from(dead_letter_exchange)),
    );
    FieldTable::from(args)
}

/// Definition of a durable queue and its binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) exchange: String,
    pub(crate) routing_key: String,
    pub(crate) args: BTreeMap<ShortString, AMQPValue>,
}

impl QueueDefinition {
    /// Creates a queue bound to nothing, routed by its own name.
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            exchange: String::new(),
            routing_key: name.to_owned(),
            args: BTreeMap::new(),
        }
    }

    /// Sets the exchange the queue is bound to.
    pub fn exchange(mut self, exchange: &str) -> Self {
        self.exchange = exchange.to_owned();
        self
    }

    /// Sets the routing key of the binding.
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }

    /// Sets the declaration arguments.
    pub fn args(mut self, args: FieldTable) -> Self {
        self.args = args.inner().clone();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bound_exchange(&self) -> &str {
        &self.exchange
    }

    pub fn binding_key(&self) -> &str {
        &self.routing_key
    }

    /// Exchange that expired or rejected messages are dead-lettered into, if any.
    pub fn dead_letter_exchange(&self) -> Option<&str> {
        match self
            .args
            .get(&ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE))
        {
            Some(AMQPValue::LongString(exchange)) => std::str::from_utf8(exchange.as_bytes()).ok(),
            _ => None,
        }
    }

    pub(crate) fn arguments(&self) -> FieldTable {
        FieldTable::from(self.args.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_route_by_queue_name_by_default() {
        let def = QueueDefinition::new("svc.created").exchange("orders");

        assert_eq!(def.binding_key(), "svc.created");
        assert_eq!(def.bound_exchange(), "orders");
        assert_eq!(def.dead_letter_exchange(), None);
    }

    #[test]
    fn should_carry_dead_letter_and_ha_args() {
        let def = QueueDefinition::new("svc.created").args(dead_letter_args("orders_SIDELINE"));

        assert_eq!(def.dead_letter_exchange(), Some("orders_SIDELINE"));
        assert_eq!(def.args.len(), 3);
        assert!(def.args.contains_key(&ShortString::from("ha-mode")));
    }
}
