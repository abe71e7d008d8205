// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Definitions
//!
//! This module provides the exchange types used by the publish topology and a
//! builder for exchange definitions. Every exchange the actor declares is
//! durable, never auto-deleted and carries the high-availability arguments;
//! the primary exchange may additionally be an `x-delayed-message` exchange
//! routing as `direct`.

use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use std::collections::BTreeMap;

/// Argument naming the routing discipline behind a delayed-message exchange
pub const AMQP_HEADERS_DELAYED_EXCHANGE_TYPE: &str = "x-delayed-type";
/// Legacy mirrored-queue policy argument
pub const AMQP_HEADERS_HA_POLICY: &str = "x-ha-policy";
/// Mirroring mode argument
pub const AMQP_HEADERS_HA_MODE: &str = "ha-mode";

/// Exchange type name registered by the delayed message plugin
pub const DELAYED_MESSAGE_EXCHANGE: &str = "x-delayed-message";

/// Exchange types the publish topology uses.
///
/// - Direct: routes on an exact routing key match
/// - XMessageDelayed: holds messages for their `x-delay` before routing (plugin required)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    #[default]
    Direct,
    XMessageDelayed,
}

impl From<&ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: &ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::XMessageDelayed => {
                lapin::ExchangeKind::Custom(DELAYED_MESSAGE_EXCHANGE.to_owned())
            }
        }
    }
}

/// Arguments that replicate an object across every cluster node.
pub fn ha_params() -> BTreeMap<ShortString, AMQPValue> {
    let mut params = BTreeMap::new();
    params.insert(
        ShortString::from(AMQP_HEADERS_HA_POLICY),
        AMQPValue::LongString(LongString::from("all")),
    );
    params.insert(
        ShortString::from(AMQP_HEADERS_HA_MODE),
        AMQPValue::LongString(LongString::from("all")),
    );
    params
}

/// Definition of a RabbitMQ exchange.
///
/// Two definitions compare equal when a broker would consider them the same
/// declaration, which is what makes re-declaration a no-op.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeDefinition {
    pub(crate) name: String,
    pub(crate) kind: ExchangeKind,
    pub(crate) delete: bool,
    pub(crate) durable: bool,
    pub(crate) params: BTreeMap<ShortString, AMQPValue>,
}

impl ExchangeDefinition {
    /// Creates a non-durable direct exchange definition with no arguments.
    pub fn new(name: &str) -> ExchangeDefinition {
        ExchangeDefinition {
            name: name.to_owned(),
            kind: ExchangeKind::Direct,
            delete: false,
            durable: false,
            params: BTreeMap::default(),
        }
    }

    /// Durable, replicated, direct exchange. Every exchange of the topology starts here.
    pub fn replicated_direct(name: &str) -> ExchangeDefinition {
        ExchangeDefinition::new(name).durable().params(ha_params())
    }

    /// Turns the exchange into a delayed-message exchange routing as `direct`.
    ///
    /// This requires the x-delayed-message plugin to be installed on the RabbitMQ server.
    pub fn direct_delayed(mut self) -> Self {
        self.kind = ExchangeKind::XMessageDelayed;
        self.params.insert(
            ShortString::from(AMQP_HEADERS_DELAYED_EXCHANGE_TYPE),
            AMQPValue::LongString(LongString::from("direct")),
        );
        self
    }

    /// Replaces the declaration arguments.
    ///
    /// # Parameters
    /// * `params` - Arguments sent with `exchange.declare`
    ///
    /// # Returns
    /// The updated definition
    pub fn params(mut self, params: BTreeMap<ShortString, AMQPValue>) -> Self {
        self.params = params;
        self
    }

    /// Marks the exchange as surviving broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Returns the exchange name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the exchange type.
    pub fn kind(&self) -> &ExchangeKind {
        &self.kind
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn is_auto_delete(&self) -> bool {
        self.delete
    }

    pub fn param(&self, key: &str) -> Option<&AMQPValue> {
        self.params.get(&ShortString::from(key))
    }

    pub(crate) fn arguments(&self) -> FieldTable {
        FieldTable::from(self.params.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_replicated_direct_exchange() {
        let def = ExchangeDefinition::replicated_direct("orders");

        assert_eq!(def.kind(), &ExchangeKind::Direct);
        assert!(def.is_durable());
        assert!(!def.is_auto_delete());
        assert_eq!(
            def.param(AMQP_HEADERS_HA_POLICY),
            Some(&AMQPValue::LongString("all".into()))
        );
        assert_eq!(
            def.param(AMQP_HEADERS_HA_MODE),
            Some(&AMQPValue::LongString("all".into()))
        );
        assert_eq!(def.param(AMQP_HEADERS_DELAYED_EXCHANGE_TYPE), None);
    }

    #[test]
    fn should_keep_ha_params_on_delayed_exchange() {
        let def = ExchangeDefinition::replicated_direct("orders").direct_delayed();

        assert_eq!(def.kind(), &ExchangeKind::XMessageDelayed);
        assert_eq!(def.params.len(), 3);
        assert_eq!(
            def.param(AMQP_HEADERS_DELAYED_EXCHANGE_TYPE),
            Some(&AMQPValue::LongString("direct".into()))
        );
        assert!(matches!(
            lapin::ExchangeKind::from(def.kind()),
            lapin::ExchangeKind::Custom(kind) if kind == "x-delayed-message"
        ));
    }
}
