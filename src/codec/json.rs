use crate::amqp::convenience::{set_header, BasicPropertiesExt};
use crate::amqp::types::AMQPValue;
use crate::amqp::BasicProperties;
use crate::codec::MessageCodec;
use crate::consumers::MessageDelivery;
use crate::transport::{WireDelivery, WireMessage};
use anyhow::Context;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;
use uuid::Uuid;

/// Header carrying the logical type of the message, stamped by [`JsonCodec::encode`].
pub const MESSAGE_TYPE_HEADER: &str = "message-type";

const CONTENT_TYPE: &str = "application/json";

/// Delivery mode: Non-persistent (1) or persistent (2).
const TRANSIENT: u8 = 1;
const PERSISTENT: u8 = 2;

/// A [`MessageCodec`] for messages that travel as JSON.
///
/// On the way out it sets the content type, the delivery mode, the [`MESSAGE_TYPE_HEADER`]
/// header and, if missing, a timestamp and a message id.
/// On the way in it refuses deliveries whose [`MESSAGE_TYPE_HEADER`] names another type;
/// deliveries without the header are accepted as long as their payload parses.
pub struct JsonCodec<T> {
    message_type: String,
    _message: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            _message: PhantomData,
        }
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }
}

impl<T> MessageCodec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    type Message = T;

    fn encode(&self, message: &T, persistent: bool) -> Result<WireMessage, anyhow::Error> {
        let payload = serde_json::to_vec(message)
            .with_context(|| format!("Failed to serialize a `{}` as JSON", self.message_type))?;

        let properties = BasicProperties::default()
            .with_content_type(CONTENT_TYPE.into())
            .with_delivery_mode(if persistent { PERSISTENT } else { TRANSIENT });
        let properties = set_header(
            properties,
            MESSAGE_TYPE_HEADER,
            AMQPValue::LongString(self.message_type.clone().into()),
        );

        Ok(WireMessage {
            payload,
            properties: inject_amqp_properties(properties),
        })
    }

    fn decode(
        &self,
        delivery: WireDelivery,
        queue: &str,
    ) -> Result<MessageDelivery<T>, anyhow::Error> {
        if let Some(message_type) = delivery.properties.get_header_str(MESSAGE_TYPE_HEADER) {
            if message_type != self.message_type.as_str() {
                anyhow::bail!(
                    "Expected a `{}` message, received a `{}` one",
                    self.message_type,
                    message_type
                );
            }
        }

        let message = serde_json::from_slice(&delivery.data).with_context(|| {
            format!("Failed to deserialize a `{}` from JSON", self.message_type)
        })?;

        Ok(MessageDelivery {
            message,
            delivery_tag: delivery.delivery_tag,
            queue: queue.to_owned(),
            redelivered: delivery.redelivered,
            properties: delivery.properties,
        })
    }
}

/// Set a timestamp and a message id on the outgoing properties, unless they are already there.
fn inject_amqp_properties(properties: BasicProperties) -> BasicProperties {
    let current_timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|ct| ct.as_secs());

    let properties = match (current_timestamp, *properties.timestamp()) {
        (_, Some(_)) => properties,
        (Some(ct), None) => properties.with_timestamp(ct),
        (None, None) => {
            warn!("System time is before 1970");
            properties
        }
    };

    if properties.message_id().is_some() {
        properties
    } else {
        properties.with_message_id(Uuid::new_v4().to_string().into())
    }
}
