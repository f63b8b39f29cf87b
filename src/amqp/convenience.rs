use lapin::{types::AMQPValue, BasicProperties};
use std::borrow::{Borrow, Cow};

/// Convenience methods for [`lapin::BasicProperties`].
pub trait BasicPropertiesExt {
    /// Lookup header by key.
    fn get_header<Q>(&self, key: &Q) -> Option<&AMQPValue>
    where
        lapin::types::ShortString: Borrow<Q> + Ord,
        Q: Ord + ?Sized;

    /// Lookup a header string value.
    ///
    /// Returns `None` if not a string.
    fn get_header_str<Q>(&self, key: &Q) -> Option<Cow<'_, str>>
    where
        lapin::types::ShortString: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        match self.get_header(key) {
            Some(AMQPValue::LongString(s)) => Some(String::from_utf8_lossy(s.as_bytes())),
            Some(AMQPValue::ShortString(s)) => Some(Cow::Borrowed(s.as_str())),
            _ => None,
        }
    }
}

impl BasicPropertiesExt for lapin::BasicProperties {
    fn get_header<Q>(&self, key: &Q) -> Option<&AMQPValue>
    where
        lapin::types::ShortString: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.headers().as_ref()?.inner().get(key)
    }
}

/// Add (or replace) a header, returning the updated properties.
///
/// `lapin` offers no mutable access to the headers of a `BasicProperties`: the whole header
/// table is cloned.
///
/// ```rust
/// use carrot_cake_driver::amqp::convenience::{set_header, BasicPropertiesExt};
/// use carrot_cake_driver::amqp::types::AMQPValue;
/// use carrot_cake_driver::amqp::BasicProperties;
///
/// let properties = set_header(
///     BasicProperties::default(),
///     "message-type",
///     AMQPValue::LongString("order.created".into()),
/// );
///
/// assert_eq!(
///     properties.get_header_str("message-type").as_deref(),
///     Some("order.created")
/// );
/// ```
pub fn set_header(
    properties: BasicProperties,
    header_name: &str,
    header_value: AMQPValue,
) -> BasicProperties {
    let mut headers = properties
        .headers()
        .as_ref()
        .map(|h| h.to_owned())
        .unwrap_or_default();
    headers.insert(header_name.into(), header_value);
    properties.with_headers(headers)
}
