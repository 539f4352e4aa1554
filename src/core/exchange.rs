//! The unit of work flowing through a route.
//!
//! An [`Exchange`] is created by a consumer for every piece of inbound work, mutated in
//! place by each processor of a route and dropped once the chain (and any destination
//! sends) complete. Exchanges are never pooled.
use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::{error::Error, message::Message, value::Value};

/// Well-known header and property names used by the engine and the built-in components.
pub mod keys {
    pub const FILE_NAME: &str = "CourierFileName";
    pub const FILE_PATH: &str = "CourierFilePath";
    pub const FILE_LENGTH: &str = "CourierFileLength";
    pub const FILE_LAST_MODIFIED: &str = "CourierFileLastModified";

    pub const HTTP_METHOD: &str = "CourierHttpMethod";
    pub const HTTP_URL: &str = "CourierHttpUrl";
    pub const HTTP_PATH: &str = "CourierHttpPath";
    pub const HTTP_QUERY: &str = "CourierHttpQuery";
    pub const HTTP_RESPONSE_CODE: &str = "CourierHttpResponseCode";

    pub const EXCHANGE_ID: &str = "CourierExchangeId";
    pub const ROUTE_ID: &str = "CourierRouteId";

    pub const EXCEPTION_CAUGHT: &str = "CourierExceptionCaught";
    pub const FAILURE_ROUTE_ID: &str = "CourierFailureRouteId";
    pub const FAILURE_ENDPOINT: &str = "CourierFailureEndpoint";
}

#[derive(Debug)]
pub struct Exchange {
    id: String,
    scope: CancellationToken,
    in_msg: Message,
    out_msg: Message,
    properties: HashMap<String, Value>,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
    error: Option<Error>,
}

impl Exchange {
    /// Create an empty exchange bound to the given execution scope.
    pub fn new(scope: CancellationToken) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            scope,
            in_msg: Message::new(),
            out_msg: Message::new(),
            properties: HashMap::new(),
            created: now,
            modified: now,
            error: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cancellation scope inherited from the owning context.
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    fn touch(&mut self) {
        self.modified = Utc::now();
    }

    pub fn in_message(&self) -> &Message {
        &self.in_msg
    }

    pub fn in_message_mut(&mut self) -> &mut Message {
        self.touch();
        &mut self.in_msg
    }

    pub fn out_message(&self) -> &Message {
        &self.out_msg
    }

    pub fn out_message_mut(&mut self) -> &mut Message {
        self.touch();
        &mut self.out_msg
    }

    // In-message shortcuts

    pub fn body(&self) -> &Value {
        self.in_msg.body()
    }

    pub fn set_body(&mut self, body: impl Into<Value>) {
        self.in_msg.set_body(body);
        self.touch();
    }

    pub fn header(&self, key: &str) -> Option<&Value> {
        self.in_msg.header(key)
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.in_msg.set_header(key, value);
        self.touch();
    }

    // Properties

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn property_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.properties
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.into())
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
        self.touch();
    }

    /// Merge properties, overwriting existing keys.
    pub fn set_properties<I, K, V>(&mut self, properties: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.properties
            .extend(properties.into_iter().map(|(k, v)| (k.into(), v.into())));
        self.touch();
    }

    pub fn remove_property(&mut self, key: &str) -> Option<Value> {
        let removed = self.properties.remove(key);
        self.touch();
        removed
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }

    pub fn clear_properties(&mut self) {
        self.properties.clear();
        self.touch();
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.property(key).and_then(Value::as_str)
    }

    pub fn property_int(&self, key: &str) -> Option<i64> {
        self.property(key).and_then(Value::as_int)
    }

    pub fn property_bool(&self, key: &str) -> Option<bool> {
        self.property(key).and_then(Value::as_bool)
    }

    pub fn property_float(&self, key: &str) -> Option<f64> {
        self.property(key).and_then(Value::as_float)
    }

    pub fn property_time(&self, key: &str) -> Option<DateTime<Utc>> {
        self.property(key).and_then(Value::as_time)
    }

    pub fn property_duration(&self, key: &str) -> Option<Duration> {
        self.property(key).and_then(Value::as_duration)
    }

    pub fn property_map(&self, key: &str) -> Option<&HashMap<String, Value>> {
        self.property(key).and_then(Value::as_map)
    }

    pub fn property_list(&self, key: &str) -> Option<&[Value]> {
        self.property(key).and_then(Value::as_list)
    }

    // Error slot

    /// A present error marks the exchange as failed.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn set_error(&mut self, error: Error) {
        self.error = Some(error);
        self.touch();
    }

    pub fn clear_error(&mut self) -> Option<Error> {
        let previous = self.error.take();
        self.touch();
        previous
    }

    /// Copy sharing the execution scope, with independent messages and properties.
    /// `created` is preserved and `modified` is reset to now.
    pub fn copy(&self) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            scope: self.scope.clone(),
            in_msg: self.in_msg.copy(),
            out_msg: self.out_msg.copy(),
            properties: self.properties.clone(),
            created: self.created,
            modified: Utc::now(),
            error: self.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use super::*;

    fn exchange() -> Exchange {
        Exchange::new(CancellationToken::new())
    }

    #[test]
    fn test_body_and_headers_delegate_to_in() {
        let mut ex = exchange();
        ex.set_body("hello");
        ex.set_header("x", 1);

        assert_eq!(ex.in_message().body().as_str(), Some("hello"));
        assert_eq!(ex.in_message().header("x").and_then(Value::as_int), Some(1));
        assert!(ex.out_message().body().is_null());
    }

    #[test]
    fn test_typed_property_getters() {
        let mut ex = exchange();
        ex.set_property("name", "orders");
        ex.set_property("count", 3);
        ex.set_property("flag", true);
        ex.set_property("ratio", 0.5);
        ex.set_property("wait", StdDuration::from_secs(2));

        assert_eq!(ex.property_str("name"), Some("orders"));
        assert_eq!(ex.property_int("count"), Some(3));
        assert_eq!(ex.property_bool("flag"), Some(true));
        assert_eq!(ex.property_float("ratio"), Some(0.5));
        assert_eq!(ex.property_duration("wait"), Some(StdDuration::from_secs(2)));

        // mismatched type reads as not found
        assert_eq!(ex.property_int("name"), None);
        assert_eq!(ex.property_str("missing"), None);
        assert!(ex.property_time("count").is_none());
    }

    #[test]
    fn test_property_or_and_remove() {
        let mut ex = exchange();
        assert_eq!(ex.property_or("retries", 5).as_int(), Some(5));

        ex.set_property("retries", 1);
        assert_eq!(ex.property_or("retries", 5).as_int(), Some(1));

        assert!(ex.remove_property("retries").is_some());
        assert!(!ex.has_property("retries"));
    }

    #[test]
    fn test_mutation_updates_modified() {
        let mut ex = exchange();
        let before = ex.modified();
        std::thread::sleep(StdDuration::from_millis(5));
        ex.set_property("k", "v");
        assert!(ex.modified() > before);
        assert_eq!(ex.created(), before);
    }

    #[test]
    fn test_copy_semantics() {
        let mut original = exchange();
        original.set_body("abc");
        original.set_property("p", "original");
        std::thread::sleep(StdDuration::from_millis(5));

        let mut copy = original.copy();
        assert_eq!(copy.created(), original.created());
        assert!(copy.modified() > original.modified());
        assert_ne!(copy.id(), original.id());

        copy.set_property("p", "changed");
        copy.set_header("only-on-copy", 1);

        assert_eq!(original.property_str("p"), Some("original"));
        assert!(original.header("only-on-copy").is_none());
        assert_eq!(copy.body().as_str(), Some("abc"));
    }

    #[test]
    fn test_copy_shares_scope() {
        let original = exchange();
        let copy = original.copy();
        original.scope().cancel();
        assert!(copy.is_cancelled());
    }

    #[test]
    fn test_error_slot() {
        let mut ex = exchange();
        assert!(!ex.is_failed());
        ex.set_error(Error::processor("bad"));
        assert!(ex.is_failed());
        assert!(ex.clear_error().is_some());
        assert!(ex.error().is_none());
    }
}
