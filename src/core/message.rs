use std::collections::HashMap;

use crate::core::value::Value;

/// A body plus a header bag. The in/out payload carried by an [`Exchange`](crate::core::Exchange).
#[derive(Debug, Clone, Default)]
pub struct Message {
    body: Value,
    headers: HashMap<String, Value>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a message with the given body and no headers.
    pub fn with_body(body: impl Into<Value>) -> Self {
        Self {
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Value>) {
        self.body = body.into();
    }

    /// Move the body out, leaving `Null` behind.
    pub fn take_body(&mut self) -> Value {
        std::mem::take(&mut self.body)
    }

    pub fn header(&self, key: &str) -> Option<&Value> {
        self.headers.get(key)
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.headers.insert(key.into(), value.into());
    }

    pub fn remove_header(&mut self, key: &str) -> Option<Value> {
        self.headers.remove(key)
    }

    pub fn has_header(&self, key: &str) -> bool {
        self.headers.contains_key(key)
    }

    pub fn headers(&self) -> &HashMap<String, Value> {
        &self.headers
    }

    /// Merge headers, overwriting existing keys.
    pub fn set_headers<I, K, V>(&mut self, headers: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
    }

    pub fn clear_headers(&mut self) {
        self.headers.clear();
    }

    /// Independent copy: the header map is duplicated, byte and opaque bodies stay shared.
    pub fn copy(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn test_header_operations() {
        let mut msg = Message::new();
        msg.set_header("a", 1);
        msg.set_headers([("b", "two"), ("a", "one")]);

        assert_eq!(msg.header("a").and_then(Value::as_str), Some("one"));
        assert!(msg.has_header("b"));
        assert_eq!(msg.headers().len(), 2);

        assert!(msg.remove_header("b").is_some());
        assert!(!msg.has_header("b"));

        msg.clear_headers();
        assert!(msg.headers().is_empty());
    }

    #[test]
    fn test_copy_has_independent_headers() {
        let mut original = Message::with_body("payload");
        original.set_header("k", "v");

        let mut copy = original.copy();
        copy.set_header("k", "changed");
        copy.set_header("extra", true);

        assert_eq!(original.header("k").and_then(Value::as_str), Some("v"));
        assert!(!original.has_header("extra"));
    }

    #[test]
    fn test_copy_shares_byte_body() {
        let original = Message::with_body(Bytes::from(vec![1u8, 2, 3]));
        let copy = original.copy();

        let a = original.body().as_bytes().unwrap();
        let b = copy.body().as_bytes().unwrap();
        assert_eq!(a.as_ptr(), b.as_ptr());
    }

    #[test]
    fn test_take_body() {
        let mut msg = Message::with_body("x");
        assert_eq!(msg.take_body().as_str(), Some("x"));
        assert!(msg.body().is_null());
    }
}
