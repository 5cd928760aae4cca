//! # Replies
//!
//! Purpose: Own one decoded server reply and expose its elements as borrowed
//! views. A `ReplyView` cannot outlive the `Reply` it was taken from, so array
//! element access needs no reference counting.
//!
//! ## Accessor Semantics
//! - `to_text` renders status and bulk payloads; other variants give `None`.
//! - `as_i64` accepts integer replies and decimal bulk/status payloads.
//! - `error_message` is only set for `-ERR` style replies.

use std::borrow::Cow;

use hkv_common::{HkvError, HkvResult};

/// RESP2 reply value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// +OK or +PONG style responses.
    Status(Vec<u8>),
    /// -ERR ... responses.
    Error(Vec<u8>),
    /// :123 responses.
    Integer(i64),
    /// $... bulk strings, with None for null.
    Bulk(Option<Vec<u8>>),
    /// *... arrays.
    Array(Vec<Reply>),
}

/// Borrowed view of a reply or one of its nested elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyView<'a> {
    inner: &'a Reply,
}

impl Reply {
    /// Borrows the whole reply as a view.
    pub fn view(&self) -> ReplyView<'_> {
        ReplyView { inner: self }
    }

    /// True for every reply except `-ERR`.
    pub fn is_ok(&self) -> bool {
        !self.is_error()
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Bulk(None))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Reply::Integer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Reply::Array(_))
    }

    /// Raw payload of status and bulk replies.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Status(data) => Some(data),
            Reply::Bulk(Some(data)) => Some(data),
            _ => None,
        }
    }

    /// Payload rendered as UTF-8 (lossy).
    pub fn to_text(&self) -> Option<Cow<'_, str>> {
        self.as_bytes().map(String::from_utf8_lossy)
    }

    /// Integer value, parsing decimal payloads when needed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Reply::Integer(value) => Some(*value),
            Reply::Status(data) | Reply::Bulk(Some(data)) => {
                std::str::from_utf8(data).ok()?.trim().parse().ok()
            }
            _ => None,
        }
    }

    /// Error text of a `-ERR` reply.
    pub fn error_message(&self) -> Option<Cow<'_, str>> {
        match self {
            Reply::Error(message) => Some(String::from_utf8_lossy(message)),
            _ => None,
        }
    }

    /// Number of array elements; zero for scalars.
    pub fn len(&self) -> usize {
        match self {
            Reply::Array(items) => items.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrows array element `index`.
    pub fn get(&self, index: usize) -> Option<ReplyView<'_>> {
        match self {
            Reply::Array(items) => items.get(index).map(Reply::view),
            _ => None,
        }
    }

    /// Iterates array elements as views; empty for scalars.
    pub fn iter(&self) -> impl Iterator<Item = ReplyView<'_>> {
        let items: &[Reply] = match self {
            Reply::Array(items) => items,
            _ => &[],
        };
        items.iter().map(Reply::view)
    }

    /// Converts `-ERR` replies into `HkvError::Command`.
    pub fn into_result(self) -> HkvResult<Reply> {
        match self {
            Reply::Error(message) => Err(HkvError::Command(
                String::from_utf8_lossy(&message).into_owned(),
            )),
            other => Ok(other),
        }
    }
}

impl<'a> ReplyView<'a> {
    pub fn reply(&self) -> &'a Reply {
        self.inner
    }

    pub fn is_nil(&self) -> bool {
        self.inner.is_nil()
    }

    pub fn is_error(&self) -> bool {
        self.inner.is_error()
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        self.inner.as_bytes()
    }

    pub fn to_text(&self) -> Option<Cow<'a, str>> {
        self.inner.to_text()
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.inner.as_i64()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<ReplyView<'a>> {
        self.inner.get(index)
    }

    /// Clones the viewed element into an owned reply.
    pub fn to_owned_reply(&self) -> Reply {
        self.inner.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_array() -> Reply {
        Reply::Array(vec![
            Reply::Bulk(Some(b"10".to_vec())),
            Reply::Bulk(None),
            Reply::Array(vec![Reply::Integer(7)]),
        ])
    }

    #[test]
    fn views_borrow_nested_elements() {
        let reply = sample_array();
        assert_eq!(reply.len(), 3);
        assert_eq!(reply.get(0).and_then(|v| v.as_i64()), Some(10));
        assert!(reply.get(1).map(|v| v.is_nil()).unwrap_or(false));
        let nested = reply.get(2).and_then(|v| v.get(0)).expect("nested");
        assert_eq!(nested.as_i64(), Some(7));
        assert!(reply.get(3).is_none());
    }

    #[test]
    fn scalar_accessors() {
        let status = Reply::Status(b"OK".to_vec());
        assert_eq!(status.to_text().as_deref(), Some("OK"));
        assert!(status.is_ok());
        assert_eq!(status.len(), 0);
        assert!(status.get(0).is_none());
        assert_eq!(status.iter().count(), 0);

        assert_eq!(Reply::Integer(-2).as_i64(), Some(-2));
        assert_eq!(Reply::Bulk(Some(b"abc".to_vec())).as_i64(), None);
        assert_eq!(Reply::Bulk(None).to_text(), None);
    }

    #[test]
    fn error_replies_convert_to_command_errors() {
        let reply = Reply::Error(b"ERR unknown command".to_vec());
        assert!(reply.is_error());
        assert_eq!(reply.error_message().as_deref(), Some("ERR unknown command"));
        match reply.into_result() {
            Err(HkvError::Command(message)) => assert_eq!(message, "ERR unknown command"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(Reply::Integer(1).into_result().is_ok());
    }
}
