//! Values recorded on spans: attributes, annotations, message events and
//! links.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::trace::SpanContext;

/// The value of a span attribute.
///
/// Exactly one variant is set per value. Empty strings are legal and
/// round-trip unchanged.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    /// A string value.
    String(Cow<'static, str>),
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer value.
    I64(i64),
}

impl From<&'static str> for AttributeValue {
    fn from(value: &'static str) -> Self {
        AttributeValue::String(Cow::Borrowed(value))
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(Cow::Owned(value))
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::I64(value)
    }
}

/// A text annotation with optional attributes, timestamped when recorded on
/// a span.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Annotation {
    description: Cow<'static, str>,
    attributes: HashMap<String, AttributeValue>,
}

impl Annotation {
    /// Create an annotation from a description only.
    pub fn new(description: impl Into<Cow<'static, str>>) -> Self {
        Annotation {
            description: description.into(),
            attributes: HashMap::new(),
        }
    }

    /// Create an annotation from a description and attributes.
    pub fn with_attributes(
        description: impl Into<Cow<'static, str>>,
        attributes: HashMap<String, AttributeValue>,
    ) -> Self {
        Annotation {
            description: description.into(),
            attributes,
        }
    }

    /// The annotation text.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The attributes attached to the annotation.
    pub fn attributes(&self) -> &HashMap<String, AttributeValue> {
        &self.attributes
    }
}

impl From<&'static str> for Annotation {
    fn from(description: &'static str) -> Self {
        Annotation::new(description)
    }
}

impl From<String> for Annotation {
    fn from(description: String) -> Self {
        Annotation::new(description)
    }
}

/// Whether a message was sent or received.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageEventType {
    /// The message was sent by this process.
    Sent,
    /// The message was received by this process.
    Received,
}

/// A message (or network) event recorded on a span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    /// Direction of the message.
    pub event_type: MessageEventType,
    /// An id for the message, unique within the direction for this span.
    pub id: u64,
    /// The size of the message before compression, in bytes.
    pub uncompressed_size: u64,
    /// The size of the message on the wire, in bytes. Zero if unknown.
    pub compressed_size: u64,
}

impl MessageEvent {
    /// Create a message event with sizes left at zero.
    pub fn new(event_type: MessageEventType, id: u64) -> Self {
        MessageEvent {
            event_type,
            id,
            uncompressed_size: 0,
            compressed_size: 0,
        }
    }

    /// Set the uncompressed size.
    pub fn with_uncompressed_size(mut self, size: u64) -> Self {
        self.uncompressed_size = size;
        self
    }

    /// Set the compressed size.
    pub fn with_compressed_size(mut self, size: u64) -> Self {
        self.compressed_size = size;
        self
    }
}

/// The relationship of a linked span to the linking one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkType {
    /// The linked span is a child of the current span.
    ChildLinkedSpan,
    /// The linked span is a parent of the current span.
    ParentLinkedSpan,
}

/// A pointer from a span to another span, possibly in a different trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Link {
    context: SpanContext,
    link_type: LinkType,
}

impl Link {
    /// Create a link to `context`.
    pub fn new(context: SpanContext, link_type: LinkType) -> Self {
        Link { context, link_type }
    }

    /// The linked span's context.
    pub fn context(&self) -> &SpanContext {
        &self.context
    }

    /// The relationship of the linked span.
    pub fn link_type(&self) -> LinkType {
        self.link_type
    }
}
