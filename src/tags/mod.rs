//! Tag keys, values and the immutable tag context.
//!
//! A [`TagContext`] is the unit of stats labelling: every recorded batch of
//! measurements carries one, and views group their aggregates by the values
//! of the tag keys they select. Contexts are immutable; mutation goes
//! through [`TagContextBuilder`], which copies on build.
//!
//! Propagating a context across process boundaries is the job of an
//! external serializer, not this module.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// The maximum length of a tag key or tag value.
pub const MAX_LENGTH: usize = 255;

/// Errors returned when constructing tags.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TagError {
    /// The key was empty, too long, or not printable ASCII.
    #[error("invalid tag key: {0}")]
    InvalidKey(String),
    /// The value was too long or not printable ASCII.
    #[error("invalid tag value: {0}")]
    InvalidValue(String),
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7e).contains(&b))
}

/// The name of a tag, restricted to printable ASCII of at most
/// [`MAX_LENGTH`] bytes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TagKey(Cow<'static, str>);

impl TagKey {
    /// Create a tag key, validating the census naming rules.
    pub fn new(key: impl Into<Cow<'static, str>>) -> Result<Self, TagError> {
        let key = key.into();
        if key.is_empty() || key.len() > MAX_LENGTH || !is_printable_ascii(&key) {
            return Err(TagError::InvalidKey(key.into_owned()));
        }
        Ok(TagKey(key))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The value of a tag, restricted to printable ASCII of at most
/// [`MAX_LENGTH`] bytes. Empty values are allowed.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TagValue(Cow<'static, str>);

impl TagValue {
    /// Create a tag value, validating the census rules.
    pub fn new(value: impl Into<Cow<'static, str>>) -> Result<Self, TagError> {
        let value = value.into();
        if value.len() > MAX_LENGTH || !is_printable_ascii(&value) {
            return Err(TagError::InvalidValue(value.into_owned()));
        }
        Ok(TagValue(value))
    }

    /// The value as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A key-value label.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Tag {
    /// The tag name.
    pub key: TagKey,
    /// The tag value.
    pub value: TagValue,
}

impl Tag {
    /// Create a tag from a key and a value.
    pub fn new(key: TagKey, value: TagValue) -> Self {
        Tag { key, value }
    }
}

/// An immutable, unordered map from [`TagKey`] to [`TagValue`].
///
/// Cloning is cheap; the underlying map is shared. Two contexts are equal
/// iff they contain the same entries, regardless of insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagContext {
    tags: Arc<HashMap<TagKey, TagValue>>,
}

impl TagContext {
    /// The context with no tags.
    pub fn empty() -> Self {
        TagContext::default()
    }

    /// Start building a context from scratch.
    pub fn builder() -> TagContextBuilder {
        TagContextBuilder::default()
    }

    /// Start building a context seeded with this context's entries.
    pub fn to_builder(&self) -> TagContextBuilder {
        TagContextBuilder {
            tags: self.tags.as_ref().clone(),
        }
    }

    /// The value for `key`, if present.
    pub fn get(&self, key: &TagKey) -> Option<&TagValue> {
        self.tags.get(key)
    }

    /// Iterate over the entries in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&TagKey, &TagValue)> {
        self.tags.iter()
    }

    /// The number of tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether the context has no tags.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Builder for [`TagContext`].
#[derive(Debug, Default)]
pub struct TagContextBuilder {
    tags: HashMap<TagKey, TagValue>,
}

impl TagContextBuilder {
    /// Insert or replace a tag.
    pub fn put(mut self, key: TagKey, value: TagValue) -> Self {
        self.tags.insert(key, value);
        self
    }

    /// Remove a tag if present.
    pub fn remove(mut self, key: &TagKey) -> Self {
        self.tags.remove(key);
        self
    }

    /// Finish building, copying the accumulated entries into an immutable
    /// context.
    pub fn build(self) -> TagContext {
        TagContext {
            tags: Arc::new(self.tags),
        }
    }
}
