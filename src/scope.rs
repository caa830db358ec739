//! Ambient span and tag scope.
//!
//! The primary recording APIs take their context as explicit arguments.
//! This module is the secondary, convenience surface: a thread-local
//! "current" span context and tag context with RAII guards that restore the
//! previous value on drop, for call stacks where threading the context
//! through every signature is impractical.

use std::cell::RefCell;

use crate::tags::TagContext;
use crate::trace::SpanContext;

thread_local! {
    static CURRENT_SPAN: RefCell<Option<SpanContext>> = const { RefCell::new(None) };
    static CURRENT_TAGS: RefCell<Option<TagContext>> = const { RefCell::new(None) };
}

/// Restores the previously current span context on drop.
#[derive(Debug)]
pub struct SpanScope {
    previous: Option<SpanContext>,
}

impl Drop for SpanScope {
    fn drop(&mut self) {
        CURRENT_SPAN.with(|current| *current.borrow_mut() = self.previous.take());
    }
}

/// Make `context` the current span context for this thread until the
/// returned guard is dropped.
pub fn set_span(context: SpanContext) -> SpanScope {
    let previous = CURRENT_SPAN.with(|current| current.borrow_mut().replace(context));
    SpanScope { previous }
}

/// The current span context on this thread, if any.
pub fn current_span_context() -> Option<SpanContext> {
    CURRENT_SPAN.with(|current| *current.borrow())
}

/// Restores the previously current tag context on drop.
#[derive(Debug)]
pub struct TagScope {
    previous: Option<TagContext>,
}

impl Drop for TagScope {
    fn drop(&mut self) {
        CURRENT_TAGS.with(|current| *current.borrow_mut() = self.previous.take());
    }
}

/// Make `tags` the current tag context for this thread until the returned
/// guard is dropped.
pub fn set_tags(tags: TagContext) -> TagScope {
    let previous = CURRENT_TAGS.with(|current| current.borrow_mut().replace(tags));
    TagScope { previous }
}

/// The current tag context on this thread; empty if none was set.
pub fn current_tag_context() -> TagContext {
    CURRENT_TAGS.with(|current| current.borrow().clone().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::{TagKey, TagValue};
    use crate::trace::{SpanId, TraceId, TraceOptions};

    fn context(id: u64) -> SpanContext {
        SpanContext::new(
            TraceId::from(id as u128),
            SpanId::from(id),
            TraceOptions::DEFAULT,
        )
    }

    #[test]
    fn scopes_nest_and_restore() {
        assert_eq!(current_span_context(), None);
        {
            let _outer = set_span(context(1));
            assert_eq!(current_span_context(), Some(context(1)));
            {
                let _inner = set_span(context(2));
                assert_eq!(current_span_context(), Some(context(2)));
            }
            assert_eq!(current_span_context(), Some(context(1)));
        }
        assert_eq!(current_span_context(), None);
    }

    #[test]
    fn tag_scope_defaults_to_empty() {
        assert!(current_tag_context().is_empty());
        let tags = TagContext::builder()
            .put(TagKey::new("k").unwrap(), TagValue::new("v").unwrap())
            .build();
        {
            let _scope = set_tags(tags.clone());
            assert_eq!(current_tag_context(), tags);
        }
        assert!(current_tag_context().is_empty());
    }

    #[test]
    fn scopes_are_thread_local() {
        let _scope = set_span(context(7));
        std::thread::spawn(|| {
            assert_eq!(current_span_context(), None);
        })
        .join()
        .unwrap();
    }
}
