//! Message envelope: identity, payload, and typed annotations.
//!
//! A [`Message`] is owned by exactly one [`Exchange`](crate::Exchange) at a
//! time. Steps mutate the payload in place and may attach annotations
//! ([`Metadata`]) that later steps or completion callbacks query by type.

use std::any::Any;
use std::fmt;

use uuid::Uuid;

// ---------------------------------------------------------------------------
// MessageId
// ---------------------------------------------------------------------------

/// Unique identifier assigned to a message at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(Uuid);

impl MessageId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// An annotation attached to a message.
///
/// Implemented for every `Debug + Send + Sync + 'static` type, so callers
/// attach plain structs and query them back by concrete type.
pub trait Metadata: Any + fmt::Debug + Send + Sync {
    /// Upcast used for typed lookup.
    fn as_any(&self) -> &dyn Any;
}

impl<M: Any + fmt::Debug + Send + Sync> Metadata for M {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Envelope carrying a payload of type `T` through a route.
#[derive(Debug)]
pub struct Message<T> {
    id: MessageId,
    content: T,
    metadata: Vec<Box<dyn Metadata>>,
}

impl<T> Message<T> {
    /// Creates a message with a freshly generated id and no annotations.
    pub fn new(content: T) -> Self {
        Self {
            id: MessageId::generate(),
            content,
            metadata: Vec::new(),
        }
    }

    /// Returns the message id. Never changes for the lifetime of the message.
    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    #[must_use]
    pub fn content(&self) -> &T {
        &self.content
    }

    pub fn content_mut(&mut self) -> &mut T {
        &mut self.content
    }

    /// Replaces the payload, returning the previous one.
    pub fn set_content(&mut self, content: T) -> T {
        std::mem::replace(&mut self.content, content)
    }

    /// Consumes the message and returns its payload.
    pub fn into_content(self) -> T {
        self.content
    }

    /// Appends an annotation. Annotations keep insertion order.
    pub fn add_metadata<M: Metadata>(&mut self, annotation: M) {
        self.metadata.push(Box::new(annotation));
    }

    /// Builder-style variant of [`add_metadata`](Self::add_metadata).
    #[must_use]
    pub fn with_metadata<M: Metadata>(mut self, annotation: M) -> Self {
        self.add_metadata(annotation);
        self
    }

    /// Returns every annotation of type `M`, in insertion order.
    ///
    /// An empty iterator is a normal result, not an error.
    pub fn query_metadata<M: Metadata>(&self) -> impl Iterator<Item = &M> + '_ {
        self.metadata
            .iter()
            .filter_map(|annotation| (**annotation).as_any().downcast_ref::<M>())
    }

    /// Returns the first annotation of type `M`, if any.
    #[must_use]
    pub fn first_metadata<M: Metadata>(&self) -> Option<&M> {
        self.query_metadata::<M>().next()
    }

    /// Iterates all annotations regardless of type.
    pub fn metadata(&self) -> impl Iterator<Item = &dyn Metadata> + '_ {
        self.metadata.iter().map(|annotation| &**annotation)
    }

    /// Number of annotations attached.
    #[must_use]
    pub fn metadata_len(&self) -> usize {
        self.metadata.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
