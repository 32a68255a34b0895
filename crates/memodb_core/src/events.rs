//! Observer registries for entity changes.
//!
//! Each controller owns an [`EventRegistry`]. Events are emitted only after
//! the transaction that produced them commits, and emitting never blocks:
//! every subscriber has its own unbounded channel, and listeners run on
//! their own tokio task.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut events = memos.subscribe();
//! memos.create_memo(&ctx, CreateMemo::new("hello")).await?;
//! assert!(matches!(events.recv().await, Some(EntityEvent::Created { .. })));
//! ```

use crate::error::{CoreError, CoreResult};
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// What happened to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityEvent {
    /// The entity was created.
    Created {
        /// Entity id.
        id: String,
    },
    /// The entity changed.
    Changed {
        /// Entity id.
        id: String,
    },
}

impl EntityEvent {
    /// Creates a `Created` event.
    pub fn created(id: impl Into<String>) -> Self {
        Self::Created { id: id.into() }
    }

    /// Creates a `Changed` event.
    pub fn changed(id: impl Into<String>) -> Self {
        Self::Changed { id: id.into() }
    }

    /// Returns the entity id.
    pub fn id(&self) -> &str {
        match self {
            Self::Created { id } | Self::Changed { id } => id,
        }
    }
}

/// Distributes [`EntityEvent`]s to subscribers.
pub struct EventRegistry {
    name: &'static str,
    subscribers: RwLock<Vec<UnboundedSender<EntityEvent>>>,
}

impl EventRegistry {
    /// Creates a registry; `name` appears in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> UnboundedReceiver<EntityEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Calls `listener` on a background task for every future event.
    ///
    /// The task ends when the registry is dropped or the handle aborted.
    ///
    /// # Errors
    ///
    /// Fails outside of a tokio runtime.
    pub fn add_listener<F>(&self, listener: F) -> CoreResult<JoinHandle<()>>
    where
        F: Fn(EntityEvent) + Send + 'static,
    {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| CoreError::validation(format!("cannot add {} listener: {e}", self.name)))?;
        let mut rx = self.subscribe();
        Ok(handle.spawn(async move {
            while let Some(event) = rx.recv().await {
                listener(event);
            }
        }))
    }

    /// Sends `event` to every live subscriber, dropping closed ones.
    pub fn emit(&self, event: EntityEvent) {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if subscribers.len() < before {
            tracing::debug!(
                registry = self.name,
                dropped = before - subscribers.len(),
                "removed closed event subscribers"
            );
        }
    }

    /// Sends several events in order.
    pub fn emit_all(&self, events: impl IntoIterator<Item = EntityEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn multiple_subscribers() {
        let registry = EventRegistry::new("memos");
        let mut a = registry.subscribe();
        let mut b = registry.subscribe();

        registry.emit(EntityEvent::created("m1"));
        assert_eq!(a.recv().await, Some(EntityEvent::created("m1")));
        assert_eq!(b.recv().await, Some(EntityEvent::created("m1")));
    }

    #[tokio::test]
    async fn closed_subscribers_are_removed() {
        let registry = EventRegistry::new("memos");
        let rx = registry.subscribe();
        assert_eq!(registry.subscriber_count(), 1);
        drop(rx);

        registry.emit(EntityEvent::changed("m1"));
        assert_eq!(registry.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn listener_runs_in_background() {
        let registry = EventRegistry::new("settings");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = registry
            .add_listener(move |event| {
                let _ = tx.send(event.id().to_string());
            })
            .unwrap();

        registry.emit_all([EntityEvent::changed("theme.mode"), EntityEvent::changed("locale")]);

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(first.as_deref(), Some("theme.mode"));
        assert_eq!(second.as_deref(), Some("locale"));
    }

    #[test]
    fn listener_needs_runtime() {
        let registry = Arc::new(EventRegistry::new("memos"));
        assert!(registry.add_listener(|_| {}).is_err());
    }
}
