//! Publish/subscribe dispatch
//!
//! Persistent handlers survive emission. One-shot handlers for an event are
//! dropped as a whole batch once that event is emitted, including any that
//! were registered while the emission was running.

use super::{EventKind, StudioEvent};
use crate::utils::token::Token;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub type Handler = Arc<dyn Fn(&StudioEvent) + Send + Sync>;

struct Registration {
    token: Token,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    persistent: HashMap<EventKind, Vec<Registration>>,
    one_shot: HashMap<EventKind, Vec<Handler>>,
}

impl Registry {
    fn is_taken(&self, token: &Token) -> bool {
        self.persistent
            .values()
            .flatten()
            .any(|r| &r.token == token)
    }
}

#[derive(Default)]
pub struct EventBus {
    registry: Mutex<Registry>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a persistent handler
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Token
    where
        F: Fn(&StudioEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let token = Token::generate(|t| registry.is_taken(t));
        registry.persistent.entry(kind).or_default().push(Registration {
            token: token.clone(),
            handler: Arc::new(handler),
        });
        token
    }

    /// Register a handler for the next emission of `kind` only
    pub fn once<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&StudioEvent) + Send + Sync + 'static,
    {
        self.registry
            .lock()
            .one_shot
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Remove a persistent handler. Unknown tokens are a no-op.
    pub fn off(&self, kind: EventKind, token: &Token) -> bool {
        let mut registry = self.registry.lock();
        let Some(registrations) = registry.persistent.get_mut(&kind) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|r| &r.token != token);
        registrations.len() != before
    }

    /// Deliver `event` to every handler registered for its kind.
    ///
    /// Handlers run without the registry locked, so they may register,
    /// remove or emit themselves.
    pub fn emit(&self, event: StudioEvent) {
        let kind = event.kind();
        let (persistent, one_shot) = {
            let registry = self.registry.lock();
            let persistent: Vec<Handler> = registry
                .persistent
                .get(&kind)
                .map(|regs| regs.iter().map(|r| r.handler.clone()).collect())
                .unwrap_or_default();
            let one_shot = registry.one_shot.get(&kind).cloned().unwrap_or_default();
            (persistent, one_shot)
        };

        if persistent.is_empty() && one_shot.is_empty() {
            return;
        }
        tracing::trace!(
            "Emitting {} to {} handlers",
            kind.as_str(),
            persistent.len() + one_shot.len()
        );

        for handler in persistent.iter().chain(one_shot.iter()) {
            handler(&event);
        }

        self.registry.lock().one_shot.remove(&kind);
    }

    /// Number of handlers (persistent and one-shot) registered for `kind`
    pub fn handler_count(&self, kind: EventKind) -> usize {
        let registry = self.registry.lock();
        registry.persistent.get(&kind).map_or(0, Vec::len)
            + registry.one_shot.get(&kind).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn remove_event(id: &str) -> StudioEvent {
        StudioEvent::RecordStopStreamRemove {
            source_id: id.to_string(),
        }
    }

    fn counter(bus: &EventBus, kind: EventKind) -> (Token, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let token = bus.on(kind, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (token, count)
    }

    #[test]
    fn test_persistent_handlers_survive_emit() {
        let bus = EventBus::new();
        let (_, count) = counter(&bus, EventKind::RecordStopStreamRemove);

        bus.emit(remove_event("a"));
        bus.emit(remove_event("b"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_handlers_receive_payload() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        bus.on(EventKind::RecordStopStreamRemove, move |event| {
            s.lock().push(event.source_id().to_string());
        });

        bus.emit(remove_event("desktop"));
        assert_eq!(*seen.lock(), vec!["desktop".to_string()]);
    }

    #[test]
    fn test_once_handlers_fire_once_as_a_batch() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let c = count.clone();
            bus.once(EventKind::RecordStopStreamRemove, move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.emit(remove_event("x"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(bus.handler_count(EventKind::RecordStopStreamRemove), 0);

        bus.emit(remove_event("x"));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        let c = count.clone();
        bus.once(EventKind::RecordStopStreamRemove, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(remove_event("x"));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_once_registered_during_emit_is_discarded_with_batch() {
        let bus = EventBus::new();
        let late = Arc::new(AtomicUsize::new(0));
        let inner_bus = bus.clone();
        let l = late.clone();
        bus.once(EventKind::RecordStopStreamRemove, move |_| {
            let l = l.clone();
            inner_bus.once(EventKind::RecordStopStreamRemove, move |_| {
                l.fetch_add(1, Ordering::SeqCst);
            });
        });

        bus.emit(remove_event("x"));
        bus.emit(remove_event("x"));
        assert_eq!(late.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_off_removes_only_that_handler() {
        let bus = EventBus::new();
        let (token, removed) = counter(&bus, EventKind::RecordStopStreamRemove);
        let (_, kept) = counter(&bus, EventKind::RecordStopStreamRemove);

        assert!(bus.off(EventKind::RecordStopStreamRemove, &token));
        assert!(!bus.off(EventKind::RecordStopStreamRemove, &token));
        assert!(!bus.off(EventKind::Stream, &token));

        bus.emit(remove_event("x"));
        assert_eq!(removed.load(Ordering::SeqCst), 0);
        assert_eq!(kept.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_emit_without_handlers_is_noop() {
        let bus = EventBus::new();
        bus.emit(remove_event("nobody"));
        assert_eq!(bus.handler_count(EventKind::RecordStopStreamRemove), 0);
    }

    #[test]
    fn test_handler_can_unregister_itself() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let token_slot: Arc<Mutex<Option<Token>>> = Arc::new(Mutex::new(None));

        let inner_bus = bus.clone();
        let slot = token_slot.clone();
        let c = count.clone();
        let token = bus.on(EventKind::RecordStopStreamRemove, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(token) = slot.lock().as_ref() {
                inner_bus.off(EventKind::RecordStopStreamRemove, token);
            }
        });
        *token_slot.lock() = Some(token);

        bus.emit(remove_event("x"));
        bus.emit(remove_event("x"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
