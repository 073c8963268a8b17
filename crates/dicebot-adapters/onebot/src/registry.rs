//! The two role slots and the "running" flag.
//!
//! Both slots live under a single lock so they are never observed
//! half-updated. Sessions displaced by an install are closed after the lock
//! is released.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::session::Session;

#[derive(Default)]
struct Slots {
    api: Option<Arc<Session>>,
    event: Option<Arc<Session>>,
}

impl Slots {
    /// Clears `slot` if it holds `session`. Returns whether it did.
    fn take_if(slot: &mut Option<Arc<Session>>, session: &Arc<Session>) -> bool {
        match slot {
            Some(current) if Arc::ptr_eq(current, session) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    fn is_empty(&self) -> bool {
        self.api.is_none() && self.event.is_none()
    }
}

/// At most one session per role slot.
#[derive(Default)]
pub struct SessionRegistry {
    slots: Mutex<Slots>,
    running: AtomicBool,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `session` into the slot(s) its role occupies.
    ///
    /// A different session previously in one of those slots is removed from
    /// every slot it held and closed.
    pub fn install(&self, session: Arc<Session>) {
        let role = session.role();
        let mut displaced: Vec<Arc<Session>> = Vec::with_capacity(2);

        {
            let mut slots = self.slots.lock();

            let mut replace = |slot: &mut Option<Arc<Session>>| {
                if let Some(old) = slot.replace(session.clone())
                    && !Arc::ptr_eq(&old, &session)
                    && !displaced.iter().any(|d| Arc::ptr_eq(d, &old))
                {
                    displaced.push(old);
                }
            };
            if role.serves_api() {
                replace(&mut slots.api);
            }
            if role.serves_events() {
                replace(&mut slots.event);
            }

            // A displaced unified session must not linger in the other slot.
            for old in &displaced {
                Slots::take_if(&mut slots.api, old);
                Slots::take_if(&mut slots.event, old);
            }

            self.running.store(true, Ordering::Release);
        }

        for old in displaced {
            if old.close() {
                info!(old = %old.id(), new = %session.id(), role = %old.role(), "Session replaced");
            }
        }
    }

    /// Removes `session` from every slot still pointing at it and closes it.
    ///
    /// Returns `true` when the `api` slot was cleared, in which case the
    /// caller must fail all pending calls.
    pub fn clear(&self, session: &Arc<Session>) -> bool {
        let api_cleared = {
            let mut slots = self.slots.lock();
            let api_cleared = Slots::take_if(&mut slots.api, session);
            Slots::take_if(&mut slots.event, session);
            if slots.is_empty() {
                self.running.store(false, Ordering::Release);
            }
            api_cleared
        };

        session.close();
        debug!(session = %session.id(), api_cleared, "Session cleared");
        api_cleared
    }

    /// The session API calls go through: the `api` slot, else a unified
    /// session in the `event` slot.
    pub fn active_api_session(&self) -> Option<Arc<Session>> {
        let slots = self.slots.lock();
        if let Some(api) = &slots.api {
            return Some(api.clone());
        }
        slots
            .event
            .as_ref()
            .filter(|s| s.role().serves_api())
            .cloned()
    }

    /// The session currently feeding events, if any.
    #[cfg(test)]
    pub fn event_session(&self) -> Option<Arc<Session>> {
        self.slots.lock().event.clone()
    }

    /// Empties both slots and returns the distinct sessions they held.
    ///
    /// The sessions are not closed.
    pub fn take_all(&self) -> Vec<Arc<Session>> {
        let mut slots = self.slots.lock();
        let api = slots.api.take();
        let event = slots.event.take();
        self.running.store(false, Ordering::Release);

        let mut sessions: Vec<_> = api.into_iter().collect();
        if let Some(event) = event
            && !sessions.iter().any(|s| Arc::ptr_eq(s, &event))
        {
            sessions.push(event);
        }
        sessions
    }

    /// Whether at least one session is installed.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionRole;
    use crate::testing::fake_sink;

    fn session(role: SessionRole) -> Arc<Session> {
        let (sink, _rx) = fake_sink();
        Session::new(role, sink)
    }

    #[test]
    fn test_unified_occupies_both_slots() {
        let registry = SessionRegistry::new();
        let unified = session(SessionRole::Unified);

        registry.install(unified.clone());
        assert!(registry.is_running());
        assert!(Arc::ptr_eq(&registry.active_api_session().unwrap(), &unified));
        assert!(Arc::ptr_eq(&registry.event_session().unwrap(), &unified));

        // Cleared from both slots with a single close.
        assert!(registry.clear(&unified));
        assert!(unified.is_closed());
        assert!(!unified.close());
        assert!(!registry.is_running());
        assert!(registry.active_api_session().is_none());
        assert!(registry.event_session().is_none());
    }

    #[test]
    fn test_replacement_closes_previous() {
        let registry = SessionRegistry::new();
        let first = session(SessionRole::Event);
        let second = session(SessionRole::Event);

        registry.install(first.clone());
        registry.install(second.clone());

        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert!(Arc::ptr_eq(&registry.event_session().unwrap(), &second));

        // The displaced session's own cleanup must not evict its successor.
        assert!(!registry.clear(&first));
        assert!(Arc::ptr_eq(&registry.event_session().unwrap(), &second));
        assert!(registry.is_running());
    }

    #[test]
    fn test_reinstall_same_session_does_not_close() {
        let registry = SessionRegistry::new();
        let unified = session(SessionRole::Unified);
        registry.install(unified.clone());
        registry.install(unified.clone());
        assert!(!unified.is_closed());
    }

    #[test]
    fn test_api_only_replacing_unified_clears_event_slot() {
        let registry = SessionRegistry::new();
        let unified = session(SessionRole::Unified);
        let api = session(SessionRole::Api);

        registry.install(unified.clone());
        registry.install(api.clone());

        assert!(unified.is_closed());
        assert!(registry.event_session().is_none());
        assert!(Arc::ptr_eq(&registry.active_api_session().unwrap(), &api));
    }

    #[test]
    fn test_split_roles() {
        let registry = SessionRegistry::new();
        let api = session(SessionRole::Api);
        let event = session(SessionRole::Unknown);

        registry.install(api.clone());
        registry.install(event.clone());
        assert!(Arc::ptr_eq(&registry.active_api_session().unwrap(), &api));
        assert!(Arc::ptr_eq(&registry.event_session().unwrap(), &event));

        // An event-only session never serves API calls.
        assert!(registry.clear(&api));
        assert!(registry.active_api_session().is_none());
        assert!(registry.is_running());

        assert!(!registry.clear(&event));
        assert!(!registry.is_running());
    }

    #[test]
    fn test_take_all_dedups_unified() {
        let registry = SessionRegistry::new();
        let unified = session(SessionRole::Unified);
        registry.install(unified);

        let taken = registry.take_all();
        assert_eq!(taken.len(), 1);
        assert!(!registry.is_running());
        assert!(registry.take_all().is_empty());
    }
}
