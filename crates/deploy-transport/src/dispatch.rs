use parking_lot::Mutex;

use crate::{ConnectionState, Listener, SessionEvent};

/// Connection state plus the listener slot, shared between a session handle
/// and its background tasks.
///
/// Listeners run under the slot lock and must not call back into the session.
pub(crate) struct Shared {
    state: Mutex<ConnectionState>,
    slot: Mutex<Slot>,
}

#[derive(Default)]
struct Slot {
    listener: Option<Listener>,
    backlog: Vec<SessionEvent>,
}

impl Shared {
    pub(crate) fn open() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Open),
            slot: Mutex::new(Slot::default()),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub(crate) fn deliver(&self, event: SessionEvent) {
        let mut guard = self.slot.lock();
        let slot = &mut *guard;
        match &slot.listener {
            Some(listener) => listener(event),
            None => slot.backlog.push(event),
        }
    }

    /// Inbound frames only flow while the session is open.
    pub(crate) fn frame(&self, text: String) {
        if self.state().is_open() {
            self.deliver(SessionEvent::Frame(text));
        }
    }

    pub(crate) fn replace_listener(&self, listener: Listener) {
        let mut slot = self.slot.lock();
        for event in slot.backlog.drain(..) {
            listener(event);
        }
        slot.listener = Some(listener);
    }

    /// Ends an open session. Returns `false` when it had already ended, so the
    /// `Ended` event goes out exactly once.
    pub(crate) fn end(&self, to: ConnectionState) -> bool {
        {
            let mut state = self.state.lock();
            if *state != ConnectionState::Open {
                return false;
            }
            *state = to;
        }
        self.deliver(SessionEvent::Ended(to));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder() -> (Listener, Arc<Mutex<Vec<SessionEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: Listener = Arc::new(move |event| sink.lock().push(event));
        (listener, seen)
    }

    #[test]
    fn backlog_is_replayed_to_first_listener() {
        let shared = Shared::open();
        shared.deliver(SessionEvent::Frame("early".into()));
        let (listener, seen) = recorder();
        shared.replace_listener(listener);
        shared.deliver(SessionEvent::Frame("late".into()));
        assert_eq!(
            seen.lock().as_slice(),
            [
                SessionEvent::Frame("early".into()),
                SessionEvent::Frame("late".into())
            ]
        );
    }

    #[test]
    fn replacing_listener_detaches_previous() {
        let shared = Shared::open();
        let (first, first_seen) = recorder();
        let (second, second_seen) = recorder();
        shared.replace_listener(first);
        shared.replace_listener(second);
        shared.deliver(SessionEvent::Frame("x".into()));
        assert!(first_seen.lock().is_empty());
        assert_eq!(second_seen.lock().len(), 1);
    }

    #[test]
    fn end_fires_once() {
        let shared = Shared::open();
        let (listener, seen) = recorder();
        shared.replace_listener(listener);
        assert!(shared.end(ConnectionState::Failed));
        assert!(!shared.end(ConnectionState::Closed));
        assert_eq!(shared.state(), ConnectionState::Failed);
        assert_eq!(
            seen.lock().as_slice(),
            [SessionEvent::Ended(ConnectionState::Failed)]
        );
    }
}
