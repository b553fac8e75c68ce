//! Recording, fault-injecting relay backend.
//!
//! [`RecordingBackend`] wraps the in-memory card and logs every call with a
//! timestamp from `tokio::time`, so tests can check call counts, write order
//! and pulse timing (including under paused time). Clones share state: keep
//! one handle for assertions and box another into the dispatcher.

use std::sync::{Arc, Mutex};

use tokio::time::Instant;

use crelay_core::card::VirtualBackend;
use crelay_core::{BoxFuture, CardError, CardType, Channel, RelayBackend, RelayCard, RelayState};

/// One call made through the backend contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendCall {
    Probe,
    Get {
        channel: u8,
        at: Instant,
    },
    Set {
        channel: u8,
        state: RelayState,
        at: Instant,
    },
}

#[derive(Default)]
struct Faults {
    /// 1-based index of the `set` call that fails.
    fail_set_on: Option<usize>,
    fail_get: bool,
    sets_seen: usize,
}

struct Inner {
    card: VirtualBackend,
    calls: Mutex<Vec<BackendCall>>,
    faults: Mutex<Faults>,
}

/// In-memory backend that records calls and can inject failures.
#[derive(Clone)]
pub struct RecordingBackend {
    inner: Arc<Inner>,
}

impl RecordingBackend {
    /// A card with `num_relays` channels, all off, identified by `serial`.
    pub fn new(serial: &str, num_relays: u8) -> Self {
        Self {
            inner: Arc::new(Inner {
                card: VirtualBackend::new(serial, num_relays),
                calls: Mutex::new(Vec::new()),
                faults: Mutex::new(Faults::default()),
            }),
        }
    }

    /// Boxed handle sharing this backend's state, for a dispatcher.
    pub fn boxed(&self) -> Box<dyn RelayBackend> {
        Box::new(self.clone())
    }

    /// Make the `n`th `set` call from now on fail (1-based).
    pub fn fail_set_on(&self, n: usize) {
        let mut faults = self.inner.faults.lock().unwrap();
        faults.fail_set_on = Some(n);
        faults.sets_seen = 0;
    }

    /// Make every `get` call fail.
    pub fn fail_gets(&self, fail: bool) {
        self.inner.faults.lock().unwrap().fail_get = fail;
    }

    /// Set a channel's state directly, without recording a call.
    pub async fn preset(&self, channel: u32, state: RelayState) {
        let card = self.inner.card.detect(None).await.unwrap();
        let channel = card.channel(channel).expect("channel in range");
        self.inner.card.set(&card, channel, state).await.unwrap();
    }

    /// Read a channel's state directly, without recording a call.
    pub async fn state(&self, channel: u32) -> RelayState {
        let card = self.inner.card.detect(None).await.unwrap();
        let channel = card.channel(channel).expect("channel in range");
        self.inner.card.get(&card, channel).await.unwrap()
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.inner.calls.lock().unwrap().clone()
    }

    /// Recorded `get` and `set` calls, ignoring probes.
    pub fn hardware_calls(&self) -> Vec<BackendCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, BackendCall::Probe))
            .collect()
    }

    /// Recorded writes as `(channel, state, at)`.
    pub fn sets(&self) -> Vec<(u8, RelayState, Instant)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Set { channel, state, at } => Some((channel, state, at)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.inner.calls.lock().unwrap().clear();
    }

    fn record(&self, call: BackendCall) {
        self.inner.calls.lock().unwrap().push(call);
    }

    fn injected(what: &str) -> CardError {
        CardError::io("recording", std::io::Error::other(format!("injected {what} failure")))
    }
}

impl RelayBackend for RecordingBackend {
    fn card_type(&self) -> CardType {
        CardType::Virtual
    }

    fn probe(&self) -> BoxFuture<'_, Result<Vec<RelayCard>, CardError>> {
        self.record(BackendCall::Probe);
        self.inner.card.probe()
    }

    fn get<'a>(
        &'a self,
        card: &'a RelayCard,
        channel: Channel,
    ) -> BoxFuture<'a, Result<RelayState, CardError>> {
        self.record(BackendCall::Get {
            channel: channel.number(),
            at: Instant::now(),
        });
        if self.inner.faults.lock().unwrap().fail_get {
            return Box::pin(async { Err(Self::injected("read")) });
        }
        self.inner.card.get(card, channel)
    }

    fn set<'a>(
        &'a self,
        card: &'a RelayCard,
        channel: Channel,
        state: RelayState,
    ) -> BoxFuture<'a, Result<(), CardError>> {
        self.record(BackendCall::Set {
            channel: channel.number(),
            state,
            at: Instant::now(),
        });
        let fail = {
            let mut faults = self.inner.faults.lock().unwrap();
            faults.sets_seen += 1;
            faults.fail_set_on == Some(faults.sets_seen)
        };
        if fail {
            return Box::pin(async { Err(Self::injected("write")) });
        }
        self.inner.card.set(card, channel, state)
    }
}
