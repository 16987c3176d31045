use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Unified event type consumed by real-time session drivers. The engine
/// itself only ever sees `tick(delta_ms)` and `handle_key_press`; this
/// layer exists so any timer primitive (thread, event loop, test script)
/// can feed it.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    Key(char),
    Tick,
    Quit,
}

/// Source of player input events.
pub trait EngineEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<EngineEvent, RecvTimeoutError>;
}

/// Channel-backed event source; producers keep a `Sender` and push keys
/// from wherever input actually originates.
pub struct ChannelEventSource {
    tx: Sender<EngineEvent>,
    rx: Receiver<EngineEvent>,
}

impl ChannelEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<EngineEvent> {
        self.tx.clone()
    }
}

impl Default for ChannelEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineEventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<EngineEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Pre-scripted event source for unit tests: yields its events in order,
/// then times out forever.
pub struct ScriptedEventSource {
    rx: Receiver<EngineEvent>,
}

impl ScriptedEventSource {
    pub fn new(events: Vec<EngineEvent>) -> Self {
        let (tx, rx) = mpsc::channel();
        for event in events {
            let _ = tx.send(event);
        }
        Self { rx }
    }
}

impl EngineEventSource for ScriptedEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<EngineEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances a session driver one event at a time: real input
/// when it arrives, a Tick when the interval lapses without any.
pub struct Runner<E: EngineEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: EngineEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.ticker.interval()
    }

    /// Blocks up to the tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> EngineEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                EngineEvent::Tick
            }
        }
    }
}
