//! Result sinks
//!
//! The loop driver reports session transitions and per-frame ticks through a
//! [`ResultSink`]. Sinks are called from the classification worker while the
//! session lock is held, so they must return quickly and must not call back
//! into the driver. [`ChannelSink`] forwards everything to another thread.

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use uuid::Uuid;

use crate::aggregation::ScanResult;

/// Per-frame signal, used by presentation code to animate the scan region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameTick {
    pub session: Uuid,
    /// Frame index within the session
    pub frame: u64,
    /// Frame looks like a card
    pub is_card: bool,
    /// Frame normalized to a card number
    pub has_candidate: bool,
    /// Session state changed on this frame
    pub state_changed: bool,
}

/// Receiver of scan session transitions
pub trait ResultSink: Send + Sync {
    /// A session started or restarted
    fn on_collecting(&self, _session: Uuid) {}

    /// A session settled on a card number
    fn on_converged(&self, session: Uuid, result: &ScanResult);

    /// A session ended without a card number, or was cancelled
    fn on_abandoned(&self, session: Uuid);

    /// A frame was applied to the live session
    fn on_frame(&self, _tick: &FrameTick) {}

    /// The classifier decoded a QR code while the session was live.
    ///
    /// Does not end the session; the host decides whether to cancel it.
    fn on_qr_code(&self, _session: Uuid, _payload: &str) {}
}

/// Events forwarded by [`ChannelSink`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    Collecting { session: Uuid },
    Converged { session: Uuid, result: ScanResult },
    Abandoned { session: Uuid },
    QrCode { session: Uuid, payload: String },
    Frame(FrameTick),
}

impl ScanEvent {
    /// Whether this is a session transition rather than a frame tick
    pub fn is_transition(&self) -> bool {
        !matches!(self, ScanEvent::Frame(_) | ScanEvent::QrCode { .. })
    }
}

/// Sink forwarding events over a crossbeam channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<ScanEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<ScanEvent>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }

    fn send(&self, event: ScanEvent) {
        // Receiver gone means nobody is listening anymore
        let _ = self.sender.send(event);
    }
}

impl ResultSink for ChannelSink {
    fn on_collecting(&self, session: Uuid) {
        self.send(ScanEvent::Collecting { session });
    }

    fn on_converged(&self, session: Uuid, result: &ScanResult) {
        self.send(ScanEvent::Converged {
            session,
            result: result.clone(),
        });
    }

    fn on_abandoned(&self, session: Uuid) {
        self.send(ScanEvent::Abandoned { session });
    }

    fn on_frame(&self, tick: &FrameTick) {
        self.send(ScanEvent::Frame(*tick));
    }

    fn on_qr_code(&self, session: Uuid, payload: &str) {
        self.send(ScanEvent::QrCode {
            session,
            payload: payload.to_string(),
        });
    }
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ResultSink for NullSink {
    fn on_converged(&self, _session: Uuid, _result: &ScanResult) {}

    fn on_abandoned(&self, _session: Uuid) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_forwards_in_order() {
        let (sink, events) = ChannelSink::new();
        let session = Uuid::new_v4();
        let tick = FrameTick {
            session,
            frame: 1,
            is_card: true,
            has_candidate: false,
            state_changed: false,
        };

        sink.on_collecting(session);
        sink.on_frame(&tick);
        sink.on_abandoned(session);

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                ScanEvent::Collecting { session },
                ScanEvent::Frame(tick),
                ScanEvent::Abandoned { session },
            ]
        );
        assert!(!received[1].is_transition());
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, events) = ChannelSink::new();
        drop(events);
        sink.on_abandoned(Uuid::new_v4());
    }

    #[test]
    fn test_qr_code_is_not_a_transition() {
        let (sink, events) = ChannelSink::new();
        let session = Uuid::new_v4();
        sink.on_qr_code(session, "WIFI:S:home;;");

        let event = events.try_recv().unwrap();
        assert_eq!(
            event,
            ScanEvent::QrCode {
                session,
                payload: "WIFI:S:home;;".to_string()
            }
        );
        assert!(!event.is_transition());

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "qr_code");
    }

    #[test]
    fn test_event_json_shape() {
        let session = Uuid::nil();
        let json = serde_json::to_value(ScanEvent::Abandoned { session }).unwrap();
        assert_eq!(json["event"], "abandoned");
        assert_eq!(json["session"], "00000000-0000-0000-0000-000000000000");
    }
}
