//! UI notification service
//!
//! Separates the advisory UI callbacks (animations, spinner, final outcome)
//! from the capture state machine so every frontend can render them its own way.

use crate::{error::CaptureError, types::RequestId};
use tokio::sync::mpsc::UnboundedSender;

/// Receives the UI-facing callbacks of a capture, one method per event
pub trait CaptureObserver: Send + Sync {
    /// A live-photo companion movie started (`true`) or stopped (`false`)
    fn on_capture_beginning_live_photo(&self, active: bool);

    /// The shutter fired; play the flash animation
    fn on_shutter_animation(&self);

    /// Show or hide the processing indicator
    fn on_processing_indicator(&self, visible: bool);

    /// Terminal outcome of a capture. Called exactly once per request.
    fn on_capture_completed(
        &self,
        request_id: RequestId,
        saved_count: usize,
        error: Option<&CaptureError>,
    );
}

/// Observer that discards all notifications
pub struct NoOpObserver;

impl CaptureObserver for NoOpObserver {
    fn on_capture_beginning_live_photo(&self, _active: bool) {
        // Intentionally empty
    }

    fn on_shutter_animation(&self) {
        // Intentionally empty
    }

    fn on_processing_indicator(&self, _visible: bool) {
        // Intentionally empty
    }

    fn on_capture_completed(
        &self,
        _request_id: RequestId,
        _saved_count: usize,
        _error: Option<&CaptureError>,
    ) {
        // Intentionally empty
    }
}

/// Observer that logs every notification
pub struct LoggingObserver {
    verbose: bool,
}

impl LoggingObserver {
    /// Create a new logging observer
    ///
    /// # Arguments
    /// * `verbose` - Whether to log the advisory UI events too
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl CaptureObserver for LoggingObserver {
    fn on_capture_beginning_live_photo(&self, active: bool) {
        if self.verbose {
            log::info!("Live photo capture {}", if active { "started" } else { "finished" });
        }
    }

    fn on_shutter_animation(&self) {
        if self.verbose {
            log::info!("Shutter fired");
        }
    }

    fn on_processing_indicator(&self, visible: bool) {
        if self.verbose {
            log::info!("Processing indicator {}", if visible { "shown" } else { "hidden" });
        }
    }

    fn on_capture_completed(
        &self,
        request_id: RequestId,
        saved_count: usize,
        error: Option<&CaptureError>,
    ) {
        match error {
            None => log::info!("Capture {} saved {} image(s)", request_id, saved_count),
            Some(error) => log::error!("Capture {} failed: {}", request_id, error),
        }
    }
}

/// Owned form of an observer callback, for channel delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureNotification {
    LivePhoto(bool),
    Shutter,
    ProcessingIndicator(bool),
    Completed {
        request_id: RequestId,
        saved_count: usize,
        /// Rendered error message, if the capture failed
        error: Option<String>,
    },
}

/// Observer forwarding notifications into an unbounded channel, so a UI
/// thread can drain them at its own pace
pub struct ChannelObserver {
    sender: UnboundedSender<CaptureNotification>,
}

impl ChannelObserver {
    #[must_use]
    pub fn new(sender: UnboundedSender<CaptureNotification>) -> Self {
        Self { sender }
    }

    fn send(&self, notification: CaptureNotification) {
        if self.sender.send(notification).is_err() {
            tracing::debug!("Capture notification dropped; receiver closed");
        }
    }
}

impl CaptureObserver for ChannelObserver {
    fn on_capture_beginning_live_photo(&self, active: bool) {
        self.send(CaptureNotification::LivePhoto(active));
    }

    fn on_shutter_animation(&self) {
        self.send(CaptureNotification::Shutter);
    }

    fn on_processing_indicator(&self, visible: bool) {
        self.send(CaptureNotification::ProcessingIndicator(visible));
    }

    fn on_capture_completed(
        &self,
        request_id: RequestId,
        saved_count: usize,
        error: Option<&CaptureError>,
    ) {
        self.send(CaptureNotification::Completed {
            request_id,
            saved_count,
            error: error.map(ToString::to_string),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn test_channel_observer_forwards_in_order() {
        let (tx, mut rx) = unbounded_channel();
        let observer = ChannelObserver::new(tx);

        observer.on_capture_beginning_live_photo(true);
        observer.on_shutter_animation();
        observer.on_processing_indicator(false);
        observer.on_capture_completed(RequestId::new(1), 0, Some(&CaptureError::SaveFailed));

        assert_eq!(rx.try_recv().unwrap(), CaptureNotification::LivePhoto(true));
        assert_eq!(rx.try_recv().unwrap(), CaptureNotification::Shutter);
        assert_eq!(
            rx.try_recv().unwrap(),
            CaptureNotification::ProcessingIndicator(false)
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            CaptureNotification::Completed {
                request_id: RequestId::new(1),
                saved_count: 0,
                error: Some("Failed to save images".to_string()),
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_observer_tolerates_closed_receiver() {
        let (tx, rx) = unbounded_channel();
        drop(rx);
        let observer = ChannelObserver::new(tx);
        observer.on_shutter_animation();
    }

    #[test]
    fn test_noop_and_logging_observers() {
        let _ = env_logger::builder().is_test(true).try_init();
        let observers: Vec<Box<dyn CaptureObserver>> =
            vec![Box::new(NoOpObserver), Box::new(LoggingObserver::new(true))];
        for observer in observers {
            observer.on_shutter_animation();
            observer.on_capture_completed(RequestId::new(2), 3, None);
        }
    }
}
