//! Services the pipeline talks to outside the capture core

pub mod observer;
pub mod preferences;

pub use observer::{
    CaptureNotification, CaptureObserver, ChannelObserver, LoggingObserver, NoOpObserver,
};
pub use preferences::FeaturePreferences;
