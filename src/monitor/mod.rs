pub mod detector;
pub mod ports;
pub mod prices;
pub mod supervisor;

pub use detector::ThresholdDetector;
pub use ports::{QuoteLookup, Subscription, SubscriptionEvent, SubscriptionStore};
pub use prices::PriceTracker;
pub use supervisor::Supervisor;
