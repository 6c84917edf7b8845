pub mod provider;
pub mod sender;
pub mod vapid;

pub use sender::{DeliveryOutcome, FanoutReport, PushSender};
