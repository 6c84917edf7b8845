pub mod compose;
pub mod dispatch;
pub mod gate;
pub mod scoring;
