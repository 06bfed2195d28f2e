pub mod position;

pub use position::{TrackerPosition, TrackerPresence};
