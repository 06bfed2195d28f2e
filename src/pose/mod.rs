pub mod frame;
pub mod recording;

pub use frame::PoseFrame;
pub use recording::PoseRecording;
