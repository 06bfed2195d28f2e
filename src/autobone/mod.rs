//! 記録した姿勢からボーン長を推定する

pub mod bones;
pub mod error;
pub mod error_model;
pub mod mailbox;
pub mod optimizer;
pub mod probe;
pub mod target;
pub mod worker;

pub use bones::{BoneConfig, BoneRole, Joint, Lengths};
pub use error::{AutoBoneError, Result};
pub use error_model::ErrorWeights;
pub use mailbox::{SkeletonMailbox, SkeletonNotifier};
pub use optimizer::{AutoBone, AutoBoneParams, Epoch, RunSummary};
pub use target::{TargetHeight, TargetSource};
pub use worker::AutoBoneJob;
