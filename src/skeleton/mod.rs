//! スケルトン評価器
//!
//! 設定（ボーン長）と1フレーム分の姿勢から、名前付きノードの3D位置を求める。
//! 最適化器は評価器を使い捨てのスクラッチモデルとして扱う。

pub mod simple;

use std::sync::Arc;

use nalgebra::Vector3;
use parking_lot::Mutex;

use crate::autobone::bones::{Joint, Lengths};
use crate::pose::PoseFrame;

pub use simple::SimpleSkeleton;

/// ノード名
pub mod nodes {
    pub const HEAD: &str = "head";
    pub const NECK: &str = "neck";
    pub const CHEST: &str = "chest";
    pub const WAIST: &str = "waist";
    pub const LEFT_HIP: &str = "left_hip";
    pub const RIGHT_HIP: &str = "right_hip";
    pub const LEFT_KNEE: &str = "left_knee";
    pub const RIGHT_KNEE: &str = "right_knee";
    pub const LEFT_FOOT: &str = "left_foot";
    pub const RIGHT_FOOT: &str = "right_foot";

    pub const ALL: [&str; 10] = [
        HEAD, NECK, CHEST, WAIST, LEFT_HIP, RIGHT_HIP, LEFT_KNEE, RIGHT_KNEE, LEFT_FOOT, RIGHT_FOOT,
    ];
}

/// 回転を持つ部位名（`PoseFrame::rotations` のキー）
pub mod segments {
    pub const HEAD: &str = "head";
    pub const CHEST: &str = "chest";
    pub const WAIST: &str = "waist";
    pub const LEFT_UPPER_LEG: &str = "left_upper_leg";
    pub const RIGHT_UPPER_LEG: &str = "right_upper_leg";
    pub const LEFT_LOWER_LEG: &str = "left_lower_leg";
    pub const RIGHT_LOWER_LEG: &str = "right_lower_leg";
}

/// 設定と姿勢からノード位置を決定的に計算する
///
/// 即時反映した設定と同じフレームからは、常に同じ位置を返すこと。
pub trait SkeletonEvaluator {
    /// 調整対象と固定値の組で初期化
    fn from_lengths(tunable: &Lengths, statics: &Lengths) -> Self
    where
        Self: Sized;

    /// `instantaneous` が true なら補間なしで即座に反映する
    fn set_config(&mut self, joint: Joint, length: f32, instantaneous: bool);

    fn config(&self, joint: Joint) -> Option<f32>;

    fn lengths(&self) -> Lengths;

    fn set_pose(&mut self, frame: &PoseFrame);

    fn node_position(&self, node: &str) -> Option<Vector3<f32>>;

    fn left_foot(&self) -> Vector3<f32>;

    fn right_foot(&self) -> Vector3<f32>;

    fn set_lengths(&mut self, lengths: &Lengths) {
        for (&joint, &length) in lengths {
            self.set_config(joint, length, true);
        }
    }
}

/// 外部から通知される実機スケルトン
pub type SharedSkeleton = Arc<Mutex<dyn SkeletonEvaluator + Send>>;

pub fn share<S: SkeletonEvaluator + Send + 'static>(skeleton: S) -> SharedSkeleton {
    Arc::new(Mutex::new(skeleton))
}
