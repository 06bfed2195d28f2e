use nalgebra::{UnitQuaternion, Vector3};

use super::{nodes, segments, SkeletonEvaluator};
use crate::autobone::bones::{Joint, Lengths};
use crate::pose::PoseFrame;

/// 参照用の順運動学スケルトン（y上向き）
///
/// HMD → 首 → 首元 → 胸/腰 → 左右の股関節 → 膝 → 足 の単純な連鎖。
/// 回転が無い部位は親の回転を使う（ルートの頭は単位回転）。
///
/// `set_config(.., instantaneous = false)` の変更は即座に位置へ反映されず、
/// 次の `set_pose` ごとに `smoothing` の比率でEMA補間される。
#[derive(Debug, Clone)]
pub struct SimpleSkeleton {
    /// 設定値
    lengths: Lengths,
    /// 位置計算に使っている値（補間中は設定値と異なる）
    applied: Lengths,
    smoothing: f32,
    root: Vector3<f32>,
    rotations: [UnitQuaternion<f32>; 7],
    positions: [Vector3<f32>; NODE_COUNT],
}

const NODE_COUNT: usize = nodes::ALL.len();
// positions のうち足のインデックス
const LEFT_FOOT_NODE: usize = 8;
const RIGHT_FOOT_NODE: usize = 9;

// rotations のインデックス
const HEAD: usize = 0;
const CHEST: usize = 1;
const WAIST: usize = 2;
const LEFT_UPPER_LEG: usize = 3;
const RIGHT_UPPER_LEG: usize = 4;
const LEFT_LOWER_LEG: usize = 5;
const RIGHT_LOWER_LEG: usize = 6;

impl SimpleSkeleton {
    pub fn new(lengths: Lengths) -> Self {
        let mut skeleton = Self {
            applied: lengths.clone(),
            lengths,
            smoothing: 0.5,
            root: Vector3::zeros(),
            rotations: [UnitQuaternion::identity(); 7],
            positions: [Vector3::zeros(); NODE_COUNT],
        };
        skeleton.update();
        skeleton
    }

    /// 非即時変更のEMA係数 (0.0..=1.0]
    pub fn with_smoothing(mut self, alpha: f32) -> Self {
        self.smoothing = alpha.clamp(f32::EPSILON, 1.0);
        self
    }

    fn length(&self, joint: Joint) -> f32 {
        self.applied.get(&joint).copied().unwrap_or(0.0)
    }

    /// 補間中の値を設定値へ近づける
    fn ease_lengths(&mut self) {
        let alpha = self.smoothing;
        for (joint, &target) in &self.lengths {
            let current = self.applied.entry(*joint).or_insert(target);
            *current = alpha * target + (1.0 - alpha) * *current;
            if (*current - target).abs() < 1e-6 {
                *current = target;
            }
        }
    }

    fn update(&mut self) {
        let head = self.length(Joint::Head);
        let neck = self.length(Joint::Neck);
        let chest = self.length(Joint::Chest);
        let waist = self.length(Joint::Waist);
        let hips_width = self.length(Joint::HipsWidth);
        let legs = self.length(Joint::LegsLength);
        let knee = self.length(Joint::KneeHeight);

        let r = &self.rotations;
        let head_pos = self.root;
        let neck_pos = head_pos + r[HEAD] * Vector3::new(0.0, 0.0, head);
        let neck_base = neck_pos + r[HEAD] * Vector3::new(0.0, -neck, 0.0);
        let chest_pos = neck_base + r[CHEST] * Vector3::new(0.0, -chest, 0.0);
        let waist_pos = neck_base + r[WAIST] * Vector3::new(0.0, -waist, 0.0);

        let half_hips = r[WAIST] * Vector3::new(hips_width / 2.0, 0.0, 0.0);
        let left_hip = waist_pos - half_hips;
        let right_hip = waist_pos + half_hips;

        // 股関節→膝 = 脚長 - 膝高
        let upper = Vector3::new(0.0, -(legs - knee), 0.0);
        let lower = Vector3::new(0.0, -knee, 0.0);
        let left_knee = left_hip + r[LEFT_UPPER_LEG] * upper;
        let right_knee = right_hip + r[RIGHT_UPPER_LEG] * upper;
        let left_foot = left_knee + r[LEFT_LOWER_LEG] * lower;
        let right_foot = right_knee + r[RIGHT_LOWER_LEG] * lower;

        self.positions = [
            head_pos, neck_pos, chest_pos, waist_pos, left_hip, right_hip, left_knee, right_knee,
            left_foot, right_foot,
        ];
    }

    fn node_index(node: &str) -> Option<usize> {
        nodes::ALL.iter().position(|n| *n == node)
    }
}

impl SkeletonEvaluator for SimpleSkeleton {
    fn from_lengths(tunable: &Lengths, statics: &Lengths) -> Self {
        let mut lengths = statics.clone();
        lengths.extend(tunable.iter().map(|(j, l)| (*j, *l)));
        Self::new(lengths)
    }

    fn set_config(&mut self, joint: Joint, length: f32, instantaneous: bool) {
        self.lengths.insert(joint, length);
        if instantaneous {
            self.applied.insert(joint, length);
            self.update();
        }
    }

    fn config(&self, joint: Joint) -> Option<f32> {
        self.lengths.get(&joint).copied()
    }

    fn lengths(&self) -> Lengths {
        self.lengths.clone()
    }

    fn set_pose(&mut self, frame: &PoseFrame) {
        let rotation = |name: &str, parent: UnitQuaternion<f32>| {
            frame.rotation(name).copied().unwrap_or(parent)
        };
        let head = rotation(segments::HEAD, UnitQuaternion::identity());
        let chest = rotation(segments::CHEST, head);
        let waist = rotation(segments::WAIST, chest);
        let left_upper = rotation(segments::LEFT_UPPER_LEG, waist);
        let right_upper = rotation(segments::RIGHT_UPPER_LEG, waist);
        let left_lower = rotation(segments::LEFT_LOWER_LEG, left_upper);
        let right_lower = rotation(segments::RIGHT_LOWER_LEG, right_upper);

        self.root = frame.root_position;
        self.rotations = [head, chest, waist, left_upper, right_upper, left_lower, right_lower];
        self.ease_lengths();
        self.update();
    }

    fn node_position(&self, node: &str) -> Option<Vector3<f32>> {
        Self::node_index(node).map(|i| self.positions[i])
    }

    fn left_foot(&self) -> Vector3<f32> {
        self.positions[LEFT_FOOT_NODE]
    }

    fn right_foot(&self) -> Vector3<f32> {
        self.positions[RIGHT_FOOT_NODE]
    }
}
