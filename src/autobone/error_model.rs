//! 誤差モデル
//!
//! 2つの時刻のフレームに対するスケルトン評価器の組から、6つの独立した誤差項を
//! 計算し、重み付き平均（誤差導関数）と損失に変換する。

use serde::Deserialize;

use super::bones::Joint;
use crate::pose::PoseFrame;
use crate::skeleton::SkeletonEvaluator;

/// 胸/腰の標準比
const CHEST_WAIST_RATIO: f32 = 0.5;
/// 脚/(腰+首) の平均値 1.1235 (SD 0.07)
const LEG_BODY_RATIO: f32 = 1.1235;
const LEG_BODY_RATIO_SD: f32 = 0.07;
/// 膝高/脚長 の標準比
const KNEE_LEG_RATIO: f32 = 0.5;

/// 各誤差項の重み。0以下なら無効
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ErrorWeights {
    #[serde(default = "default_slide")]
    pub slide: f32,
    #[serde(default)]
    pub offset: f32,
    #[serde(default = "default_proportion")]
    pub proportion: f32,
    #[serde(default = "default_height")]
    pub height: f32,
    #[serde(default)]
    pub position: f32,
    #[serde(default)]
    pub position_offset: f32,
}

fn default_slide() -> f32 { 1.0 }
fn default_proportion() -> f32 { 0.2 }
fn default_height() -> f32 { 0.1 }

impl Default for ErrorWeights {
    fn default() -> Self {
        Self {
            slide: default_slide(),
            offset: 0.0,
            proportion: default_proportion(),
            height: default_height(),
            position: 0.0,
            position_offset: 0.0,
        }
    }
}

impl ErrorWeights {
    /// 全項目無効
    pub fn none() -> Self {
        Self {
            slide: 0.0,
            offset: 0.0,
            proportion: 0.0,
            height: 0.0,
            position: 0.0,
            position_offset: 0.0,
        }
    }

    /// 有効な項の重み付き平均
    ///
    /// アンカーが無いフレームでも重みは分母に残る（効果が薄まるだけで無効化はしない）。
    pub fn error_deriv<S: SkeletonEvaluator + ?Sized>(
        &self,
        frame1: &PoseFrame,
        frame2: &PoseFrame,
        skeleton1: &S,
        skeleton2: &S,
        height_change: f32,
    ) -> f32 {
        let mut total_error = 0.0;
        let mut sum_weight = 0.0;

        if self.slide > 0.0 {
            total_error += slide_error(skeleton1, skeleton2) * self.slide;
            sum_weight += self.slide;
        }

        if self.offset > 0.0 {
            total_error += offset_error(skeleton1, skeleton2) * self.offset;
            sum_weight += self.offset;
        }

        if self.proportion > 0.0 {
            // どちらでもよいので1つ目を使う
            total_error += proportion_error(skeleton1) * self.proportion;
            sum_weight += self.proportion;
        }

        if self.height > 0.0 {
            total_error += height_change.abs() * self.height;
            sum_weight += self.height;
        }

        if self.position > 0.0 {
            // 2つ目だけ半分にする
            let error =
                position_error(frame1, skeleton1) + position_error(frame2, skeleton2) / 2.0;
            total_error += error * self.position;
            sum_weight += self.position;
        }

        if self.position_offset > 0.0 {
            total_error +=
                position_offset_error(frame1, frame2, skeleton1, skeleton2) * self.position_offset;
            sum_weight += self.position_offset;
        }

        if sum_weight > 0.0 {
            total_error / sum_weight
        } else {
            0.0
        }
    }
}

/// 損失関数（二乗誤差）
pub fn loss(error_deriv: f32) -> f32 {
    0.5 * (error_deriv * error_deriv)
}

/// 足の移動量。4で割るのは半分（中点に近づける）と左右平均のため
pub fn slide_error<S: SkeletonEvaluator + ?Sized>(skeleton1: &S, skeleton2: &S) -> f32 {
    let slide_left = (skeleton1.left_foot() - skeleton2.left_foot()).norm();
    let slide_right = (skeleton1.right_foot() - skeleton2.right_foot()).norm();
    (slide_left + slide_right) / 4.0
}

/// 両足の高さの差（同時刻・時刻間）
pub fn offset_error<S: SkeletonEvaluator + ?Sized>(skeleton1: &S, skeleton2: &S) -> f32 {
    let l1 = skeleton1.left_foot().y;
    let r1 = skeleton1.right_foot().y;
    let l2 = skeleton2.left_foot().y;
    let r2 = skeleton2.right_foot().y;

    let dist1 = (l1 - r1).abs();
    let dist2 = (l2 - r2).abs();
    // 時刻間の左右差は l1-r2 を2回数える
    let dist3 = (l1 - r2).abs();
    let dist4 = (l1 - r2).abs();
    let dist5 = (l1 - l2).abs();
    let dist6 = (r1 - r2).abs();

    (dist1 + dist2 + dist3 + dist4 + dist5 + dist6) / 12.0
}

/// 平均的な人体比率からのずれ
pub fn proportion_error<S: SkeletonEvaluator + ?Sized>(skeleton: &S) -> f32 {
    let neck = skeleton.config(Joint::Neck);
    let chest = skeleton.config(Joint::Chest);
    let waist = skeleton.config(Joint::Waist);
    let legs = skeleton.config(Joint::LegsLength);
    let knee = skeleton.config(Joint::KneeHeight);

    let chest_waist = match (chest, waist) {
        (Some(c), Some(w)) => (c / w - CHEST_WAIST_RATIO).abs(),
        _ => 0.0,
    };
    let leg_body = match (legs, waist, neck) {
        (Some(l), Some(w), Some(n)) => (l / (w + n) - LEG_BODY_RATIO).abs(),
        _ => 0.0,
    };
    let knee_leg = match (knee, legs) {
        (Some(k), Some(l)) => (k / l - KNEE_LEG_RATIO).abs(),
        _ => 0.0,
    };

    // 1SD (68%) 以内は誤差なし。NaNはそのまま通して異常値として扱わせる
    let leg_body = if leg_body <= LEG_BODY_RATIO_SD {
        0.0
    } else {
        leg_body - LEG_BODY_RATIO_SD
    };

    (chest_waist + leg_body + knee_leg) / 3.0
}

/// 正解アンカーと対応ノードの平均距離
pub fn position_error<S: SkeletonEvaluator + ?Sized>(frame: &PoseFrame, skeleton: &S) -> f32 {
    let mut offset = 0.0;
    let mut count = 0;

    for (node, anchor) in &frame.positions {
        if let Some(position) = skeleton.node_position(node) {
            offset += (position - anchor).norm();
            count += 1;
        }
    }

    if count > 0 {
        offset / count as f32
    } else {
        0.0
    }
}

/// アンカーとノードのずれが時間的に一定かどうか
pub fn position_offset_error<S: SkeletonEvaluator + ?Sized>(
    frame1: &PoseFrame,
    frame2: &PoseFrame,
    skeleton1: &S,
    skeleton2: &S,
) -> f32 {
    let mut offset = 0.0;
    let mut count = 0;

    for (node, anchor1) in &frame1.positions {
        let Some(anchor2) = frame2.position(node) else {
            continue;
        };
        let (Some(node1), Some(node2)) = (skeleton1.node_position(node), skeleton2.node_position(node))
        else {
            continue;
        };

        let dist1 = (node1 - anchor1).norm();
        let dist2 = (node2 - anchor2).norm();
        offset += (dist2 - dist1).abs();
        count += 1;
    }

    if count > 0 {
        offset / count as f32
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autobone::bones::Lengths;
    use crate::skeleton::{nodes, SimpleSkeleton};
    use nalgebra::Vector3;

    fn lengths(values: &[(Joint, f32)]) -> Lengths {
        values.iter().copied().collect()
    }

    fn default_skeleton(frame: &PoseFrame) -> SimpleSkeleton {
        let mut skeleton = SimpleSkeleton::new(Joint::ALL.iter().map(|j| (*j, j.default_length())).collect());
        skeleton.set_pose(frame);
        skeleton
    }

    fn standing(height: f32) -> PoseFrame {
        PoseFrame::new(Vector3::new(0.0, height, 0.0))
    }

    #[test]
    fn test_loss() {
        assert_eq!(loss(0.0), 0.0);
        assert!((loss(0.2) - 0.02).abs() < 1e-7);
        assert!((loss(-0.2) - 0.02).abs() < 1e-7);
    }

    #[test]
    fn test_slide_error() {
        let s1 = default_skeleton(&standing(1.79));
        let s2 = default_skeleton(&PoseFrame::new(Vector3::new(0.2, 1.79, 0.0)));
        // 両足0.2ずつ移動 → (0.2 + 0.2) / 4
        assert!((slide_error(&s1, &s2) - 0.1).abs() < 1e-6);
        assert_eq!(slide_error(&s1, &s1), 0.0);
    }

    #[test]
    fn test_offset_error() {
        let s1 = default_skeleton(&standing(1.79));
        let s2 = default_skeleton(&standing(1.85));
        // 左右差0、時刻間の差0.06が4項（l1-r2 ×2, l1-l2, r1-r2）
        assert!((offset_error(&s1, &s2) - 0.06 * 4.0 / 12.0).abs() < 1e-5);
        assert_eq!(offset_error(&s1, &s1), 0.0);
    }

    #[test]
    fn test_proportion_error_defaults() {
        let s = default_skeleton(&standing(1.79));
        let chest_waist = (0.42f32 / 0.85 - 0.5).abs();
        let leg_body = ((0.84f32 / 0.95 - 1.1235).abs() - 0.07).max(0.0);
        let knee_leg = (0.42f32 / 0.84 - 0.5).abs();
        let expected = (chest_waist + leg_body + knee_leg) / 3.0;
        assert!((proportion_error(&s) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_proportion_within_sd_is_zero() {
        // legs / (waist + neck) = 1.15 → 1.1235 から 0.0265 （SD内）
        let s = SimpleSkeleton::new(lengths(&[
            (Joint::Neck, 0.1),
            (Joint::Waist, 0.7),
            (Joint::Chest, 0.35),
            (Joint::LegsLength, 0.92),
            (Joint::KneeHeight, 0.46),
        ]));
        assert!(proportion_error(&s) < 1e-6);
    }

    #[test]
    fn test_proportion_missing_operands() {
        // Chest・Neck が無い → 胸/腰・脚/体 は0
        let s = SimpleSkeleton::new(lengths(&[
            (Joint::Waist, 0.8),
            (Joint::LegsLength, 0.8),
            (Joint::KneeHeight, 0.6),
        ]));
        assert!((proportion_error(&s) - 0.25 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_proportion_nan_propagates() {
        let s = SimpleSkeleton::new(lengths(&[
            (Joint::Neck, f32::NAN),
            (Joint::Waist, 0.85),
            (Joint::Chest, 0.42),
            (Joint::LegsLength, 0.84),
            (Joint::KneeHeight, 0.42),
        ]));
        assert!(proportion_error(&s).is_nan());
    }

    #[test]
    fn test_position_error_asymmetric_halving() {
        let frame1 = standing(1.79).with_position(nodes::HEAD, Vector3::new(0.0, 1.89, 0.0));
        let frame2 = standing(1.79).with_position(nodes::HEAD, Vector3::new(0.0, 1.89, 0.0));
        let s1 = default_skeleton(&frame1);
        let s2 = default_skeleton(&frame2);
        assert!((position_error(&frame1, &s1) - 0.1).abs() < 1e-5);

        let weights = ErrorWeights {
            position: 1.0,
            ..ErrorWeights::none()
        };
        // 0.1 + 0.1 / 2
        let deriv = weights.error_deriv(&frame1, &frame2, &s1, &s2, 0.0);
        assert!((deriv - 0.15).abs() < 1e-5);
    }

    #[test]
    fn test_position_error_unknown_node() {
        let frame = standing(1.79).with_position("left_hand", Vector3::new(1.0, 1.0, 1.0));
        let s = default_skeleton(&frame);
        assert_eq!(position_error(&frame, &s), 0.0);
    }

    #[test]
    fn test_position_offset_error() {
        let frame1 = standing(1.79).with_position(nodes::WAIST, Vector3::new(0.0, 0.84, 0.2));
        // 2つ目は0.3ずれている → |0.3 - 0.1|
        let frame2 = standing(1.79)
            .with_position(nodes::WAIST, Vector3::new(0.0, 0.84, 0.4))
            .with_position(nodes::HEAD, Vector3::new(0.0, 1.79, 0.0));
        let s1 = default_skeleton(&frame1);
        let s2 = default_skeleton(&frame2);
        assert!((position_offset_error(&frame1, &frame2, &s1, &s2) - 0.2).abs() < 1e-5);
        // アンカーが片方にしかない / 無い
        assert_eq!(position_offset_error(&standing(1.79), &frame2, &s1, &s2), 0.0);
    }

    #[test]
    fn test_weighted_average() {
        let frame1 = standing(1.79);
        let frame2 = PoseFrame::new(Vector3::new(0.2, 1.79, 0.0));
        let s1 = default_skeleton(&frame1);
        let s2 = default_skeleton(&frame2);
        let weights = ErrorWeights {
            slide: 1.0,
            height: 3.0,
            ..ErrorWeights::none()
        };
        // (0.1 * 1 + 0.5 * 3) / 4
        let deriv = weights.error_deriv(&frame1, &frame2, &s1, &s2, -0.5);
        assert!((deriv - 0.4).abs() < 1e-5);
    }

    #[test]
    fn test_missing_anchors_still_count_weight() {
        let frame = standing(1.79);
        let s = default_skeleton(&frame);
        let weights = ErrorWeights {
            height: 1.0,
            position: 1.0,
            ..ErrorWeights::none()
        };
        // 位置誤差は0だが重みは分母に残る
        let deriv = weights.error_deriv(&frame, &frame, &s, &s, 0.4);
        assert!((deriv - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_no_active_weights() {
        let frame = standing(1.79);
        let s = default_skeleton(&frame);
        assert_eq!(ErrorWeights::none().error_deriv(&frame, &frame, &s, &s, 1.0), 0.0);
    }

    #[test]
    fn test_weights_from_toml() {
        let weights: ErrorWeights = toml::from_str("offset = 0.5\nslide = 0.0").unwrap();
        assert_eq!(weights.slide, 0.0);
        assert_eq!(weights.offset, 0.5);
        assert_eq!(weights.proportion, 0.2);
        assert_eq!(weights.height, 0.1);
    }
}
