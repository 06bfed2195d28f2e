//! 収束目標となる身長の推定

use super::bones::{height_sum, Lengths};
use crate::pose::PoseRecording;

/// これ以下のHMD高さは直立していない可能性が高い
pub const MIN_PLAUSIBLE_HMD_HEIGHT: f32 = 0.50;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetSource {
    /// 呼び出し側が指定
    Explicit,
    /// 既知のスケルトンの身長
    Skeleton,
    /// 記録中の最大HMD高さ
    Hmd { implausible: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetHeight {
    pub value: f32,
    pub source: TargetSource,
}

/// 記録中のHMD高さの最大値（欠落フレームは無視、初期値0）
pub fn max_hmd_height(recording: &PoseRecording) -> f32 {
    recording
        .frames()
        .map(|f| f.hmd_height())
        .fold(0.0, |max, h| if h > max { h } else { max })
}

/// 目標身長を決める
///
/// 優先順: 指定値（0以上）→ 既知スケルトン → 最大HMD高さ。
/// スケルトンが無いことやHMD高さが低すぎることはエラーにしない。
pub fn estimate_target_height(
    explicit: Option<f32>,
    known_skeleton: Option<&Lengths>,
    recording: &PoseRecording,
) -> TargetHeight {
    if let Some(value) = explicit.filter(|v| *v >= 0.0) {
        return TargetHeight {
            value,
            source: TargetSource::Explicit,
        };
    }

    if let Some(lengths) = known_skeleton {
        let value = height_sum(lengths, None);
        log::warn!(
            "Target height loaded from skeleton (make sure you reset before running!): {}",
            value
        );
        return TargetHeight {
            value,
            source: TargetSource::Skeleton,
        };
    }

    let value = max_hmd_height(recording);
    let implausible = value <= MIN_PLAUSIBLE_HMD_HEIGHT;
    if implausible {
        log::warn!(
            "Max headset height detected (value seems too low, did you not stand up straight while measuring?): {}",
            value
        );
    } else {
        log::info!("Max headset height detected: {}", value);
    }

    TargetHeight {
        value,
        source: TargetSource::Hmd { implausible },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autobone::bones::Joint;
    use crate::pose::PoseFrame;
    use nalgebra::Vector3;

    fn recording(heights: &[f32]) -> PoseRecording {
        PoseRecording::from_frames(
            heights
                .iter()
                .map(|h| PoseFrame::new(Vector3::new(0.0, *h, 0.0)))
                .collect(),
        )
    }

    #[test]
    fn test_max_hmd_height() {
        let mut rec = recording(&[1.6, 1.72, 1.7]);
        rec.push_missing();
        assert!((max_hmd_height(&rec) - 1.72).abs() < 1e-6);
        assert_eq!(max_hmd_height(&PoseRecording::default()), 0.0);
    }

    #[test]
    fn test_explicit_wins() {
        let target = estimate_target_height(Some(1.8), None, &recording(&[1.6]));
        assert_eq!(target.value, 1.8);
        assert_eq!(target.source, TargetSource::Explicit);
    }

    #[test]
    fn test_negative_explicit_is_auto() {
        let target = estimate_target_height(Some(-1.0), None, &recording(&[1.6]));
        assert_eq!(target.source, TargetSource::Hmd { implausible: false });
        assert!((target.value - 1.6).abs() < 1e-6);
    }

    #[test]
    fn test_skeleton_before_hmd() {
        let lengths: Lengths = [(Joint::Neck, 0.1), (Joint::Waist, 0.8), (Joint::LegsLength, 0.8)]
            .into_iter()
            .collect();
        let target = estimate_target_height(None, Some(&lengths), &recording(&[1.6]));
        assert_eq!(target.source, TargetSource::Skeleton);
        assert!((target.value - 1.7).abs() < 1e-5);
    }

    #[test]
    fn test_low_hmd_is_advisory() {
        let target = estimate_target_height(None, None, &recording(&[0.3, 0.5]));
        assert_eq!(target.source, TargetSource::Hmd { implausible: true });
        assert!((target.value - 0.5).abs() < 1e-6);
    }
}
