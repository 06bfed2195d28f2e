use super::bones::{Joint, Lengths};
use crate::pose::PoseFrame;
use crate::skeleton::SkeletonEvaluator;

/// フレームペアを評価する使い捨てのスケルトン2体
///
/// 試行値は `with_trial` の中でだけ見え、終了時に必ず元の長さへ戻る。
#[derive(Debug, Clone)]
pub struct ProbePair<S> {
    first: S,
    second: S,
}

impl<S: SkeletonEvaluator + Clone> ProbePair<S> {
    pub fn new(tunable: &Lengths, statics: &Lengths) -> Self {
        let first = S::from_lengths(tunable, statics);
        Self {
            second: first.clone(),
            first,
        }
    }
}

impl<S: SkeletonEvaluator> ProbePair<S> {
    /// 両方に設定を反映し、それぞれのフレームに姿勢を合わせる
    pub fn bind(&mut self, lengths: &Lengths, frame1: &PoseFrame, frame2: &PoseFrame) {
        self.first.set_lengths(lengths);
        self.second.set_lengths(lengths);
        self.first.set_pose(frame1);
        self.second.set_pose(frame2);
    }

    pub fn first(&self) -> &S {
        &self.first
    }

    pub fn second(&self) -> &S {
        &self.second
    }

    /// `joint` を `length` にした状態で `eval` を呼び、元の長さに戻す
    ///
    /// 元の長さが未設定の関節は試行できない（None を返す）。
    pub fn with_trial<R>(
        &mut self,
        joint: Joint,
        length: f32,
        eval: impl FnOnce(&S, &S) -> R,
    ) -> Option<R> {
        let original = self.first.config(joint)?;
        self.set_both(joint, length);
        let result = eval(&self.first, &self.second);
        self.set_both(joint, original);
        Some(result)
    }

    fn set_both(&mut self, joint: Joint, length: f32) {
        self.first.set_config(joint, length, true);
        self.second.set_config(joint, length, true);
    }
}
