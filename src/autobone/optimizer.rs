//! ボーン長の最適化ループ
//!
//! 記録中のフレームペアごとに、各調整対象のボーン長を ± に少しずつ動かして
//! 誤差導関数が下がる方を採用する（逐次の座標降下）。

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::Deserialize;

use super::bones::{total_sum, BoneConfig, Joint, Lengths};
use super::error::{AutoBoneError, Result};
use super::error_model::{loss, ErrorWeights};
use super::mailbox::{SkeletonMailbox, SkeletonNotifier};
use super::probe::ProbePair;
use super::target::{estimate_target_height, TargetHeight};
use crate::pose::{PoseFrame, PoseRecording};
use crate::settings::SettingsStore;
use crate::skeleton::{SharedSkeleton, SkeletonEvaluator};
use crate::tracker::TrackerPresence;

/// これ未満のボーン長は採用しない
pub const MIN_BONE_LENGTH: f32 = 0.01;

/// 初期誤差の報告用エポック
pub const BASELINE_EPOCH: i32 = -1;

/// 最適化パラメータ
#[derive(Debug, Clone, Deserialize)]
pub struct AutoBoneParams {
    #[serde(default = "default_cursor_increment")]
    pub cursor_increment: usize,
    #[serde(default = "default_min_data_distance")]
    pub min_data_distance: usize,
    #[serde(default = "default_max_data_distance")]
    pub max_data_distance: usize,
    #[serde(default = "default_num_epochs")]
    pub num_epochs: u32,
    #[serde(default = "default_initial_adjust_rate")]
    pub initial_adjust_rate: f32,
    #[serde(default = "default_adjust_rate_decay")]
    pub adjust_rate_decay: f32,
    /// 最適化前の誤差をエポック -1 として報告する
    #[serde(default = "default_calc_init_error")]
    pub calc_init_error: bool,
    #[serde(default)]
    pub weights: ErrorWeights,
}

fn default_cursor_increment() -> usize { 1 }
fn default_min_data_distance() -> usize { 2 }
fn default_max_data_distance() -> usize { 32 }
fn default_num_epochs() -> u32 { 5 }
fn default_initial_adjust_rate() -> f32 { 2.5 }
fn default_adjust_rate_decay() -> f32 { 1.01 }
fn default_calc_init_error() -> bool { true }

impl Default for AutoBoneParams {
    fn default() -> Self {
        Self {
            cursor_increment: default_cursor_increment(),
            min_data_distance: default_min_data_distance(),
            max_data_distance: default_max_data_distance(),
            num_epochs: default_num_epochs(),
            initial_adjust_rate: default_initial_adjust_rate(),
            adjust_rate_decay: default_adjust_rate_decay(),
            calc_init_error: default_calc_init_error(),
            weights: ErrorWeights::default(),
        }
    }
}

impl AutoBoneParams {
    pub fn validate(&self) -> Result<()> {
        if self.cursor_increment == 0 {
            return Err(AutoBoneError::InvalidParams(
                "cursor_increment must be at least 1".to_string(),
            ));
        }
        if i32::try_from(self.num_epochs).is_err() {
            return Err(AutoBoneError::InvalidParams(format!(
                "num_epochs is too large: {}",
                self.num_epochs
            )));
        }
        if !(self.adjust_rate_decay > 0.0) {
            return Err(AutoBoneError::InvalidParams(format!(
                "adjust_rate_decay must be positive, got {}",
                self.adjust_rate_decay
            )));
        }
        Ok(())
    }

    /// エポックごとの調整率。-1 は 0（観測のみ）
    pub fn adjust_rate(&self, epoch: i32) -> f32 {
        if epoch < 0 {
            return 0.0;
        }
        self.initial_adjust_rate / self.adjust_rate_decay.powi(epoch)
    }

    /// `validate` 済みなら切り詰めは起きない
    fn epoch_count(&self) -> i32 {
        i32::try_from(self.num_epochs).unwrap_or(i32::MAX)
    }

    fn first_epoch(&self) -> i32 {
        if self.calc_init_error {
            BASELINE_EPOCH
        } else {
            0
        }
    }
}

/// 1エポック分の結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Epoch {
    /// 0始まり。-1 は最適化前
    pub epoch: i32,
    /// 有効なフレームペアが無ければ None
    pub average_error: Option<f32>,
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.average_error {
            Some(error) => write!(f, "Epoch: {}, Epoch Error: {}", self.epoch + 1, error),
            None => write!(f, "Epoch: {}, Epoch Error: no data", self.epoch + 1),
        }
    }
}

/// 最適化の最終結果
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub target: TargetHeight,
    pub final_height: f32,
    /// |最終身長 - 目標身長|
    pub final_error: f32,
    pub epochs: Vec<Epoch>,
}

/// 比較するフレームペアのインデックス列
///
/// 間隔は `min..=max`（記録長-1まで）、開始位置は `increment` ずつ進める。
pub fn frame_pairs(
    len: usize,
    min_distance: usize,
    max_distance: usize,
    increment: usize,
) -> impl Iterator<Item = (usize, usize)> {
    let increment = increment.max(1);
    (min_distance..=max_distance)
        .take_while(move |offset| *offset < len)
        .flat_map(move |offset| {
            (0..len - offset)
                .step_by(increment)
                .map(move |cursor| (cursor, cursor + offset))
        })
}

/// 1組のフレームを評価する際に共有する値
struct PairContext<'a> {
    frame1: &'a PoseFrame,
    frame2: &'a PoseFrame,
    weights: &'a ErrorWeights,
    target_height: f32,
}

impl PairContext<'_> {
    fn error_deriv<S: SkeletonEvaluator>(&self, first: &S, second: &S, height: f32) -> f32 {
        self.weights.error_deriv(
            self.frame1,
            self.frame2,
            first,
            second,
            self.target_height - height,
        )
    }
}

/// 1関節の ± 試行。採用すべき新しい長さを返す（変更なしが最良なら None）
fn trial_joint<S: SkeletonEvaluator>(
    probe: &mut ProbePair<S>,
    ctx: &PairContext<'_>,
    joint: Joint,
    original_length: f32,
    adjust: f32,
    total_length: f32,
    current_height: f32,
    current_error: f32,
) -> Option<f32> {
    let mut min_error = current_error;
    let mut best = None;

    for sign in [1.0f32, -1.0] {
        // 全長に対する比率でスケールする
        let step = (sign * adjust * original_length) / total_length;
        let new_length = original_length + step;
        if !(new_length >= MIN_BONE_LENGTH) {
            continue;
        }

        let new_height = if joint.is_height_joint() {
            current_height + step
        } else {
            current_height
        };
        let new_error = probe.with_trial(joint, new_length, |first, second| {
            ctx.error_deriv(first, second, new_height)
        });

        if let Some(new_error) = new_error {
            if new_error < min_error {
                min_error = new_error;
                best = Some(new_length);
            }
        }
    }

    if let Some(new_length) = best {
        log::debug!(
            "{}: {} -> {} (error {} -> {})",
            joint,
            original_length,
            new_length,
            current_error,
            min_error
        );
    }
    best
}

/// 実行中フラグのガード（drop時に解除）
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// ボーン長の自動推定器
///
/// 設定ストアと既知のスケルトンはロックで保護され、最適化中も別スレッドから
/// 参照・通知できる。最適化は作業用コピーに対して行い、エポックの終わりに
/// まとめて公開する。
pub struct AutoBone {
    params: AutoBoneParams,
    bones: Mutex<BoneConfig>,
    skeleton: Mutex<Option<SharedSkeleton>>,
    mailbox: SkeletonMailbox,
    settings: Mutex<Box<dyn SettingsStore + Send>>,
    trackers: Box<dyn TrackerPresence + Send + Sync>,
    running: AtomicBool,
    cancel_requested: AtomicBool,
}

impl AutoBone {
    pub fn new(
        params: AutoBoneParams,
        settings: Box<dyn SettingsStore + Send>,
        trackers: Box<dyn TrackerPresence + Send + Sync>,
    ) -> Self {
        let bones = BoneConfig::load(settings.as_ref(), trackers.as_ref());
        Self {
            params,
            bones: Mutex::new(bones),
            skeleton: Mutex::new(None),
            mailbox: SkeletonMailbox::new(),
            settings: Mutex::new(settings),
            trackers,
            running: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
        }
    }

    pub fn params(&self) -> &AutoBoneParams {
        &self.params
    }

    /// 設定ストアのスナップショット
    pub fn bones(&self) -> BoneConfig {
        self.bones.lock().clone()
    }

    pub fn get(&self, joint: Joint) -> Option<f32> {
        self.bones.lock().get(joint)
    }

    pub fn lengths(&self) -> Lengths {
        self.bones.lock().lengths()
    }

    /// 1関節の長さを変更し、既知スケルトンと設定に反映して保存する
    ///
    /// 未登録の関節なら何もせず false。
    pub fn set_length(&self, joint: Joint, length: f32) -> Result<bool> {
        if !self.bones.lock().set_length(joint, length) {
            return Ok(false);
        }
        self.commit_length(joint, length)?;
        Ok(true)
    }

    /// 1関節を組み込みのデフォルト値に戻して保存する
    pub fn reset_length(&self, joint: Joint) -> Result<bool> {
        self.set_length(joint, joint.default_length())
    }

    fn commit_length(&self, joint: Joint, length: f32) -> Result<()> {
        if let Some(skeleton) = self.known_skeleton() {
            skeleton.lock().set_config(joint, length, false);
        }
        let mut settings = self.settings.lock();
        settings.set_float(joint.settings_key(), length);
        settings.save()?;
        Ok(())
    }

    /// 設定のデフォルト値を読み直す（Chestの役割もここで決まる）
    pub fn reload_config_values(&self) {
        let reloaded = self.load_defaults();
        *self.bones.lock() = reloaded;
    }

    fn load_defaults(&self) -> BoneConfig {
        let settings = self.settings.lock();
        BoneConfig::load(settings.as_ref(), self.trackers.as_ref())
    }

    /// スケルトン更新通知のハンドル
    pub fn skeleton_notifier(&self) -> SkeletonNotifier {
        self.mailbox.notifier()
    }

    pub fn known_skeleton(&self) -> Option<SharedSkeleton> {
        self.skeleton.lock().clone()
    }

    /// 未消費の通知があれば既知スケルトンとして採用し、現在の設定を反映する
    pub fn poll_skeleton_update(&self) -> Result<bool> {
        let Some(skeleton) = self.mailbox.take_latest() else {
            return Ok(false);
        };
        *self.skeleton.lock() = Some(skeleton.clone());
        log::info!("Received updated skeleton");
        self.apply_config_to_skeleton(&skeleton)?;
        Ok(true)
    }

    /// 既知スケルトンへ反映して保存。スケルトンが無ければ設定へ直接保存
    pub fn apply_config(&self) -> Result<()> {
        self.poll_skeleton_update()?;
        match self.known_skeleton() {
            Some(skeleton) => self.apply_config_to_skeleton(&skeleton),
            None => self.save_configs(),
        }
    }

    pub fn apply_config_to_skeleton(&self, skeleton: &SharedSkeleton) -> Result<()> {
        let tunable = self.bones.lock().tunable();
        {
            let mut skeleton = skeleton.lock();
            for (joint, length) in tunable {
                skeleton.set_config(joint, length, false);
            }
        }
        // スケルトン側は永続化しないので設定にも書き出す
        self.save_configs()?;
        log::info!("Configured skeleton bone lengths");
        Ok(())
    }

    /// スケルトン無しで設定に保存
    pub fn save_configs(&self) -> Result<()> {
        let bones = self.bones();
        let mut settings = self.settings.lock();
        bones.save(settings.as_mut())?;
        Ok(())
    }

    /// フレームペア間で実行中の最適化を止める
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn target_height(&self, explicit: Option<f32>, recording: &PoseRecording) -> Result<TargetHeight> {
        self.poll_skeleton_update()?;
        let known = self.known_skeleton().map(|s| s.lock().lengths());
        Ok(estimate_target_height(explicit, known.as_ref(), recording))
    }

    /// 記録全体でボーン長を最適化する
    ///
    /// `target_height` が None（または負）なら自動推定。`on_epoch` はエポック完了ごとに
    /// 同じスレッドで呼ばれる。
    pub fn process_frames<S: SkeletonEvaluator + Clone>(
        &self,
        recording: &PoseRecording,
        target_height: Option<f32>,
        mut on_epoch: Option<&mut dyn FnMut(&Epoch)>,
    ) -> Result<RunSummary> {
        self.params.validate()?;
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AutoBoneError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);
        self.cancel_requested.store(false, Ordering::SeqCst);

        let target = self.target_height(target_height, recording)?;
        let params = &self.params;
        let mut working = self.bones();
        let mut probe: ProbePair<S> = ProbePair::new(&working.tunable(), &working.statics());
        let mut epochs = Vec::new();

        for epoch in params.first_epoch()..params.epoch_count() {
            let mut sum_error = 0.0f32;
            let mut error_count = 0usize;
            let adjust_rate = params.adjust_rate(epoch);

            let pairs = frame_pairs(
                recording.len(),
                params.min_data_distance,
                params.max_data_distance,
                params.cursor_increment,
            );
            for (index1, index2) in pairs {
                if self.cancel_requested.load(Ordering::SeqCst) {
                    log::info!("Optimization cancelled during epoch {}", epoch + 1);
                    return Err(AutoBoneError::Cancelled);
                }

                let frame1 = recording
                    .get(index1)
                    .ok_or(AutoBoneError::MissingFrame { index: index1 })?;
                let frame2 = recording
                    .get(index2)
                    .ok_or(AutoBoneError::MissingFrame { index: index2 })?;
                let ctx = PairContext {
                    frame1,
                    frame2,
                    weights: &params.weights,
                    target_height: target.value,
                };

                probe.bind(&working.lengths(), frame1, frame2);

                let tunable = working.tunable();
                let total_length = total_sum(&tunable);
                let current_height = working.height();
                let error_deriv = ctx.error_deriv(probe.first(), probe.second(), current_height);
                let error = loss(error_deriv);

                if !error.is_finite() {
                    log::warn!("Error value is invalid, resetting variables to recover");
                    working = self.load_defaults();
                    sum_error = 0.0;
                    error_count = 0;
                    continue;
                }

                sum_error += error_deriv;
                error_count += 1;

                // エポック -1 は誤差の記録のみ
                if epoch < 0 {
                    continue;
                }

                let adjust = error * adjust_rate;
                for (joint, original_length) in tunable {
                    let new_length = trial_joint(
                        &mut probe,
                        &ctx,
                        joint,
                        original_length,
                        adjust,
                        total_length,
                        current_height,
                        error_deriv,
                    );
                    if let Some(new_length) = new_length {
                        working.set_length(joint, new_length);
                    }
                }
            }

            let record = Epoch {
                epoch,
                average_error: if error_count > 0 {
                    Some(sum_error / error_count as f32)
                } else {
                    None
                },
            };
            log::info!("{}", record);

            *self.bones.lock() = working.clone();
            if let Some(callback) = on_epoch.as_deref_mut() {
                callback(&record);
            }
            epochs.push(record);
        }

        let final_height = working.height();
        log::info!(
            "Target height: {} New height: {}",
            target.value,
            final_height
        );

        Ok(RunSummary {
            target,
            final_height,
            final_error: (final_height - target.value).abs(),
            epochs,
        })
    }
}
