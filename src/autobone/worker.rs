//! 最適化を専用スレッドで実行する

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};
use crossbeam_channel::{unbounded, Receiver};

use super::error;
use super::optimizer::{AutoBone, Epoch, RunSummary};
use crate::pose::PoseRecording;
use crate::skeleton::SkeletonEvaluator;

/// 実行中の最適化ジョブ
pub struct AutoBoneJob {
    handle: JoinHandle<error::Result<RunSummary>>,
    epochs: Receiver<Epoch>,
}

impl AutoBoneJob {
    /// エポック完了ごとの進捗
    pub fn epochs(&self) -> &Receiver<Epoch> {
        &self.epochs
    }

    /// 終了を待つ。最適化の失敗は `AutoBoneError` として取り出せる
    pub fn join(self) -> Result<RunSummary> {
        let summary = self
            .handle
            .join()
            .map_err(|_| anyhow!("AutoBone worker thread panicked"))??;
        Ok(summary)
    }
}

/// `recording` の最適化を新しいスレッドで開始する
///
/// 進捗は `AutoBoneJob::epochs` から受け取る。受信側を捨てても実行は続く。
pub fn spawn<S>(autobone: Arc<AutoBone>, recording: PoseRecording, target_height: Option<f32>) -> AutoBoneJob
where
    S: SkeletonEvaluator + Clone + 'static,
{
    let (sender, epochs) = unbounded();
    let handle = thread::spawn(move || {
        let mut forward = |epoch: &Epoch| {
            let _ = sender.send(*epoch);
        };
        let result = autobone.process_frames::<S>(&recording, target_height, Some(&mut forward));
        match &result {
            Ok(summary) => log::info!("AutoBone finished, final error: {}", summary.final_error),
            Err(e) => log::warn!("AutoBone failed: {}", e),
        }
        result
    });
    AutoBoneJob { handle, epochs }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autobone::error::AutoBoneError;
    use crate::autobone::optimizer::AutoBoneParams;
    use crate::pose::PoseFrame;
    use crate::settings::TomlSettings;
    use crate::skeleton::SimpleSkeleton;
    use nalgebra::Vector3;

    fn autobone() -> Arc<AutoBone> {
        Arc::new(AutoBone::new(
            AutoBoneParams::default(),
            Box::new(TomlSettings::in_memory()),
            Box::new(false),
        ))
    }

    fn walking(count: usize) -> PoseRecording {
        PoseRecording::from_frames(
            (0..count)
                .map(|i| {
                    let phase = i as f32 * 0.3;
                    PoseFrame::new(Vector3::new(0.02 * phase.sin(), 1.7 + 0.01 * phase.cos(), 0.0))
                })
                .collect(),
        )
    }

    #[test]
    fn test_worker_reports_every_epoch() {
        let job = spawn::<SimpleSkeleton>(autobone(), walking(20), None);
        let epochs = job.epochs.clone();
        let result = job.join().unwrap();

        let received: Vec<Epoch> = epochs.try_iter().collect();
        assert_eq!(received, result.epochs);
        assert_eq!(received.len(), 6);
        assert_eq!(received[0].epoch, -1);
        assert_eq!(received[5].epoch, 4);
    }

    #[test]
    fn test_worker_surfaces_missing_frame() {
        let mut recording = walking(4);
        recording.push_missing();
        let job = spawn::<SimpleSkeleton>(autobone(), recording, Some(1.7));
        let err = job.join().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AutoBoneError>(),
            Some(AutoBoneError::MissingFrame { .. })
        ));
    }

    #[test]
    fn test_second_run_rejected_while_active() {
        let autobone = autobone();
        let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(1);
        let (resume_tx, resume_rx) = crossbeam_channel::bounded::<()>(1);

        let runner = Arc::clone(&autobone);
        let handle = thread::spawn(move || {
            let mut first = true;
            let mut hold = |_: &Epoch| {
                // 最初のエポックで止まって待つ
                if first {
                    first = false;
                    let _ = started_tx.send(());
                    let _ = resume_rx.recv();
                }
            };
            runner.process_frames::<SimpleSkeleton>(&walking(10), None, Some(&mut hold))
        });

        started_rx.recv().unwrap();
        assert!(autobone.is_running());
        let second = autobone.process_frames::<SimpleSkeleton>(&walking(10), None, None);
        assert!(matches!(second, Err(AutoBoneError::AlreadyRunning)));
        resume_tx.send(()).unwrap();

        assert!(handle.join().unwrap().is_ok());
        assert!(!autobone.is_running());
    }
}
