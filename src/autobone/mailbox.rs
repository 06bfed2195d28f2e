//! スケルトン更新通知の1スロットメールボックス
//!
//! 通知側はいつでも投函できる。未消費の通知があれば新しいもので置き換える。
//! 最適化器は決まった時点（目標身長の推定開始時・設定適用時）でのみ受け取る。

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::skeleton::SharedSkeleton;

pub struct SkeletonMailbox {
    sender: Sender<SharedSkeleton>,
    receiver: Receiver<SharedSkeleton>,
}

impl SkeletonMailbox {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(1);
        Self { sender, receiver }
    }

    /// 通知用ハンドル（別スレッドへ渡せる）
    pub fn notifier(&self) -> SkeletonNotifier {
        SkeletonNotifier {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
        }
    }

    /// 最新の通知を取り出す
    pub fn take_latest(&self) -> Option<SharedSkeleton> {
        self.receiver.try_iter().last()
    }
}

impl Default for SkeletonMailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct SkeletonNotifier {
    sender: Sender<SharedSkeleton>,
    receiver: Receiver<SharedSkeleton>,
}

impl SkeletonNotifier {
    /// 新しいスケルトンが利用可能になった
    pub fn notify(&self, skeleton: SharedSkeleton) {
        let mut pending = skeleton;
        loop {
            match self.sender.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    // 古い通知を捨てて入れ直す
                    let _ = self.receiver.try_recv();
                    pending = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}
