use serde::{Deserialize, Serialize};

/// トラッカーの装着部位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerPosition {
    Head,
    Chest,
    Hip,
    LeftKnee,
    RightKnee,
    LeftFoot,
    RightFoot,
}

/// 構成済みトラッカーの存在問い合わせ
///
/// リロード時にのみ参照される（Chestを調整対象にするかの判定）。
pub trait TrackerPresence {
    fn has_chest_tracker(&self) -> bool;
}

impl TrackerPresence for [TrackerPosition] {
    fn has_chest_tracker(&self) -> bool {
        self.contains(&TrackerPosition::Chest)
    }
}

impl TrackerPresence for Vec<TrackerPosition> {
    fn has_chest_tracker(&self) -> bool {
        self.as_slice().has_chest_tracker()
    }
}

impl TrackerPresence for bool {
    fn has_chest_tracker(&self) -> bool {
        *self
    }
}
