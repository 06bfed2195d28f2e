//! ボーン長の設定ストア
//!
//! 各関節は `BoneRole::Tunable`（最適化対象）か `BoneRole::Static`（固定）の
//! どちらか一方だけを持つ。Chestの役割はリロード時にのみ決まる。

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::settings::SettingsStore;
use crate::tracker::TrackerPresence;

/// 関節名 → 長さ（メートル）
pub type Lengths = BTreeMap<Joint, f32>;

/// 胸トラッカーを強制的に調整対象にする設定キー
pub const FORCE_CHEST_TRACKER_KEY: &str = "autobone.forceChestTracker";

/// 身長を構成する関節（固定）
pub const HEIGHT_JOINTS: [Joint; 3] = [Joint::Neck, Joint::Waist, Joint::LegsLength];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Joint {
    Head,
    Neck,
    Chest,
    Waist,
    HipsWidth,
    LegsLength,
    KneeHeight,
}

impl Joint {
    pub const ALL: [Joint; 7] = [
        Joint::Head,
        Joint::Neck,
        Joint::Chest,
        Joint::Waist,
        Joint::HipsWidth,
        Joint::LegsLength,
        Joint::KneeHeight,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Joint::Head => "Head",
            Joint::Neck => "Neck",
            Joint::Chest => "Chest",
            Joint::Waist => "Waist",
            Joint::HipsWidth => "Hips width",
            Joint::LegsLength => "Legs length",
            Joint::KneeHeight => "Knee height",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|j| j.name() == name)
    }

    /// 永続化先の設定キー
    pub fn settings_key(self) -> &'static str {
        match self {
            Joint::Head => "body.headShift",
            Joint::Neck => "body.neckLength",
            Joint::Chest => "body.chestDistance",
            Joint::Waist => "body.waistDistance",
            Joint::HipsWidth => "body.hipsWidth",
            Joint::LegsLength => "body.legsLength",
            Joint::KneeHeight => "body.kneeHeight",
        }
    }

    pub fn default_length(self) -> f32 {
        match self {
            Joint::Head => 0.1,
            Joint::Neck => 0.1,
            Joint::Chest => 0.42,
            Joint::Waist => 0.85,
            Joint::HipsWidth => 0.3,
            Joint::LegsLength => 0.84,
            Joint::KneeHeight => 0.42,
        }
    }

    pub fn is_height_joint(self) -> bool {
        HEIGHT_JOINTS.contains(&self)
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoneRole {
    Tunable,
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneEntry {
    pub length: f32,
    pub role: BoneRole,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoneConfig {
    bones: BTreeMap<Joint, BoneEntry>,
}

impl BoneConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 設定のデフォルト値から構築（リロード）
    pub fn load(settings: &dyn SettingsStore, trackers: &dyn TrackerPresence) -> Self {
        let chest_role = if settings.get_bool(FORCE_CHEST_TRACKER_KEY, false)
            || trackers.has_chest_tracker()
        {
            BoneRole::Tunable
        } else {
            BoneRole::Static
        };

        let mut config = Self::new();
        for joint in Joint::ALL {
            let role = match joint {
                Joint::Head | Joint::Neck | Joint::HipsWidth => BoneRole::Static,
                Joint::Chest => chest_role,
                Joint::Waist | Joint::LegsLength | Joint::KneeHeight => BoneRole::Tunable,
            };
            let length = settings.get_float(joint.settings_key(), joint.default_length());
            config.insert(joint, length, role);
        }
        config
    }

    pub fn insert(&mut self, joint: Joint, length: f32, role: BoneRole) {
        self.bones.insert(joint, BoneEntry { length, role });
    }

    pub fn get(&self, joint: Joint) -> Option<f32> {
        self.bones.get(&joint).map(|e| e.length)
    }

    pub fn role(&self, joint: Joint) -> Option<BoneRole> {
        self.bones.get(&joint).map(|e| e.role)
    }

    /// 役割を変えずに長さを更新。未登録の関節なら false
    pub fn set_length(&mut self, joint: Joint, length: f32) -> bool {
        match self.bones.get_mut(&joint) {
            Some(entry) => {
                entry.length = length;
                true
            }
            None => false,
        }
    }

    /// 1関節だけ組み込みのデフォルト値に戻す（保存済みの値は使わない）
    pub fn reset_length(&mut self, joint: Joint) -> bool {
        self.set_length(joint, joint.default_length())
    }

    pub fn tunable_joints(&self) -> Vec<Joint> {
        self.joints_with(BoneRole::Tunable).map(|(j, _)| j).collect()
    }

    pub fn tunable(&self) -> Lengths {
        self.joints_with(BoneRole::Tunable).collect()
    }

    pub fn statics(&self) -> Lengths {
        self.joints_with(BoneRole::Static).collect()
    }

    /// 全関節（役割を問わない）
    pub fn lengths(&self) -> Lengths {
        self.bones.iter().map(|(j, e)| (*j, e.length)).collect()
    }

    pub fn height(&self) -> f32 {
        height_sum(&self.tunable(), Some(&self.statics()))
    }

    pub fn total_length(&self) -> f32 {
        total_sum(&self.tunable())
    }

    /// 調整対象の長さを設定に書き出して永続化
    pub fn save(&self, settings: &mut dyn SettingsStore) -> Result<()> {
        for (joint, length) in self.tunable() {
            settings.set_float(joint.settings_key(), length);
        }
        settings.save()
    }

    fn joints_with(&self, role: BoneRole) -> impl Iterator<Item = (Joint, f32)> + '_ {
        self.bones
            .iter()
            .filter(move |(_, e)| e.role == role)
            .map(|(j, e)| (*j, e.length))
    }
}

/// `primary` を優先し、無ければ `fallback` を参照
pub fn lookup(joint: Joint, primary: &Lengths, fallback: Option<&Lengths>) -> Option<f32> {
    primary
        .get(&joint)
        .or_else(|| fallback.and_then(|f| f.get(&joint)))
        .copied()
}

/// 身長 = 身長関節の合計
pub fn height_sum(tunable: &Lengths, statics: Option<&Lengths>) -> f32 {
    HEIGHT_JOINTS
        .iter()
        .filter_map(|&j| lookup(j, tunable, statics))
        .sum()
}

/// 調整対象の合計長（正規化の分母）
pub fn total_sum(tunable: &Lengths) -> f32 {
    tunable.values().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::TomlSettings;

    fn defaults(has_chest: bool) -> BoneConfig {
        BoneConfig::load(&TomlSettings::in_memory(), &has_chest)
    }

    #[test]
    fn test_default_roles_without_chest() {
        let config = defaults(false);
        assert_eq!(
            config.tunable_joints(),
            vec![Joint::Waist, Joint::LegsLength, Joint::KneeHeight]
        );
        assert_eq!(config.role(Joint::Chest), Some(BoneRole::Static));
        assert_eq!(config.role(Joint::Neck), Some(BoneRole::Static));
        assert_eq!(config.get(Joint::Chest), Some(0.42));
    }

    #[test]
    fn test_chest_tunable_with_tracker() {
        let config = defaults(true);
        assert_eq!(config.role(Joint::Chest), Some(BoneRole::Tunable));
        assert!(config.tunable().contains_key(&Joint::Chest));
        assert!(!config.statics().contains_key(&Joint::Chest));
    }

    #[test]
    fn test_force_chest_setting() {
        let mut settings = TomlSettings::in_memory();
        settings.set_float("body.chestDistance", 0.4);
        let table: toml::Table = "[autobone]\nforceChestTracker = true".parse().unwrap();
        let forced = TomlSettings::from_table(table);
        let config = BoneConfig::load(&forced, &false);
        assert_eq!(config.role(Joint::Chest), Some(BoneRole::Tunable));

        let config = BoneConfig::load(&settings, &false);
        assert_eq!(config.role(Joint::Chest), Some(BoneRole::Static));
        assert!((config.get(Joint::Chest).unwrap() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_every_joint_has_one_role() {
        let config = defaults(false);
        let tunable = config.tunable();
        let statics = config.statics();
        for joint in Joint::ALL {
            assert!(tunable.contains_key(&joint) ^ statics.contains_key(&joint), "{}", joint);
        }
    }

    #[test]
    fn test_height_sum_falls_back_to_static() {
        let config = defaults(false);
        // Neck(0.1, static) + Waist(0.85) + Legs(0.84)
        assert!((config.height() - 1.79).abs() < 1e-5);

        let tunable = config.tunable();
        // staticを渡さなければNeckは数えない
        assert!((height_sum(&tunable, None) - 1.69).abs() < 1e-5);

        let mut partial = Lengths::new();
        partial.insert(Joint::Waist, 0.7);
        let statics = config.statics();
        // Legsはtunable/static両方に無いので0
        assert!((height_sum(&partial, Some(&statics)) - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_height_sum_ignores_non_height_joints() {
        let mut tunable = Lengths::new();
        tunable.insert(Joint::Neck, 0.12);
        tunable.insert(Joint::Waist, 0.8);
        tunable.insert(Joint::LegsLength, 0.9);
        tunable.insert(Joint::KneeHeight, 0.45);
        tunable.insert(Joint::Chest, 0.4);
        assert!((height_sum(&tunable, None) - 1.82).abs() < 1e-5);
    }

    #[test]
    fn test_total_sum() {
        let config = defaults(false);
        assert!((config.total_length() - (0.85 + 0.84 + 0.42)).abs() < 1e-5);
    }

    #[test]
    fn test_lookup_prefers_primary() {
        let mut primary = Lengths::new();
        primary.insert(Joint::Waist, 0.7);
        let mut alt = Lengths::new();
        alt.insert(Joint::Waist, 0.9);
        alt.insert(Joint::Neck, 0.11);
        assert_eq!(lookup(Joint::Waist, &primary, Some(&alt)), Some(0.7));
        assert_eq!(lookup(Joint::Neck, &primary, Some(&alt)), Some(0.11));
        assert_eq!(lookup(Joint::Neck, &primary, None), None);
    }

    #[test]
    fn test_set_and_reset_length() {
        let mut settings = TomlSettings::in_memory();
        settings.set_float("body.waistDistance", 0.7);
        let mut config = BoneConfig::load(&settings, &false);
        assert_eq!(config.get(Joint::Waist), Some(0.7));
        assert!(config.set_length(Joint::Waist, 0.6));
        assert_eq!(config.get(Joint::Waist), Some(0.6));
        assert_eq!(config.role(Joint::Waist), Some(BoneRole::Tunable));
        // 保存済みの0.7ではなく組み込み値
        assert!(config.reset_length(Joint::Waist));
        assert_eq!(config.get(Joint::Waist), Some(0.85));
        assert!(!BoneConfig::new().set_length(Joint::Waist, 0.5));
    }

    #[test]
    fn test_save_writes_only_tunable() {
        let mut settings = TomlSettings::in_memory();
        let mut config = BoneConfig::load(&settings, &false);
        config.set_length(Joint::LegsLength, 0.91);
        config.set_length(Joint::Neck, 0.2);
        config.save(&mut settings).unwrap();

        assert!((settings.get_float("body.legsLength", 0.0) - 0.91).abs() < 1e-6);
        assert_eq!(settings.get_float("body.neckLength", -1.0), -1.0);
    }

    #[test]
    fn test_joint_names() {
        for joint in Joint::ALL {
            assert_eq!(Joint::from_name(joint.name()), Some(joint));
        }
        assert_eq!(Joint::from_name("Torso"), None);
        assert!(Joint::Waist.is_height_joint());
        assert!(!Joint::KneeHeight.is_height_joint());
    }
}
