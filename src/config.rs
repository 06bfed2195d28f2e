use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::autobone::AutoBoneParams;
use crate::tracker::TrackerPosition;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub autobone: AutoBoneConfig,
    #[serde(default)]
    pub trackers: TrackersConfig,
    /// 身体寸法のデフォルト値を持つ設定ファイル（結果の保存先）
    #[serde(default = "default_settings_path")]
    pub settings_path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AutoBoneConfig {
    #[serde(flatten)]
    pub params: AutoBoneParams,
    /// 目標身長（メートル）。未指定なら自動推定
    #[serde(default)]
    pub target_height: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackersConfig {
    /// 装着しているトラッカー
    #[serde(default)]
    pub positions: Vec<TrackerPosition>,
}

fn default_settings_path() -> PathBuf { PathBuf::from("vrconfig.toml") }

impl Default for Config {
    fn default() -> Self {
        Self {
            autobone: AutoBoneConfig::default(),
            trackers: TrackersConfig::default(),
            settings_path: default_settings_path(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// 読めなければデフォルト値
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{:#}, using defaults", e);
                Self::default()
            }
        }
    }
}
