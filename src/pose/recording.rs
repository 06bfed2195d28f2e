use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::PoseFrame;

/// 時系列順の姿勢記録
///
/// インデックスが離散時刻。`None` は欠落したサンプル。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoseRecording {
    frames: Vec<Option<PoseFrame>>,
}

impl PoseRecording {
    pub fn new(frames: Vec<Option<PoseFrame>>) -> Self {
        Self { frames }
    }

    pub fn from_frames(frames: Vec<PoseFrame>) -> Self {
        Self {
            frames: frames.into_iter().map(Some).collect(),
        }
    }

    pub fn push(&mut self, frame: PoseFrame) {
        self.frames.push(Some(frame));
    }

    /// 欠落サンプルを追加
    pub fn push_missing(&mut self) {
        self.frames.push(None);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 範囲外または欠落なら None
    pub fn get(&self, index: usize) -> Option<&PoseFrame> {
        self.frames.get(index).and_then(Option::as_ref)
    }

    /// 欠落を除いたフレーム
    pub fn frames(&self) -> impl Iterator<Item = &PoseFrame> {
        self.frames.iter().flatten()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read recording {}", path.display()))?;
        let recording: PoseRecording = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse recording {}", path.display()))?;
        Ok(recording)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).context("Failed to write recording file")?;
        Ok(())
    }
}
