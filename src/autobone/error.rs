//! ボーン長最適化のエラー型

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutoBoneError {
    /// フレームペアが欠落サンプルを参照した
    #[error("Frames are missing from processing data (index {index})")]
    MissingFrame { index: usize },

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("An optimization run is already active")]
    AlreadyRunning,

    #[error("Optimization was cancelled")]
    Cancelled,

    #[error("Failed to save configuration: {0}")]
    Settings(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AutoBoneError>;
