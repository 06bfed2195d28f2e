use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 記録された1サンプル分の姿勢
///
/// - `root_position`: HMDのワールド座標（y上向き、メートル）
/// - `rotations`: 部位名 → トラッカー回転（スケルトン評価器が使用）
/// - `positions`: ノード名 → 絶対位置（正解アンカー、空でもよい）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    pub root_position: Vector3<f32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rotations: BTreeMap<String, UnitQuaternion<f32>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub positions: BTreeMap<String, Vector3<f32>>,
}

impl PoseFrame {
    pub fn new(root_position: Vector3<f32>) -> Self {
        Self {
            root_position,
            rotations: BTreeMap::new(),
            positions: BTreeMap::new(),
        }
    }

    /// 部位の回転を付与
    pub fn with_rotation(mut self, segment: &str, rotation: UnitQuaternion<f32>) -> Self {
        self.rotations.insert(segment.to_string(), rotation);
        self
    }

    /// 正解アンカーを付与
    pub fn with_position(mut self, node: &str, position: Vector3<f32>) -> Self {
        self.positions.insert(node.to_string(), position);
        self
    }

    pub fn rotation(&self, segment: &str) -> Option<&UnitQuaternion<f32>> {
        self.rotations.get(segment)
    }

    pub fn position(&self, node: &str) -> Option<&Vector3<f32>> {
        self.positions.get(node)
    }

    pub fn has_positions(&self) -> bool {
        !self.positions.is_empty()
    }

    /// HMDの高さ（y成分）
    pub fn hmd_height(&self) -> f32 {
        self.root_position.y
    }
}
