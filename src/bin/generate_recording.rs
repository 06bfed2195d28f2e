use anyhow::{Context, Result};
use nalgebra::{UnitQuaternion, Vector3};

use autobone::autobone::bones::height_sum;
use autobone::autobone::{Joint, Lengths};
use autobone::pose::{PoseFrame, PoseRecording};
use autobone::skeleton::{nodes, segments, SimpleSkeleton, SkeletonEvaluator};

const DEFAULT_FRAMES: usize = 200;
// 記録のフレーム間隔（秒）
const FRAME_INTERVAL: f32 = 1.0 / 20.0;
// 足踏みの周期（秒）
const STEP_PERIOD: f32 = 1.2;

/// 足踏みする人の合成記録を生成する
///
/// `--anchors` を付けると参照スケルトンのノード位置を正解アンカーとして書き込む。
fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let anchors = args.iter().any(|a| a == "--anchors");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();

    let output = positional
        .first()
        .map(|s| s.as_str())
        .unwrap_or("recording.json");
    let frames = match positional.get(1) {
        Some(count) => count
            .parse::<usize>()
            .with_context(|| format!("Invalid frame count: {}", count))?,
        None => DEFAULT_FRAMES,
    };

    let lengths = reference_lengths();
    let height = height_sum(&lengths, None);
    println!("参照身長: {:.3}", height);

    let mut skeleton = SimpleSkeleton::new(lengths);
    let mut recording = PoseRecording::default();
    for i in 0..frames {
        let t = i as f32 * FRAME_INTERVAL;
        let mut frame = walking_frame(t, height);
        if anchors {
            skeleton.set_pose(&frame);
            for node in nodes::ALL {
                if let Some(position) = skeleton.node_position(node) {
                    frame = frame.with_position(node, position);
                }
            }
        }
        recording.push(frame);
    }

    recording.save(output)?;
    println!("{} フレームを書き出しました: {}", recording.len(), output);
    Ok(())
}

fn reference_lengths() -> Lengths {
    [
        (Joint::Head, 0.1),
        (Joint::Neck, 0.1),
        (Joint::Chest, 0.36),
        (Joint::Waist, 0.74),
        (Joint::HipsWidth, 0.28),
        (Joint::LegsLength, 0.92),
        (Joint::KneeHeight, 0.47),
    ]
    .into_iter()
    .collect()
}

/// 時刻 `t` の姿勢。片足ずつ腿を上げ、上げている間は頭が少し下がる
fn walking_frame(t: f32, height: f32) -> PoseFrame {
    let phase = t / STEP_PERIOD * std::f32::consts::TAU;
    let left_lift = phase.sin().max(0.0);
    let right_lift = (-phase.sin()).max(0.0);

    let thigh = |lift: f32| UnitQuaternion::from_euler_angles(-0.6 * lift, 0.0, 0.0);
    let shin = |lift: f32| UnitQuaternion::from_euler_angles(0.3 * lift, 0.0, 0.0);
    let sway = UnitQuaternion::from_euler_angles(0.0, 0.0, 0.03 * phase.sin());
    let head = UnitQuaternion::from_euler_angles(0.05 * phase.cos(), 0.1 * (0.5 * phase).sin(), 0.0);

    let bob = 0.02 * (left_lift + right_lift);
    PoseFrame::new(Vector3::new(0.01 * phase.sin(), height - bob, 0.0))
        .with_rotation(segments::HEAD, head)
        .with_rotation(segments::WAIST, sway)
        .with_rotation(segments::LEFT_UPPER_LEG, thigh(left_lift))
        .with_rotation(segments::RIGHT_UPPER_LEG, thigh(right_lift))
        .with_rotation(segments::LEFT_LOWER_LEG, thigh(left_lift) * shin(left_lift))
        .with_rotation(segments::RIGHT_LOWER_LEG, thigh(right_lift) * shin(right_lift))
}
