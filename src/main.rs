use anyhow::{bail, Context, Result};
use std::io::Write;
use std::sync::Arc;

use autobone::autobone::{worker, AutoBone, Joint};
use autobone::config::Config;
use autobone::pose::PoseRecording;
use autobone::settings::TomlSettings;
use autobone::skeleton::SimpleSkeleton;

const CONFIG_PATH: &str = "autobone.toml";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(buf, "[{}] {} - {}", record.level(), record.target(), record.args())
        })
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(recording_path) = args.get(1) else {
        let program = args.first().map(String::as_str).unwrap_or("autobone");
        bail!("usage: {} <recording.json> [{}]", program, CONFIG_PATH);
    };
    let config_path = args.get(2).map(String::as_str).unwrap_or(CONFIG_PATH);
    let config = Config::load_or_default(config_path);

    println!("=== AutoBone {} ===", env!("AUTOBONE_VERSION"));
    println!("記録: {}", recording_path);
    println!("設定: {}", config.settings_path.display());

    let recording = PoseRecording::load(recording_path)
        .with_context(|| format!("Failed to load recording {}", recording_path))?;
    println!("フレーム数: {}", recording.len());

    let settings = TomlSettings::load(&config.settings_path)?;
    let autobone = Arc::new(AutoBone::new(
        config.autobone.params.clone(),
        Box::new(settings),
        Box::new(config.trackers.positions.clone()),
    ));

    let params = autobone.params();
    println!(
        "エポック: {}, 調整率: {} (減衰 {})",
        params.num_epochs, params.initial_adjust_rate, params.adjust_rate_decay
    );
    print_lengths("初期値", &autobone);

    let job = worker::spawn::<SimpleSkeleton>(
        Arc::clone(&autobone),
        recording,
        config.autobone.target_height,
    );
    // 送信側はジョブ終了時に閉じる
    for epoch in job.epochs().iter() {
        println!("{}", epoch);
    }
    let summary = job.join()?;

    println!();
    println!("目標身長: {:.4} ({:?})", summary.target.value, summary.target.source);
    println!("推定身長: {:.4}", summary.final_height);
    println!("誤差: {:.4}", summary.final_error);
    print_lengths("推定値", &autobone);

    autobone.apply_config()?;
    println!("保存しました: {}", config.settings_path.display());

    Ok(())
}

fn print_lengths(label: &str, autobone: &AutoBone) {
    println!("{}:", label);
    for joint in Joint::ALL {
        if let Some(length) = autobone.get(joint) {
            println!("  {:<12} {:.4}", joint.name(), length);
        }
    }
}
