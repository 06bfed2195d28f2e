use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use toml::{Table, Value};

/// 名前付き設定値の読み書き（身体寸法のデフォルト値など）
///
/// キーはドット区切り（例: `body.waistDistance`）。
pub trait SettingsStore {
    fn get_float(&self, key: &str, default: f32) -> f32;
    fn set_float(&mut self, key: &str, value: f32);
    fn get_bool(&self, key: &str, default: bool) -> bool;
    /// 永続化
    fn save(&mut self) -> Result<()>;
}

/// TOMLファイルをバックエンドにした設定ストア
#[derive(Debug, Clone, Default)]
pub struct TomlSettings {
    path: Option<PathBuf>,
    table: Table,
}

impl TomlSettings {
    /// ファイルを持たないストア（saveは何もしない）
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn from_table(table: Table) -> Self {
        Self { path: None, table }
    }

    /// ファイルから読み込む。存在しなければ空で作成し、save時に書き出す
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let table = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings file {}", path.display()))?;
            content
                .parse::<Table>()
                .with_context(|| format!("Failed to parse settings file {}", path.display()))?
        } else {
            Table::new()
        };
        Ok(Self {
            path: Some(path),
            table,
        })
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        let mut parts = key.split('.');
        let mut value = self.table.get(parts.next()?)?;
        for part in parts {
            value = value.as_table()?.get(part)?;
        }
        Some(value)
    }

    fn insert(&mut self, key: &str, value: Value) {
        let mut segments: Vec<&str> = key.split('.').collect();
        let Some(leaf) = segments.pop() else {
            return;
        };
        let mut table = &mut self.table;
        for segment in segments {
            let entry = table
                .entry(segment.to_string())
                .or_insert(Value::Table(Table::new()));
            // テーブル以外の値が途中にあれば置き換える
            if !entry.is_table() {
                *entry = Value::Table(Table::new());
            }
            table = match entry {
                Value::Table(t) => t,
                _ => return,
            };
        }
        table.insert(leaf.to_string(), value);
    }
}

impl SettingsStore for TomlSettings {
    fn get_float(&self, key: &str, default: f32) -> f32 {
        match self.lookup(key) {
            Some(Value::Float(v)) => *v as f32,
            Some(Value::Integer(v)) => *v as f32,
            _ => default,
        }
    }

    fn set_float(&mut self, key: &str, value: f32) {
        self.insert(key, Value::Float(value as f64));
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.lookup(key).and_then(Value::as_bool).unwrap_or(default)
    }

    fn save(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = toml::to_string_pretty(&self.table).context("Failed to serialize settings")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write settings file {}", path.display()))?;
        Ok(())
    }
}
