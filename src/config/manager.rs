//! # 设置文件管理
//!
//! 加载、保存设置文件。
//!
//! ## 功能
//! - 文件缺失时使用默认值，缺失键回退默认值，未知键忽略
//! - 原子写入（同目录临时文件 + rename）
//! - 仅在内容修改后保存
//!
//! ## 依赖关系
//! - 被 `main.rs`, `commands/` 使用
//! - 使用 `dirs` 定位用户配置目录

use super::settings::Settings;
use crate::error::{PortError, Result};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// 设置文件管理器
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
    modified: bool,
}

impl ConfigManager {
    /// 创建管理器（不读取文件）
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
            modified: false,
        }
    }

    /// 默认设置文件路径: `<config dir>/s2port/settings.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("s2port")
            .join("settings.toml")
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// 可变访问，标记为已修改
    pub fn settings_mut(&mut self) -> &mut Settings {
        self.modified = true;
        &mut self.settings
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// 读取设置文件；不存在时使用默认值
    pub fn load(&mut self) -> Result<()> {
        if !self.config_path.exists() {
            log::debug!(
                "no settings file at {}, using defaults",
                self.config_path.display()
            );
            self.settings = Settings::default();
            return Ok(());
        }

        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| PortError::read(&self.config_path, e))?;
        self.settings = toml::from_str(&content)?;
        self.modified = false;
        log::debug!("loaded settings from {}", self.config_path.display());
        Ok(())
    }

    /// 保存设置（原子写入）
    pub fn save(&mut self) -> Result<()> {
        let mut content = String::from("# s2port settings\n\n");
        content.push_str(&toml::to_string_pretty(&self.settings)?);
        self.atomic_write(&content)?;
        self.modified = false;
        log::info!("settings saved to {}", self.config_path.display());
        Ok(())
    }

    /// 有修改时才保存
    pub fn save_if_modified(&mut self) -> Result<()> {
        if self.is_modified() {
            self.save()?;
        }
        Ok(())
    }

    fn atomic_write(&self, content: &str) -> Result<()> {
        let path = &self.config_path;
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| PortError::write(parent, e))?;

        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| PortError::write(path, e))?;
        temp.write_all(content.as_bytes())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| PortError::write(path, e))?;
        temp.persist(path)
            .map_err(|e| PortError::write(path, e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::CollisionPolicy;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ConfigManager::new(dir.path().join("settings.toml"));
        manager.load().unwrap();
        assert_eq!(manager.settings(), &Settings::default());
        assert!(!manager.is_modified());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let mut manager = ConfigManager::new(&path);
        manager.settings_mut().general.collision = CollisionPolicy::Rename;
        manager
            .settings_mut()
            .tools
            .entry("qc".into())
            .or_default()
            .insert("fps".into(), toml::Value::Integer(24));
        manager.save_if_modified().unwrap();
        assert!(path.exists());

        let mut reloaded = ConfigManager::new(&path);
        reloaded.load().unwrap();
        assert_eq!(reloaded.settings().general.collision, CollisionPolicy::Rename);
        assert_eq!(
            reloaded.settings().tool_options("qc").get("fps").map(String::as_str),
            Some("24")
        );
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "[general]\njobs = 4\nshiny = true\n\n[window]\nwidth = 3\n").unwrap();
        let mut manager = ConfigManager::new(&path);
        manager.load().unwrap();
        assert_eq!(manager.settings().general.jobs, 4);
    }
}
