//! # 输出暂存区
//!
//! 工具的所有输出先写入输出目录下的临时目录，成功后再移动到最终位置。
//! 暂存区未提交即被丢弃时，临时目录连同其中文件一并删除。
//!
//! ## 功能
//! - 最终路径 -> 暂存路径的映射（保持相对结构）
//! - 提交：创建父目录并移动（rename 失败时 copy + 删除）
//! - 被覆盖的已有文件先移入暂存区备份，提交中途失败时撤回已移动的文件并恢复备份
//!
//! ## 依赖关系
//! - 被 `batch/dispatcher.rs`, `tools/mod.rs` 使用
//! - 使用 `tempfile` 创建临时目录

use crate::error::{PortError, Result};

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// 暂存文件子目录
const STAGED_DIR: &str = "staged";
/// 被覆盖文件的备份子目录
const BACKUP_DIR: &str = "backup";

/// 输出暂存区
pub struct Staging {
    /// 输出根目录
    root: PathBuf,
    /// 临时目录（位于输出根目录内，保证同一文件系统）
    dir: TempDir,
    /// 已登记的最终路径（按登记顺序）
    entries: Vec<PathBuf>,
}

/// 已提交的一项：最终路径与其原文件的备份
struct Placed {
    target: PathBuf,
    backup: Option<PathBuf>,
}

impl Staging {
    /// 在输出根目录下创建暂存区
    pub fn new(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).map_err(|e| PortError::write(root, e))?;
        let dir = tempfile::Builder::new()
            .prefix(".s2port-stage-")
            .tempdir_in(root)
            .map_err(|e| PortError::write(root, e))?;
        Ok(Self {
            root: root.to_path_buf(),
            dir,
            entries: Vec::new(),
        })
    }

    fn relative<'p>(&self, final_path: &'p Path) -> Result<&'p Path> {
        final_path.strip_prefix(&self.root).map_err(|_| {
            PortError::InvalidArgument(format!(
                "output {} is outside the output directory {}",
                final_path.display(),
                self.root.display()
            ))
        })
    }

    /// 为最终路径分配暂存路径
    pub fn path_for(&mut self, final_path: &Path) -> Result<PathBuf> {
        let staged = self.dir.path().join(STAGED_DIR).join(self.relative(final_path)?);
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent).map_err(|e| PortError::write(parent, e))?;
        }
        if !self.entries.iter().any(|p| p == final_path) {
            self.entries.push(final_path.to_path_buf());
        }
        Ok(staged)
    }

    /// 提交：将暂存文件移动到最终位置，返回实际写出的路径
    ///
    /// 任一文件移动失败时，本次已写出的文件被删除，被覆盖的原文件从备份恢复。
    pub fn commit(self) -> Result<Vec<PathBuf>> {
        let mut placed: Vec<Placed> = Vec::new();

        for final_path in &self.entries {
            let relative = match self.relative(final_path) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            let staged = self.dir.path().join(STAGED_DIR).join(relative);
            // 登记后未实际写入的路径
            if !staged.is_file() {
                continue;
            }
            let backup = self.dir.path().join(BACKUP_DIR).join(relative);
            match place(&staged, final_path, &backup) {
                Ok(entry) => placed.push(entry),
                Err(e) => {
                    rollback(&placed);
                    return Err(e);
                }
            }
        }

        log::debug!(
            "committed {} file(s) into {}",
            placed.len(),
            self.root.display()
        );
        Ok(placed.into_iter().map(|p| p.target).collect())
    }
}

/// 将暂存文件放到最终位置，已有文件先移入备份
fn place(staged: &Path, target: &Path, backup: &Path) -> Result<Placed> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| PortError::write(parent, e))?;
    }

    let backup = if target.is_file() {
        if let Some(parent) = backup.parent() {
            fs::create_dir_all(parent).map_err(|e| PortError::write(parent, e))?;
        }
        fs::rename(target, backup).map_err(|e| PortError::write(target, e))?;
        Some(backup.to_path_buf())
    } else {
        None
    };

    if let Err(e) = move_file(staged, target) {
        if let Some(saved) = &backup {
            restore(saved, target);
        }
        return Err(e);
    }
    Ok(Placed {
        target: target.to_path_buf(),
        backup,
    })
}

/// 撤回已放置的文件（逆序），恢复备份
fn rollback(placed: &[Placed]) {
    for entry in placed.iter().rev() {
        if let Err(e) = fs::remove_file(&entry.target) {
            log::warn!("rollback: could not remove {}: {}", entry.target.display(), e);
        }
        if let Some(saved) = &entry.backup {
            restore(saved, &entry.target);
        }
    }
}

fn restore(backup: &Path, target: &Path) {
    if let Err(e) = fs::rename(backup, target) {
        log::warn!("rollback: could not restore {}: {}", target.display(), e);
    }
}

/// 移动文件，跨设备时退化为复制
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_err() {
        fs::copy(from, to).map_err(|e| PortError::write(to, e))?;
        let _ = fs::remove_file(from);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visible_files(root: &Path) -> Vec<PathBuf> {
        walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().strip_prefix(root).unwrap().to_path_buf())
            .collect()
    }

    #[test]
    fn test_commit_moves_files() {
        let out = tempfile::tempdir().unwrap();
        let mut staging = Staging::new(out.path()).unwrap();
        let target = out.path().join("sub").join("a.txt");
        let staged = staging.path_for(&target).unwrap();
        fs::write(&staged, "hello").unwrap();
        assert!(!target.exists());

        let moved = staging.commit().unwrap();
        assert_eq!(moved, vec![target.clone()]);
        assert_eq!(fs::read_to_string(&target).unwrap(), "hello");
        assert_eq!(visible_files(out.path()), vec![PathBuf::from("sub/a.txt")]);
    }

    #[test]
    fn test_drop_discards() {
        let out = tempfile::tempdir().unwrap();
        {
            let mut staging = Staging::new(out.path()).unwrap();
            let staged = staging.path_for(&out.path().join("a.txt")).unwrap();
            fs::write(staged, "x").unwrap();
        }
        assert!(visible_files(out.path()).is_empty());
    }

    #[test]
    fn test_commit_overwrites_existing() {
        let out = tempfile::tempdir().unwrap();
        let target = out.path().join("a.txt");
        fs::write(&target, "old").unwrap();

        let mut staging = Staging::new(out.path()).unwrap();
        fs::write(staging.path_for(&target).unwrap(), "new").unwrap();
        staging.commit().unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
        assert_eq!(visible_files(out.path()), vec![PathBuf::from("a.txt")]);
    }

    #[test]
    fn test_failed_commit_restores_existing() {
        let out = tempfile::tempdir().unwrap();
        let first = out.path().join("a.txt");
        fs::write(&first, "old").unwrap();
        // 目录占据了第二个输出的位置，移动必然失败
        let blocked = out.path().join("b.txt");
        fs::create_dir(&blocked).unwrap();
        fs::write(blocked.join("keep"), "x").unwrap();

        let mut staging = Staging::new(out.path()).unwrap();
        fs::write(staging.path_for(&first).unwrap(), "new a").unwrap();
        fs::write(staging.path_for(&blocked).unwrap(), "new b").unwrap();
        assert!(staging.commit().is_err());

        assert_eq!(fs::read_to_string(&first).unwrap(), "old");
        assert!(blocked.is_dir());
        let mut files = visible_files(out.path());
        files.sort();
        assert_eq!(files, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt/keep")]);
    }

    #[test]
    fn test_failed_commit_removes_new_files() {
        let out = tempfile::tempdir().unwrap();
        let blocked = out.path().join("z.txt");
        fs::create_dir(&blocked).unwrap();

        let mut staging = Staging::new(out.path()).unwrap();
        fs::write(staging.path_for(&out.path().join("fresh.txt")).unwrap(), "x").unwrap();
        fs::write(staging.path_for(&blocked).unwrap(), "y").unwrap();
        assert!(staging.commit().is_err());

        assert!(!out.path().join("fresh.txt").exists());
        assert!(visible_files(out.path()).is_empty());
    }

    #[test]
    fn test_rejects_outside_root() {
        let out = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let mut staging = Staging::new(out.path()).unwrap();
        assert!(staging.path_for(&other.path().join("a.txt")).is_err());
    }
}
