//! # 工具注册表
//!
//! 进程级只读注册表：工具 id -> (描述, 构造函数)。
//! 启动时由内置工具表一次性构建，之后不再修改，无需加锁。
//!
//! ## 依赖关系
//! - 被 `main.rs`, `commands/`, `batch/dispatcher.rs` 使用
//! - 引用全部工具子模块的 `DESCRIPTOR` 与构造函数

use super::{ToolContract, ToolDescriptor};
use crate::error::{PortError, Result};

use std::sync::OnceLock;

/// 工具构造函数
pub type Constructor = fn() -> Box<dyn ToolContract>;

struct Entry {
    descriptor: &'static ToolDescriptor,
    constructor: Constructor,
}

/// 工具注册表
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；id 重复时保留先注册的工具
    pub fn register(
        &mut self,
        descriptor: &'static ToolDescriptor,
        constructor: Constructor,
    ) -> Result<()> {
        if self.entries.iter().any(|e| e.descriptor.id == descriptor.id) {
            return Err(PortError::DuplicateIdentifier(descriptor.id.to_string()));
        }
        self.entries.push(Entry {
            descriptor,
            constructor,
        });
        Ok(())
    }

    /// 按 id 查找描述
    pub fn get(&self, id: &str) -> Result<&'static ToolDescriptor> {
        self.entries
            .iter()
            .find(|e| e.descriptor.id == id)
            .map(|e| e.descriptor)
            .ok_or_else(|| PortError::NotFound(id.to_string()))
    }

    /// 创建新的工具实例
    pub fn create(&self, id: &str) -> Result<Box<dyn ToolContract>> {
        self.entries
            .iter()
            .find(|e| e.descriptor.id == id)
            .map(|e| (e.constructor)())
            .ok_or_else(|| PortError::NotFound(id.to_string()))
    }

    /// 按注册顺序遍历
    pub fn list(&self) -> impl Iterator<Item = &'static ToolDescriptor> + '_ {
        self.entries.iter().map(|e| e.descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 内置工具表
    pub fn builtin() -> Result<Self> {
        use super::*;

        let table: [(&'static ToolDescriptor, Constructor); 17] = [
            (&texture::DESCRIPTOR, texture::create),
            (&vmat::DESCRIPTOR, vmat::create),
            (&bones::DESCRIPTOR, bones::create),
            (&qc::DESCRIPTOR, qc::create),
            (&loop_sound::DESCRIPTOR, loop_sound::create),
            (&quad_stereo::DESCRIPTOR, quad_stereo::create),
            (&color_alpha::DESCRIPTOR, color_alpha::create),
            (&metal_alpha::DESCRIPTOR, metal_alpha::create),
            (&brightness_alpha::DESCRIPTOR, brightness_alpha::create),
            (&subtexture::DESCRIPTOR, subtexture::create),
            (&search_replace::DESCRIPTOR, search_replace::create),
            (&sanitize::DESCRIPTOR, sanitize::create),
            (&soundscape::DESCRIPTOR, soundscape::create),
            (&vmt_gen::DESCRIPTOR, vmt_gen::create),
            (&ao_bake::DESCRIPTOR, ao_bake::create),
            (&pbr_bake::DESCRIPTOR, pbr_bake::create),
            (&qc_prefix::DESCRIPTOR, qc_prefix::create),
        ];

        let mut registry = Self::new();
        for (descriptor, constructor) in table {
            registry.register(descriptor, constructor)?;
        }
        Ok(registry)
    }
}

static REGISTRY: OnceLock<ToolRegistry> = OnceLock::new();

/// 初始化全局注册表（幂等）
pub fn init() -> Result<&'static ToolRegistry> {
    if let Some(registry) = REGISTRY.get() {
        return Ok(registry);
    }
    let registry = ToolRegistry::builtin()?;
    log::debug!("registered {} tools", registry.len());
    Ok(REGISTRY.get_or_init(|| registry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchDispatcher, CancelToken, JobCommand};
    use crate::tools::{qc, texture, BatchMode};

    static SHADOW_QC: ToolDescriptor = ToolDescriptor {
        id: "qc",
        name: "Shadow QC",
        description: "duplicate id",
        extensions: &["smd"],
        mode: BatchMode::PerFile,
        options: &[],
    };

    #[test]
    fn test_duplicate_rejected_first_kept() {
        let mut registry = ToolRegistry::new();
        registry.register(&qc::DESCRIPTOR, qc::create).unwrap();
        let err = registry
            .register(&SHADOW_QC, texture::create)
            .unwrap_err();
        assert!(matches!(err, PortError::DuplicateIdentifier(ref id) if id == "qc"));

        let active = registry.get("qc").unwrap();
        assert_eq!(active.name, qc::DESCRIPTOR.name);
        assert_eq!(registry.create("qc").unwrap().descriptor().name, qc::DESCRIPTOR.name);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_not_found() {
        let registry = ToolRegistry::new();
        assert!(matches!(registry.get("nope"), Err(PortError::NotFound(_))));
        assert!(registry.create("nope").is_err());
    }

    #[test]
    fn test_builtin_order_and_uniqueness() {
        let registry = ToolRegistry::builtin().unwrap();
        let ids: Vec<_> = registry.list().map(|d| d.id).collect();
        assert_eq!(ids.len(), 17);
        assert_eq!(ids[0], "texture");
        assert_eq!(ids[13], "vmt-gen");
        assert_eq!(ids[14], "ao-bake");
        assert_eq!(ids[16], "qc-prefix");
        // 可重复遍历
        assert_eq!(registry.list().count(), ids.len());
    }

    #[test]
    fn test_every_tool_rejects_bad_inputs() {
        let registry = ToolRegistry::builtin().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let wrong = dir.path().join("input.wrongext");
        std::fs::write(&wrong, b"data").unwrap();
        let missing = dir.path().join("missing.txt");

        for descriptor in registry.list() {
            let tool = registry.create(descriptor.id).unwrap();
            assert!(!tool.validate(&[]).is_empty(), "{} accepted no inputs", descriptor.id);
            if descriptor.extensions.is_empty() {
                assert!(!tool.validate(&[missing.clone()]).is_empty(), "{}", descriptor.id);
            } else {
                assert!(
                    !tool.validate(&[wrong.clone()]).is_empty(),
                    "{} accepted .wrongext",
                    descriptor.id
                );
            }
        }
    }

    #[test]
    fn test_every_tool_plan_stops_on_empty_input() {
        let registry = ToolRegistry::builtin().unwrap();
        let out = tempfile::tempdir().unwrap();
        let dispatcher = BatchDispatcher::new(&registry, CancelToken::new());

        for descriptor in registry.list() {
            let cmd = JobCommand {
                tool: descriptor.id.to_string(),
                output_dir: out.path().to_path_buf(),
                ..Default::default()
            };
            assert!(
                matches!(dispatcher.plan(&cmd), Err(PortError::ValidationError { .. })),
                "{} planned an empty batch",
                descriptor.id
            );
        }
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_every_tool_has_valid_defaults() {
        let registry = ToolRegistry::builtin().unwrap();
        for descriptor in registry.list() {
            let options = crate::tools::ToolOptions::defaults(descriptor.options);
            assert!(options.is_ok(), "bad defaults for {}", descriptor.id);
        }
    }
}
