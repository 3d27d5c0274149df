//! # 批处理调度器
//!
//! 将一次工具调用（工具 + 选项 + 输入集合）展开为作业项并执行。
//!
//! ## 功能
//! - 实例化并配置工具，展开目录输入，执行校验
//! - 应用输出冲突策略
//! - 逐文件模式：单项失败继续，每项独立暂存
//! - 原子模式：整批单次运行，任一失败整体回滚
//! - 单调进度事件，协作式取消
//!
//! ## 依赖关系
//! - 被 `commands/run.rs`, `commands/validate.rs` 调用
//! - 使用 `batch/collector.rs`, `batch/resolver.rs`, `batch/staging.rs`
//! - 使用 `tools/registry.rs` 创建工具实例

use crate::batch::cancel::CancelToken;
use crate::batch::collector::{CollectedFile, FileCollector};
use crate::batch::resolver::{resolve_jobs, CollisionPolicy};
use crate::batch::staging::Staging;
use crate::error::{PortError, Result};
use crate::models::{BatchState, BatchSummary, JobFailure, JobItem, JobResult};
use crate::tools::{BatchMode, RunContext, ToolContract, ToolOptions, ToolRegistry};

use std::collections::BTreeMap;
use std::path::PathBuf;

/// 一次批处理请求
#[derive(Debug, Clone, Default)]
pub struct JobCommand {
    pub tool: String,
    /// 原始选项（依据工具 schema 解析）
    pub options: BTreeMap<String, String>,
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub collision: CollisionPolicy,
    pub recursive: bool,
    /// 目录展开的文件名模式（逗号分隔）
    pub pattern: Option<String>,
}

/// 调度过程中发往界面线程的事件
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Started { tool: String, total: usize },
    Progress(f64),
    ItemFinished(JobResult),
}

/// 已校验、已解析输出路径的批次计划
pub struct BatchPlan {
    pub tool: Box<dyn ToolContract>,
    pub jobs: Vec<JobItem>,
}

/// 单调进度跟踪
struct ProgressTracker<'e> {
    last: f64,
    emit: &'e mut dyn FnMut(BatchEvent),
}

impl<'e> ProgressTracker<'e> {
    fn new(emit: &'e mut dyn FnMut(BatchEvent)) -> Self {
        Self { last: 0.0, emit }
    }

    fn update(&mut self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction > self.last {
            self.last = fraction;
            (self.emit)(BatchEvent::Progress(fraction));
        }
    }

    fn send(&mut self, event: BatchEvent) {
        (self.emit)(event);
    }
}

/// 批处理调度器
pub struct BatchDispatcher<'r> {
    registry: &'r ToolRegistry,
    cancel: CancelToken,
}

impl<'r> BatchDispatcher<'r> {
    pub fn new(registry: &'r ToolRegistry, cancel: CancelToken) -> Self {
        Self { registry, cancel }
    }

    /// 配置、收集、校验并解析输出路径；校验失败时不会运行工具
    pub fn plan(&self, cmd: &JobCommand) -> Result<BatchPlan> {
        let tool = self.registry.create(&cmd.tool)?;
        plan_with(tool, cmd)
    }

    /// 执行批处理
    pub fn dispatch(
        &self,
        cmd: &JobCommand,
        events: &mut dyn FnMut(BatchEvent),
    ) -> Result<BatchSummary> {
        let plan = self.plan(cmd)?;
        self.execute(plan, events)
    }

    /// 执行已生成的计划
    pub fn execute(
        &self,
        plan: BatchPlan,
        events: &mut dyn FnMut(BatchEvent),
    ) -> Result<BatchSummary> {
        let BatchPlan { tool, jobs } = plan;
        let descriptor = tool.descriptor();
        let mut summary = BatchSummary::new(descriptor.id);
        let mut progress = ProgressTracker::new(events);

        summary.state = BatchState::Running;
        progress.send(BatchEvent::Started {
            tool: descriptor.id.to_string(),
            total: jobs.len(),
        });
        log::info!(
            "running '{}' ({}) over {} item(s)",
            descriptor.id,
            descriptor.mode,
            jobs.len()
        );

        match descriptor.mode {
            BatchMode::PerFile => {
                self.run_per_file(tool.as_ref(), &jobs, &mut summary, &mut progress)
            }
            BatchMode::Atomic => self.run_atomic(tool.as_ref(), &jobs, &mut summary, &mut progress),
        }

        if !summary.state.is_terminal() {
            summary.state = BatchState::Completed;
            progress.update(1.0);
        }
        log::info!(
            "'{}' {}: {} ok, {} skipped, {} failed",
            summary.tool,
            summary.state,
            summary.success,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }

    // ─────────────────────────────────────────────────────────────
    // 逐文件模式
    // ─────────────────────────────────────────────────────────────

    fn run_per_file(
        &self,
        tool: &dyn ToolContract,
        jobs: &[JobItem],
        summary: &mut BatchSummary,
        progress: &mut ProgressTracker,
    ) {
        let total = jobs.len().max(1) as f64;

        for (index, item) in jobs.iter().enumerate() {
            if item.skip {
                log::info!("skipping {} (output exists)", item.input.display());
                record(summary, progress, JobResult::skipped(item));
                progress.update((index + 1) as f64 / total);
                continue;
            }

            if self.cancel.is_cancelled() {
                cancel_remaining(summary, progress, &jobs[index..]);
                return;
            }

            let outcome = self.run_single(tool, item, index, total, progress);
            match outcome {
                Ok(notes) => {
                    summary.notes.extend(notes);
                    record(summary, progress, JobResult::success(item));
                }
                Err(PortError::Cancelled) => {
                    cancel_remaining(summary, progress, &jobs[index..]);
                    return;
                }
                Err(e) => {
                    log::warn!("{}: {}", item.input.display(), e);
                    record(summary, progress, JobResult::failed(item, &e));
                }
            }
            progress.update((index + 1) as f64 / total);
        }
    }

    /// 单项运行：独立暂存区，成功才提交
    fn run_single(
        &self,
        tool: &dyn ToolContract,
        item: &JobItem,
        index: usize,
        total: f64,
        progress: &mut ProgressTracker,
    ) -> Result<Vec<String>> {
        let root = staging_root(item);
        let mut staging = Staging::new(&root)?;
        let mut sink = |f: f64| progress.update((index as f64 + f) / total);
        let result = {
            let mut ctx = RunContext::new(&mut staging, &mut sink, &self.cancel);
            tool.run(std::slice::from_ref(item), &mut ctx)
        };
        let tool_summary = result?;
        staging.commit()?;
        Ok(tool_summary.notes)
    }

    // ─────────────────────────────────────────────────────────────
    // 原子模式
    // ─────────────────────────────────────────────────────────────

    fn run_atomic(
        &self,
        tool: &dyn ToolContract,
        jobs: &[JobItem],
        summary: &mut BatchSummary,
        progress: &mut ProgressTracker,
    ) {
        let active: Vec<JobItem> = jobs.iter().filter(|j| !j.skip).cloned().collect();

        let outcome = if self.cancel.is_cancelled() {
            Err(PortError::Cancelled)
        } else if active.is_empty() {
            Ok(Vec::new())
        } else {
            self.run_all(tool, &active, progress)
        };

        match outcome {
            Ok(notes) => {
                summary.notes.extend(notes);
                for item in jobs {
                    let result = if item.skip {
                        JobResult::skipped(item)
                    } else {
                        JobResult::success(item)
                    };
                    record(summary, progress, result);
                }
            }
            Err(e) => {
                log::warn!("atomic batch '{}' rolled back: {}", summary.tool, e);
                for item in jobs {
                    let result = if item.skip {
                        JobResult::skipped(item)
                    } else {
                        JobResult::failed(item, &e)
                    };
                    record(summary, progress, result);
                }
                summary.error = Some(JobFailure::from(&e));
                summary.state = if matches!(e, PortError::Cancelled) {
                    BatchState::Cancelled
                } else {
                    BatchState::Failed
                };
            }
        }
    }

    fn run_all(
        &self,
        tool: &dyn ToolContract,
        active: &[JobItem],
        progress: &mut ProgressTracker,
    ) -> Result<Vec<String>> {
        let root = common_root(active);
        let mut staging = Staging::new(&root)?;
        let mut sink = |f: f64| progress.update(f);
        let result = {
            let mut ctx = RunContext::new(&mut staging, &mut sink, &self.cancel);
            tool.run(active, &mut ctx)
        };
        let tool_summary = result?;
        // 工具返回后再检查一次，避免提交已被取消的批次
        if self.cancel.is_cancelled() {
            return Err(PortError::Cancelled);
        }
        staging.commit()?;
        Ok(tool_summary.notes)
    }
}

/// 配置工具并生成计划
pub fn plan_with(mut tool: Box<dyn ToolContract>, cmd: &JobCommand) -> Result<BatchPlan> {
    let descriptor = tool.descriptor();
    let options = ToolOptions::resolve(descriptor.options, &cmd.options)?;
    tool.configure(&options)?;

    let mut problems = Vec::new();
    let mut files: Vec<CollectedFile> = Vec::new();
    for input in &cmd.inputs {
        if !input.exists() {
            problems.push(format!("{}: no such file or directory", input.display()));
            continue;
        }
        let accepts = |p: &std::path::Path| tool.accepts(p);
        let mut collector = FileCollector::new(input)
            .recursive(cmd.recursive)
            .with_filter(&accepts);
        if let Some(pattern) = &cmd.pattern {
            collector = collector.with_pattern(pattern);
        }
        files.extend(collector.collect());
    }

    let paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
    if problems.is_empty() || !paths.is_empty() {
        problems.extend(tool.validate(&paths));
    }
    if !problems.is_empty() {
        return Err(PortError::ValidationError { problems });
    }

    let jobs = resolve_jobs(tool.as_ref(), &files, &cmd.output_dir, cmd.collision);
    Ok(BatchPlan { tool, jobs })
}

fn record(summary: &mut BatchSummary, progress: &mut ProgressTracker, result: JobResult) {
    progress.send(BatchEvent::ItemFinished(result.clone()));
    summary.merge(result);
}

/// 取消后未完成的项记为失败（原因：取消），保证每个计划项都有结果
fn cancel_remaining(summary: &mut BatchSummary, progress: &mut ProgressTracker, rest: &[JobItem]) {
    log::warn!(
        "batch '{}' cancelled, {} item(s) not processed",
        summary.tool,
        rest.len()
    );
    let err = PortError::Cancelled;
    for item in rest {
        let result = if item.skip {
            JobResult::skipped(item)
        } else {
            JobResult::failed(item, &err)
        };
        record(summary, progress, result);
    }
    summary.state = BatchState::Cancelled;
    summary.error = Some(JobFailure::from(&err));
}

/// 单项的暂存根目录：输出路径的父目录
fn staging_root(item: &JobItem) -> PathBuf {
    item.output
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// 一组作业输出的公共父目录
fn common_root(jobs: &[JobItem]) -> PathBuf {
    let mut root = staging_root(&jobs[0]);
    for item in &jobs[1..] {
        while !item.output.starts_with(&root) {
            match root.parent() {
                Some(parent) => root = parent.to_path_buf(),
                None => break,
            }
        }
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReasonCode;
    use crate::models::JobStatus;
    use crate::tools::{stem_of, with_file_name, ToolDescriptor, ToolSummary};
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    static PER_FILE: ToolDescriptor = ToolDescriptor {
        id: "upper",
        name: "Upper",
        description: "uppercases text",
        extensions: &["txt"],
        mode: BatchMode::PerFile,
        options: &[],
    };

    static ATOMIC: ToolDescriptor = ToolDescriptor {
        id: "upper-all",
        name: "Upper (atomic)",
        description: "uppercases text, all or nothing",
        extensions: &["txt"],
        mode: BatchMode::Atomic,
        options: &[],
    };

    /// 测试工具：内容含 "bad" 时失败
    struct UpperTool {
        descriptor: &'static ToolDescriptor,
        runs: Arc<AtomicUsize>,
        cancel_after: Option<(usize, CancelToken)>,
    }

    impl UpperTool {
        fn new(descriptor: &'static ToolDescriptor) -> Self {
            Self {
                descriptor,
                runs: Arc::new(AtomicUsize::new(0)),
                cancel_after: None,
            }
        }
    }

    impl ToolContract for UpperTool {
        fn descriptor(&self) -> &'static ToolDescriptor {
            self.descriptor
        }

        fn configure(&mut self, _options: &ToolOptions) -> Result<()> {
            Ok(())
        }

        fn output_name(&self, relative: &Path) -> PathBuf {
            with_file_name(relative, &format!("{}.out", stem_of(relative)))
        }

        fn run(&self, jobs: &[JobItem], ctx: &mut RunContext) -> Result<ToolSummary> {
            let count = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            for (i, job) in jobs.iter().enumerate() {
                ctx.checkpoint()?;
                let text = fs::read_to_string(&job.input).map_err(|e| PortError::read(&job.input, e))?;
                if text.contains("bad") {
                    return Err(PortError::conversion(&job.input, ReasonCode::Malformed, "bad content"));
                }
                ctx.write(&job.output, text.to_uppercase().as_bytes())?;
                ctx.report((i + 1) as f64 / jobs.len() as f64);
            }
            if let Some((n, token)) = &self.cancel_after {
                if count == *n {
                    token.cancel();
                }
            }
            Ok(ToolSummary::default())
        }
    }

    fn inputs(dir: &Path, bad_index: Option<usize>) -> Vec<PathBuf> {
        (1..=5)
            .map(|i| {
                let p = dir.join(format!("f{}.txt", i));
                let body = if Some(i) == bad_index { "bad" } else { "good" };
                fs::write(&p, body).unwrap();
                p
            })
            .collect()
    }

    fn command(dir: &Path, out: &Path) -> JobCommand {
        JobCommand {
            tool: "upper".into(),
            inputs: vec![dir.to_path_buf()],
            output_dir: out.to_path_buf(),
            ..Default::default()
        }
    }

    fn outputs(out: &Path) -> Vec<PathBuf> {
        let mut files: Vec<_> = walkdir::WalkDir::new(out)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .collect();
        files.sort();
        files
    }

    fn execute(
        tool: UpperTool,
        cmd: &JobCommand,
        cancel: CancelToken,
    ) -> (BatchSummary, Vec<BatchEvent>) {
        let registry = ToolRegistry::new();
        let dispatcher = BatchDispatcher::new(&registry, cancel);
        let plan = plan_with(Box::new(tool), cmd).unwrap();
        let mut events = Vec::new();
        let summary = dispatcher
            .execute(plan, &mut |e| events.push(e))
            .unwrap();
        (summary, events)
    }

    fn progress_values(events: &[BatchEvent]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Progress(f) => Some(*f),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_per_file_continues_after_failure() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let files = inputs(src.path(), Some(3));
        let (summary, events) =
            execute(UpperTool::new(&PER_FILE), &command(src.path(), out.path()), CancelToken::new());

        assert_eq!(summary.state, BatchState::Completed);
        assert_eq!(summary.success, 4);
        assert_eq!(summary.failed, 1);
        let failed: Vec<_> = summary.failures().collect();
        assert_eq!(failed[0].input, files[2]);
        assert_eq!(
            failed[0].error.as_ref().and_then(|e| e.reason),
            Some(ReasonCode::Malformed)
        );
        assert_eq!(outputs(out.path()).len(), 4);

        let values = progress_values(&events);
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(values.last().copied(), Some(1.0));
    }

    #[test]
    fn test_atomic_rolls_back_everything() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        inputs(src.path(), Some(4));
        let (summary, _) =
            execute(UpperTool::new(&ATOMIC), &command(src.path(), out.path()), CancelToken::new());

        assert_eq!(summary.state, BatchState::Failed);
        assert_eq!(summary.failed, 5);
        assert!(summary.error.is_some());
        assert!(outputs(out.path()).is_empty());
    }

    #[test]
    fn test_atomic_success_progress() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        inputs(src.path(), None);
        let (summary, events) =
            execute(UpperTool::new(&ATOMIC), &command(src.path(), out.path()), CancelToken::new());

        assert_eq!(summary.state, BatchState::Completed);
        assert_eq!(summary.success, 5);
        assert_eq!(outputs(out.path()).len(), 5);
        let values = progress_values(&events);
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(values.last().copied(), Some(1.0));
    }

    #[test]
    fn test_validation_blocks_run() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let wrong = src.path().join("model.smd");
        fs::write(&wrong, "version 1").unwrap();

        let tool = UpperTool::new(&PER_FILE);
        let runs = tool.runs.clone();
        let mut cmd = command(src.path(), out.path());
        cmd.inputs = vec![wrong];
        assert!(matches!(
            plan_with(Box::new(tool), &cmd),
            Err(PortError::ValidationError { .. })
        ));

        let empty = UpperTool::new(&PER_FILE);
        cmd.inputs = vec![];
        match plan_with(Box::new(empty), &cmd) {
            Err(PortError::ValidationError { problems }) => {
                assert_eq!(problems, vec!["no input files".to_string()])
            }
            _ => panic!("expected validation error"),
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_per_file_cancel_stops_before_next_item() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        inputs(src.path(), None);
        let cancel = CancelToken::new();
        let mut tool = UpperTool::new(&PER_FILE);
        tool.cancel_after = Some((2, cancel.clone()));
        let (summary, _) = execute(tool, &command(src.path(), out.path()), cancel);

        assert_eq!(summary.state, BatchState::Cancelled);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.total(), 5);
        assert!(summary
            .failures()
            .all(|r| r.error.as_ref().map(|e| e.message.as_str()) == Some("Batch cancelled")));
        assert_eq!(outputs(out.path()).len(), 2);
    }

    #[test]
    fn test_atomic_cancel_rolls_back() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        inputs(src.path(), None);
        let cancel = CancelToken::new();
        let mut tool = UpperTool::new(&ATOMIC);
        tool.cancel_after = Some((1, cancel.clone()));
        let (summary, _) = execute(tool, &command(src.path(), out.path()), cancel);

        assert_eq!(summary.state, BatchState::Cancelled);
        assert!(outputs(out.path()).is_empty());
    }

    #[test]
    fn test_skip_policy_does_not_run() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        inputs(src.path(), None);
        fs::write(out.path().join("f1.out"), "keep").unwrap();

        let tool = UpperTool::new(&PER_FILE);
        let runs = tool.runs.clone();
        let mut cmd = command(src.path(), out.path());
        cmd.collision = CollisionPolicy::Skip;
        let (summary, _) = execute(tool, &cmd, CancelToken::new());

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.success, 4);
        assert_eq!(runs.load(Ordering::SeqCst), 4);
        assert_eq!(fs::read_to_string(out.path().join("f1.out")).unwrap(), "keep");
        assert_eq!(summary.results[0].status, JobStatus::Skipped);
    }

    #[test]
    fn test_rerun_is_byte_identical() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        inputs(src.path(), None);
        let cmd = command(src.path(), out.path());
        execute(UpperTool::new(&PER_FILE), &cmd, CancelToken::new());
        let first: Vec<_> = outputs(out.path()).iter().map(|p| fs::read(p).unwrap()).collect();
        execute(UpperTool::new(&PER_FILE), &cmd, CancelToken::new());
        let second: Vec<_> = outputs(out.path()).iter().map(|p| fs::read(p).unwrap()).collect();
        assert_eq!(first, second);
    }
}
