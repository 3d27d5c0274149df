//! # 批处理作业模型
//!
//! 描述一次批处理中的作业项、单项结果与批次汇总。
//!
//! ## 依赖关系
//! - 被 `batch/`, `tools/`, `commands/` 使用
//! - 使用 `error.rs` 中的 `ReasonCode`

use crate::error::{PortError, ReasonCode};

use std::fmt;
use std::path::PathBuf;

/// 单个待处理文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobItem {
    /// 输入文件
    pub input: PathBuf,
    /// 相对于收集根目录的路径
    pub relative: PathBuf,
    /// 解析后的输出路径
    pub output: PathBuf,
    /// 由冲突策略标记为跳过
    pub skip: bool,
}

impl JobItem {
    pub fn new(input: PathBuf, relative: PathBuf, output: PathBuf) -> Self {
        Self {
            input,
            relative,
            output,
            skip: false,
        }
    }
}

/// 单项结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Success,
    Skipped,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Success => write!(f, "success"),
            JobStatus::Skipped => write!(f, "skipped"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// 类型化的失败信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    /// 原因码（校验、取消等批次级错误没有原因码）
    pub reason: Option<ReasonCode>,
    pub message: String,
}

impl From<&PortError> for JobFailure {
    fn from(err: &PortError) -> Self {
        Self {
            reason: err.reason(),
            message: err.to_string(),
        }
    }
}

/// 单个作业项的处理结果
#[derive(Debug, Clone)]
pub struct JobResult {
    pub input: PathBuf,
    pub status: JobStatus,
    pub output: Option<PathBuf>,
    pub error: Option<JobFailure>,
}

impl JobResult {
    pub fn success(item: &JobItem) -> Self {
        Self {
            input: item.input.clone(),
            status: JobStatus::Success,
            output: Some(item.output.clone()),
            error: None,
        }
    }

    pub fn skipped(item: &JobItem) -> Self {
        Self {
            input: item.input.clone(),
            status: JobStatus::Skipped,
            output: Some(item.output.clone()),
            error: None,
        }
    }

    pub fn failed(item: &JobItem, err: &PortError) -> Self {
        Self {
            input: item.input.clone(),
            status: JobStatus::Failed,
            output: None,
            error: Some(JobFailure::from(err)),
        }
    }
}

/// 批次状态机: Pending -> Running -> Completed | Failed | Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl BatchState {
    /// 是否为终止状态
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BatchState::Completed | BatchState::Failed | BatchState::Cancelled
        )
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchState::Pending => "pending",
            BatchState::Running => "running",
            BatchState::Completed => "completed",
            BatchState::Failed => "failed",
            BatchState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// 批次汇总
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub tool: String,
    pub state: BatchState,
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
    pub results: Vec<JobResult>,
    /// 批次级错误（原子工具失败、取消）
    pub error: Option<JobFailure>,
    /// 工具附加说明
    pub notes: Vec<String>,
}

impl BatchSummary {
    pub fn new(tool: &str) -> Self {
        Self {
            tool: tool.to_string(),
            state: BatchState::Pending,
            success: 0,
            skipped: 0,
            failed: 0,
            results: Vec::new(),
            error: None,
            notes: Vec::new(),
        }
    }

    /// 合并单项结果
    pub fn merge(&mut self, result: JobResult) {
        match result.status {
            JobStatus::Success => self.success += 1,
            JobStatus::Skipped => self.skipped += 1,
            JobStatus::Failed => self.failed += 1,
        }
        self.results.push(result);
    }

    /// 总处理数量
    pub fn total(&self) -> usize {
        self.success + self.skipped + self.failed
    }

    /// 失败项
    pub fn failures(&self) -> impl Iterator<Item = &JobResult> {
        self.results
            .iter()
            .filter(|r| r.status == JobStatus::Failed)
    }
}
