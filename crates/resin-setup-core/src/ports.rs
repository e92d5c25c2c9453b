//! 系统能力接口（由 `resin-setup-windows` 提供生产实现，测试使用内存替身）。
//!
//! 约定：
//! - 所有接口均为 `Send + Sync`，只读扫描可以在工作线程中并行执行
//! - 接口以 `anyhow::Result` 返回，由核心在边界处归入 [`crate::SetupError`] 分类
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use std::path::PathBuf;

use anyhow::Result;

use crate::state::RollbackState;

/// 本机固定卷（非可移动、非网络）枚举。
pub trait VolumeSource: Send + Sync {
    /// 返回各卷根目录（例如 `C:\`）。
    fn fixed_volumes(&self) -> Result<Vec<PathBuf>>;
}

/// 产品注册表信息。
pub trait ProductRegistry: Send + Sync {
    /// 读取记录“当前安装”的注册表值；值不存在时返回 `Ok(None)`。
    fn current_home(&self) -> Result<Option<String>>;
}

/// 服务注册表记录（`HKLM\SYSTEM\CurrentControlSet\Services`）。
pub trait ServiceRegistry: Send + Sync {
    /// 列出全部服务名。
    fn list_services(&self) -> Result<Vec<String>>;
    /// 读取服务的 ImagePath；值不存在时返回 `Ok(None)`。
    fn image_path(&self, service: &str) -> Result<Option<String>>;
    /// 改写服务的 ImagePath。
    fn set_image_path(&self, service: &str, image_path: &str) -> Result<()>;
}

/// 服务运行状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    StartPending,
    StopPending,
    Running,
    ContinuePending,
    PausePending,
    Paused,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::StartPending => "start_pending",
            Self::StopPending => "stop_pending",
            Self::Running => "running",
            Self::ContinuePending => "continue_pending",
            Self::PausePending => "pause_pending",
            Self::Paused => "paused",
        }
    }
}

/// 服务控制管理器。
pub trait ServiceController: Send + Sync {
    /// 查询运行状态；服务未注册时返回 `Ok(None)`。
    fn status(&self, service: &str) -> Result<Option<RunState>>;
    /// 发出启动请求（不等待）。
    fn start(&self, service: &str) -> Result<()>;
    /// 发出停止请求（不等待）。
    fn stop(&self, service: &str) -> Result<()>;
}

/// 服务进程账户。
#[derive(Clone, PartialEq, Eq)]
pub enum ServiceAccount {
    LocalSystem,
    User { name: String, password: String },
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalSystem => f.write_str("LocalSystem"),
            Self::User { name, .. } => f.debug_struct("User").field("name", name).finish_non_exhaustive(),
        }
    }
}

/// 新服务注册请求。
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub service_name: String,
    pub display_name: String,
    /// 服务可执行文件路径（不含参数）。
    pub executable: String,
    pub account: ServiceAccount,
}

/// 事务化的服务注册/注销。
pub trait ServiceInstaller: Send + Sync {
    /// 注册服务并返回可用于回滚的状态。
    ///
    /// 实现必须保证：失败时不残留任何服务记录。
    fn install(&self, request: &InstallRequest) -> Result<RollbackState>;
    /// 按回滚状态注销服务。
    fn uninstall(&self, service: &str, state: &RollbackState) -> Result<()>;
}

/// IIS 过滤器条目。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterEntry {
    pub name: String,
    pub enabled: bool,
    pub state: u32,
    pub path: String,
    pub description: String,
}

/// Web 服务器过滤器元数据库（`W3SVC/Filters`）。
pub trait FilterMetabase: Send + Sync {
    /// 列出全部过滤器条目。
    fn entries(&self) -> Result<Vec<FilterEntry>>;
    /// 新建或覆盖同名条目。
    fn put_entry(&self, entry: &FilterEntry) -> Result<()>;
    /// 删除同名条目。
    fn remove_entry(&self, name: &str) -> Result<()>;
    /// 读取 FilterLoadOrder（逗号分隔）。
    fn load_order(&self) -> Result<String>;
    fn set_load_order(&self, value: &str) -> Result<()>;
    /// 提交未落盘的修改。
    fn commit(&self) -> Result<()>;
    /// 默认站点 scripts 虚拟目录的物理路径（未配置时返回 `Ok(None)`）。
    fn scripts_dir(&self) -> Result<Option<PathBuf>>;
}
