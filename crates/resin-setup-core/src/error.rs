//! 核心错误类型。
//!
//! 分类：
//! - `AccessDenied`：注册表/文件系统权限不足，发现流程跳过对应分支
//! - `MalformedRecord`：服务 ImagePath 或参数串无法解析，跳过该条记录
//! - `Io`：过滤器二进制复制/删除、状态文件读写失败
//! - `Transaction`：服务安装/卸载事务失败，仅影响该次操作
//! - `StateNotFound`：无落盘回滚状态且未启用默认状态回退
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use std::path::PathBuf;

use thiserror::Error;

/// 适配层错误的统一装箱形式（`anyhow::Error` 可直接转换）。
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 核心操作结果别名。
pub type SetupResult<T> = Result<T, SetupError>;

/// 发现与生命周期操作的错误。
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("访问被拒绝: {context}")]
    AccessDenied {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("记录格式错误: {0}")]
    MalformedRecord(String),

    #[error("IO 失败: {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("服务事务失败: {service}")]
    Transaction {
        service: String,
        #[source]
        source: BoxError,
    },

    #[error("未找到服务回滚状态: {0}")]
    StateNotFound(String),

    #[error("已选定当前安装 {current}，不可再次选择 {requested}")]
    AlreadySelected { current: String, requested: String },

    #[error("改写服务 ImagePath 失败: {service}")]
    ImagePathRewrite {
        service: String,
        #[source]
        source: BoxError,
    },

    #[error("服务控制失败: {service}")]
    ServiceControl {
        service: String,
        #[source]
        source: BoxError,
    },

    #[error("服务不存在: {0}")]
    ServiceNotFound(String),

    #[error("等待服务 {service} 进入 {target} 状态超时")]
    TransitionTimeout { service: String, target: String },

    #[error("服务正在{phase}，拒绝并发操作: {service}")]
    Busy { service: String, phase: String },

    #[error("操作已取消: {0}")]
    Cancelled(String),

    #[error("配置错误: {0}")]
    Config(String),
}

impl SetupError {
    /// 构造 `AccessDenied`，用于包装适配层返回的错误。
    pub fn access_denied(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::AccessDenied {
            context: context.into(),
            source: source.into(),
        }
    }

    /// 构造 `Io`，附带出错路径。
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
