//! Resin 安装发现与服务生命周期核心库（跨平台/与 Win32 细节无关）。
//!
//! 功能：
//! - 规范化安装目录路径，并判定目录是否为有效的 Resin 安装根目录
//! - 解析/生成 Windows 服务 ImagePath 中的 Resin 启动参数
//! - 扫描本机卷、注册表与服务记录，维护去重后的安装/服务清单
//! - 编排服务安装、卸载、启动、停止（含回滚状态落盘）
//! - 向 IIS 过滤器链注册/移除 isapi_srun 过滤器
//!
//! 约定：
//! - 所有系统能力（注册表、服务控制管理器、元数据库）通过 [`ports`] 中的接口注入，
//!   生产实现位于 `resin-setup-windows`，测试使用内存替身
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

pub mod args;
pub mod config;
pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod inventory;
pub mod lifecycle;
pub mod paths;
pub mod ports;
pub mod probe;
pub mod scanner;
pub mod session;
pub mod state;
pub mod webfilter;

pub use error::{SetupError, SetupResult};
