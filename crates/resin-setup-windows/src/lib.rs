//! Windows 平台能力封装（注册表、服务控制管理器、本机卷、IIS 元数据库、提权检测）。
//!
//! 目标：
//! - 为 `resin-setup-core` 中的系统能力接口提供生产实现
//! - 统一错误处理风格（以 `anyhow::Result` 形式向上返回，由核心归类）
//!
//! 说明：
//! - 注册表/服务/卷相关模块仅在 Windows 上编译
//! - `metabase` 通过 `adsutil.vbs` 命令行工作，输出解析逻辑与平台无关
//!
//! 权限要求：
//! - 注册/注销服务、改写 ImagePath、修改 IIS 过滤器通常需要管理员权限
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

pub mod elevation;
pub mod metabase;
#[cfg(windows)]
pub mod registry;
#[cfg(windows)]
pub mod service;
#[cfg(windows)]
pub mod volumes;

use anyhow::Result;
use resin_setup_core::config::SetupConfig;
use resin_setup_core::session::HostPorts;

/// 组装本机系统能力。
///
/// 异常处理：
/// - 非 Windows 平台返回错误
#[cfg(windows)]
pub fn host(config: &SetupConfig) -> Result<HostPorts> {
    use std::sync::Arc;

    let services = Arc::new(registry::WinServiceRegistry::local_machine());
    Ok(HostPorts {
        volumes: Arc::new(volumes::FixedVolumes),
        product_registry: Arc::new(registry::WinProductRegistry::new(
            &config.product.current_home_key,
            &config.product.current_home_value,
        )),
        services,
        controller: Arc::new(service::ScmController),
        installer: Arc::new(service::ScmInstaller::new(config.control.poll_interval())),
        metabase: Arc::new(metabase::AdsutilMetabase::from_config(&config.filter)?),
        own_location: std::env::current_exe().ok(),
    })
}

/// 组装本机系统能力。
///
/// 异常处理：
/// - 非 Windows 平台返回错误
#[cfg(not(windows))]
pub fn host(_config: &SetupConfig) -> Result<HostPorts> {
    anyhow::bail!("服务与注册表操作仅支持 Windows")
}
