//! 提权/权限相关检测。
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use anyhow::{bail, Result};

/// 允许在非管理员下执行修改类命令的环境变量（仅用于测试环境）。
pub const ALLOW_NON_ADMIN_ENV: &str = "RESIN_SETUP_ALLOW_NON_ADMIN";

/// 判断当前进程是否以管理员权限运行。
///
/// 返回值：
/// - `Ok(true)`：当前为管理员
/// - `Ok(false)`：当前非管理员（非 Windows 平台恒为 `false`）
#[cfg(windows)]
pub fn is_running_as_admin() -> Result<bool> {
    use windows::Win32::UI::Shell::IsUserAnAdmin;
    unsafe { Ok(IsUserAnAdmin().as_bool()) }
}

#[cfg(not(windows))]
pub fn is_running_as_admin() -> Result<bool> {
    Ok(false)
}

/// 修改类操作前的权限检查。
///
/// 参数：
/// - `action`：操作名（用于错误信息）
///
/// 异常处理：
/// - 非管理员且未设置 `RESIN_SETUP_ALLOW_NON_ADMIN=1` 时返回错误
///
/// 安全注意：
/// - 该检查仅用于尽早给出明确提示，不能作为完整的安全边界
pub fn require_admin(action: &str) -> Result<()> {
    if std::env::var(ALLOW_NON_ADMIN_ENV).is_ok_and(|v| v == "1") {
        return Ok(());
    }
    if !is_running_as_admin()? {
        bail!("{action} 需要管理员权限，请以管理员身份运行");
    }
    Ok(())
}
