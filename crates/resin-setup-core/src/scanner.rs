//! 服务记录扫描：从服务注册表中找出 Resin 服务并重建 [`ServiceDescriptor`]。
//!
//! 匹配规则：
//! - ImagePath 的可执行文件名为产品启动器（忽略大小写）
//! - 参数中包含 `-service`
//!
//! home 的确定：
//! - 优先使用显式 `-resin-home`
//! - 否则取可执行文件所在目录，并要求其通过安装根目录判定
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use std::path::Path;

use tracing::{debug, warn};

use crate::args::{self, ServiceArgs};
use crate::descriptor::ServiceDescriptor;
use crate::error::{SetupError, SetupResult};
use crate::paths;
use crate::ports::ServiceRegistry;
use crate::probe::{InstallationProbe, ProbeResult};

/// 由服务命令行推导 home。
///
/// 返回值：
/// - 显式 `-resin-home`：原样返回（不做判定）
/// - 由 `-exe` 推导：去掉末尾文件名后通过判定才返回
/// - 其余情况返回 `None`
pub fn derive_home(args: &ServiceArgs, probe: &dyn InstallationProbe) -> Option<String> {
    if let Some(home) = args.home.as_deref().filter(|h| !h.is_empty()) {
        return Some(home.to_string());
    }
    let exe = args.exe.as_deref()?;
    let dir = paths::parent_segment(exe)?;
    match probe.probe(Path::new(dir)) {
        ProbeResult::Root(_) => Some(dir.to_string()),
        ProbeResult::NotARoot => None,
    }
}

/// 判断 ImagePath 是否指向产品启动器，匹配时返回解析结果。
pub fn match_launcher(image_path: &str, launcher: &str) -> Option<ServiceArgs> {
    let parsed = args::parse(image_path);
    let exe = parsed.exe.as_deref()?;
    if args::is_launcher(exe, launcher) {
        Some(parsed)
    } else {
        None
    }
}

/// 扫描服务注册表，返回所有可识别的 Resin 服务描述。
///
/// 参数：
/// - `registry`：服务注册表
/// - `probe`：安装根目录判定
/// - `launcher`：启动器文件名（例如 `resin.exe`）
///
/// 异常处理：
/// - 无法列出服务时返回 `AccessDenied`（整体失败）
/// - 单条记录读取失败或无法确定 home 时跳过该记录并记录日志
pub fn scan_services(
    registry: &dyn ServiceRegistry,
    probe: &dyn InstallationProbe,
    launcher: &str,
) -> SetupResult<Vec<ServiceDescriptor>> {
    let names = registry
        .list_services()
        .map_err(|e| SetupError::access_denied("列出服务注册表失败", e))?;

    let mut result = Vec::new();
    for name in names {
        let image_path = match registry.image_path(&name) {
            Ok(Some(p)) if !p.trim().is_empty() => p,
            Ok(_) => continue,
            Err(e) => {
                warn!("读取服务 ImagePath 失败，跳过: {name}: {e:#}");
                continue;
            }
        };
        let Some(parsed) = match_launcher(&image_path, launcher) else {
            continue;
        };
        if !parsed.service {
            debug!("服务未以 -service 方式运行，跳过: {name}");
            continue;
        }
        let Some(home) = derive_home(&parsed, probe) else {
            warn!("无法确定服务的安装目录，跳过: {name} ({image_path})");
            continue;
        };
        let descriptor = ServiceDescriptor::from_args(name, home, parsed);
        debug!("发现 Resin 服务: {descriptor}");
        result.push(descriptor);
    }
    Ok(result)
}
