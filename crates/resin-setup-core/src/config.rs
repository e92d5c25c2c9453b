//! 工具配置（setup-config.json）。
//!
//! 该模块描述发现与生命周期操作所需的全部可调参数：
//! - 产品标识（目录前缀、容器目录标记、启动器文件名、安装根目录标记文件）
//! - IIS 过滤器信息（过滤器名、二进制文件名、平台子目录、adsutil 位置）
//! - 回滚状态策略（是否落盘、是否读取、缺失时是否回退到默认状态）
//! - 服务状态等待策略（轮询间隔、可选超时）
//!
//! 约定：
//! - 所有段落通过 `#[serde(default)]` 提供默认值，配置文件可只写需要覆盖的字段
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SetupError, SetupResult};

/// 配置根对象（对应 `setup-config.json`）。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SetupConfig {
    #[serde(default)]
    /// 产品识别规则。
    pub product: ProductConfig,
    #[serde(default)]
    /// IIS 过滤器注册参数。
    pub filter: FilterConfig,
    #[serde(default)]
    /// 回滚状态策略。
    pub rollback: RollbackConfig,
    #[serde(default)]
    /// 服务状态等待策略。
    pub control: ControlConfig,
}

impl SetupConfig {
    /// 读取并解析配置文件（JSON）。
    ///
    /// 异常处理：
    /// - 文件读取失败返回 `Io`
    /// - JSON 解析失败返回 `Config`
    pub fn load(path: &Path) -> SetupResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| SetupError::io(path, e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| SetupError::Config(format!("解析 {} 失败: {e}", path.display())))
    }
}

/// 产品识别规则。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductConfig {
    /// 卷根目录下安装目录名前缀（忽略大小写）。
    pub dir_prefix: String,
    /// “应用服务器容器”目录名标记（忽略大小写，包含即匹配）。
    pub container_marker: String,
    /// 启动器可执行文件名。
    pub launcher: String,
    /// 判定安装根目录所需的标记文件/目录（相对安装根目录）。
    pub root_markers: Vec<String>,
    /// 记录“当前安装”的注册表键（HKLM 下）。
    pub current_home_key: String,
    /// 记录“当前安装”的注册表值名。
    pub current_home_value: String,
}

impl Default for ProductConfig {
    fn default() -> Self {
        Self {
            dir_prefix: "resin".to_string(),
            container_marker: "appservers".to_string(),
            launcher: "resin.exe".to_string(),
            root_markers: vec!["lib/resin.jar".to_string()],
            current_home_key: r"SOFTWARE\Caucho\Resin".to_string(),
            current_home_value: "Home".to_string(),
        }
    }
}

/// IIS 过滤器注册参数。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// 过滤器名（同时写入 FilterLoadOrder）。
    pub name: String,
    /// 过滤器二进制文件名。
    pub binary: String,
    /// 过滤器描述。
    pub description: String,
    /// 安装目录下存放过滤器二进制的平台子目录。
    pub platform_subdir: String,
    /// 写入 FilterState 的“已加载”状态码。
    pub loaded_state: u32,
    /// `adsutil.vbs` 路径（为空时使用 `%SystemDrive%\Inetpub\AdminScripts\adsutil.vbs`）。
    pub adsutil_script: Option<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            name: "Resin".to_string(),
            binary: "isapi_srun.dll".to_string(),
            description: "isapi_srun Extension".to_string(),
            platform_subdir: "win32".to_string(),
            loaded_state: 4,
            adsutil_script: None,
        }
    }
}

/// 回滚状态策略。
///
/// 说明：
/// - `persist`：安装成功后写入 `<服务名>.srv`
/// - `load_persisted`：卸载时读取已落盘状态；关闭后始终使用默认状态
/// - `synthetic_default`：无落盘状态时回退到“已安装、LocalSystem 账户”的默认状态；
///   关闭后缺失状态会导致卸载失败（`StateNotFound`）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackConfig {
    pub persist: bool,
    pub load_persisted: bool,
    pub synthetic_default: bool,
    /// 覆盖默认状态目录（默认 `%ProgramData%\Caucho\services`）。
    pub state_dir: Option<String>,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            persist: true,
            load_persisted: true,
            synthetic_default: true,
            state_dir: None,
        }
    }
}

impl RollbackConfig {
    /// 解析实际使用的状态目录。
    ///
    /// 异常处理：
    /// - 未配置 `state_dir` 且无法读取 ProgramData 时返回 `Config`
    pub fn resolve_state_dir(&self) -> SetupResult<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => crate::paths::default_services_state_dir()
                .map_err(|e| SetupError::Config(format!("{e:#}"))),
        }
    }
}

/// 服务状态等待策略。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// 轮询服务状态的间隔（毫秒）。
    pub poll_interval_ms: u64,
    /// 等待状态切换的超时（秒）；为空表示一直等待。
    pub transition_timeout_secs: Option<u64>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            transition_timeout_secs: None,
        }
    }
}

impl ControlConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn transition_timeout(&self) -> Option<Duration> {
        self.transition_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 空对象应完整回退到默认值。
    fn empty_json_uses_defaults() {
        let cfg: SetupConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.product.launcher, "resin.exe");
        assert_eq!(cfg.filter.name, "Resin");
        assert!(cfg.rollback.synthetic_default);
        assert!(cfg.control.transition_timeout().is_none());
    }

    #[test]
    /// 部分覆盖：只改写指定段落。
    fn partial_override_keeps_other_sections() {
        let json = r#"{ "rollback": { "persist": false, "load_persisted": false, "synthetic_default": false } }"#;
        let cfg: SetupConfig = serde_json::from_str(json).unwrap();
        assert!(!cfg.rollback.synthetic_default);
        assert_eq!(cfg.product.dir_prefix, "resin");
        assert_eq!(cfg.control.poll_interval_ms, 250);
    }

    #[test]
    /// 段落内只写单个字段，其余字段取默认值。
    fn single_field_override_within_section() {
        let cfg: SetupConfig = serde_json::from_str(r#"{"control":{"transition_timeout_secs":30}}"#).unwrap();
        assert_eq!(cfg.control.transition_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.control.poll_interval_ms, 250);

        let cfg: SetupConfig =
            serde_json::from_str(r#"{"product":{"launcher":"resin-pro.exe"},"rollback":{"persist":false}}"#).unwrap();
        assert_eq!(cfg.product.launcher, "resin-pro.exe");
        assert_eq!(cfg.product.dir_prefix, "resin");
        assert!(!cfg.rollback.persist);
        assert!(cfg.rollback.load_persisted);
        assert!(cfg.rollback.synthetic_default);
    }
}
