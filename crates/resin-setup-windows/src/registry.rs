//! 注册表读写：服务 ImagePath 与 Resin“当前安装”记录。
//!
//! 主要用途：
//! - 枚举 `HKLM\SYSTEM\CurrentControlSet\Services` 下的服务并读写其 ImagePath
//! - 读取 `HKLM\SOFTWARE\Caucho\Resin` 下记录的当前安装目录
//! - 注销服务时清理本工具注册期间新建的事件日志源
//!
//! 权限要求：
//! - 读取通常不需要管理员；改写 ImagePath、删除事件日志源需要管理员权限
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use std::io::ErrorKind;

use anyhow::{Context, Result};
use resin_setup_core::ports::{ProductRegistry, ServiceRegistry};
use winreg::enums::{HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, KEY_READ, KEY_WRITE};
use winreg::RegKey;

/// 服务记录所在的注册表键。
pub const SERVICES_KEY: &str = r"SYSTEM\CurrentControlSet\Services";

/// 应用程序事件日志源所在的注册表键。
pub const EVENT_SOURCES_KEY: &str = r"SYSTEM\CurrentControlSet\Services\EventLog\Application";

/// 注册表根键。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegRoot {
    LocalMachine,
    CurrentUser,
}

impl RegRoot {
    fn open(self) -> RegKey {
        match self {
            Self::LocalMachine => RegKey::predef(HKEY_LOCAL_MACHINE),
            Self::CurrentUser => RegKey::predef(HKEY_CURRENT_USER),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::LocalMachine => "HKLM",
            Self::CurrentUser => "HKCU",
        }
    }
}

/// 读取字符串值；键或值不存在时返回 `Ok(None)`。
fn read_optional_string(root: RegRoot, key_path: &str, value: &str) -> Result<Option<String>> {
    let key = match root.open().open_subkey_with_flags(key_path, KEY_READ) {
        Ok(key) => key,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("打开注册表键失败: {}\\{key_path}", root.name()));
        }
    };
    match key.get_value::<String, _>(value) {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("读取注册表值失败: {}\\{key_path}\\{value}", root.name())),
    }
}

/// 服务注册表（默认 `HKLM\SYSTEM\CurrentControlSet\Services`）。
#[derive(Debug, Clone)]
pub struct WinServiceRegistry {
    root: RegRoot,
    services_key: String,
}

impl WinServiceRegistry {
    pub fn local_machine() -> Self {
        Self::with_root(RegRoot::LocalMachine, SERVICES_KEY)
    }

    /// 指定根键与服务键路径（测试时指向 HKCU 下的临时键）。
    pub fn with_root(root: RegRoot, services_key: impl Into<String>) -> Self {
        Self {
            root,
            services_key: services_key.into(),
        }
    }

    fn service_key(&self, service: &str) -> String {
        format!(r"{}\{service}", self.services_key)
    }
}

impl ServiceRegistry for WinServiceRegistry {
    fn list_services(&self) -> Result<Vec<String>> {
        let key = self
            .root
            .open()
            .open_subkey_with_flags(&self.services_key, KEY_READ)
            .with_context(|| format!("打开服务注册表键失败: {}\\{}", self.root.name(), self.services_key))?;
        key.enum_keys()
            .collect::<std::io::Result<Vec<String>>>()
            .context("枚举服务注册表子键失败")
    }

    fn image_path(&self, service: &str) -> Result<Option<String>> {
        read_optional_string(self.root, &self.service_key(service), "ImagePath")
    }

    fn set_image_path(&self, service: &str, image_path: &str) -> Result<()> {
        let path = self.service_key(service);
        let key = self
            .root
            .open()
            .open_subkey_with_flags(&path, KEY_READ | KEY_WRITE)
            .with_context(|| format!("打开服务注册表键失败: {}\\{path}", self.root.name()))?;
        key.set_value("ImagePath", &image_path)
            .with_context(|| format!("写入 ImagePath 失败: {service}"))?;
        Ok(())
    }
}

/// 产品注册表：读取“当前安装”目录。
#[derive(Debug, Clone)]
pub struct WinProductRegistry {
    root: RegRoot,
    key: String,
    value: String,
}

impl WinProductRegistry {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            root: RegRoot::LocalMachine,
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    pub fn with_root(root: RegRoot, key: &str, value: &str) -> Self {
        Self {
            root,
            ..Self::new(key, value)
        }
    }
}

impl ProductRegistry for WinProductRegistry {
    fn current_home(&self) -> Result<Option<String>> {
        read_optional_string(self.root, &self.key, &self.value)
    }
}

/// 判断应用程序事件日志源是否存在。
pub fn event_source_exists(source: &str) -> Result<bool> {
    let hklm = RegRoot::LocalMachine.open();
    match hklm.open_subkey_with_flags(format!(r"{EVENT_SOURCES_KEY}\{source}"), KEY_READ) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("打开事件日志源失败: {source}")),
    }
}

/// 删除应用程序事件日志源（不存在时视为已删除）。
pub fn delete_event_source(source: &str) -> Result<()> {
    let parent = RegRoot::LocalMachine
        .open()
        .open_subkey_with_flags(EVENT_SOURCES_KEY, KEY_READ | KEY_WRITE)
        .context("打开事件日志键失败")?;
    match parent.delete_subkey_all(source) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("删除事件日志源失败: {source}")),
    }
}
