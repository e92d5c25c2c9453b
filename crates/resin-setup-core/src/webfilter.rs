//! IIS ISAPI 过滤器集成：注册/注销过滤器条目，维护 FilterLoadOrder，复制过滤器二进制。
//!
//! 约束：
//! - 注册时先提交元数据库，再复制二进制；复制失败返回 `IoError`，但不回滚已提交的注册
//! - FilterLoadOrder 按逗号分隔的名称处理，名称比较忽略大小写，过滤器名最多出现一次
//! - 所有失败都以 [`ConfigureInfo`] 返回，不抛出
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

use crate::config::FilterConfig;
use crate::ports::{FilterEntry, FilterMetabase};

/// 过滤器配置结果状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureStatus {
    /// 元数据库已是目标状态（二进制仍会刷新）。
    AlreadyConfigured,
    ConfiguredOk,
    /// 二进制复制/删除失败。
    IoError,
    RemovedOk,
    AlreadyRemoved,
    /// 读写元数据库失败。
    MetabaseError,
}

/// 配置结果：状态与可选的失败原因。
#[derive(Debug)]
pub struct ConfigureInfo {
    pub status: ConfigureStatus,
    pub error: Option<anyhow::Error>,
}

impl ConfigureInfo {
    fn ok(status: ConfigureStatus) -> Self {
        Self { status, error: None }
    }

    fn failed(status: ConfigureStatus, error: anyhow::Error) -> Self {
        Self {
            status,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

fn tokens(load_order: &str) -> impl Iterator<Item = &str> {
    load_order.split(',').map(str::trim).filter(|t| !t.is_empty())
}

/// 若加载顺序中没有该过滤器，则将其加到最前面。
///
/// 返回值：
/// - `Some(新值)`：需要改写
/// - `None`：已存在，无需改写
pub fn add_to_load_order(load_order: &str, name: &str) -> Option<String> {
    if tokens(load_order).any(|t| t.eq_ignore_ascii_case(name)) {
        return None;
    }
    let mut parts = vec![name];
    parts.extend(tokens(load_order));
    Some(parts.join(","))
}

/// 从加载顺序中移除该过滤器。
///
/// 返回值：
/// - `Some(新值)`：找到并移除
/// - `None`：不存在
pub fn remove_from_load_order(load_order: &str, name: &str) -> Option<String> {
    if !tokens(load_order).any(|t| t.eq_ignore_ascii_case(name)) {
        return None;
    }
    let rest: Vec<&str> = tokens(load_order)
        .filter(|t| !t.eq_ignore_ascii_case(name))
        .collect();
    Some(rest.join(","))
}

/// Web 服务器过滤器集成器。
pub struct WebFilterIntegrator<'a> {
    metabase: &'a dyn FilterMetabase,
    filter: &'a FilterConfig,
}

impl<'a> WebFilterIntegrator<'a> {
    pub fn new(metabase: &'a dyn FilterMetabase, filter: &'a FilterConfig) -> Self {
        Self { metabase, filter }
    }

    fn desired_entry(&self, scripts_dir: &Path) -> FilterEntry {
        FilterEntry {
            name: self.filter.name.clone(),
            enabled: true,
            state: self.filter.loaded_state,
            path: scripts_dir.join(&self.filter.binary).to_string_lossy().into_owned(),
            description: self.filter.description.clone(),
        }
    }

    /// 注册过滤器。
    ///
    /// 参数：
    /// - `home`：Resin 安装目录（二进制来源为 `home/<平台子目录>/<二进制>`）
    /// - `scripts_dir`：IIS scripts 目录
    ///
    /// 返回值：
    /// - `ConfiguredOk` / `AlreadyConfigured`：成功
    /// - `MetabaseError`：元数据库读写失败（未复制二进制）
    /// - `IoError`：二进制复制失败（注册已提交，不回滚）
    pub fn register(&self, home: &Path, scripts_dir: &Path) -> ConfigureInfo {
        let changed = match self.register_metabase(scripts_dir) {
            Ok(changed) => changed,
            Err(e) => {
                warn!("注册 IIS 过滤器失败: {e:#}");
                return ConfigureInfo::failed(ConfigureStatus::MetabaseError, e);
            }
        };

        let source = home.join(&self.filter.platform_subdir).join(&self.filter.binary);
        let target = scripts_dir.join(&self.filter.binary);
        if let Err(e) = std::fs::copy(&source, &target)
            .with_context(|| format!("复制 {} 到 {} 失败", source.display(), target.display()))
        {
            warn!("过滤器已注册，但二进制复制失败: {e:#}");
            return ConfigureInfo::failed(ConfigureStatus::IoError, e);
        }

        info!("IIS 过滤器已注册: {} => {}", self.filter.name, target.display());
        ConfigureInfo::ok(if changed {
            ConfigureStatus::ConfiguredOk
        } else {
            ConfigureStatus::AlreadyConfigured
        })
    }

    /// 写入条目与加载顺序并提交；返回是否有修改。
    fn register_metabase(&self, scripts_dir: &Path) -> anyhow::Result<bool> {
        let desired = self.desired_entry(scripts_dir);
        let existing = self
            .metabase
            .entries()?
            .into_iter()
            .find(|e| e.name.eq_ignore_ascii_case(&desired.name));

        let mut changed = false;
        if existing.as_ref() != Some(&desired) {
            self.metabase.put_entry(&desired)?;
            changed = true;
        }
        let order = self.metabase.load_order()?;
        if let Some(updated) = add_to_load_order(&order, &self.filter.name) {
            self.metabase.set_load_order(&updated)?;
            changed = true;
        }
        if changed {
            self.metabase.commit()?;
        }
        Ok(changed)
    }

    /// 注销过滤器并删除 scripts 目录中的二进制。
    ///
    /// 返回值：
    /// - `RemovedOk`：找到条目或加载顺序中的名称并已移除
    /// - `AlreadyRemoved`：两者都不存在
    /// - `IoError`：删除二进制失败（无论是否找到）
    /// - `MetabaseError`：元数据库读写失败
    pub fn deregister(&self, scripts_dir: &Path) -> ConfigureInfo {
        let found = match self.deregister_metabase() {
            Ok(found) => found,
            Err(e) => {
                warn!("注销 IIS 过滤器失败: {e:#}");
                return ConfigureInfo::failed(ConfigureStatus::MetabaseError, e);
            }
        };

        let target = scripts_dir.join(&self.filter.binary);
        match std::fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                let e = anyhow::Error::new(e).context(format!("删除 {} 失败", target.display()));
                warn!("{e:#}");
                return ConfigureInfo::failed(ConfigureStatus::IoError, e);
            }
        }

        if found {
            info!("IIS 过滤器已注销: {}", self.filter.name);
            ConfigureInfo::ok(ConfigureStatus::RemovedOk)
        } else {
            ConfigureInfo::ok(ConfigureStatus::AlreadyRemoved)
        }
    }

    fn deregister_metabase(&self) -> anyhow::Result<bool> {
        let mut found = false;
        let entry = self
            .metabase
            .entries()?
            .into_iter()
            .find(|e| e.name.eq_ignore_ascii_case(&self.filter.name));
        if let Some(entry) = entry {
            self.metabase.remove_entry(&entry.name)?;
            found = true;
        }
        let order = self.metabase.load_order()?;
        if let Some(updated) = remove_from_load_order(&order, &self.filter.name) {
            self.metabase.set_load_order(&updated)?;
            found = true;
        }
        if found {
            self.metabase.commit()?;
        }
        Ok(found)
    }
}
