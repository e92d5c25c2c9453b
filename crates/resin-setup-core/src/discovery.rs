//! 安装发现：扫描本机固定卷、注册表记录、服务记录与自身所在目录。
//!
//! 步骤（顺序决定插入顺序，去重保证最终集合与顺序无关）：
//! 1) 每个固定卷根目录下，名称以产品前缀开头且通过判定的目录
//! 2) 名称包含容器标记的目录：判定其直接子目录（只下探一层）
//! 3) 注册表记录的“当前安装”：插入并选定
//! 4) 启动器匹配的服务记录：由 `-resin-home` 或 `-exe` 推导 home
//! 5) 从自身所在位置逐级向上，找到第一个安装根目录；若尚未选定则选定它
//!
//! 失败策略：
//! - 单个卷/目录/注册表分支读取失败只跳过该分支
//! - 无法列出服务注册表是唯一的整体失败
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::ProductConfig;
use crate::descriptor::Installation;
use crate::error::{SetupError, SetupResult};
use crate::inventory::Inventory;
use crate::paths::{self, CanonicalPath};
use crate::ports::{ProductRegistry, ServiceRegistry, VolumeSource};
use crate::probe::{InstallationProbe, ProbeResult};
use crate::scanner;

/// 发现流程所需的外部能力。
pub struct Discovery<'a> {
    pub product: &'a ProductConfig,
    pub probe: &'a dyn InstallationProbe,
    pub volumes: &'a dyn VolumeSource,
    pub product_registry: &'a dyn ProductRegistry,
    pub services: &'a dyn ServiceRegistry,
    /// 当前进程可执行文件路径（为空则跳过第 5 步）。
    pub own_location: Option<&'a Path>,
}

impl Discovery<'_> {
    /// 执行全部发现步骤并返回清单中的安装快照。
    ///
    /// 异常处理：
    /// - 仅当服务注册表无法列出时返回 `AccessDenied`；此前步骤的结果已写入清单
    pub fn discover(&self, inventory: &Inventory) -> SetupResult<Vec<Installation>> {
        self.scan_volumes(inventory);
        self.scan_current_home(inventory);
        self.scan_service_homes(inventory)?;
        self.scan_own_location(inventory);
        let found = inventory.installations();
        info!("发现 Resin 安装 {} 个", found.len());
        Ok(found)
    }

    /// 并行扫描各固定卷；插入清单时由清单内部的互斥锁串行化。
    fn scan_volumes(&self, inventory: &Inventory) {
        let volumes = match self.volumes.fixed_volumes() {
            Ok(v) => v,
            Err(e) => {
                warn!("枚举本机卷失败，跳过卷扫描: {e:#}");
                return;
            }
        };
        std::thread::scope(|scope| {
            for volume in &volumes {
                scope.spawn(move || self.scan_volume(volume, inventory));
            }
        });
    }

    fn scan_volume(&self, volume: &Path, inventory: &Inventory) {
        let entries = match std::fs::read_dir(volume) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("读取卷失败，跳过: {}: {e}", volume.display());
                return;
            }
        };
        let prefix = self.product.dir_prefix.to_lowercase();
        let container = self.product.container_marker.to_lowercase();

        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if name.starts_with(&prefix) && self.insert_if_root(&dir, inventory) {
                continue;
            }
            if !container.is_empty() && name.contains(&container) {
                self.scan_container(&dir, inventory);
            }
        }
    }

    /// 容器目录只判定其直接子目录。
    fn scan_container(&self, dir: &Path, inventory: &Inventory) {
        let children = match std::fs::read_dir(dir) {
            Ok(children) => children,
            Err(e) => {
                warn!("读取容器目录失败，跳过: {}: {e}", dir.display());
                return;
            }
        };
        for child in children.flatten() {
            let path = child.path();
            if path.is_dir() {
                self.insert_if_root(&path, inventory);
            }
        }
    }

    fn insert_if_root(&self, dir: &Path, inventory: &Inventory) -> bool {
        match self.probe.probe(dir) {
            ProbeResult::Root(home) => {
                if inventory.insert_installation(Installation::new(home)).is_new() {
                    debug!("发现安装目录: {}", dir.display());
                }
                true
            }
            ProbeResult::NotARoot => false,
        }
    }

    fn scan_current_home(&self, inventory: &Inventory) {
        let home = match self.product_registry.current_home() {
            Ok(Some(home)) if !home.trim().is_empty() => home,
            Ok(_) => return,
            Err(e) => {
                warn!("读取当前安装注册表值失败，跳过: {e:#}");
                return;
            }
        };
        let installation = Installation::new(CanonicalPath::new(&home));
        match inventory.select(installation) {
            Ok(selected) => info!("注册表记录的当前安装: {selected}"),
            Err(e @ SetupError::AlreadySelected { .. }) => warn!("{e}"),
            Err(e) => warn!("选定当前安装失败: {e}"),
        }
    }

    fn scan_service_homes(&self, inventory: &Inventory) -> SetupResult<()> {
        let names = self
            .services
            .list_services()
            .map_err(|e| SetupError::access_denied("列出服务注册表失败", e))?;
        for name in names {
            let image_path = match self.services.image_path(&name) {
                Ok(Some(p)) => p,
                Ok(None) => continue,
                Err(e) => {
                    debug!("读取服务 ImagePath 失败，跳过: {name}: {e:#}");
                    continue;
                }
            };
            let Some(parsed) = scanner::match_launcher(&image_path, &self.product.launcher) else {
                continue;
            };
            if let Some(home) = scanner::derive_home(&parsed, self.probe) {
                inventory.insert_installation(Installation::new(CanonicalPath::new(home)));
            }
        }
        Ok(())
    }

    fn scan_own_location(&self, inventory: &Inventory) {
        let Some(location) = self.own_location else {
            return;
        };
        let start = CanonicalPath::new(location);
        let mut current: PathBuf = start.as_path().to_path_buf();
        loop {
            let current_str = current.to_string_lossy().into_owned();
            let Some(parent) = paths::parent_segment(&current_str) else {
                return;
            };
            current = PathBuf::from(parent);
            if let ProbeResult::Root(home) = self.probe.probe(&current) {
                let installation = Installation::new(home);
                inventory.insert_installation(installation.clone());
                if !inventory.has_selection() {
                    match inventory.select(installation) {
                        Ok(selected) => info!("按程序所在位置选定当前安装: {selected}"),
                        Err(e @ SetupError::AlreadySelected { .. }) => debug!("{e}"),
                        Err(e) => warn!("选定当前安装失败: {e}"),
                    }
                }
                return;
            }
        }
    }
}
