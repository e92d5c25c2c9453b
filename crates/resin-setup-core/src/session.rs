//! 会话编排：持有配置、系统能力与清单，串联发现、服务扫描与生命周期操作。
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::config::SetupConfig;
use crate::descriptor::{Installation, ServiceDescriptor};
use crate::discovery::Discovery;
use crate::error::{SetupError, SetupResult};
use crate::inventory::Inventory;
use crate::lifecycle::ServiceLifecycleManager;
use crate::ports::{
    FilterMetabase, ProductRegistry, ServiceController, ServiceInstaller, ServiceRegistry, VolumeSource,
};
use crate::probe::{InstallationProbe, MarkerProbe};
use crate::scanner;
use crate::state::RollbackStateStore;
use crate::webfilter::WebFilterIntegrator;

/// IIS 服务名（停止/重启 Web 服务器时使用）。
pub const WEB_SERVER_SERVICE: &str = "W3SVC";

/// 宿主系统能力集合。
#[derive(Clone)]
pub struct HostPorts {
    pub volumes: Arc<dyn VolumeSource>,
    pub product_registry: Arc<dyn ProductRegistry>,
    pub services: Arc<dyn ServiceRegistry>,
    pub controller: Arc<dyn ServiceController>,
    pub installer: Arc<dyn ServiceInstaller>,
    pub metabase: Arc<dyn FilterMetabase>,
    /// 当前进程可执行文件路径。
    pub own_location: Option<PathBuf>,
}

/// 一次工具运行的会话。
pub struct SetupSession {
    config: SetupConfig,
    host: HostPorts,
    probe: Box<dyn InstallationProbe>,
    inventory: Inventory,
    lifecycle: ServiceLifecycleManager,
}

impl SetupSession {
    /// 创建会话。
    ///
    /// 异常处理：
    /// - 回滚状态目录无法确定时返回 `Config`
    pub fn new(config: SetupConfig, host: HostPorts, probe: Box<dyn InstallationProbe>) -> SetupResult<Self> {
        let store = RollbackStateStore::new(config.rollback.resolve_state_dir()?);
        let lifecycle = ServiceLifecycleManager::new(
            Arc::clone(&host.services),
            Arc::clone(&host.controller),
            Arc::clone(&host.installer),
            store,
            config.rollback.clone(),
            config.control.clone(),
            config.product.launcher.clone(),
        );
        Ok(Self {
            config,
            host,
            probe,
            inventory: Inventory::new(),
            lifecycle,
        })
    }

    /// 使用配置中的标记文件判定安装根目录。
    pub fn with_marker_probe(config: SetupConfig, host: HostPorts) -> SetupResult<Self> {
        let probe = MarkerProbe::new(config.product.root_markers.clone());
        Self::new(config, host, Box::new(probe))
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn lifecycle(&self) -> &ServiceLifecycleManager {
        &self.lifecycle
    }

    pub fn web_filter(&self) -> WebFilterIntegrator<'_> {
        WebFilterIntegrator::new(self.host.metabase.as_ref(), &self.config.filter)
    }

    /// 执行安装发现。
    pub fn discover(&self) -> SetupResult<Vec<Installation>> {
        Discovery {
            product: &self.config.product,
            probe: self.probe.as_ref(),
            volumes: self.host.volumes.as_ref(),
            product_registry: self.host.product_registry.as_ref(),
            services: self.host.services.as_ref(),
            own_location: self.host.own_location.as_deref(),
        }
        .discover(&self.inventory)
    }

    /// 全量重新扫描服务：清空旧的服务描述后重建。
    pub fn rescan_services(&self) -> SetupResult<Vec<ServiceDescriptor>> {
        self.inventory.clear_services();
        let services = scanner::scan_services(
            self.host.services.as_ref(),
            self.probe.as_ref(),
            &self.config.product.launcher,
        )?;
        self.inventory.replace_services(services);
        Ok(self.inventory.services())
    }

    /// 发现安装、扫描服务，并为每个安装附加其服务使用的静态 server id。
    pub fn refresh(&self) -> SetupResult<Vec<Installation>> {
        self.discover()?;
        let services = self.rescan_services()?;
        info!("发现 Resin 服务 {} 个", services.len());

        for installation in self.inventory.installations() {
            let mut servers: Vec<String> = Vec::new();
            for service in self.inventory.services_for(&installation) {
                if let Some(id) = service.server_id() {
                    if !servers.iter().any(|s| s == id) {
                        servers.push(id.to_string());
                    }
                }
            }
            self.inventory.attach_servers(installation.home(), servers);
        }
        Ok(self.inventory.installations())
    }

    /// 按 home 取得安装（不存在时加入清单）。
    pub fn installation_for_home(&self, home: impl AsRef<Path>) -> Installation {
        self.inventory.find_or_insert(home)
    }

    /// 读取 IIS 默认站点 scripts 目录。
    pub fn scripts_dir(&self) -> SetupResult<Option<PathBuf>> {
        self.host
            .metabase
            .scripts_dir()
            .map_err(|e| SetupError::access_denied("读取 IIS scripts 目录失败", e))
    }

    /// 停止 IIS 服务。
    pub fn stop_web_server(&self) -> SetupResult<()> {
        self.lifecycle.stop(WEB_SERVER_SERVICE)
    }

    /// 重启 IIS 服务。
    pub fn restart_web_server(&self) -> SetupResult<()> {
        self.lifecycle.restart(WEB_SERVER_SERVICE)
    }
}
