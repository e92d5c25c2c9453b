//! Windows 服务控制与事务化注册/注销（基于 `windows-service` crate）。
//!
//! 用途：
//! - 查询/启动/停止服务（阻塞等待由核心按配置轮询完成）
//! - 注册 Resin 服务：手动启动、LocalSystem 或指定账户；注册后任一步骤失败即删除服务
//! - 按回滚状态注销服务：注册前已存在的服务不删除
//!
//! 权限要求：
//! - 创建/删除/启停服务通常需要管理员权限
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use resin_setup_core::ports::{InstallRequest, RunState, ServiceAccount, ServiceController, ServiceInstaller};
use resin_setup_core::state::RollbackState;
use tracing::{debug, info, warn};
use windows_service::service::{
    Service, ServiceAccess, ServiceErrorControl, ServiceInfo, ServiceStartType, ServiceState, ServiceType,
};
use windows_service::service_manager::{ServiceManager, ServiceManagerAccess};

use crate::registry;

/// ERROR_SERVICE_DOES_NOT_EXIST
const ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;

/// 注销前等待服务停止的上限。
const UNINSTALL_STOP_TIMEOUT: Duration = Duration::from_secs(30);

fn open_manager(access: ServiceManagerAccess) -> Result<ServiceManager> {
    ServiceManager::local_computer(None::<&str>, access).context("打开 ServiceManager 失败")
}

/// 打开服务；服务不存在时返回 `Ok(None)`。
fn open_service(manager: &ServiceManager, name: &str, access: ServiceAccess) -> Result<Option<Service>> {
    match manager.open_service(name, access) {
        Ok(service) => Ok(Some(service)),
        Err(windows_service::Error::Winapi(e)) if e.raw_os_error() == Some(ERROR_SERVICE_DOES_NOT_EXIST) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("打开服务失败: {name}")),
    }
}

fn map_state(state: ServiceState) -> RunState {
    match state {
        ServiceState::Stopped => RunState::Stopped,
        ServiceState::StartPending => RunState::StartPending,
        ServiceState::StopPending => RunState::StopPending,
        ServiceState::Running => RunState::Running,
        ServiceState::ContinuePending => RunState::ContinuePending,
        ServiceState::PausePending => RunState::PausePending,
        ServiceState::Paused => RunState::Paused,
    }
}

/// 服务控制管理器。
#[derive(Debug, Clone, Copy, Default)]
pub struct ScmController;

impl ServiceController for ScmController {
    fn status(&self, service: &str) -> Result<Option<RunState>> {
        let manager = open_manager(ServiceManagerAccess::CONNECT)?;
        let Some(handle) = open_service(&manager, service, ServiceAccess::QUERY_STATUS)? else {
            return Ok(None);
        };
        let status = handle
            .query_status()
            .with_context(|| format!("查询服务状态失败: {service}"))?;
        Ok(Some(map_state(status.current_state)))
    }

    fn start(&self, service: &str) -> Result<()> {
        let manager = open_manager(ServiceManagerAccess::CONNECT)?;
        let handle = open_service(&manager, service, ServiceAccess::START)?
            .ok_or_else(|| anyhow!("服务不存在: {service}"))?;
        handle
            .start::<&str>(&[])
            .with_context(|| format!("启动服务失败: {service}"))?;
        Ok(())
    }

    fn stop(&self, service: &str) -> Result<()> {
        let manager = open_manager(ServiceManagerAccess::CONNECT)?;
        let handle = open_service(&manager, service, ServiceAccess::STOP)?
            .ok_or_else(|| anyhow!("服务不存在: {service}"))?;
        handle
            .stop()
            .with_context(|| format!("停止服务失败: {service}"))?;
        Ok(())
    }
}

/// 事务化服务注册器。
#[derive(Debug, Clone)]
pub struct ScmInstaller {
    poll_interval: Duration,
}

impl ScmInstaller {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// 停止服务并等待，超时只记录日志（随后的删除会在服务停止后生效）。
    fn stop_before_delete(&self, handle: &Service, name: &str) {
        let Ok(status) = handle.query_status() else {
            return;
        };
        if status.current_state == ServiceState::Stopped {
            return;
        }
        if let Err(e) = handle.stop() {
            warn!("注销前停止服务失败: {name}: {e}");
            return;
        }
        let start = Instant::now();
        while start.elapsed() < UNINSTALL_STOP_TIMEOUT {
            match handle.query_status() {
                Ok(s) if s.current_state == ServiceState::Stopped => return,
                Ok(_) => std::thread::sleep(self.poll_interval),
                Err(_) => return,
            }
        }
        warn!("等待服务停止超时，继续删除: {name}");
    }
}

impl ServiceInstaller for ScmInstaller {
    fn install(&self, request: &InstallRequest) -> Result<RollbackState> {
        let manager = open_manager(ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE)?;
        if open_service(&manager, &request.service_name, ServiceAccess::QUERY_STATUS)?.is_some() {
            return Err(anyhow!("服务已存在: {}", request.service_name));
        }
        let event_log_existed = registry::event_source_exists(&request.service_name).unwrap_or(false);

        let (account_name, account_password) = match &request.account {
            ServiceAccount::LocalSystem => (None, None),
            ServiceAccount::User { name, password } => {
                (Some(OsString::from(name)), Some(OsString::from(password)))
            }
        };
        let service_info = ServiceInfo {
            name: OsString::from(&request.service_name),
            display_name: OsString::from(&request.display_name),
            service_type: ServiceType::OWN_PROCESS,
            start_type: ServiceStartType::OnDemand,
            error_control: ServiceErrorControl::Normal,
            executable_path: PathBuf::from(&request.executable),
            launch_arguments: vec![],
            dependencies: vec![],
            account_name,
            account_password,
        };

        let service = manager
            .create_service(&service_info, ServiceAccess::CHANGE_CONFIG | ServiceAccess::DELETE)
            .with_context(|| format!("创建服务失败: {}", request.service_name))?;

        if let Err(e) = service.set_description(format!("Resin ({})", request.display_name)) {
            // 注册作为整体失败：删除刚创建的服务，不留残余记录。
            let _ = service.delete();
            return Err(anyhow::Error::new(e).context(format!("设置服务描述失败，已回滚: {}", request.service_name)));
        }

        info!("服务已注册: {}", request.service_name);
        let mut state = RollbackState::new(request.service_name.clone(), &request.account);
        state.event_log_existed = event_log_existed;
        Ok(state)
    }

    fn uninstall(&self, service: &str, state: &RollbackState) -> Result<()> {
        if state.already_registered {
            info!("服务在注册前已存在，不删除: {service}");
            return Ok(());
        }
        let manager = open_manager(ServiceManagerAccess::CONNECT)?;
        let access = ServiceAccess::QUERY_STATUS | ServiceAccess::STOP | ServiceAccess::DELETE;
        match open_service(&manager, service, access)? {
            Some(handle) => {
                self.stop_before_delete(&handle, service);
                handle
                    .delete()
                    .with_context(|| format!("删除服务失败: {service}"))?;
                info!("服务已删除: {service}");
            }
            None => warn!("服务不存在，视为已注销: {service}"),
        }
        if !state.event_log_existed {
            if let Err(e) = registry::delete_event_source(service) {
                debug!("清理事件日志源失败: {service}: {e:#}");
            }
        }
        Ok(())
    }
}
