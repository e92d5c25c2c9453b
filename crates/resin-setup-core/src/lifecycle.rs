//! 服务生命周期管理：注册、注销、启动、停止、重启。
//!
//! 状态机（按服务名）：
//! `Unregistered -> Installing -> Installed{Stopped|Running} -> Uninstalling -> Unregistered`
//!
//! 约束：
//! - `Installing` / `Uninstalling` 为过渡阶段，同名服务的并发注册/注销返回 `Busy`
//! - 注册事务失败不残留服务记录（由 [`ServiceInstaller`] 实现保证）
//! - ImagePath 改写失败只报告错误，不自动注销已注册的服务
//! - 启动/停止阻塞等待目标状态；取消只阻止发出下一个动作，不中断已发出的动作
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::args;
use crate::config::{ControlConfig, RollbackConfig};
use crate::descriptor::ServiceDescriptor;
use crate::error::{SetupError, SetupResult};
use crate::ports::{InstallRequest, RunState, ServiceAccount, ServiceController, ServiceInstaller, ServiceRegistry};
use crate::state::{RollbackState, RollbackStateStore};

/// 服务在生命周期中的阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServicePhase {
    Unregistered,
    Installing,
    Installed(RunState),
    Uninstalling,
}

impl ServicePhase {
    fn label(self) -> &'static str {
        match self {
            Self::Unregistered => "未注册",
            Self::Installing => "注册",
            Self::Installed(_) => "已注册",
            Self::Uninstalling => "注销",
        }
    }
}

/// 取消标记：可跨线程共享，置位后不再发出后续动作。
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 过渡阶段守卫：离开作用域时清除该服务的过渡阶段。
struct PhaseGuard<'a> {
    phases: &'a Mutex<HashMap<String, ServicePhase>>,
    service: String,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        lock(self.phases).remove(&self.service);
    }
}

fn lock(phases: &Mutex<HashMap<String, ServicePhase>>) -> MutexGuard<'_, HashMap<String, ServicePhase>> {
    phases.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 将 ImagePath 截断到第一个 `.exe`（忽略大小写），保留紧随其后的右引号。
///
/// 异常处理：
/// - 不含 `.exe` 返回 `MalformedRecord`
pub fn bare_executable(image_path: &str) -> SetupResult<&str> {
    let mut end = args::exe_end(image_path)
        .ok_or_else(|| SetupError::MalformedRecord(format!("ImagePath 中没有 .exe: {image_path}")))?;
    if image_path.starts_with('"') && image_path[end..].starts_with('"') {
        end += 1;
    }
    Ok(&image_path[..end])
}

/// 服务生命周期管理器。
pub struct ServiceLifecycleManager {
    registry: Arc<dyn ServiceRegistry>,
    controller: Arc<dyn ServiceController>,
    installer: Arc<dyn ServiceInstaller>,
    store: RollbackStateStore,
    rollback: RollbackConfig,
    control: ControlConfig,
    launcher: String,
    phases: Mutex<HashMap<String, ServicePhase>>,
}

impl ServiceLifecycleManager {
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        controller: Arc<dyn ServiceController>,
        installer: Arc<dyn ServiceInstaller>,
        store: RollbackStateStore,
        rollback: RollbackConfig,
        control: ControlConfig,
        launcher: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            controller,
            installer,
            store,
            rollback,
            control,
            launcher: launcher.into(),
            phases: Mutex::new(HashMap::new()),
        }
    }

    /// 进入过渡阶段；同名服务已处于过渡阶段时返回 `Busy`。
    fn enter(&self, service: &str, phase: ServicePhase) -> SetupResult<PhaseGuard<'_>> {
        let mut phases = lock(&self.phases);
        if let Some(current) = phases.get(service) {
            return Err(SetupError::Busy {
                service: service.to_string(),
                phase: current.label().to_string(),
            });
        }
        phases.insert(service.to_string(), phase);
        Ok(PhaseGuard {
            phases: &self.phases,
            service: service.to_string(),
        })
    }

    /// 查询服务当前阶段。
    ///
    /// 返回值：
    /// - 正在注册/注销时返回对应过渡阶段
    /// - 否则按服务控制管理器的状态返回 `Unregistered` 或 `Installed(..)`
    pub fn phase(&self, service: &str) -> SetupResult<ServicePhase> {
        if let Some(phase) = lock(&self.phases).get(service) {
            return Ok(*phase);
        }
        let state = self
            .controller
            .status(service)
            .map_err(|e| control_error(service, e))?;
        Ok(state.map_or(ServicePhase::Unregistered, ServicePhase::Installed))
    }

    /// 注册服务并写入参数。
    ///
    /// 参数：
    /// - `descriptor`：服务描述
    /// - `is_new`：为真时先执行事务化注册；为假时只改写已有服务的 ImagePath
    ///
    /// 异常处理：
    /// - 注册事务失败返回 `Transaction`
    /// - ImagePath 不含 `.exe` 返回 `MalformedRecord`；读写失败返回 `ImagePathRewrite`
    /// - 回滚状态落盘失败只记录日志
    pub fn install(&self, descriptor: &ServiceDescriptor, is_new: bool) -> SetupResult<()> {
        let name = descriptor.name.as_str();
        let _guard = self.enter(name, ServicePhase::Installing)?;

        if is_new {
            let request = self.install_request(descriptor);
            info!("注册服务: {name} ({})", request.executable);
            let state = self.installer.install(&request).map_err(|e| SetupError::Transaction {
                service: name.to_string(),
                source: e.into(),
            })?;
            if self.rollback.persist {
                if let Err(e) = self.store.save(&state) {
                    warn!("写入回滚状态失败（卸载时将按配置回退）: {name}: {e}");
                }
            }
        }

        self.rewrite_image_path(descriptor)?;
        info!("服务配置已写入: {descriptor}");
        Ok(())
    }

    fn install_request(&self, descriptor: &ServiceDescriptor) -> InstallRequest {
        let executable = descriptor
            .executable_path
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| {
                format!("{}\\{}", descriptor.home.trim_end_matches(['\\', '/']), self.launcher)
            });
        let account = match descriptor.run_as_user.as_deref().filter(|u| !u.is_empty()) {
            Some(user) => ServiceAccount::User {
                name: user.to_string(),
                password: descriptor
                    .password()
                    .map(|p| p.expose().to_string())
                    .unwrap_or_default(),
            },
            None => ServiceAccount::LocalSystem,
        };
        InstallRequest {
            service_name: descriptor.name.clone(),
            display_name: descriptor.name.clone(),
            executable,
            account,
        }
    }

    fn rewrite_image_path(&self, descriptor: &ServiceDescriptor) -> SetupResult<()> {
        let name = descriptor.name.as_str();
        let rewrite_error = |e: anyhow::Error| SetupError::ImagePathRewrite {
            service: name.to_string(),
            source: e.into(),
        };
        let current = self
            .registry
            .image_path(name)
            .map_err(rewrite_error)?
            .ok_or_else(|| SetupError::ServiceNotFound(name.to_string()))?;
        let image_path = format!("{} {}", bare_executable(&current)?, descriptor.format_arguments());
        debug!("改写 ImagePath: {name} => {image_path}");
        self.registry.set_image_path(name, &image_path).map_err(rewrite_error)
    }

    /// 注销服务。
    ///
    /// 异常处理：
    /// - 无可用回滚状态返回 `StateNotFound`
    /// - 状态文件损坏返回 `MalformedRecord`
    /// - 注销事务失败返回 `Transaction`
    pub fn uninstall(&self, descriptor: &ServiceDescriptor) -> SetupResult<()> {
        let name = descriptor.name.as_str();
        let _guard = self.enter(name, ServicePhase::Uninstalling)?;

        let state = self.rollback_state(name)?;
        info!("注销服务: {name}");
        self.installer
            .uninstall(name, &state)
            .map_err(|e| SetupError::Transaction {
                service: name.to_string(),
                source: e.into(),
            })?;
        match self.store.remove(name) {
            Ok(true) => debug!("回滚状态已删除: {name}"),
            Ok(false) => {}
            Err(e) => warn!("删除回滚状态失败: {name}: {e}"),
        }
        Ok(())
    }

    fn rollback_state(&self, name: &str) -> SetupResult<RollbackState> {
        if self.rollback.load_persisted {
            if let Some(state) = self.store.load(name)? {
                return Ok(state);
            }
        }
        if self.rollback.synthetic_default {
            debug!("使用默认回滚状态: {name}");
            Ok(RollbackState::synthetic_default(name))
        } else {
            Err(SetupError::StateNotFound(name.to_string()))
        }
    }

    /// 查询运行状态；服务未注册返回 `ServiceNotFound`。
    pub fn run_state(&self, service: &str) -> SetupResult<RunState> {
        self.controller
            .status(service)
            .map_err(|e| control_error(service, e))?
            .ok_or_else(|| SetupError::ServiceNotFound(service.to_string()))
    }

    /// 启动服务并等待进入运行状态（已运行则直接返回）。
    pub fn start(&self, service: &str) -> SetupResult<()> {
        match self.run_state(service)? {
            RunState::Running => {
                debug!("服务已在运行: {service}");
                return Ok(());
            }
            RunState::StartPending => {}
            RunState::StopPending => {
                self.wait_for(service, RunState::Stopped)?;
                self.issue_start(service)?;
            }
            _ => self.issue_start(service)?,
        }
        self.wait_for(service, RunState::Running)?;
        info!("服务已启动: {service}");
        Ok(())
    }

    /// 停止服务并等待进入停止状态（已停止则直接返回）。
    pub fn stop(&self, service: &str) -> SetupResult<()> {
        match self.run_state(service)? {
            RunState::Stopped => {
                debug!("服务已停止: {service}");
                return Ok(());
            }
            RunState::StopPending => {}
            RunState::StartPending => {
                self.wait_for(service, RunState::Running)?;
                self.issue_stop(service)?;
            }
            _ => self.issue_stop(service)?,
        }
        self.wait_for(service, RunState::Stopped)?;
        info!("服务已停止: {service}");
        Ok(())
    }

    /// 重启服务（运行中先停止，再启动）。
    pub fn restart(&self, service: &str) -> SetupResult<()> {
        self.restart_with_cancel(service, &CancelFlag::new())
    }

    /// 可取消的重启：每个动作发出前检查取消标记。
    ///
    /// 异常处理：
    /// - 取消后返回 `Cancelled`；已完成的停止不会回滚
    pub fn restart_with_cancel(&self, service: &str, cancel: &CancelFlag) -> SetupResult<()> {
        if cancel.is_cancelled() {
            return Err(SetupError::Cancelled(service.to_string()));
        }
        self.stop(service)?;
        if cancel.is_cancelled() {
            warn!("重启已取消，服务保持停止: {service}");
            return Err(SetupError::Cancelled(service.to_string()));
        }
        self.start(service)
    }

    fn issue_start(&self, service: &str) -> SetupResult<()> {
        self.controller.start(service).map_err(|e| control_error(service, e))
    }

    fn issue_stop(&self, service: &str) -> SetupResult<()> {
        self.controller.stop(service).map_err(|e| control_error(service, e))
    }

    fn wait_for(&self, service: &str, target: RunState) -> SetupResult<()> {
        let deadline = self.control.transition_timeout().map(|t| Instant::now() + t);
        loop {
            if self.run_state(service)? == target {
                return Ok(());
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(SetupError::TransitionTimeout {
                    service: service.to_string(),
                    target: target.as_str().to_string(),
                });
            }
            std::thread::sleep(self.control.poll_interval());
        }
    }
}

fn control_error(service: &str, e: anyhow::Error) -> SetupError {
    SetupError::ServiceControl {
        service: service.to_string(),
        source: e.into(),
    }
}
