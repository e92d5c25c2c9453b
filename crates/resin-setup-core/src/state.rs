//! 服务回滚状态落盘（`%ProgramData%\Caucho\services\<服务名>.srv`）。
//!
//! 目的：
//! - 记录“注册服务时做过哪些系统修改”，以便卸载时按相同信息反向执行
//! - 文件缺失时由调用方决定是否回退到 [`RollbackState::synthetic_default`]
//!
//! 格式：
//! - JSON，带 `schema_version`；读取到更高版本视为格式错误
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::error::{SetupError, SetupResult};
use crate::paths::STATE_FILE_EXTENSION;
use crate::ports::ServiceAccount;

/// 当前状态文件格式版本。
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// 服务进程账户类型（不落盘密码）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    LocalSystem,
    User,
}

/// 服务注册的回滚状态。
///
/// 字段说明：
/// - `state_id`：本次注册的状态 ID
/// - `account` / `account_name`：注册时使用的账户
/// - `already_registered`：注册前服务是否已存在（为真时卸载不删除服务）
/// - `event_log_existed`：注册前事件日志源是否已存在
/// - `installed`：注册是否完成
/// - `recorded_at`：记录时间（UTC）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackState {
    pub schema_version: u32,
    pub state_id: Uuid,
    pub service_name: String,
    pub account: AccountKind,
    #[serde(default)]
    pub account_name: Option<String>,
    pub already_registered: bool,
    pub event_log_existed: bool,
    pub installed: bool,
    pub recorded_at: OffsetDateTime,
}

impl RollbackState {
    /// 为一次新注册创建状态。
    pub fn new(service_name: impl Into<String>, account: &ServiceAccount) -> Self {
        let (kind, name) = match account {
            ServiceAccount::LocalSystem => (AccountKind::LocalSystem, None),
            ServiceAccount::User { name, .. } => (AccountKind::User, Some(name.clone())),
        };
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            state_id: Uuid::new_v4(),
            service_name: service_name.into(),
            account: kind,
            account_name: name,
            already_registered: false,
            event_log_existed: false,
            installed: true,
            recorded_at: OffsetDateTime::now_utc(),
        }
    }

    /// 无落盘状态时使用的默认状态：已安装、LocalSystem 账户、注册前不存在。
    pub fn synthetic_default(service_name: impl Into<String>) -> Self {
        Self {
            event_log_existed: true,
            ..Self::new(service_name, &ServiceAccount::LocalSystem)
        }
    }
}

/// 回滚状态文件存储。
#[derive(Debug, Clone)]
pub struct RollbackStateStore {
    dir: PathBuf,
}

impl RollbackStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 指定服务的状态文件路径。
    pub fn path_for(&self, service: &str) -> PathBuf {
        self.dir.join(format!("{service}.{STATE_FILE_EXTENSION}"))
    }

    /// 写入状态文件（先写临时文件并落盘，再替换目标文件）。
    ///
    /// 异常处理：
    /// - 目录创建、写入、刷新或替换失败返回 `Io`；失败时删除临时文件
    pub fn save(&self, state: &RollbackState) -> SetupResult<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| SetupError::io(&self.dir, e))?;
        let path = self.path_for(&state.service_name);
        let tmp = path.with_extension(format!("{STATE_FILE_EXTENSION}.tmp"));

        if let Err(e) = write_flushed(&tmp, state) {
            let _ = std::fs::remove_file(&tmp);
            return Err(SetupError::io(&tmp, e));
        }
        std::fs::rename(&tmp, &path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            SetupError::io(&path, e)
        })?;
        debug!("回滚状态已写入: {}", path.display());
        Ok(path)
    }

    /// 读取状态文件。
    ///
    /// 返回值：
    /// - `Ok(None)`：文件不存在
    ///
    /// 异常处理：
    /// - 读取失败返回 `Io`；内容损坏或版本过高返回 `MalformedRecord`
    pub fn load(&self, service: &str) -> SetupResult<Option<RollbackState>> {
        let path = self.path_for(service);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SetupError::io(&path, e)),
        };
        let state: RollbackState = serde_json::from_slice(&bytes).map_err(|e| {
            SetupError::MalformedRecord(format!("回滚状态文件 {} 解析失败: {e}", path.display()))
        })?;
        if state.schema_version > STATE_SCHEMA_VERSION {
            return Err(SetupError::MalformedRecord(format!(
                "回滚状态文件 {} 版本 {} 高于支持的版本 {STATE_SCHEMA_VERSION}",
                path.display(),
                state.schema_version
            )));
        }
        Ok(Some(state))
    }

    /// 删除状态文件。
    ///
    /// 返回值：
    /// - `Ok(true)`：文件存在并已删除
    /// - `Ok(false)`：文件不存在
    pub fn remove(&self, service: &str) -> SetupResult<bool> {
        let path = self.path_for(service);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SetupError::io(&path, e)),
        }
    }
}

/// 序列化并刷新到磁盘；文件句柄在函数返回时释放。
fn write_flushed(path: &Path, state: &RollbackState) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, state).map_err(std::io::Error::from)?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (RollbackStateStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("resin-state-{}", Uuid::new_v4()));
        (RollbackStateStore::new(dir.join("services")), dir)
    }

    #[test]
    fn save_then_load_returns_same_state() {
        let (store, root) = store();
        let account = ServiceAccount::User {
            name: r".\resin".to_string(),
            password: "pw".to_string(),
        };
        let state = RollbackState::new("resin-web", &account);
        let path = store.save(&state).unwrap();
        assert_eq!(path.file_name().unwrap(), "resin-web.srv");

        let loaded = store.load("resin-web").unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.account, AccountKind::User);
        assert!(!std::fs::read_to_string(&path).unwrap().contains("pw"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_file_loads_as_none() {
        let (store, _root) = store();
        assert!(store.load("nope").unwrap().is_none());
        assert!(!store.remove("nope").unwrap());
    }

    #[test]
    fn newer_schema_is_rejected() {
        let (store, root) = store();
        let mut state = RollbackState::synthetic_default("svc");
        state.schema_version = STATE_SCHEMA_VERSION + 1;
        store.save(&state).unwrap();
        assert!(matches!(store.load("svc"), Err(SetupError::MalformedRecord(_))));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn corrupt_file_is_malformed() {
        let (store, root) = store();
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.path_for("svc"), b"not json").unwrap();
        assert!(matches!(store.load("svc"), Err(SetupError::MalformedRecord(_))));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn synthetic_default_matches_reference_state() {
        let state = RollbackState::synthetic_default("svc");
        assert_eq!(state.account, AccountKind::LocalSystem);
        assert!(state.installed);
        assert!(!state.already_registered);
        assert!(state.event_log_existed);
    }
}
