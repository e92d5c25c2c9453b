//! 安装/服务清单（发现流程与生命周期操作共享的唯一可变状态）。
//!
//! 约束：
//! - 安装按规范化 home 去重，服务按名称去重；插入已存在的键是无操作，返回已有条目的索引
//! - “当前安装”只能选定一次，再次选定返回 `AlreadySelected`
//! - 整个清单由一把互斥锁保护，保证“检查-插入”原子完成
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::descriptor::{Installation, ServiceDescriptor};
use crate::error::{SetupError, SetupResult};
use crate::paths::CanonicalPath;

/// 插入结果：新插入或已存在，均携带条目索引。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    New(usize),
    Existing(usize),
}

impl Insert {
    pub fn index(self) -> usize {
        match self {
            Self::New(i) | Self::Existing(i) => i,
        }
    }

    pub fn is_new(self) -> bool {
        matches!(self, Self::New(_))
    }
}

#[derive(Debug, Default)]
struct InventoryState {
    installations: Vec<Installation>,
    services: Vec<ServiceDescriptor>,
    selected: Option<usize>,
}

impl InventoryState {
    fn insert_installation(&mut self, installation: Installation) -> Insert {
        match self.installations.iter().position(|i| *i == installation) {
            Some(idx) => Insert::Existing(idx),
            None => {
                self.installations.push(installation);
                Insert::New(self.installations.len() - 1)
            }
        }
    }

    fn insert_service(&mut self, service: ServiceDescriptor) -> Insert {
        match self.services.iter().position(|s| *s == service) {
            Some(idx) => Insert::Existing(idx),
            None => {
                self.services.push(service);
                Insert::New(self.services.len() - 1)
            }
        }
    }
}

/// 去重后的安装与服务清单。
#[derive(Debug, Default)]
pub struct Inventory {
    state: Mutex<InventoryState>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, InventoryState> {
        // 清单只保存值数据，持锁线程 panic 后数据仍然一致，可以继续使用。
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 插入安装（已存在则不覆盖）。
    pub fn insert_installation(&self, installation: Installation) -> Insert {
        self.lock().insert_installation(installation)
    }

    pub fn installation(&self, index: usize) -> Option<Installation> {
        self.lock().installations.get(index).cloned()
    }

    /// 按插入顺序返回全部安装的快照。
    pub fn installations(&self) -> Vec<Installation> {
        self.lock().installations.clone()
    }

    /// 按 home 查找安装，不存在时插入；不影响“当前安装”的选定。
    pub fn find_or_insert(&self, home: impl AsRef<Path>) -> Installation {
        let installation = Installation::new(CanonicalPath::new(home));
        let mut state = self.lock();
        let idx = state.insert_installation(installation).index();
        state.installations[idx].clone()
    }

    /// 选定当前安装（若不在清单中则先插入）。
    ///
    /// 异常处理：
    /// - 已选定过（无论是否同一安装）返回 `AlreadySelected`，原选定保持不变
    pub fn select(&self, installation: Installation) -> SetupResult<Installation> {
        let mut state = self.lock();
        if let Some(current) = state.selected.and_then(|i| state.installations.get(i)) {
            return Err(SetupError::AlreadySelected {
                current: current.home().to_string(),
                requested: installation.home().to_string(),
            });
        }
        let idx = state.insert_installation(installation).index();
        state.selected = Some(idx);
        Ok(state.installations[idx].clone())
    }

    pub fn selected(&self) -> Option<Installation> {
        let state = self.lock();
        state.selected.and_then(|i| state.installations.get(i).cloned())
    }

    pub fn has_selection(&self) -> bool {
        self.lock().selected.is_some()
    }

    /// 为指定安装附加 server id 列表。
    ///
    /// 返回值：
    /// - `true`：找到安装并已更新
    /// - `false`：清单中没有该安装
    pub fn attach_servers(&self, home: &CanonicalPath, servers: Vec<String>) -> bool {
        let mut state = self.lock();
        match state.installations.iter_mut().find(|i| i.home() == home) {
            Some(installation) => {
                installation.attach_servers(servers);
                true
            }
            None => false,
        }
    }

    /// 插入服务描述（同名已存在则不覆盖）。
    pub fn insert_service(&self, service: ServiceDescriptor) -> Insert {
        self.lock().insert_service(service)
    }

    pub fn service(&self, name: &str) -> Option<ServiceDescriptor> {
        self.lock().services.iter().find(|s| s.name == name).cloned()
    }

    pub fn services(&self) -> Vec<ServiceDescriptor> {
        self.lock().services.clone()
    }

    /// 返回 home 与指定安装相同的服务。
    pub fn services_for(&self, installation: &Installation) -> Vec<ServiceDescriptor> {
        self.lock()
            .services
            .iter()
            .filter(|s| CanonicalPath::new(&s.home) == *installation.home())
            .cloned()
            .collect()
    }

    pub fn clear_services(&self) {
        self.lock().services.clear();
    }

    /// 用新扫描结果整体替换服务列表（不做增量合并）。
    pub fn replace_services(&self, services: Vec<ServiceDescriptor>) {
        let mut state = self.lock();
        state.services.clear();
        for service in services {
            state.insert_service(service);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installation(home: &str) -> Installation {
        Installation::new(CanonicalPath::new(home))
    }

    #[test]
    /// 同一规范化 home 插入两次只保留一条，两次都返回同一索引。
    fn insert_is_idempotent() {
        let inv = Inventory::new();
        let first = inv.insert_installation(installation(r"C:\resin-4.0"));
        let second = inv.insert_installation(installation(r"c:\RESIN-4.0\"));
        assert!(first.is_new());
        assert_eq!(second, Insert::Existing(first.index()));
        assert_eq!(inv.installations().len(), 1);
        assert_eq!(inv.installation(0).unwrap().home().as_str(), r"C:\resin-4.0");
    }

    #[test]
    /// 第二次选定报错，且第一次的选定保持不变。
    fn selection_is_set_once() {
        let inv = Inventory::new();
        inv.select(installation(r"C:\a")).unwrap();
        let err = inv.select(installation(r"C:\b")).unwrap_err();
        assert!(matches!(err, SetupError::AlreadySelected { .. }));
        assert_eq!(inv.selected().unwrap().home().as_str(), r"C:\a");

        let again = inv.select(installation(r"C:\a")).unwrap_err();
        assert!(matches!(again, SetupError::AlreadySelected { .. }));
    }

    #[test]
    fn find_or_insert_reuses_existing_entry() {
        let inv = Inventory::new();
        inv.insert_installation(installation(r"D:\apps\resin"));
        let found = inv.find_or_insert(r"d:\apps\resin\");
        assert_eq!(found.home().as_str(), r"D:\apps\resin");
        assert_eq!(inv.installations().len(), 1);
        assert!(!inv.has_selection());
    }

    #[test]
    fn services_dedup_by_name_and_filter_by_home() {
        let inv = Inventory::new();
        assert!(inv.insert_service(ServiceDescriptor::new("a", r"C:\r1")).is_new());
        assert!(!inv.insert_service(ServiceDescriptor::new("a", r"C:\r2")).is_new());
        inv.insert_service(ServiceDescriptor::new("b", r"c:\R1\"));
        inv.insert_service(ServiceDescriptor::new("c", r"C:\r2"));

        let names: Vec<String> = inv
            .services_for(&installation(r"C:\r1"))
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

        inv.replace_services(vec![ServiceDescriptor::new("z", r"C:\r3")]);
        assert_eq!(inv.services().len(), 1);
        assert!(inv.service("a").is_none());
    }

    #[test]
    fn attach_servers_updates_matching_installation() {
        let inv = Inventory::new();
        inv.insert_installation(installation(r"C:\r"));
        assert!(inv.attach_servers(&CanonicalPath::new(r"C:\R"), vec!["web-a".to_string()]));
        assert_eq!(inv.installations()[0].servers(), ["web-a".to_string()]);
        assert!(!inv.attach_servers(&CanonicalPath::new(r"C:\other"), vec![]));
    }
}
