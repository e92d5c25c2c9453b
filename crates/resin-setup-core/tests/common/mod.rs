#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use uuid::Uuid;

use resin_setup_core::config::SetupConfig;
use resin_setup_core::paths::CanonicalPath;
use resin_setup_core::ports::{
    FilterEntry, FilterMetabase, InstallRequest, ProductRegistry, RunState, ServiceController, ServiceInstaller,
    ServiceRegistry, VolumeSource,
};
use resin_setup_core::probe::{InstallationProbe, MarkerProbe, ProbeResult};
use resin_setup_core::session::HostPorts;
use resin_setup_core::state::RollbackState;

pub fn unique_temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{prefix}-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub struct CleanupDir(pub PathBuf);

impl Drop for CleanupDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// 创建一个带 `lib/resin.jar` 的安装目录。
pub fn make_install(dir: &Path) {
    std::fs::create_dir_all(dir.join("lib")).expect("create lib dir");
    std::fs::write(dir.join("lib").join("resin.jar"), b"jar").expect("write resin.jar");
}

pub struct FakeVolumes(pub Vec<PathBuf>);

impl VolumeSource for FakeVolumes {
    fn fixed_volumes(&self) -> Result<Vec<PathBuf>> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
pub struct FakeProductRegistry {
    pub home: Option<String>,
    pub fail: bool,
}

impl ProductRegistry for FakeProductRegistry {
    fn current_home(&self) -> Result<Option<String>> {
        if self.fail {
            return Err(anyhow!("access denied"));
        }
        Ok(self.home.clone())
    }
}

/// 内存服务注册表：服务名 -> ImagePath。
#[derive(Default)]
pub struct FakeServiceRegistry {
    pub images: Mutex<BTreeMap<String, String>>,
    pub fail_list: bool,
    pub fail_write: bool,
}

impl FakeServiceRegistry {
    pub fn with(entries: &[(&str, &str)]) -> Self {
        let reg = Self::default();
        for (name, image) in entries {
            reg.put(name, image);
        }
        reg
    }

    pub fn put(&self, name: &str, image: &str) {
        self.images
            .lock()
            .unwrap()
            .insert(name.to_string(), image.to_string());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.images.lock().unwrap().get(name).cloned()
    }

    pub fn remove(&self, name: &str) {
        self.images.lock().unwrap().remove(name);
    }
}

impl ServiceRegistry for FakeServiceRegistry {
    fn list_services(&self) -> Result<Vec<String>> {
        if self.fail_list {
            return Err(anyhow!("registry access denied"));
        }
        Ok(self.images.lock().unwrap().keys().cloned().collect())
    }

    fn image_path(&self, service: &str) -> Result<Option<String>> {
        Ok(self.get(service))
    }

    fn set_image_path(&self, service: &str, image_path: &str) -> Result<()> {
        if self.fail_write {
            return Err(anyhow!("write denied"));
        }
        if self.get(service).is_none() {
            return Err(anyhow!("service {service} does not exist"));
        }
        self.put(service, image_path);
        Ok(())
    }
}

/// 内存服务控制器：启动/停止先进入 pending，下一次查询时完成切换。
#[derive(Default)]
pub struct FakeController {
    pub states: Mutex<HashMap<String, RunState>>,
    pub actions: Mutex<Vec<String>>,
    /// 为真时停留在 pending 状态，不完成切换。
    pub stuck: bool,
}

impl FakeController {
    pub fn with(name: &str, state: RunState) -> Self {
        let c = Self::default();
        c.states.lock().unwrap().insert(name.to_string(), state);
        c
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }
}

impl ServiceController for FakeController {
    fn status(&self, service: &str) -> Result<Option<RunState>> {
        let mut states = self.states.lock().unwrap();
        let Some(state) = states.get_mut(service) else {
            return Ok(None);
        };
        let current = *state;
        if !self.stuck {
            match current {
                RunState::StartPending => *state = RunState::Running,
                RunState::StopPending => *state = RunState::Stopped,
                _ => {}
            }
        }
        Ok(Some(current))
    }

    fn start(&self, service: &str) -> Result<()> {
        self.actions.lock().unwrap().push(format!("start {service}"));
        let mut states = self.states.lock().unwrap();
        let state = states
            .get_mut(service)
            .ok_or_else(|| anyhow!("service {service} does not exist"))?;
        *state = RunState::StartPending;
        Ok(())
    }

    fn stop(&self, service: &str) -> Result<()> {
        self.actions.lock().unwrap().push(format!("stop {service}"));
        let mut states = self.states.lock().unwrap();
        let state = states
            .get_mut(service)
            .ok_or_else(|| anyhow!("service {service} does not exist"))?;
        *state = RunState::StopPending;
        Ok(())
    }
}

/// 内存安装器：注册时写入服务注册表与控制器。
pub struct FakeInstaller {
    pub registry: Arc<FakeServiceRegistry>,
    pub controller: Arc<FakeController>,
    pub fail_install: bool,
    pub fail_uninstall: bool,
    pub requests: Mutex<Vec<InstallRequest>>,
    pub uninstalled: Mutex<Vec<(String, RollbackState)>>,
}

impl FakeInstaller {
    pub fn new(registry: Arc<FakeServiceRegistry>, controller: Arc<FakeController>) -> Self {
        Self {
            registry,
            controller,
            fail_install: false,
            fail_uninstall: false,
            requests: Mutex::new(Vec::new()),
            uninstalled: Mutex::new(Vec::new()),
        }
    }
}

impl ServiceInstaller for FakeInstaller {
    fn install(&self, request: &InstallRequest) -> Result<RollbackState> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_install {
            return Err(anyhow!("transaction rolled back"));
        }
        let image = if request.executable.contains(' ') {
            format!("\"{}\"", request.executable)
        } else {
            request.executable.clone()
        };
        self.registry.put(&request.service_name, &image);
        self.controller
            .states
            .lock()
            .unwrap()
            .insert(request.service_name.clone(), RunState::Stopped);
        Ok(RollbackState::new(request.service_name.clone(), &request.account))
    }

    fn uninstall(&self, service: &str, state: &RollbackState) -> Result<()> {
        if self.fail_uninstall {
            return Err(anyhow!("uninstall transaction failed"));
        }
        self.registry.remove(service);
        self.controller.states.lock().unwrap().remove(service);
        self.uninstalled
            .lock()
            .unwrap()
            .push((service.to_string(), state.clone()));
        Ok(())
    }
}

/// 内存过滤器元数据库。
#[derive(Default)]
pub struct FakeMetabase {
    pub entries: Mutex<Vec<FilterEntry>>,
    pub load_order: Mutex<String>,
    pub commits: AtomicUsize,
    pub scripts: Option<PathBuf>,
    pub fail: bool,
}

impl FakeMetabase {
    pub fn with_load_order(order: &str) -> Self {
        let m = Self::default();
        *m.load_order.lock().unwrap() = order.to_string();
        m
    }

    pub fn load_order_value(&self) -> String {
        self.load_order.lock().unwrap().clone()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

impl FilterMetabase for FakeMetabase {
    fn entries(&self) -> Result<Vec<FilterEntry>> {
        if self.fail {
            return Err(anyhow!("metabase unavailable"));
        }
        Ok(self.entries.lock().unwrap().clone())
    }

    fn put_entry(&self, entry: &FilterEntry) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|e| !e.name.eq_ignore_ascii_case(&entry.name));
        entries.push(entry.clone());
        Ok(())
    }

    fn remove_entry(&self, name: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .retain(|e| !e.name.eq_ignore_ascii_case(name));
        Ok(())
    }

    fn load_order(&self) -> Result<String> {
        Ok(self.load_order_value())
    }

    fn set_load_order(&self, value: &str) -> Result<()> {
        *self.load_order.lock().unwrap() = value.to_string();
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn scripts_dir(&self) -> Result<Option<PathBuf>> {
        Ok(self.scripts.clone())
    }
}

/// 判定：先匹配预设的 Windows 风格根目录，再按标记文件判定真实目录。
pub struct FakeProbe {
    pub roots: Vec<CanonicalPath>,
    pub markers: MarkerProbe,
}

impl FakeProbe {
    pub fn new(roots: &[&str]) -> Self {
        Self {
            roots: roots.iter().map(CanonicalPath::new).collect(),
            markers: MarkerProbe::new(vec!["lib/resin.jar".to_string()]),
        }
    }
}

impl InstallationProbe for FakeProbe {
    fn probe(&self, dir: &Path) -> ProbeResult {
        let candidate = CanonicalPath::new(dir);
        if self.roots.contains(&candidate) {
            return ProbeResult::Root(candidate);
        }
        self.markers.probe(dir)
    }
}

/// 组装一套内存宿主能力。
pub struct FakeHost {
    pub volumes: Vec<PathBuf>,
    pub product: FakeProductRegistry,
    pub registry: Arc<FakeServiceRegistry>,
    pub controller: Arc<FakeController>,
    pub metabase: Arc<FakeMetabase>,
    pub own_location: Option<PathBuf>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            volumes: Vec::new(),
            product: FakeProductRegistry::default(),
            registry: Arc::new(FakeServiceRegistry::default()),
            controller: Arc::new(FakeController::default()),
            metabase: Arc::new(FakeMetabase::default()),
            own_location: None,
        }
    }
}

impl FakeHost {
    pub fn into_ports(self) -> HostPorts {
        let installer = FakeInstaller::new(Arc::clone(&self.registry), Arc::clone(&self.controller));
        HostPorts {
            volumes: Arc::new(FakeVolumes(self.volumes)),
            product_registry: Arc::new(self.product),
            services: self.registry,
            controller: self.controller,
            installer: Arc::new(installer),
            metabase: self.metabase,
            own_location: self.own_location,
        }
    }
}

/// 状态目录指向临时目录的配置。
pub fn config_with_state_dir(dir: &Path) -> SetupConfig {
    let mut cfg = SetupConfig::default();
    cfg.rollback.state_dir = Some(dir.to_string_lossy().into_owned());
    cfg.control.poll_interval_ms = 1;
    cfg
}
