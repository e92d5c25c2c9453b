//! 安装根目录判定与配置文件定位。
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use std::path::Path;

use crate::paths::CanonicalPath;

/// 目录判定结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// 不是安装根目录（正常的否定结果，不是错误）。
    NotARoot,
    /// 是安装根目录，携带规范化后的路径。
    Root(CanonicalPath),
}

impl ProbeResult {
    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root(_))
    }
}

/// 判定一个目录是否为有效的安装根目录。
pub trait InstallationProbe: Send + Sync {
    fn probe(&self, dir: &Path) -> ProbeResult;
}

/// 按标记文件判定：目录存在且所有标记（相对路径）均存在时视为安装根目录。
#[derive(Debug, Clone)]
pub struct MarkerProbe {
    markers: Vec<String>,
}

impl MarkerProbe {
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }
}

impl InstallationProbe for MarkerProbe {
    fn probe(&self, dir: &Path) -> ProbeResult {
        if !dir.is_dir() {
            return ProbeResult::NotARoot;
        }
        // 配置中的标记使用 `/`，此处逐段拼接以适配本机分隔符。
        let all_present = self.markers.iter().all(|marker| {
            let path = marker
                .split(['/', '\\'])
                .filter(|s| !s.is_empty())
                .fold(dir.to_path_buf(), |acc, seg| acc.join(seg));
            path.exists()
        });
        if all_present {
            ProbeResult::Root(CanonicalPath::new(dir))
        } else {
            ProbeResult::NotARoot
        }
    }
}

/// 定位安装目录下的主配置文件（相对路径）。
///
/// 返回值：
/// - `conf\resin.xml` 优先，其次 `conf\resin.conf`
/// - 均不存在时返回 `None`
pub fn locate_conf_file(home: &Path) -> Option<&'static str> {
    let conf = home.join("conf");
    if conf.join("resin.xml").is_file() {
        Some(r"conf\resin.xml")
    } else if conf.join("resin.conf").is_file() {
        Some(r"conf\resin.conf")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(prefix: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("{prefix}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn marker_probe_requires_every_marker() {
        let dir = temp_dir("resin-probe");
        let probe = MarkerProbe::new(vec!["lib/resin.jar".to_string()]);
        assert_eq!(probe.probe(&dir), ProbeResult::NotARoot);

        std::fs::create_dir_all(dir.join("lib")).unwrap();
        std::fs::write(dir.join("lib").join("resin.jar"), b"jar").unwrap();
        assert!(probe.probe(&dir).is_root());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_directory_is_not_a_root() {
        let probe = MarkerProbe::new(vec![]);
        let missing = std::env::temp_dir().join(format!("resin-missing-{}", uuid::Uuid::new_v4()));
        assert_eq!(probe.probe(&missing), ProbeResult::NotARoot);
    }

    #[test]
    fn conf_file_prefers_xml() {
        let dir = temp_dir("resin-conf");
        std::fs::create_dir_all(dir.join("conf")).unwrap();
        assert_eq!(locate_conf_file(&dir), None);

        std::fs::write(dir.join("conf").join("resin.conf"), b"").unwrap();
        assert_eq!(locate_conf_file(&dir), Some(r"conf\resin.conf"));

        std::fs::write(dir.join("conf").join("resin.xml"), b"").unwrap();
        assert_eq!(locate_conf_file(&dir), Some(r"conf\resin.xml"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
