//! 路径约定与规范化（ProgramData 落盘目录、安装目录身份键）。
//!
//! 目标：
//! - 将落盘路径集中管理（回滚状态文件位于 `%ProgramData%\Caucho\services`）
//! - 为安装目录提供稳定的相等/哈希键：忽略大小写、忽略末尾分隔符、解析符号链接
//!
//! 说明：
//! - 服务 ImagePath 等字符串总是 Windows 风格路径；此处的分段函数同时识别 `\` 与 `/`，
//!   以便在非 Windows 主机上处理同样的字符串
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// ProgramData 下的供应商目录名。
///
/// 示例（默认）：
/// - `%ProgramData%\Caucho`
pub const VENDOR_DIR: &str = "Caucho";

/// 回滚状态文件所在子目录名。
pub const SERVICES_STATE_SUBDIR: &str = "services";

/// 回滚状态文件扩展名（`<服务名>.srv`）。
pub const STATE_FILE_EXTENSION: &str = "srv";

/// 获取本产品在 ProgramData 下的根目录。
///
/// 返回值：
/// - 成功：`%ProgramData%\Caucho`
///
/// 异常处理：
/// - 当环境变量 `ProgramData` 不存在或不可读时，返回错误。
pub fn program_data_dir() -> Result<PathBuf> {
    let program_data = std::env::var("ProgramData").context("读取 ProgramData 环境变量失败")?;
    Ok(PathBuf::from(program_data).join(VENDOR_DIR))
}

/// 默认回滚状态目录。
///
/// 返回值：
/// - `%ProgramData%\Caucho\services`
pub fn default_services_state_dir() -> Result<PathBuf> {
    Ok(program_data_dir()?.join(SERVICES_STATE_SUBDIR))
}

/// 确保目录存在（不存在则递归创建）。
///
/// 异常处理：
/// - 目录创建失败（权限、路径非法等）会返回错误。
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).with_context(|| format!("创建目录失败: {}", path.display()))?;
    Ok(())
}

fn is_separator(c: char) -> bool {
    c == '\\' || c == '/'
}

/// 去掉末尾分隔符，但保留卷根（`C:\`）与文件系统根（`/`）。
fn trim_trailing_separators(raw: &str) -> &str {
    let mut s = raw;
    while s.len() > 1 && s.ends_with(is_separator) {
        let shorter = &s[..s.len() - 1];
        if shorter.ends_with(':') {
            break;
        }
        s = shorter;
    }
    s
}

/// 返回路径的上一级（按 `\` 或 `/` 切分）。
///
/// 返回值：
/// - `Some(parent)`：存在上一级；若上一级是卷根则保留分隔符（`C:\srv` → `C:\`）
/// - `None`：已到达根或路径中没有分隔符
pub fn parent_segment(path: &str) -> Option<&str> {
    let trimmed = trim_trailing_separators(path);
    let idx = trimmed.rfind(is_separator)?;
    if idx == 0 {
        return None;
    }
    let head = &trimmed[..idx];
    let parent = if head.ends_with(':') {
        &trimmed[..=idx]
    } else {
        head
    };
    if parent == trimmed {
        None
    } else {
        Some(parent)
    }
}

/// 返回路径最后一段（文件名），无分隔符时返回整个字符串。
pub fn file_name_segment(path: &str) -> &str {
    let trimmed = trim_trailing_separators(path);
    match trimmed.rfind(is_separator) {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// 规范化后的绝对路径，作为安装目录的身份键。
///
/// 相等与哈希只比较 `key`：分隔符统一为 `\`、连续分隔符折叠、转小写。
/// 展示值 `display` 保留原始大小写；目录存在时为解析链接后的真实路径。
#[derive(Debug, Clone)]
pub struct CanonicalPath {
    display: String,
    key: String,
}

impl CanonicalPath {
    /// 规范化路径。
    ///
    /// 行为：
    /// - 目录存在：使用 `dunce::canonicalize` 解析符号链接/联接点（不产生 `\\?\` 前缀）
    /// - 目录不存在或解析失败：退化为纯字符串规范化
    pub fn new(raw: impl AsRef<Path>) -> Self {
        let lossy = raw.as_ref().to_string_lossy();
        let trimmed = trim_trailing_separators(lossy.trim());
        let path = Path::new(trimmed);
        let resolved = if path.exists() {
            dunce::canonicalize(path)
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|_| trimmed.to_string())
        } else {
            trimmed.to_string()
        };
        let display = trim_trailing_separators(&resolved).to_string();
        let key = identity_key(&display);
        Self { display, key }
    }

    /// 展示用路径字符串。
    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// 以 [`Path`] 形式访问。
    pub fn as_path(&self) -> &Path {
        Path::new(&self.display)
    }

    /// 相等/哈希使用的身份键。
    pub fn key(&self) -> &str {
        &self.key
    }
}

fn identity_key(display: &str) -> String {
    let mut key = String::with_capacity(display.len());
    let mut last_sep = false;
    for c in display.chars() {
        if is_separator(c) {
            if !last_sep {
                key.push('\\');
            }
            last_sep = true;
        } else {
            key.extend(c.to_lowercase());
            last_sep = false;
        }
    }
    key
}

impl PartialEq for CanonicalPath {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for CanonicalPath {}

impl Hash for CanonicalPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_path_ignores_case_and_trailing_separator() {
        let a = CanonicalPath::new(r"C:\Resin-4.0\");
        let b = CanonicalPath::new(r"c:\resin-4.0");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), r"C:\Resin-4.0");
    }

    #[test]
    fn canonical_path_unifies_separators() {
        let a = CanonicalPath::new("C:/apps//resin");
        let b = CanonicalPath::new(r"C:\apps\resin");
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn volume_root_keeps_its_separator() {
        assert_eq!(CanonicalPath::new(r"C:\").as_str(), r"C:\");
    }

    #[test]
    fn parent_segment_walks_up_to_volume_root() {
        assert_eq!(parent_segment(r"C:\srv\bin\resin.exe"), Some(r"C:\srv\bin"));
        assert_eq!(parent_segment(r"C:\srv"), Some(r"C:\"));
        assert_eq!(parent_segment(r"C:\"), None);
        assert_eq!(parent_segment("resin.exe"), None);
    }

    #[test]
    fn file_name_segment_returns_last_component() {
        assert_eq!(file_name_segment(r"C:\srv\bin\Resin.exe"), "Resin.exe");
        assert_eq!(file_name_segment("resin.exe"), "resin.exe");
    }
}
