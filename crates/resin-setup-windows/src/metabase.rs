//! IIS 元数据库访问（基于 `cscript adsutil.vbs`）。
//!
//! 说明：
//! - 使用 IIS 自带的 `adsutil.vbs` 读写 `W3SVC/Filters`，避免直接绑定 ADSI COM 接口
//! - 每次 `SET`/`CREATE`/`DELETE` 由 adsutil 立即提交，`commit` 无需额外操作
//! - 命令输出解析为纯函数，可在任意平台测试
//!
//! 输出格式示例：
//! ```text
//! FilterLoadOrder                 : (STRING) "Resin,sspifilt"
//! FilterEnabled                   : (BOOLEAN) True
//! [/W3SVC/Filters/Resin]
//! ```
//!
//! 权限要求：
//! - 需要管理员权限
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use std::path::PathBuf;
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use resin_setup_core::config::FilterConfig;
use resin_setup_core::ports::{FilterEntry, FilterMetabase};
use tracing::debug;

/// 过滤器集合路径。
pub const FILTERS_PATH: &str = "W3SVC/Filters";

/// 默认站点 scripts 虚拟目录路径。
pub const SCRIPTS_VDIR_PATH: &str = "W3SVC/1/ROOT/scripts";

/// 读取 `Name : (TYPE) value` 形式的属性值（去掉类型前缀与引号）。
///
/// 返回值：
/// - `Some(value)`：找到属性
/// - `None`：输出中没有该属性
pub fn parse_property(output: &str, property: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if !name.trim().eq_ignore_ascii_case(property) {
            return None;
        }
        let rest = rest.trim();
        let value = match rest.strip_prefix('(') {
            Some(typed) => typed.split_once(')').map_or(typed, |(_, v)| v).trim(),
            None => rest,
        };
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        Some(value.to_string())
    })
}

/// 读取 `ENUM` 输出中的子节点名（`[/W3SVC/Filters/Resin]` → `Resin`）。
pub fn parse_child_nodes(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let inner = line.trim().strip_prefix('[')?.strip_suffix(']')?;
            let name = inner.trim_end_matches('/').rsplit('/').next()?;
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

/// 基于 adsutil 的过滤器元数据库。
#[derive(Debug, Clone)]
pub struct AdsutilMetabase {
    script: PathBuf,
}

impl AdsutilMetabase {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self { script: script.into() }
    }

    /// 按配置定位 adsutil.vbs。
    ///
    /// 异常处理：
    /// - 未配置且无法读取 `SystemDrive` 时返回错误
    pub fn from_config(filter: &FilterConfig) -> Result<Self> {
        match &filter.adsutil_script {
            Some(script) => Ok(Self::new(script)),
            None => {
                let drive = std::env::var("SystemDrive").context("读取 SystemDrive 环境变量失败")?;
                Ok(Self::new(
                    PathBuf::from(format!("{drive}\\"))
                        .join("Inetpub")
                        .join("AdminScripts")
                        .join("adsutil.vbs"),
                ))
            }
        }
    }

    /// 执行 adsutil 子命令并返回标准输出。
    ///
    /// 异常处理：
    /// - 启动失败或退出码非 0 时返回错误，并附带 stdout/stderr
    fn run(&self, args: &[&str]) -> Result<String> {
        debug!("adsutil {}", args.join(" "));
        let out = Command::new("cscript")
            .arg("//nologo")
            .arg(&self.script)
            .args(args)
            .output()
            .context("执行 cscript adsutil.vbs 失败")?;
        let stdout = String::from_utf8_lossy(&out.stdout).into_owned();
        if out.status.success() {
            return Ok(stdout);
        }
        let stderr = String::from_utf8_lossy(&out.stderr);
        Err(anyhow!(
            "adsutil {} 执行失败: {}\n{}\n{}",
            args.first().copied().unwrap_or_default(),
            out.status,
            stdout,
            stderr
        ))
    }

    fn filter_path(name: &str) -> String {
        format!("{FILTERS_PATH}/{name}")
    }

    fn read_entry(&self, name: &str) -> Result<FilterEntry> {
        let out = self.run(&["ENUM", &Self::filter_path(name)])?;
        Ok(FilterEntry {
            name: name.to_string(),
            enabled: parse_property(&out, "FilterEnabled").is_some_and(|v| parse_bool(&v)),
            state: parse_property(&out, "FilterState")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            path: parse_property(&out, "FilterPath").unwrap_or_default(),
            description: parse_property(&out, "FilterDescription").unwrap_or_default(),
        })
    }
}

impl FilterMetabase for AdsutilMetabase {
    fn entries(&self) -> Result<Vec<FilterEntry>> {
        let out = self.run(&["ENUM", FILTERS_PATH])?;
        parse_child_nodes(&out)
            .iter()
            .map(|name| self.read_entry(name))
            .collect()
    }

    fn put_entry(&self, entry: &FilterEntry) -> Result<()> {
        let path = Self::filter_path(&entry.name);
        let exists = parse_child_nodes(&self.run(&["ENUM", FILTERS_PATH])?)
            .iter()
            .any(|n| n.eq_ignore_ascii_case(&entry.name));
        if !exists {
            self.run(&["CREATE", &path, "IIsFilter"])?;
        }
        let state = entry.state.to_string();
        let enabled = if entry.enabled { "TRUE" } else { "FALSE" };
        for (property, value) in [
            ("FilterEnabled", enabled),
            ("FilterState", state.as_str()),
            ("FilterPath", entry.path.as_str()),
            ("FilterDescription", entry.description.as_str()),
        ] {
            self.run(&["SET", &format!("{path}/{property}"), value])
                .with_context(|| format!("写入 {path}/{property} 失败"))?;
        }
        Ok(())
    }

    fn remove_entry(&self, name: &str) -> Result<()> {
        self.run(&["DELETE", &Self::filter_path(name)])?;
        Ok(())
    }

    fn load_order(&self) -> Result<String> {
        let out = self.run(&["GET", &format!("{FILTERS_PATH}/FilterLoadOrder")])?;
        Ok(parse_property(&out, "FilterLoadOrder").unwrap_or_default())
    }

    fn set_load_order(&self, value: &str) -> Result<()> {
        self.run(&["SET", &format!("{FILTERS_PATH}/FilterLoadOrder"), value])?;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        Ok(())
    }

    fn scripts_dir(&self) -> Result<Option<PathBuf>> {
        let out = match self.run(&["GET", &format!("{SCRIPTS_VDIR_PATH}/Path")]) {
            Ok(out) => out,
            Err(e) => {
                debug!("读取 scripts 虚拟目录失败: {e:#}");
                return Ok(None);
            }
        };
        Ok(parse_property(&out, "Path")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_typed_properties() {
        let out = r#"
FilterLoadOrder                 : (STRING) "Resin,sspifilt,Compression"
FilterEnabled                   : (BOOLEAN) True
FilterState                     : (INTEGER) 4
FilterPath                      : (STRING) "C:\Inetpub\scripts\isapi_srun.dll"
"#;
        assert_eq!(
            parse_property(out, "FilterLoadOrder").as_deref(),
            Some("Resin,sspifilt,Compression")
        );
        assert_eq!(parse_property(out, "filterenabled").as_deref(), Some("True"));
        assert_eq!(parse_property(out, "FilterState").as_deref(), Some("4"));
        assert_eq!(
            parse_property(out, "FilterPath").as_deref(),
            Some(r"C:\Inetpub\scripts\isapi_srun.dll")
        );
        assert_eq!(parse_property(out, "FilterDescription"), None);
    }

    #[test]
    fn parse_empty_string_property() {
        let out = r#"FilterLoadOrder                 : (STRING) """#;
        assert_eq!(parse_property(out, "FilterLoadOrder").as_deref(), Some(""));
    }

    #[test]
    fn parse_enum_children() {
        let out = "KeyType                         : (STRING) \"IIsFilters\"\n\
                   FilterLoadOrder                 : (STRING) \"Resin\"\n\
                   [/W3SVC/Filters/Resin]\n\
                   [/W3SVC/Filters/Compression]\n";
        assert_eq!(parse_child_nodes(out), vec!["Resin".to_string(), "Compression".to_string()]);
    }

    #[test]
    fn parse_bool_values() {
        assert!(parse_bool("True"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("False"));
    }
}
