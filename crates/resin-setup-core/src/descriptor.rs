//! 安装（Installation）与服务描述（ServiceDescriptor）模型。
//!
//! 约定：
//! - `Installation` 的身份为规范化后的安装目录
//! - `ServiceDescriptor` 的身份为服务注册名；相等与哈希只比较名称
//! - 端口为 `None` 表示未设置，只有严格大于 0 时才会写入参数串
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use std::fmt::{self, Write as _};
use std::hash::{Hash, Hasher};

use crate::args::{quote_if_needed, ServiceArgs};
use crate::paths::CanonicalPath;

/// 一个已发现的 Resin 安装。
#[derive(Debug, Clone)]
pub struct Installation {
    home: CanonicalPath,
    servers: Vec<String>,
}

impl Installation {
    pub fn new(home: CanonicalPath) -> Self {
        Self {
            home,
            servers: Vec::new(),
        }
    }

    pub fn home(&self) -> &CanonicalPath {
        &self.home
    }

    /// 该安装下已知的 server id（发现阶段填充，可能为空）。
    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    pub(crate) fn attach_servers(&mut self, servers: Vec<String>) {
        self.servers = servers;
    }
}

impl PartialEq for Installation {
    fn eq(&self, other: &Self) -> bool {
        self.home == other.home
    }
}

impl Eq for Installation {}

impl Hash for Installation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.home.hash(state);
    }
}

impl fmt::Display for Installation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.home, f)
    }
}

/// 服务运行身份中的 server 选择。
///
/// 静态 server id 与动态 server 互斥，由类型保证。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ServerSelection {
    /// 未指定，使用配置中的默认 server。
    #[default]
    Default,
    /// `-server <id>`。
    Static(String),
    /// `-dynamic-server <address>`。
    Dynamic(String),
}

/// 服务账户密码：只写，不从系统回读；`Debug` 输出时隐藏内容。
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(******)")
    }
}

/// 一个受管 Windows 服务的 Resin 启动配置。
#[derive(Debug, Clone, Default)]
pub struct ServiceDescriptor {
    pub name: String,
    pub executable_path: Option<String>,
    pub home: String,
    pub root_directory: Option<String>,
    pub log_directory: Option<String>,
    pub conf_file: Option<String>,
    pub run_as_user: Option<String>,
    run_as_password: Option<Password>,
    pub is_preview: bool,
    pub java_home: Option<String>,
    pub server: ServerSelection,
    pub debug_port: Option<u16>,
    pub jmx_port: Option<u16>,
    pub watchdog_port: Option<u16>,
    pub extra_arguments: Option<String>,
}

/// 按“失败即未设置”的规则解析端口：空串、非数字、0 或越界都返回 `None`。
pub fn parse_port(raw: Option<&str>) -> Option<u16> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<u16>().ok())
        .filter(|p| *p > 0)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl ServiceDescriptor {
    /// 创建新服务描述（前端新建服务时使用）。
    pub fn new(name: impl Into<String>, home: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            home: home.into(),
            ..Self::default()
        }
    }

    /// 由解析后的命令行重建描述。
    ///
    /// 参数：
    /// - `name`：服务注册名（来自服务记录，而非命令行中的 `-name`）
    /// - `home`：已确定的安装目录
    /// - `args`：命令行解析结果
    pub fn from_args(name: impl Into<String>, home: impl Into<String>, args: ServiceArgs) -> Self {
        let server = match (non_empty(args.server), non_empty(args.dynamic_server)) {
            (Some(id), _) => ServerSelection::Static(id),
            (None, Some(addr)) => ServerSelection::Dynamic(addr),
            (None, None) => ServerSelection::Default,
        };
        Self {
            name: name.into(),
            executable_path: args.exe,
            home: home.into(),
            root_directory: args.root_directory,
            log_directory: args.log_directory,
            conf_file: args.conf,
            run_as_user: args.user,
            run_as_password: None,
            is_preview: args.preview,
            java_home: args.java_home,
            server,
            debug_port: parse_port(args.debug_port.as_deref()),
            jmx_port: parse_port(args.jmx_port.as_deref()),
            watchdog_port: parse_port(args.watchdog_port.as_deref()),
            extra_arguments: non_empty(args.extra),
        }
    }

    /// 设置服务账户密码（只写）。
    pub fn set_password(&mut self, password: Password) {
        self.run_as_password = Some(password);
    }

    pub(crate) fn password(&self) -> Option<&Password> {
        self.run_as_password.as_ref()
    }

    /// 静态 server id（若有）。
    pub fn server_id(&self) -> Option<&str> {
        match &self.server {
            ServerSelection::Static(id) => Some(id.as_str()),
            _ => None,
        }
    }

    /// 生成写入 ImagePath 的 Resin 参数串。
    ///
    /// 格式（固定顺序）：
    /// `-service -name <name> [-conf <conf>] -resin-home <home> [-root-directory <root>]
    /// [-log-directory <log>] [-server <id> | -dynamic-server <addr>] [-preview]
    /// [-debug-port N] [-jmx-port N] [-watchdog-port N] [<extra>]`
    ///
    /// 含空白的值会加双引号；`extra` 原样追加在末尾。
    pub fn format_arguments(&self) -> String {
        let mut sb = String::from("-service -name ");
        sb.push_str(&quote_if_needed(&self.name));
        push_flag(&mut sb, "-conf", self.conf_file.as_deref());
        push_flag(&mut sb, "-resin-home", Some(self.home.as_str()));
        push_flag(&mut sb, "-root-directory", self.root_directory.as_deref());
        push_flag(&mut sb, "-log-directory", self.log_directory.as_deref());

        match &self.server {
            ServerSelection::Static(id) if !id.is_empty() => push_flag(&mut sb, "-server", Some(id.as_str())),
            ServerSelection::Dynamic(addr) if !addr.is_empty() => {
                push_flag(&mut sb, "-dynamic-server", Some(addr.as_str()))
            }
            _ => {}
        }

        if self.is_preview {
            sb.push_str(" -preview");
        }

        for (flag, port) in [
            ("-debug-port", self.debug_port),
            ("-jmx-port", self.jmx_port),
            ("-watchdog-port", self.watchdog_port),
        ] {
            if let Some(p) = port.filter(|p| *p > 0) {
                let _ = write!(sb, " {flag} {p}");
            }
        }

        if let Some(extra) = self.extra_arguments.as_deref().filter(|e| !e.is_empty()) {
            sb.push(' ');
            sb.push_str(extra);
        }
        sb
    }
}

fn push_flag(sb: &mut String, flag: &str, value: Option<&str>) {
    if let Some(v) = value {
        sb.push(' ');
        sb.push_str(flag);
        sb.push(' ');
        sb.push_str(&quote_if_needed(v));
    }
}

impl PartialEq for ServiceDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ServiceDescriptor {}

impl Hash for ServiceDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.server {
            ServerSelection::Static(id) => write!(f, "{} [-server {id}]", self.name),
            ServerSelection::Dynamic(addr) => write!(f, "{} [-dynamic-server {addr}]", self.name),
            ServerSelection::Default => write!(f, "{} [default server]", self.name),
        }
    }
}
