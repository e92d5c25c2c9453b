//! 服务启动命令行（ImagePath）解析。
//!
//! 规则：
//! - 以空白分隔参数；双引号包围的片段视为一个参数（引号内可含空格）
//! - 第一个不以 `-` 开头的参数视为可执行文件路径（隐式 `-exe`）；
//!   未加引号且含空格的路径延伸到第一个 `.exe` 为止
//! - 带值参数后紧跟另一个已识别参数时，该值视为未设置
//! - 识别固定的 Resin 参数集合；其余参数按原顺序原样保留到 `extra`
//!
//! 该解析是 [`crate::descriptor::ServiceDescriptor::format_arguments`] 的左逆：
//! 对格式化结果再解析、再格式化，得到语义相同的参数串。
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use std::borrow::Cow;

/// 命令行中的一个参数。
#[derive(Debug, Clone, PartialEq, Eq)]
struct Token<'a> {
    /// 原始片段（含引号）。
    raw: &'a str,
    /// 去掉引号后的值。
    text: String,
}

/// 按 Windows 命令行习惯切分参数（仅处理双引号，不处理转义）。
fn tokenize(line: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    let mut in_quotes = false;
    let mut text = String::new();

    for (idx, c) in line.char_indices() {
        if c.is_whitespace() && !in_quotes {
            if let Some(s) = start.take() {
                tokens.push(Token {
                    raw: &line[s..idx],
                    text: std::mem::take(&mut text),
                });
            }
            continue;
        }
        if start.is_none() {
            start = Some(idx);
        }
        if c == '"' {
            in_quotes = !in_quotes;
        } else {
            text.push(c);
        }
    }
    if let Some(s) = start {
        tokens.push(Token {
            raw: &line[s..],
            text,
        });
    }
    tokens
}

/// 第一个 `.exe`（忽略大小写）结束处的字节位置。
pub fn exe_end(image_path: &str) -> Option<usize> {
    image_path
        .to_ascii_lowercase()
        .find(".exe")
        .map(|idx| idx + ".exe".len())
}

/// 未加引号的可执行文件路径：从开头延伸到第一个 `.exe`，其后须为空白或结尾。
///
/// 返回值：
/// - `Some((exe, rest))`：路径片段与剩余参数部分
/// - `None`：以引号或 `-` 开头、没有 `.exe`，或路径片段中出现了参数
fn unquoted_executable(line: &str) -> Option<(&str, &str)> {
    if line.starts_with('"') || line.starts_with('-') {
        return None;
    }
    let end = exe_end(line)?;
    let rest = &line[end..];
    if rest.chars().next().is_some_and(|c| !c.is_whitespace()) {
        return None;
    }
    let exe = &line[..end];
    if exe
        .split_whitespace()
        .skip(1)
        .any(|piece| piece.starts_with('-') || piece.contains('"'))
    {
        return None;
    }
    Some((exe, rest))
}

/// 值中含空白时加双引号，保证再次解析时仍是一个参数。
pub(crate) fn quote_if_needed(value: &str) -> Cow<'_, str> {
    if value.chars().any(char::is_whitespace) && !value.starts_with('"') {
        Cow::Owned(format!("\"{value}\""))
    } else {
        Cow::Borrowed(value)
    }
}

/// 解析得到的 Resin 服务参数。
///
/// 端口以原始字符串保存，由调用方按“解析失败即视为未设置”的规则转换。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceArgs {
    pub exe: Option<String>,
    pub service: bool,
    pub name: Option<String>,
    pub conf: Option<String>,
    pub home: Option<String>,
    pub root_directory: Option<String>,
    pub log_directory: Option<String>,
    pub server: Option<String>,
    pub dynamic_server: Option<String>,
    pub user: Option<String>,
    pub java_home: Option<String>,
    pub debug_port: Option<String>,
    pub jmx_port: Option<String>,
    pub watchdog_port: Option<String>,
    pub preview: bool,
    /// 未识别参数，按原顺序以单个空格连接（保留原始引号）。
    pub extra: Option<String>,
}

impl ServiceArgs {
    fn slot(&mut self, flag: &str) -> Option<&mut Option<String>> {
        let slot = match flag {
            "-exe" => &mut self.exe,
            "-name" => &mut self.name,
            "-conf" => &mut self.conf,
            "-resin-home" => &mut self.home,
            "-root-directory" => &mut self.root_directory,
            "-log-directory" => &mut self.log_directory,
            "-server" => &mut self.server,
            "-dynamic-server" => &mut self.dynamic_server,
            "-user" => &mut self.user,
            "-java-home" => &mut self.java_home,
            "-debug-port" => &mut self.debug_port,
            "-jmx-port" => &mut self.jmx_port,
            "-watchdog-port" => &mut self.watchdog_port,
            _ => return None,
        };
        Some(slot)
    }
}

/// 已识别的参数名（不带值与带值）。
const KNOWN_FLAGS: &[&str] = &[
    "-service",
    "-preview",
    "-exe",
    "-name",
    "-conf",
    "-resin-home",
    "-root-directory",
    "-log-directory",
    "-server",
    "-dynamic-server",
    "-user",
    "-java-home",
    "-debug-port",
    "-jmx-port",
    "-watchdog-port",
];

fn is_known_flag(text: &str) -> bool {
    KNOWN_FLAGS.contains(&normalize_flag(text).as_ref())
}

/// 将 `--flag` 归一为 `-flag`，非参数原样返回。
fn normalize_flag(text: &str) -> Cow<'_, str> {
    match text.strip_prefix("--") {
        Some(rest) if !rest.is_empty() => Cow::Owned(format!("-{rest}")),
        _ => Cow::Borrowed(text),
    }
}

/// 解析服务命令行。
///
/// 参数：
/// - `command_line`：完整 ImagePath（可执行文件 + 参数），或仅参数部分
///
/// 返回值：
/// - 解析后的 [`ServiceArgs`]；缺少值的参数（位于末尾或后接其他已识别参数）视为未设置
pub fn parse(command_line: &str) -> ServiceArgs {
    let line = command_line.trim();
    let mut args = ServiceArgs::default();
    let tokens = match unquoted_executable(line) {
        Some((exe, rest)) => {
            args.exe = Some(exe.to_string());
            tokenize(rest)
        }
        None => tokenize(line),
    };
    let mut extras: Vec<&str> = Vec::new();
    let mut iter = tokens.iter().peekable();

    if args.exe.is_none() {
        if let Some(first) = iter.peek() {
            if !first.text.starts_with('-') {
                args.exe = Some(first.text.clone());
                iter.next();
            }
        }
    }

    while let Some(token) = iter.next() {
        let flag = normalize_flag(&token.text);
        match flag.as_ref() {
            "-service" => args.service = true,
            "-preview" => args.preview = true,
            other => match args.slot(other) {
                Some(slot) => {
                    if let Some(value) = iter.next_if(|next| !is_known_flag(&next.text)) {
                        *slot = Some(value.text.clone());
                    }
                }
                None => extras.push(token.raw),
            },
        }
    }

    if !extras.is_empty() {
        args.extra = Some(extras.join(" "));
    }
    args
}

/// 判断可执行文件路径的文件名是否为指定启动器（忽略大小写）。
pub fn is_launcher(exe: &str, launcher: &str) -> bool {
    crate::paths::file_name_segment(exe).eq_ignore_ascii_case(launcher)
}
