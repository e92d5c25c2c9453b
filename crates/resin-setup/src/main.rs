//! Resin 安装配置工具（命令行）。
//!
//! 职责：
//! - 发现本机 Resin 安装与已注册的 Resin 服务
//! - 注册/更新/注销 Resin Windows 服务，启动/停止/重启服务
//! - 向 IIS 注册/注销 isapi_srun 过滤器，停止/重启 IIS
//! - 解析服务 ImagePath 并输出重建后的参数（不访问系统）
//!
//! 权限要求：
//! - 修改类命令（install/uninstall/iis-register/iis-deregister）需要管理员权限
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use resin_setup_core::args as service_args;
use resin_setup_core::config::SetupConfig;
use resin_setup_core::descriptor::{Password, ServerSelection, ServiceDescriptor};
use resin_setup_core::paths;
use resin_setup_core::probe::locate_conf_file;
use resin_setup_core::session::SetupSession;
use resin_setup_core::webfilter::ConfigureInfo;
use resin_setup_windows::elevation;

/// 默认配置文件名（位于当前目录时自动加载）。
const DEFAULT_CONFIG_FILE: &str = "setup-config.json";

/// 命令行参数。
///
/// 说明：
/// - `config` 指向工具配置文件；未指定时使用当前目录下的 `setup-config.json`，不存在则使用内置默认值
/// - `verbose` 将默认日志级别提升为 debug
#[derive(Debug, Parser)]
#[command(name = "resin-setup", version)]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// 支持的子命令。
#[derive(Debug, Subcommand)]
enum Commands {
    /// 发现本机 Resin 安装（含每个安装使用的 server id）。
    Discover,
    /// 列出已注册的 Resin 服务。
    Services,
    /// 解析一条服务 ImagePath 并输出重建结果（不访问系统）。
    Args {
        /// 完整的 ImagePath（可执行文件 + 参数）。
        image_path: String,
    },
    /// 注册新服务，或以 `--update` 改写已有服务的参数。
    Install(InstallArgs),
    /// 注销服务。
    Uninstall { name: String },
    /// 启动服务并等待进入运行状态。
    Start { name: String },
    /// 停止服务并等待进入停止状态。
    Stop { name: String },
    /// 重启服务。
    Restart { name: String },
    /// 向 IIS 注册 isapi_srun 过滤器。
    IisRegister {
        /// Resin 安装目录（默认使用已选定的当前安装）。
        #[arg(long)]
        home: Option<PathBuf>,
        /// IIS scripts 目录（默认读取默认站点的 scripts 虚拟目录）。
        #[arg(long)]
        scripts: Option<PathBuf>,
    },
    /// 从 IIS 注销 isapi_srun 过滤器。
    IisDeregister {
        #[arg(long)]
        scripts: Option<PathBuf>,
    },
    /// 停止 IIS（W3SVC）。
    IisStop,
    /// 重启 IIS（W3SVC）。
    IisRestart,
    /// 环境自检（管理员权限、配置、状态目录）。
    Doctor,
}

/// `install` 子命令参数。
#[derive(Debug, Args)]
struct InstallArgs {
    /// 服务名。
    name: String,
    /// Resin 安装目录（默认使用已选定的当前安装）。
    #[arg(long)]
    home: Option<String>,
    /// 服务可执行文件（默认 `<home>\resin.exe`）。
    #[arg(long)]
    exe: Option<String>,
    /// 配置文件（默认 `conf\resin.xml`，其次 `conf\resin.conf`）。
    #[arg(long)]
    conf: Option<String>,
    #[arg(long)]
    root_directory: Option<String>,
    #[arg(long)]
    log_directory: Option<String>,
    #[arg(long, conflicts_with = "dynamic_server")]
    server: Option<String>,
    #[arg(long)]
    dynamic_server: Option<String>,
    /// 服务运行账户（默认 LocalSystem）。
    #[arg(long)]
    user: Option<String>,
    #[arg(long, requires = "user")]
    password: Option<String>,
    #[arg(long, default_value_t = false)]
    preview: bool,
    #[arg(long)]
    debug_port: Option<u16>,
    #[arg(long)]
    jmx_port: Option<u16>,
    #[arg(long)]
    watchdog_port: Option<u16>,
    /// 原样追加到参数末尾的额外参数。
    #[arg(long, allow_hyphen_values = true)]
    extra: Option<String>,
    /// 只改写已有服务的参数，不注册新服务。
    #[arg(long, default_value_t = false)]
    update: bool,
}

/// 程序入口：解析参数并分发子命令。
///
/// 异常处理：
/// - 任意子命令执行失败会返回 `Err` 并输出日志（由调用方/控制台显示）。
fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_target(false)
        .init();

    match &cli.command {
        Commands::Args { image_path } => print_args(image_path),
        Commands::Doctor => doctor(&cli),
        command => run_with_session(&cli, command),
    }
}

/// 读取配置。
///
/// 异常处理：
/// - 显式指定的配置文件读取/解析失败返回错误
fn load_config(cli: &Cli) -> Result<SetupConfig> {
    match &cli.config {
        Some(path) => SetupConfig::load(path).with_context(|| format!("加载配置失败: {}", path.display())),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.is_file() {
                SetupConfig::load(default).with_context(|| format!("加载配置失败: {DEFAULT_CONFIG_FILE}"))
            } else {
                Ok(SetupConfig::default())
            }
        }
    }
}

fn open_session(cli: &Cli) -> Result<SetupSession> {
    let config = load_config(cli)?;
    let host = resin_setup_windows::host(&config)?;
    Ok(SetupSession::with_marker_probe(config, host)?)
}

/// 需要访问系统的子命令。
fn run_with_session(cli: &Cli, command: &Commands) -> Result<()> {
    let session = open_session(cli)?;
    match command {
        Commands::Discover => discover(&session),
        Commands::Services => list_services(&session),
        Commands::Install(args) => install(&session, args),
        Commands::Uninstall { name } => uninstall(&session, name),
        Commands::Start { name } => Ok(session.lifecycle().start(name)?),
        Commands::Stop { name } => Ok(session.lifecycle().stop(name)?),
        Commands::Restart { name } => Ok(session.lifecycle().restart(name)?),
        Commands::IisRegister { home, scripts } => iis_register(&session, home.as_deref(), scripts.as_deref()),
        Commands::IisDeregister { scripts } => iis_deregister(&session, scripts.as_deref()),
        Commands::IisStop => Ok(session.stop_web_server()?),
        Commands::IisRestart => Ok(session.restart_web_server()?),
        Commands::Args { .. } | Commands::Doctor => Ok(()),
    }
}

fn discover(session: &SetupSession) -> Result<()> {
    let installations = session.refresh()?;
    let selected = session.inventory().selected();
    for installation in &installations {
        let marker = if selected.as_ref() == Some(installation) { "*" } else { " " };
        if installation.servers().is_empty() {
            println!("{marker} {installation}");
        } else {
            println!("{marker} {installation} servers=[{}]", installation.servers().join(","));
        }
    }
    if installations.is_empty() {
        println!("未发现 Resin 安装");
    }
    Ok(())
}

fn list_services(session: &SetupSession) -> Result<()> {
    for service in session.rescan_services()? {
        println!("{service}");
        println!("    home = {}", service.home);
        println!("    args = {}", service.format_arguments());
    }
    Ok(())
}

/// 解析 ImagePath 并输出重建后的服务描述。
fn print_args(image_path: &str) -> Result<()> {
    let parsed = service_args::parse(image_path);
    let exe = parsed.exe.clone().unwrap_or_default();
    let home = parsed
        .home
        .clone()
        .or_else(|| paths::parent_segment(&exe).map(str::to_string))
        .unwrap_or_default();
    let name = parsed.name.clone().unwrap_or_default();
    let service = parsed.service;
    let descriptor = ServiceDescriptor::from_args(name, home, parsed);

    println!("exe = {exe}");
    println!("service = {service}");
    println!("name = {}", descriptor.name);
    println!("home = {}", descriptor.home);
    match &descriptor.server {
        ServerSelection::Static(id) => println!("server = {id}"),
        ServerSelection::Dynamic(addr) => println!("dynamic_server = {addr}"),
        ServerSelection::Default => println!("server = (default)"),
    }
    for (label, port) in [
        ("debug_port", descriptor.debug_port),
        ("jmx_port", descriptor.jmx_port),
        ("watchdog_port", descriptor.watchdog_port),
    ] {
        match port {
            Some(p) => println!("{label} = {p}"),
            None => println!("{label} = (unset)"),
        }
    }
    if let Some(extra) = &descriptor.extra_arguments {
        println!("extra = {extra}");
    }
    println!("args = {}", descriptor.format_arguments());
    Ok(())
}

/// 确定目标安装目录：显式指定优先，否则执行发现并使用已选定的当前安装。
fn resolve_home(session: &SetupSession, home: Option<&Path>) -> Result<PathBuf> {
    if let Some(home) = home {
        return Ok(session.installation_for_home(home).home().as_path().to_path_buf());
    }
    session.discover()?;
    session
        .inventory()
        .selected()
        .map(|i| i.home().as_path().to_path_buf())
        .ok_or_else(|| anyhow!("未选定当前 Resin 安装，请使用 --home 指定"))
}

fn install(session: &SetupSession, args: &InstallArgs) -> Result<()> {
    elevation::require_admin("注册服务")?;

    let home = resolve_home(session, args.home.as_deref().map(Path::new))?;
    let mut descriptor = ServiceDescriptor::new(args.name.clone(), home.to_string_lossy().into_owned());
    descriptor.executable_path = args.exe.clone();
    descriptor.conf_file = args
        .conf
        .clone()
        .or_else(|| locate_conf_file(&home).map(str::to_string));
    descriptor.root_directory = args.root_directory.clone();
    descriptor.log_directory = args.log_directory.clone();
    descriptor.server = match (&args.server, &args.dynamic_server) {
        (Some(id), _) if !id.is_empty() => ServerSelection::Static(id.clone()),
        (_, Some(addr)) if !addr.is_empty() => ServerSelection::Dynamic(addr.clone()),
        _ => ServerSelection::Default,
    };
    descriptor.run_as_user = args.user.clone();
    if let Some(password) = &args.password {
        descriptor.set_password(Password::new(password.clone()));
    }
    descriptor.is_preview = args.preview;
    descriptor.debug_port = args.debug_port.filter(|p| *p > 0);
    descriptor.jmx_port = args.jmx_port.filter(|p| *p > 0);
    descriptor.watchdog_port = args.watchdog_port.filter(|p| *p > 0);
    descriptor.extra_arguments = args.extra.clone().filter(|e| !e.is_empty());

    session.lifecycle().install(&descriptor, !args.update)?;
    info!("服务已配置: {descriptor}");
    println!("{}", descriptor.format_arguments());
    Ok(())
}

fn uninstall(session: &SetupSession, name: &str) -> Result<()> {
    elevation::require_admin("注销服务")?;

    let descriptor = match session.rescan_services() {
        Ok(_) => session.inventory().service(name),
        Err(e) => {
            warn!("扫描服务失败，按服务名直接注销: {e}");
            None
        }
    }
    .unwrap_or_else(|| ServiceDescriptor::new(name, ""));
    session.lifecycle().uninstall(&descriptor)?;
    info!("服务已注销: {name}");
    Ok(())
}

fn resolve_scripts(session: &SetupSession, scripts: Option<&Path>) -> Result<PathBuf> {
    match scripts {
        Some(dir) => Ok(dir.to_path_buf()),
        None => session
            .scripts_dir()?
            .ok_or_else(|| anyhow!("未找到 IIS scripts 目录，请使用 --scripts 指定")),
    }
}

fn report(info: ConfigureInfo) -> Result<()> {
    println!("status = {:?}", info.status);
    match info.error {
        Some(e) => Err(e.context(format!("IIS 过滤器配置失败: {:?}", info.status))),
        None => Ok(()),
    }
}

fn iis_register(session: &SetupSession, home: Option<&Path>, scripts: Option<&Path>) -> Result<()> {
    elevation::require_admin("注册 IIS 过滤器")?;
    let home = resolve_home(session, home)?;
    let scripts = resolve_scripts(session, scripts)?;
    report(session.web_filter().register(&home, &scripts))
}

fn iis_deregister(session: &SetupSession, scripts: Option<&Path>) -> Result<()> {
    elevation::require_admin("注销 IIS 过滤器")?;
    let scripts = resolve_scripts(session, scripts)?;
    report(session.web_filter().deregister(&scripts))
}

/// 环境自检：只读输出，不做系统修改。
fn doctor(cli: &Cli) -> Result<()> {
    println!("admin = {}", elevation::is_running_as_admin()?);
    let config = load_config(cli)?;
    println!("launcher = {}", config.product.launcher);
    println!("filter = {} ({})", config.filter.name, config.filter.binary);
    match config.rollback.resolve_state_dir() {
        Ok(dir) => println!("state_dir = {}", dir.display()),
        Err(e) => println!("state_dir = (unavailable: {e})"),
    }
    println!(
        "rollback = persist:{} load_persisted:{} synthetic_default:{}",
        config.rollback.persist, config.rollback.load_persisted, config.rollback.synthetic_default
    );
    match config.control.transition_timeout() {
        Some(t) => println!("transition_timeout = {}s", t.as_secs()),
        None => println!("transition_timeout = (none)"),
    }
    Ok(())
}
