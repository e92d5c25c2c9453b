//! 本机卷枚举：固定磁盘与 RAM 盘（跳过可移动、网络与光驱）。
//!
//! 作者：Resin 安装配置工具项目组（自动生成）
//! 创建时间：2026-10-16
//! 修改时间：2026-10-16

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use resin_setup_core::ports::VolumeSource;
use tracing::debug;
use windows::core::PCWSTR;
use windows::Win32::Storage::FileSystem::{GetDriveTypeW, GetLogicalDrives};

const DRIVE_FIXED: u32 = 3;
const DRIVE_RAMDISK: u32 = 6;

/// 通过 `GetLogicalDrives`/`GetDriveTypeW` 枚举卷。
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedVolumes;

impl VolumeSource for FixedVolumes {
    fn fixed_volumes(&self) -> Result<Vec<PathBuf>> {
        let mask = unsafe { GetLogicalDrives() };
        if mask == 0 {
            return Err(anyhow!("GetLogicalDrives 失败: {}", std::io::Error::last_os_error()));
        }
        let mut volumes = Vec::new();
        for (bit, letter) in (b'A'..=b'Z').enumerate() {
            if mask & (1 << bit) == 0 {
                continue;
            }
            let root = format!("{}:\\", letter as char);
            let wide: Vec<u16> = root.encode_utf16().chain(std::iter::once(0)).collect();
            let kind = unsafe { GetDriveTypeW(PCWSTR(wide.as_ptr())) };
            if kind == DRIVE_FIXED || kind == DRIVE_RAMDISK {
                volumes.push(PathBuf::from(root));
            } else {
                debug!("跳过非固定卷: {root} (type={kind})");
            }
        }
        Ok(volumes)
    }
}
