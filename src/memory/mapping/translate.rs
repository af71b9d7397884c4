//! 虚拟地址到物理地址的转换

use super::TranslationEntry;
use crate::memory::address::{PhysicalAddress, VirtualAddress, VirtualPageNumber};
use thiserror::Error;

/// 访问类型
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AccessMode {
    Read,
    Write,
}

/// 转换失败的原因，均携带出错的虚拟地址
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum TranslationFault {
    /// 超出地址空间
    #[error("address error at {0}")]
    AddressError(VirtualAddress),
    /// 写只读页
    #[error("write to read-only page at {0}")]
    ReadOnlyViolation(VirtualAddress),
    /// 页不在内存中
    #[error("page fault at {0}")]
    PageFault(VirtualAddress),
    /// 页表项指向不存在的页帧
    #[error("bus error at {0}")]
    BusError(VirtualAddress),
}

impl TranslationFault {
    pub fn address(&self) -> VirtualAddress {
        match *self {
            Self::AddressError(address)
            | Self::ReadOnlyViolation(address)
            | Self::PageFault(address)
            | Self::BusError(address) => address,
        }
    }
}

/// 在 `table` 中查找 `address`
///
/// 依次检查：越界、写只读页、未映射、页帧号越界。成功时设置 used，写访问另设置 dirty。
pub fn translate(
    table: &mut [TranslationEntry],
    address: VirtualAddress,
    mode: AccessMode,
    frame_count: usize,
) -> Result<PhysicalAddress, TranslationFault> {
    let vpn = VirtualPageNumber::floor(address);
    let entry = table
        .get_mut(vpn.0)
        .ok_or(TranslationFault::AddressError(address))?;
    if mode == AccessMode::Write && entry.is_read_only() {
        return Err(TranslationFault::ReadOnlyViolation(address));
    }
    let frame = entry
        .resident_frame()
        .ok_or(TranslationFault::PageFault(address))?;
    if frame.0 >= frame_count {
        return Err(TranslationFault::BusError(address));
    }
    entry.touch(mode);
    Ok(frame.address_at(address.page_offset()))
}
