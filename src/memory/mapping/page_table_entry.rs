//! 单个虚拟页的映射状态 [`TranslationEntry`]

use crate::memory::address::{PhysicalPageNumber, VirtualPageNumber};
use crate::memory::mapping::AccessMode;
use bitflags::bitflags;
use std::sync::Arc;

bitflags! {
    /// 页表项的标志位
    #[derive(Default)]
    pub struct Flags: u8 {
        /// 页帧中是该页的有效内容
        const VALID = 1 << 0;
        /// 禁止写入
        const READ_ONLY = 1 << 1;
        /// 上次清除后被访问过（仅供观察，置换策略不使用）
        const USED = 1 << 2;
        /// 装入或写回之后被写过
        const DIRTY = 1 << 3;
        /// 交换镜像中存有该页最新的内容
        const SWAPPED = 1 << 4;
    }
}

#[derive(Clone, Debug)]
pub struct TranslationEntry {
    virtual_page: VirtualPageNumber,
    /// `None` 表示未映射
    physical_frame: Option<PhysicalPageNumber>,
    flags: Flags,
    /// 该页内容所来自的可执行镜像
    backing_file: Arc<str>,
}

impl TranslationEntry {
    /// 未映射的页表项
    pub fn unmapped(virtual_page: VirtualPageNumber, backing_file: Arc<str>) -> Self {
        Self {
            virtual_page,
            physical_frame: None,
            flags: Flags::empty(),
            backing_file,
        }
    }

    pub fn virtual_page(&self) -> VirtualPageNumber {
        self.virtual_page
    }

    pub fn physical_frame(&self) -> Option<PhysicalPageNumber> {
        self.physical_frame
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn backing_file(&self) -> &str {
        &self.backing_file
    }

    pub fn is_valid(&self) -> bool {
        self.flags.contains(Flags::VALID)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(Flags::DIRTY)
    }

    pub fn is_used(&self) -> bool {
        self.flags.contains(Flags::USED)
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(Flags::READ_ONLY)
    }

    pub fn is_swapped(&self) -> bool {
        self.flags.contains(Flags::SWAPPED)
    }

    /// 已映射且有效时返回所在页帧
    pub fn resident_frame(&self) -> Option<PhysicalPageNumber> {
        if self.is_valid() {
            self.physical_frame
        } else {
            None
        }
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.flags.set(Flags::READ_ONLY, read_only);
    }

    /// 装入页帧后建立映射：清除 used / dirty / read-only，保留交换标志
    pub fn map(&mut self, frame: PhysicalPageNumber) {
        self.physical_frame = Some(frame);
        self.flags = Flags::VALID | (self.flags & Flags::SWAPPED);
    }

    /// 页帧被收回，映射失效
    pub fn invalidate(&mut self) {
        self.physical_frame = None;
        self.flags.remove(Flags::VALID | Flags::USED | Flags::DIRTY);
    }

    /// 内容已写回交换镜像
    pub fn mark_swapped(&mut self) {
        self.flags.insert(Flags::SWAPPED);
        self.flags.remove(Flags::DIRTY);
    }

    /// 一次成功的访问
    pub fn touch(&mut self, mode: AccessMode) {
        self.flags.insert(Flags::USED);
        if mode == AccessMode::Write {
            self.flags.insert(Flags::DIRTY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> TranslationEntry {
        TranslationEntry::unmapped(VirtualPageNumber(3), Arc::from("prog"))
    }

    #[test]
    fn starts_unmapped() {
        let entry = entry();
        assert!(!entry.is_valid());
        assert_eq!(entry.physical_frame(), None);
        assert_eq!(entry.resident_frame(), None);
        assert_eq!(entry.backing_file(), "prog");
    }

    #[test]
    fn map_resets_access_bits_but_keeps_swap() {
        let mut entry = entry();
        entry.map(PhysicalPageNumber(2));
        entry.touch(AccessMode::Write);
        assert!(entry.is_dirty() && entry.is_used());
        entry.mark_swapped();
        assert!(!entry.is_dirty());
        entry.invalidate();
        entry.set_read_only(true);
        entry.map(PhysicalPageNumber(5));
        assert_eq!(entry.flags(), Flags::VALID | Flags::SWAPPED);
        assert_eq!(entry.resident_frame(), Some(PhysicalPageNumber(5)));
    }

    #[test]
    fn read_touch_leaves_clean() {
        let mut entry = entry();
        entry.map(PhysicalPageNumber(0));
        entry.touch(AccessMode::Read);
        assert!(entry.is_used());
        assert!(!entry.is_dirty());
    }
}
