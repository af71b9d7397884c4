//! 模拟的物理内存 [`PhysicalMemory`]

use crate::memory::address::{PhysicalAddress, PhysicalPageNumber};
use crate::memory::config::PAGE_SIZE;
use core::ops::Range;

/// 按页帧组织的主存字节
pub struct PhysicalMemory {
    bytes: Vec<u8>,
}

impl PhysicalMemory {
    pub fn new(frame_count: usize) -> Self {
        Self {
            bytes: vec![0; frame_count * PAGE_SIZE],
        }
    }

    pub fn frame_count(&self) -> usize {
        self.bytes.len() / PAGE_SIZE
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    fn frame_range(ppn: PhysicalPageNumber) -> Range<usize> {
        let start = PhysicalAddress::from(ppn).0;
        start..start + PAGE_SIZE
    }

    /// 一个页帧的内容
    pub fn frame(&self, ppn: PhysicalPageNumber) -> &[u8] {
        &self.bytes[Self::frame_range(ppn)]
    }

    pub fn frame_mut(&mut self, ppn: PhysicalPageNumber) -> &mut [u8] {
        &mut self.bytes[Self::frame_range(ppn)]
    }

    /// 从物理地址开始的 `len` 个字节
    pub fn slice(&self, address: PhysicalAddress, len: usize) -> &[u8] {
        &self.bytes[address.0..address.0 + len]
    }

    pub fn slice_mut(&mut self, address: PhysicalAddress, len: usize) -> &mut [u8] {
        &mut self.bytes[address.0..address.0 + len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_do_not_overlap() {
        let mut memory = PhysicalMemory::new(4);
        assert_eq!(memory.frame_count(), 4);
        memory.frame_mut(PhysicalPageNumber(1)).iter_mut().for_each(|b| *b = 0xee);
        assert!(memory.frame(PhysicalPageNumber(0)).iter().all(|&b| b == 0));
        assert!(memory.frame(PhysicalPageNumber(2)).iter().all(|&b| b == 0));
        assert_eq!(memory.slice(PhysicalAddress(PAGE_SIZE), 2), &[0xee, 0xee]);
        assert_eq!(memory.slice(PhysicalAddress(2 * PAGE_SIZE - 1), 2), &[0xee, 0]);
    }
}
