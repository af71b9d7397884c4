//! 全局页帧表 [`GlobalFrameTable`]
//!
//! 每个物理页帧一项，记录当前占用它的（地址空间，虚拟页）以及装入时间戳。
//! 所有权与时间戳只能通过这里的方法修改，保证同一个页帧至多属于一个虚拟页。

use crate::memory::address::{PhysicalPageNumber, VirtualPageNumber};
use crate::memory::mapping::AsHandle;
use core::fmt;

/// 页帧的占用者。只保存地址空间的句柄，不持有其页表
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct FrameOwner {
    pub space: AsHandle,
    pub vpn: VirtualPageNumber,
}

#[derive(Clone, Copy, Debug, Default)]
struct FrameEntry {
    owner: Option<FrameOwner>,
    /// 最近一次装入的时间戳，越小越久
    recency: u64,
}

pub struct GlobalFrameTable {
    entries: Vec<FrameEntry>,
    /// 逻辑时钟，每次 [`GlobalFrameTable::assign`] 前进一格
    tick: u64,
}

impl GlobalFrameTable {
    pub fn new(frame_count: usize) -> Self {
        Self {
            entries: vec![FrameEntry::default(); frame_count],
            tick: 1,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.entries.len()
    }

    /// 下标最小的空闲页帧
    pub fn acquire_free_frame(&self) -> Option<PhysicalPageNumber> {
        self.entries
            .iter()
            .position(|entry| entry.owner.is_none())
            .map(PhysicalPageNumber)
    }

    /// 时间戳最小的页帧，相同时取下标最小者
    ///
    /// 仅在没有空闲页帧时调用；页帧表非空时总能选出一个
    pub fn select_victim(&self) -> PhysicalPageNumber {
        let mut victim = 0;
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.recency < self.entries[victim].recency {
                victim = index;
            }
        }
        PhysicalPageNumber(victim)
    }

    /// 取出页帧原来的占用者，页帧随后只能交给 [`GlobalFrameTable::assign`]
    pub fn evict(&mut self, frame: PhysicalPageNumber) -> Option<FrameOwner> {
        self.entries[frame.0].owner.take()
    }

    /// 记录新的占用者，并把时间戳刷新为“现在”
    pub fn assign(&mut self, frame: PhysicalPageNumber, owner: FrameOwner) {
        let entry = &mut self.entries[frame.0];
        assert!(
            entry.owner.is_none(),
            "frame {} is still owned by {:?}",
            frame.0,
            entry.owner
        );
        entry.owner = Some(owner);
        entry.recency = self.tick;
        self.tick += 1;
    }

    /// 释放页帧，返回原来的占用者
    pub fn release(&mut self, frame: PhysicalPageNumber) -> Option<FrameOwner> {
        let entry = &mut self.entries[frame.0];
        entry.recency = 0;
        entry.owner.take()
    }

    pub fn owner(&self, frame: PhysicalPageNumber) -> Option<FrameOwner> {
        self.entries.get(frame.0).and_then(|entry| entry.owner)
    }

    pub fn recency(&self, frame: PhysicalPageNumber) -> u64 {
        self.entries[frame.0].recency
    }

    pub fn free_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.owner.is_none()).count()
    }

    /// `space` 占用的所有页帧
    pub fn owned_by(
        &self,
        space: AsHandle,
    ) -> impl Iterator<Item = (PhysicalPageNumber, VirtualPageNumber)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(move |(index, entry)| match entry.owner {
                Some(owner) if owner.space == space => Some((PhysicalPageNumber(index), owner.vpn)),
                _ => None,
            })
    }
}

impl fmt::Display for GlobalFrameTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "frame  owner      vpn    recency")?;
        for (index, entry) in self.entries.iter().enumerate() {
            match entry.owner {
                Some(owner) => writeln!(
                    f,
                    "{:<6} {:<10} {:<6} {}",
                    index,
                    owner.space.to_string(),
                    owner.vpn.0,
                    entry.recency
                )?,
                None => writeln!(f, "{:<6} -", index)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(index: u32, vpn: usize) -> FrameOwner {
        FrameOwner {
            space: AsHandle::new(index, 0),
            vpn: VirtualPageNumber(vpn),
        }
    }

    #[test]
    fn free_frames_lowest_first() {
        let mut table = GlobalFrameTable::new(3);
        assert_eq!(table.acquire_free_frame(), Some(PhysicalPageNumber(0)));
        table.assign(PhysicalPageNumber(0), owner(0, 5));
        assert_eq!(table.acquire_free_frame(), Some(PhysicalPageNumber(1)));
        table.assign(PhysicalPageNumber(1), owner(0, 6));
        table.assign(PhysicalPageNumber(2), owner(0, 7));
        assert_eq!(table.acquire_free_frame(), None);
        assert_eq!(table.free_count(), 0);
        table.release(PhysicalPageNumber(1));
        assert_eq!(table.acquire_free_frame(), Some(PhysicalPageNumber(1)));
    }

    #[test]
    fn victim_is_lowest_recency_then_lowest_index() {
        let mut table = GlobalFrameTable::new(4);
        for (index, recency) in [5, 2, 9, 2].iter().enumerate() {
            table.entries[index] = FrameEntry {
                owner: Some(owner(0, index)),
                recency: *recency,
            };
        }
        assert_eq!(table.select_victim(), PhysicalPageNumber(1));
    }

    #[test]
    fn victim_is_least_recently_loaded() {
        let mut table = GlobalFrameTable::new(3);
        for frame in 0..3 {
            table.assign(PhysicalPageNumber(frame), owner(0, frame));
        }
        assert_eq!(table.select_victim(), PhysicalPageNumber(0));
        assert_eq!(table.evict(PhysicalPageNumber(0)), Some(owner(0, 0)));
        table.assign(PhysicalPageNumber(0), owner(1, 9));
        assert_eq!(table.select_victim(), PhysicalPageNumber(1));
        assert!(table.recency(PhysicalPageNumber(0)) > table.recency(PhysicalPageNumber(2)));
    }

    #[test]
    #[should_panic]
    fn assign_over_owned_frame_panics() {
        let mut table = GlobalFrameTable::new(1);
        table.assign(PhysicalPageNumber(0), owner(0, 0));
        table.assign(PhysicalPageNumber(0), owner(0, 1));
    }

    #[test]
    fn owned_by_filters_space() {
        let mut table = GlobalFrameTable::new(4);
        table.assign(PhysicalPageNumber(0), owner(0, 3));
        table.assign(PhysicalPageNumber(1), owner(1, 3));
        table.assign(PhysicalPageNumber(3), owner(0, 4));
        let owned: Vec<_> = table.owned_by(AsHandle::new(0, 0)).collect();
        assert_eq!(
            owned,
            vec![
                (PhysicalPageNumber(0), VirtualPageNumber(3)),
                (PhysicalPageNumber(3), VirtualPageNumber(4))
            ]
        );
        assert_eq!(table.release(PhysicalPageNumber(1)), Some(owner(1, 3)));
        assert_eq!(table.owner(PhysicalPageNumber(1)), None);
        assert!(table.to_string().contains("frame"));
    }
}
