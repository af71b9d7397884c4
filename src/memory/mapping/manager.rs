//! 地址空间的登记表 [`AddrSpaceManager`]
//!
//! 页帧表只记录 [`AsHandle`]，通过这里找到对应的 [`AddrSpace`]。
//! 槽位被回收后代数加一，旧句柄因此失效而不会指向新的地址空间。

use super::AddrSpace;
use core::fmt;
use thiserror::Error;

/// 地址空间的句柄：槽位下标加代数
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct AsHandle {
    index: u32,
    generation: u32,
}

impl AsHandle {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for AsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "as{}.{}", self.index, self.generation)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
#[error("address space {0} no longer exists")]
pub struct StaleHandle(pub AsHandle);

struct Slot {
    generation: u32,
    space: Option<AddrSpace>,
}

#[derive(Default)]
pub struct AddrSpaceManager {
    slots: Vec<Slot>,
}

impl AddrSpaceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个地址空间，优先复用空槽位
    pub fn insert(&mut self, space: AddrSpace) -> AsHandle {
        if let Some(index) = self.slots.iter().position(|slot| slot.space.is_none()) {
            let slot = &mut self.slots[index];
            slot.space = Some(space);
            AsHandle::new(index as u32, slot.generation)
        } else {
            self.slots.push(Slot {
                generation: 0,
                space: Some(space),
            });
            AsHandle::new(self.slots.len() as u32 - 1, 0)
        }
    }

    fn slot(&self, handle: AsHandle) -> Option<&Slot> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
    }

    pub fn get(&self, handle: AsHandle) -> Result<&AddrSpace, StaleHandle> {
        self.slot(handle)
            .and_then(|slot| slot.space.as_ref())
            .ok_or(StaleHandle(handle))
    }

    pub fn get_mut(&mut self, handle: AsHandle) -> Result<&mut AddrSpace, StaleHandle> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.space.as_mut())
            .ok_or(StaleHandle(handle))
    }

    pub fn contains(&self, handle: AsHandle) -> bool {
        self.get(handle).is_ok()
    }

    /// 取出地址空间，句柄随之失效
    pub fn remove(&mut self, handle: AsHandle) -> Result<AddrSpace, StaleHandle> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.space.is_some())
            .ok_or(StaleHandle(handle))?;
        slot.generation = slot.generation.wrapping_add(1);
        slot.space.take().ok_or(StaleHandle(handle))
    }

    pub fn iter(&self) -> impl Iterator<Item = (AsHandle, &AddrSpace)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.space
                .as_ref()
                .map(|space| (AsHandle::new(index as u32, slot.generation), space))
        })
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
