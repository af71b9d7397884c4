//! 缺页处理 [`PageFaultResolver`]
//!
//! 取得页帧（空闲页帧优先，否则淘汰装入最早的页），脏页先写回交换镜像，
//! 再把缺失的页调入页帧并建立映射。

use crate::fs::{FileSystem, OpenFileExt, StorageError};
use crate::memory::address::{PhysicalPageNumber, VirtualAddress, VirtualPageNumber};
use crate::memory::config::PAGE_SIZE;
use crate::memory::frame::{FrameOwner, GlobalFrameTable, PhysicalMemory};
use crate::memory::mapping::{AddrSpaceManager, AsHandle, SegmentKind, SegmentMap, StaleHandle};
use core::ops::Range;
use log::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaultError {
    #[error("address error at {0}")]
    AddressError(VirtualAddress),
    #[error(transparent)]
    StaleHandle(#[from] StaleHandle),
    /// 换入或写回时存储失败，只终止发生缺页的进程
    #[error("storage failure while paging page {page}: {source}")]
    Storage {
        page: VirtualPageNumber,
        #[source]
        source: StorageError,
    },
}

/// 缺页如何得到解决
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FaultResolution {
    /// 使用了空闲页帧
    FreeFrame { frame: PhysicalPageNumber },
    /// 淘汰了 `victim`；若它是脏页则已写回
    Evicted {
        frame: PhysicalPageNumber,
        victim: FrameOwner,
        written_back: bool,
    },
    /// 该页已在内存中，页帧表未被改动
    AlreadyResident { frame: PhysicalPageNumber },
}

impl FaultResolution {
    pub fn frame(&self) -> PhysicalPageNumber {
        match *self {
            Self::FreeFrame { frame }
            | Self::Evicted { frame, .. }
            | Self::AlreadyResident { frame } => frame,
        }
    }
}

/// 被淘汰的页帧及其原占用者
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Eviction {
    pub frame: PhysicalPageNumber,
    pub owner: Option<FrameOwner>,
    pub was_dirty: bool,
}

/// 调入时的一段连续读取：页帧内的字节区间及其在文件中的起点
struct PageRun {
    bytes: Range<usize>,
    file_offset: usize,
}

/// 借用内核中与缺页有关的全部状态，完成一次缺页处理
pub struct PageFaultResolver<'a> {
    frames: &'a mut GlobalFrameTable,
    spaces: &'a mut AddrSpaceManager,
    memory: &'a mut PhysicalMemory,
    fs: &'a dyn FileSystem,
}

impl<'a> PageFaultResolver<'a> {
    pub fn new(
        frames: &'a mut GlobalFrameTable,
        spaces: &'a mut AddrSpaceManager,
        memory: &'a mut PhysicalMemory,
        fs: &'a dyn FileSystem,
    ) -> Self {
        Self {
            frames,
            spaces,
            memory,
            fs,
        }
    }

    /// 处理 `space` 在 `address` 处的缺页
    ///
    /// 返回后该页有效且映射到一个只属于它的页帧，失败时不会留下半完成的映射
    pub fn resolve(
        &mut self,
        space: AsHandle,
        address: VirtualAddress,
    ) -> Result<FaultResolution, FaultError> {
        let vpn = VirtualPageNumber::floor(address);
        let resident = match self.spaces.get(space)?.entry(vpn) {
            Some(entry) => entry.resident_frame(),
            None => return Err(FaultError::AddressError(address)),
        };
        if let Some(frame) = resident {
            debug!("{}: page {} already in frame {}", space, vpn.0, frame.0);
            return Ok(FaultResolution::AlreadyResident { frame });
        }

        let resolution = match self.frames.acquire_free_frame() {
            Some(frame) => FaultResolution::FreeFrame { frame },
            None => {
                let eviction = self.evict()?;
                match eviction.owner {
                    Some(victim) => FaultResolution::Evicted {
                        frame: eviction.frame,
                        victim,
                        written_back: eviction.was_dirty,
                    },
                    None => FaultResolution::FreeFrame {
                        frame: eviction.frame,
                    },
                }
            }
        };
        let frame = resolution.frame();

        self.page_in(frame, space, vpn)?;
        self.frames.assign(frame, FrameOwner { space, vpn });
        if let Ok(owner) = self.spaces.get_mut(space) {
            if let Some(entry) = owner.entry_mut(vpn) {
                entry.map(frame);
            }
        }
        debug!("{}: page {} -> frame {} ({:?})", space, vpn.0, frame.0, resolution);
        trace!("frame table after fault:\n{}", self.frames);
        Ok(resolution)
    }

    /// 淘汰装入最早的页帧
    ///
    /// 脏页先写回；写回失败时页帧和原占用者都保持不变
    pub fn evict(&mut self) -> Result<Eviction, FaultError> {
        let frame = self.frames.select_victim();
        let owner = self.frames.owner(frame);
        let was_dirty = owner.map_or(false, |owner| self.is_dirty(owner));
        if let Some(owner) = owner.filter(|_| was_dirty) {
            self.write_back(frame, owner)?;
        }

        let owner = self.frames.evict(frame);
        if let Some(owner) = owner {
            if let Ok(space) = self.spaces.get_mut(owner.space) {
                if let Some(entry) = space.entry_mut(owner.vpn) {
                    if was_dirty {
                        entry.mark_swapped();
                    }
                    entry.invalidate();
                }
            }
            debug!(
                "evicted {} page {} from frame {}{}",
                owner.space,
                owner.vpn.0,
                frame.0,
                if was_dirty { " (written back)" } else { "" }
            );
        }
        Ok(Eviction {
            frame,
            owner,
            was_dirty,
        })
    }

    fn is_dirty(&self, owner: FrameOwner) -> bool {
        self.spaces
            .get(owner.space)
            .ok()
            .and_then(|space| space.entry(owner.vpn))
            .map_or(false, |entry| entry.is_dirty())
    }

    /// 把页帧内容写到占用者交换镜像中对应虚拟页的位置
    fn write_back(&mut self, frame: PhysicalPageNumber, owner: FrameOwner) -> Result<(), FaultError> {
        let space = self.spaces.get(owner.space)?;
        let storage = |source: StorageError| FaultError::Storage {
            page: owner.vpn,
            source,
        };
        let swap = self.fs.open(space.swap_file()).map_err(storage)?;
        swap.write_all_at(owner.vpn.file_offset(), self.memory.frame(frame))
            .map_err(storage)
    }

    /// 把 `space` 的第 `vpn` 页读入页帧
    ///
    /// 写回过的页从交换镜像整页读入；否则按段读取，不属于任何段的字节清零
    fn page_in(
        &mut self,
        frame: PhysicalPageNumber,
        space: AsHandle,
        vpn: VirtualPageNumber,
    ) -> Result<(), FaultError> {
        let owner = self.spaces.get(space)?;
        let storage = |source: StorageError| FaultError::Storage { page: vpn, source };
        let bytes = self.memory.frame_mut(frame);

        if owner.entry(vpn).map_or(false, |entry| entry.is_swapped()) {
            let swap = self.fs.open(owner.swap_file()).map_err(storage)?;
            swap.read_exact_at(vpn.file_offset(), bytes).map_err(storage)?;
            trace!("{}: page {} read from {}", space, vpn.0, owner.swap_file());
            return Ok(());
        }

        bytes.iter_mut().for_each(|byte| *byte = 0);
        let runs = Self::runs(owner.segments(), vpn);
        if runs.is_empty() {
            return Ok(());
        }
        let executable = self.fs.open(owner.program()).map_err(storage)?;
        for run in runs {
            trace!(
                "{}: page {} bytes {:?} from {} offset {}",
                space,
                vpn.0,
                run.bytes,
                owner.program(),
                run.file_offset
            );
            executable
                .read_exact_at(run.file_offset, &mut bytes[run.bytes])
                .map_err(storage)?;
        }
        Ok(())
    }

    /// 把一页按所属段切分为若干段连续的文件区间
    fn runs(segments: &SegmentMap, vpn: VirtualPageNumber) -> Vec<PageRun> {
        let base = VirtualAddress::from(vpn);
        let mut runs: Vec<PageRun> = Vec::new();
        let mut last: Option<SegmentKind> = None;
        for offset in 0..PAGE_SIZE {
            let (kind, file_offset) = match segments.locate(base + offset) {
                Some((segment, file_offset)) => (segment.kind, file_offset),
                None => {
                    last = None;
                    continue;
                }
            };
            let extends = last == Some(kind)
                && runs.last().map_or(false, |run| {
                    run.bytes.end == offset && run.file_offset + run.bytes.len() == file_offset
                });
            match runs.last_mut() {
                Some(run) if extends => run.bytes.end += 1,
                _ => {
                    runs.push(PageRun {
                        bytes: offset..offset + 1,
                        file_offset,
                    });
                    last = Some(kind);
                }
            }
        }
        runs
    }
}
