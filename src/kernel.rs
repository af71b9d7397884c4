//! 内核 [`Kernel`]：把机器、页帧表、地址空间和后备存储组合在一起
//!
//! 页帧表的所有修改都经过 `&mut Kernel`，多线程共享时使用 [`SharedKernel`] 加锁。

use crate::fs::FileSystem;
use crate::interrupt::{handle_exception, ExceptionOutcome, ExceptionType, ProcessFault};
use crate::machine::Machine;
use crate::memory::address::{PhysicalAddress, PhysicalPageNumber, VirtualAddress};
use crate::memory::config::{ConfigError, MachineConfig, BAD_VADDR_REG};
use crate::memory::fault::{FaultError, FaultResolution, PageFaultResolver};
use crate::memory::frame::{FrameOwner, GlobalFrameTable};
use crate::memory::mapping::{
    AccessMode, AddrSpace, AddrSpaceManager, AsHandle, LoadError, StaleHandle, TranslationFault,
};
use byteorder::{ByteOrder, LittleEndian};
use hashbrown::HashMap;
use log::*;
use spin::Mutex;
use std::sync::Arc;
use thiserror::Error;

pub type SharedKernel = Arc<Mutex<Kernel>>;

/// 分页的统计数据
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PagingStats {
    /// 已解决的缺页次数
    pub faults: u64,
    /// 其中直接使用空闲页帧的次数
    pub free_frame_faults: u64,
    pub evictions: u64,
    /// 淘汰时写回的脏页数
    pub write_backs: u64,
}

#[derive(Debug, Error)]
pub enum MemoryAccessError {
    #[error("unsupported access size {0}")]
    BadSize(usize),
    #[error("no address space is active")]
    NoActiveSpace,
    /// 访问引发的异常终止了当前进程
    #[error("process terminated: {0}")]
    Fault(#[from] ProcessFault),
}

/// 页表与页帧表不一致
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum VerifyError {
    #[error("frame {frame} is mapped by both {first:?} and {second:?}")]
    SharedFrame {
        frame: PhysicalPageNumber,
        first: FrameOwner,
        second: FrameOwner,
    },
    #[error("frame {frame} is mapped by {expected:?} but owned by {found:?}")]
    OwnerMismatch {
        frame: PhysicalPageNumber,
        expected: FrameOwner,
        found: Option<FrameOwner>,
    },
    #[error("frame {frame} is owned by {owner:?} which does not map it")]
    DanglingOwner {
        frame: PhysicalPageNumber,
        owner: FrameOwner,
    },
}

pub struct Kernel {
    config: MachineConfig,
    machine: Machine,
    frames: GlobalFrameTable,
    spaces: AddrSpaceManager,
    fs: Arc<dyn FileSystem>,
    stats: PagingStats,
}

impl Kernel {
    pub fn new(config: MachineConfig, fs: Arc<dyn FileSystem>) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            "kernel initialized: {} frames, {} bytes of memory",
            config.num_phys_pages,
            config.memory_size()
        );
        Ok(Self {
            config,
            machine: Machine::new(config.num_phys_pages),
            frames: GlobalFrameTable::new(config.num_phys_pages),
            spaces: AddrSpaceManager::new(),
            fs,
            stats: PagingStats::default(),
        })
    }

    pub fn into_shared(self) -> SharedKernel {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    pub fn frames(&self) -> &GlobalFrameTable {
        &self.frames
    }

    pub fn spaces(&self) -> &AddrSpaceManager {
        &self.spaces
    }

    pub fn space(&self, handle: AsHandle) -> Result<&AddrSpace, StaleHandle> {
        self.spaces.get(handle)
    }

    pub fn space_mut(&mut self, handle: AsHandle) -> Result<&mut AddrSpace, StaleHandle> {
        self.spaces.get_mut(handle)
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    pub fn stats(&self) -> PagingStats {
        self.stats
    }

    /// 创建并登记地址空间，不切换到它
    pub fn load(&mut self, program: &str) -> Result<AsHandle, LoadError> {
        let space = AddrSpace::load(self.fs.as_ref(), program, self.frames.frame_count())?;
        Ok(self.spaces.insert(space))
    }

    /// 装入程序、设置初始寄存器并切换到它
    pub fn exec(&mut self, program: &str) -> Result<AsHandle, LoadError> {
        let mut space = AddrSpace::load(self.fs.as_ref(), program, self.frames.frame_count())?;
        space.init_registers();
        let context = *space.context();
        self.save_current();
        let handle = self.spaces.insert(space);
        self.machine.load_context(&context);
        self.machine.activate(handle);
        debug!("exec {} as {}", program, handle);
        Ok(handle)
    }

    /// 保存当前地址空间的寄存器，换入 `next`
    pub fn switch_to(&mut self, next: AsHandle) -> Result<(), StaleHandle> {
        if !self.spaces.contains(next) {
            return Err(StaleHandle(next));
        }
        self.save_current();
        let space = self.spaces.get(next)?;
        space.restore_context(next, &mut self.machine);
        debug!("switched to {}", next);
        Ok(())
    }

    fn save_current(&mut self) {
        if let Some(current) = self.machine.active() {
            if let Ok(current) = self.spaces.get_mut(current) {
                current.save_context(&self.machine);
            }
        }
    }

    /// 进程退出：销毁地址空间并释放其全部页帧
    pub fn exit(&mut self, handle: AsHandle) -> Result<(), StaleHandle> {
        let space = self.spaces.remove(handle)?;
        if self.machine.active() == Some(handle) {
            self.machine.deactivate();
        }
        self.destroy(handle, space);
        Ok(())
    }

    /// 终止正在运行的进程，返回它的句柄；没有正在运行的进程时返回 `None`
    pub fn kill_current(&mut self) -> Option<AsHandle> {
        let handle = self.machine.deactivate()?;
        match self.spaces.remove(handle) {
            Ok(space) => {
                self.destroy(handle, space);
                Some(handle)
            }
            Err(error) => {
                error!("active address space already gone: {}", error);
                None
            }
        }
    }

    fn destroy(&mut self, handle: AsHandle, space: AddrSpace) {
        space.destroy(
            handle,
            &mut self.frames,
            &mut self.machine.memory,
            self.fs.as_ref(),
        );
    }

    /// 在 `handle` 的页表中转换地址；句柄失效视为地址错误
    pub fn translate(
        &mut self,
        handle: AsHandle,
        address: VirtualAddress,
        mode: AccessMode,
    ) -> Result<PhysicalAddress, TranslationFault> {
        let frame_count = self.frames.frame_count();
        match self.spaces.get_mut(handle) {
            Ok(space) => space.translate(address, mode, frame_count),
            Err(_) => Err(TranslationFault::AddressError(address)),
        }
    }

    /// 为 `handle` 解决 `address` 处的缺页
    pub fn resolve_fault(
        &mut self,
        handle: AsHandle,
        address: VirtualAddress,
    ) -> Result<FaultResolution, FaultError> {
        let resolution = PageFaultResolver::new(
            &mut self.frames,
            &mut self.spaces,
            &mut self.machine.memory,
            self.fs.as_ref(),
        )
        .resolve(handle, address)?;

        match resolution {
            FaultResolution::FreeFrame { .. } => {
                self.stats.faults += 1;
                self.stats.free_frame_faults += 1;
            }
            FaultResolution::Evicted { written_back, .. } => {
                self.stats.faults += 1;
                self.stats.evictions += 1;
                if written_back {
                    self.stats.write_backs += 1;
                }
            }
            FaultResolution::AlreadyResident { .. } => {}
        }
        debug_assert_eq!(self.verify(), Ok(()));
        Ok(resolution)
    }

    /// 检查页表与页帧表是否一致：每个有效页表项独占一个页帧，且页帧表记录的占用者正是它
    pub fn verify(&self) -> Result<(), VerifyError> {
        let mut mapped: HashMap<PhysicalPageNumber, FrameOwner> = HashMap::new();
        for (handle, space) in self.spaces.iter() {
            for entry in space.page_table() {
                let frame = match entry.resident_frame() {
                    Some(frame) => frame,
                    None => continue,
                };
                let owner = FrameOwner {
                    space: handle,
                    vpn: entry.virtual_page(),
                };
                if let Some(first) = mapped.insert(frame, owner) {
                    return Err(VerifyError::SharedFrame {
                        frame,
                        first,
                        second: owner,
                    });
                }
                let found = self.frames.owner(frame);
                if found != Some(owner) {
                    return Err(VerifyError::OwnerMismatch {
                        frame,
                        expected: owner,
                        found,
                    });
                }
            }
        }
        for index in 0..self.frames.frame_count() {
            let frame = PhysicalPageNumber(index);
            if let Some(owner) = self.frames.owner(frame) {
                if mapped.get(&frame) != Some(&owner) {
                    return Err(VerifyError::DanglingOwner { frame, owner });
                }
            }
        }
        Ok(())
    }

    /// 当前地址空间中的一次访存
    ///
    /// 缺页时把地址写入 `BadVAddr` 并引发异常，解决后重试一次。其它异常终止进程
    fn access(
        &mut self,
        address: VirtualAddress,
        size: usize,
        mode: AccessMode,
    ) -> Result<PhysicalAddress, MemoryAccessError> {
        if ![1, 2, 4].contains(&size) {
            return Err(MemoryAccessError::BadSize(size));
        }
        let handle = self
            .machine
            .active()
            .ok_or(MemoryAccessError::NoActiveSpace)?;
        let mut retried = false;
        loop {
            let result = if address.0 % size != 0 {
                Err(TranslationFault::AddressError(address))
            } else {
                self.translate(handle, address, mode)
            };
            let fault = match result {
                Ok(physical) => return Ok(physical),
                Err(fault) => fault,
            };
            self.machine
                .write_register(BAD_VADDR_REG, address.0 as u32 as i32);
            let which = ExceptionType::from(fault);
            if retried && which == ExceptionType::PageFault {
                return Err(ProcessFault::Translation(fault).into());
            }
            match handle_exception(self, which) {
                ExceptionOutcome::Retry(_) => retried = true,
                ExceptionOutcome::Terminated { cause, .. } => return Err(cause.into()),
            }
        }
    }

    /// 读 1、2 或 4 字节，小端序
    pub fn read_mem(&mut self, address: VirtualAddress, size: usize) -> Result<u32, MemoryAccessError> {
        let physical = self.access(address, size, AccessMode::Read)?;
        let bytes = self.machine.memory.slice(physical, size);
        Ok(match size {
            1 => bytes[0] as u32,
            2 => LittleEndian::read_u16(bytes) as u32,
            _ => LittleEndian::read_u32(bytes),
        })
    }

    /// 写 1、2 或 4 字节，小端序
    pub fn write_mem(
        &mut self,
        address: VirtualAddress,
        size: usize,
        value: u32,
    ) -> Result<(), MemoryAccessError> {
        let physical = self.access(address, size, AccessMode::Write)?;
        let bytes = self.machine.memory.slice_mut(physical, size);
        match size {
            1 => bytes[0] = value as u8,
            2 => LittleEndian::write_u16(bytes, value as u16),
            _ => LittleEndian::write_u32(bytes, value),
        }
        Ok(())
    }
}
