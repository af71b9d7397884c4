//! 用户程序的地址空间 [`AddrSpace`]
//!
//! 装入时只解析文件头并建立全部未映射的页表，页面在第一次缺页时才调入。

use super::{translate, AccessMode, AsHandle, SegmentMap, TranslationEntry, TranslationFault};
use crate::fs::{FileSystem, OpenFile, StorageError};
use crate::interrupt::context::Context;
use crate::machine::Machine;
use crate::memory::address::{PhysicalAddress, VirtualAddress, VirtualPageNumber};
use crate::memory::config::{PAGE_SIZE, USER_STACK_SIZE};
use crate::memory::frame::{FrameOwner, GlobalFrameTable, PhysicalMemory};
use crate::noff::{NoffError, NoffHeader, NOFF_HEADER_SIZE};
use core::sync::atomic::{AtomicUsize, Ordering};
use log::*;
use std::sync::Arc;
use thiserror::Error;

/// 交换镜像的编号，保证不同地址空间的镜像不重名
static SWAP_COUNTER: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid executable: {0}")]
    Header(#[from] NoffError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("program needs {num_pages} pages but the machine has {frames} frames")]
    TooLarge { num_pages: usize, frames: usize },
}

pub struct AddrSpace {
    page_table: Vec<TranslationEntry>,
    segments: SegmentMap,
    program: Arc<str>,
    /// 写回脏页的交换镜像
    swap: String,
    /// 不在处理器上运行时保存的寄存器
    context: Context,
}

impl AddrSpace {
    /// 从 `fs` 中的可执行文件 `program` 创建地址空间
    ///
    /// 页数超过 `frame_capacity` 的程序即使淘汰所有页帧也无法运行，直接拒绝
    pub fn load(
        fs: &dyn FileSystem,
        program: &str,
        frame_capacity: usize,
    ) -> Result<Self, LoadError> {
        let executable = fs.open(program)?;
        let mut bytes = [0u8; NOFF_HEADER_SIZE];
        let read = executable.read_at(0, &mut bytes)?;
        let header = NoffHeader::parse(&bytes[..read])?;

        let size = header.total_size() + USER_STACK_SIZE;
        let num_pages = VirtualPageNumber::ceil(VirtualAddress(size)).0;
        if num_pages > frame_capacity {
            return Err(LoadError::TooLarge {
                num_pages,
                frames: frame_capacity,
            });
        }

        let segments = SegmentMap::from_header(&header);
        if segments.has_overlap() {
            warn!("{}: segments overlap, earlier segments take precedence", program);
        }

        // 已存在的同名文件可能是别的地址空间正在使用的镜像，换一个编号
        let swap = loop {
            let swap = format!(
                "{}.swap.{}",
                program,
                SWAP_COUNTER.fetch_add(1, Ordering::Relaxed)
            );
            match fs.create(&swap, num_pages * PAGE_SIZE) {
                Ok(()) => break swap,
                Err(StorageError::AlreadyExists(_)) => {
                    debug!("{}: swap image {} taken", program, swap);
                }
                Err(error) => return Err(error.into()),
            }
        };

        let program: Arc<str> = Arc::from(program);
        let page_table = (0..num_pages)
            .map(|vpn| TranslationEntry::unmapped(VirtualPageNumber(vpn), program.clone()))
            .collect();
        info!(
            "loaded {}: {} bytes, {} pages, swap {}",
            program, size, num_pages, swap
        );
        Ok(Self {
            page_table,
            segments,
            program,
            swap,
            context: Context::default(),
        })
    }

    pub fn num_pages(&self) -> usize {
        self.page_table.len()
    }

    pub fn page_table(&self) -> &[TranslationEntry] {
        &self.page_table
    }

    pub fn entry(&self, vpn: VirtualPageNumber) -> Option<&TranslationEntry> {
        self.page_table.get(vpn.0)
    }

    pub(crate) fn entry_mut(&mut self, vpn: VirtualPageNumber) -> Option<&mut TranslationEntry> {
        self.page_table.get_mut(vpn.0)
    }

    pub fn segments(&self) -> &SegmentMap {
        &self.segments
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn swap_file(&self) -> &str {
        &self.swap
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// 设置页的写保护，返回该页是否存在
    pub fn set_read_only(&mut self, vpn: VirtualPageNumber, read_only: bool) -> bool {
        match self.entry_mut(vpn) {
            Some(entry) => {
                entry.set_read_only(read_only);
                true
            }
            None => false,
        }
    }

    /// 驻留在内存中的页数
    pub fn resident_pages(&self) -> usize {
        self.page_table.iter().filter(|entry| entry.is_valid()).count()
    }

    pub fn translate(
        &mut self,
        address: VirtualAddress,
        mode: AccessMode,
        frame_count: usize,
    ) -> Result<PhysicalAddress, TranslationFault> {
        translate(&mut self.page_table, address, mode, frame_count)
    }

    /// 程序开始运行时的寄存器：PC 指向 0，栈顶留出少量空间
    pub fn init_registers(&mut self) {
        self.context = Context::new(self.num_pages() * PAGE_SIZE);
        debug!(
            "{}: initial stack pointer {:#x}",
            self.program,
            self.num_pages() * PAGE_SIZE - 16
        );
    }

    /// 换出前保存寄存器
    pub fn save_context(&mut self, machine: &Machine) {
        self.context = machine.context();
    }

    /// 换入时恢复寄存器，并把页表设为机器当前使用的映射
    pub fn restore_context(&self, handle: AsHandle, machine: &mut Machine) {
        machine.load_context(&self.context);
        machine.activate(handle);
    }

    /// 释放占用的全部页帧并删除交换镜像
    pub fn destroy(
        self,
        handle: AsHandle,
        frames: &mut GlobalFrameTable,
        memory: &mut PhysicalMemory,
        fs: &dyn FileSystem,
    ) {
        let mut released = 0;
        for entry in self.page_table.iter() {
            let frame = match entry.resident_frame() {
                Some(frame) if frame.0 < frames.frame_count() => frame,
                _ => continue,
            };
            memory.frame_mut(frame).iter_mut().for_each(|byte| *byte = 0);
            let owner = frames.release(frame);
            debug_assert_eq!(
                owner,
                Some(FrameOwner {
                    space: handle,
                    vpn: entry.virtual_page()
                })
            );
            released += 1;
        }
        if let Err(error) = fs.remove(&self.swap) {
            warn!("{}: cannot remove swap image {}: {}", handle, self.swap, error);
        }
        info!(
            "destroyed {} ({}), released {} frames",
            handle, self.program, released
        );
    }
}
