//! 内存与机器的配置常量，以及运行时可调的 [`MachineConfig`]

use thiserror::Error;

/// 页（以及物理页帧）的字节数
pub const PAGE_SIZE: usize = 128;

/// 默认的物理页帧数量
pub const NUM_PHYS_PAGES: usize = 32;

/// 每个用户程序额外预留的栈空间
pub const USER_STACK_SIZE: usize = 1024;

/// 通用寄存器个数
pub const NUM_GP_REGS: usize = 32;
/// 栈指针
pub const STACK_REG: usize = 29;
/// 返回地址
pub const RET_ADDR_REG: usize = 31;
pub const HI_REG: usize = 32;
pub const LO_REG: usize = 33;
/// 当前 PC
pub const PC_REG: usize = 34;
/// 下一条指令的 PC（分支延迟槽）
pub const NEXT_PC_REG: usize = 35;
/// 上一条指令的 PC，仅用于调试
pub const PREV_PC_REG: usize = 36;
pub const LOAD_REG: usize = 37;
pub const LOAD_VALUE_REG: usize = 38;
/// 缺页 / 地址异常时由机器写入出错的虚拟地址
pub const BAD_VADDR_REG: usize = 39;
pub const NUM_TOTAL_REGS: usize = 40;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum ConfigError {
    #[error("machine must have at least one physical frame")]
    NoPhysicalFrames,
}

/// 机器的运行时配置
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MachineConfig {
    /// 物理页帧数量
    pub num_phys_pages: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            num_phys_pages: NUM_PHYS_PAGES,
        }
    }
}

impl MachineConfig {
    pub fn with_phys_pages(mut self, num_phys_pages: usize) -> Self {
        self.num_phys_pages = num_phys_pages;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_phys_pages == 0 {
            return Err(ConfigError::NoPhysicalFrames);
        }
        Ok(())
    }

    /// 物理内存总字节数
    pub fn memory_size(&self) -> usize {
        self.num_phys_pages * PAGE_SIZE
    }
}
