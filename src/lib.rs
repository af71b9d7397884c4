//! 教学操作系统的虚拟内存子系统
//!
//! - 线性页表与按需调页：[`memory::mapping`]
//! - 全局页帧表与置换：[`memory::frame`] [`memory::fault`]
//! - 模拟的处理器与异常处理：[`machine`] [`interrupt`]
//! - 可执行文件与后备存储：[`noff`] [`fs`]

#![warn(clippy::all)]

pub mod fs;
pub mod interrupt;
pub mod kernel;
pub mod machine;
pub mod memory;
pub mod noff;

pub use kernel::{Kernel, MemoryAccessError, PagingStats, SharedKernel, VerifyError};
