//! 用户程序异常的处理入口

use crate::kernel::Kernel;
use crate::memory::address::VirtualAddress;
use crate::memory::config::BAD_VADDR_REG;
use crate::memory::fault::{FaultError, FaultResolution};
use crate::memory::mapping::{AsHandle, TranslationFault};
use log::*;
use thiserror::Error;

/// 机器在访存失败时引发的异常
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExceptionType {
    PageFault,
    ReadOnly,
    BusError,
    AddressError,
}

impl From<TranslationFault> for ExceptionType {
    fn from(fault: TranslationFault) -> Self {
        match fault {
            TranslationFault::PageFault(_) => Self::PageFault,
            TranslationFault::ReadOnlyViolation(_) => Self::ReadOnly,
            TranslationFault::BusError(_) => Self::BusError,
            TranslationFault::AddressError(_) => Self::AddressError,
        }
    }
}

/// 进程被终止的原因
#[derive(Debug, Error)]
pub enum ProcessFault {
    #[error(transparent)]
    Translation(#[from] TranslationFault),
    #[error(transparent)]
    Resolve(#[from] FaultError),
}

#[derive(Debug)]
pub enum ExceptionOutcome {
    /// 缺页已解决，重新执行出错的访问
    Retry(FaultResolution),
    /// 当前进程已被终止，地址空间已销毁
    Terminated {
        space: Option<AsHandle>,
        cause: ProcessFault,
    },
}

/// 异常的处理入口
///
/// 出错的虚拟地址由机器写在 `BadVAddr` 寄存器中。缺页交给缺页处理，
/// 其余异常以及无法解决的缺页终止当前进程；总线错误说明内核装入了错误的映射，直接 panic
pub fn handle_exception(kernel: &mut Kernel, which: ExceptionType) -> ExceptionOutcome {
    let address = VirtualAddress(kernel.machine().read_register(BAD_VADDR_REG) as u32 as usize);
    match which {
        ExceptionType::PageFault => page_fault(kernel, address),
        ExceptionType::BusError => panic!(
            "bus error at {}: translation names a frame outside physical memory",
            address
        ),
        ExceptionType::AddressError => Err(TranslationFault::AddressError(address).into()),
        ExceptionType::ReadOnly => Err(TranslationFault::ReadOnlyViolation(address).into()),
    }
    .unwrap_or_else(|cause| fault(kernel, cause))
}

/// 处理缺页
fn page_fault(kernel: &mut Kernel, address: VirtualAddress) -> Result<ExceptionOutcome, ProcessFault> {
    let space = kernel
        .machine()
        .active()
        .ok_or(TranslationFault::AddressError(address))?;
    let resolution = kernel.resolve_fault(space, address)?;
    Ok(ExceptionOutcome::Retry(resolution))
}

/// 出现未能解决的异常，终止当前进程
fn fault(kernel: &mut Kernel, cause: ProcessFault) -> ExceptionOutcome {
    let space = kernel.kill_current();
    match space {
        Some(handle) => warn!("{} terminated: {}", handle, cause),
        None => warn!("exception with no active address space: {}", cause),
    }
    ExceptionOutcome::Terminated { space, cause }
}
