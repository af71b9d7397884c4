//! 保存的用户寄存器 [`Context`]

use crate::memory::config::{NEXT_PC_REG, NUM_TOTAL_REGS, PC_REG, STACK_REG};

/// 进程不在处理器上时保存的全部寄存器
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Context {
    pub regs: [i32; NUM_TOTAL_REGS],
}

impl Default for Context {
    fn default() -> Self {
        Self {
            regs: [0; NUM_TOTAL_REGS],
        }
    }
}

impl Context {
    /// 新程序的初始寄存器
    ///
    /// 从虚拟地址 0 开始执行，栈指针指向地址空间末尾再向下留 16 字节
    pub fn new(stack_top: usize) -> Self {
        let mut context = Self::default();
        context.regs[PC_REG] = 0;
        context.regs[NEXT_PC_REG] = 4;
        context.regs[STACK_REG] = (stack_top - 16) as i32;
        context
    }
}
