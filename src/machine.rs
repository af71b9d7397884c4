//! 模拟的用户态处理器 [`Machine`]
//!
//! 寄存器组、主存，以及当前生效的地址空间。切换地址空间只需替换
//! [`Machine::activate`] 记录的句柄，页表仍由 [`crate::memory::mapping::AddrSpace`] 持有。

use crate::interrupt::context::Context;
use crate::memory::config::NUM_TOTAL_REGS;
use crate::memory::frame::PhysicalMemory;
use crate::memory::mapping::AsHandle;

pub struct Machine {
    registers: [i32; NUM_TOTAL_REGS],
    pub memory: PhysicalMemory,
    active: Option<AsHandle>,
}

impl Machine {
    pub fn new(frame_count: usize) -> Self {
        Self {
            registers: [0; NUM_TOTAL_REGS],
            memory: PhysicalMemory::new(frame_count),
            active: None,
        }
    }

    pub fn read_register(&self, index: usize) -> i32 {
        self.registers[index]
    }

    pub fn write_register(&mut self, index: usize, value: i32) {
        self.registers[index] = value;
    }

    pub fn registers(&self) -> &[i32; NUM_TOTAL_REGS] {
        &self.registers
    }

    /// 当前寄存器的快照
    pub fn context(&self) -> Context {
        Context {
            regs: self.registers,
        }
    }

    pub fn load_context(&mut self, context: &Context) {
        self.registers = context.regs;
    }

    pub fn active(&self) -> Option<AsHandle> {
        self.active
    }

    pub fn activate(&mut self, handle: AsHandle) {
        self.active = Some(handle);
    }

    /// 撤销当前映射，之后的访存都会失败
    pub fn deactivate(&mut self) -> Option<AsHandle> {
        self.active.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::config::{BAD_VADDR_REG, STACK_REG};

    #[test]
    fn context_round_trips_registers() {
        let mut machine = Machine::new(2);
        machine.write_register(STACK_REG, 1000);
        machine.write_register(BAD_VADDR_REG, -1);
        let saved = machine.context();
        machine.load_context(&Context::default());
        assert_eq!(machine.read_register(STACK_REG), 0);
        machine.load_context(&saved);
        assert_eq!(machine.read_register(STACK_REG), 1000);
        assert_eq!(machine.registers()[BAD_VADDR_REG], -1);
    }

    #[test]
    fn activation() {
        let mut machine = Machine::new(2);
        assert_eq!(machine.active(), None);
        let handle = AsHandle::new(3, 1);
        machine.activate(handle);
        assert_eq!(machine.active(), Some(handle));
        assert_eq!(machine.deactivate(), Some(handle));
        assert_eq!(machine.active(), None);
    }
}
