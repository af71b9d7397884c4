//! 内存管理模块

pub mod address;
pub mod config;
pub mod fault;
pub mod frame;
pub mod mapping;
pub mod range;

#[cfg(test)]
mod tests;

pub use address::*;
pub use config::*;
pub use fault::{FaultError, FaultResolution, PageFaultResolver};
