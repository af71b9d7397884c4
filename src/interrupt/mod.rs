//! 异常模块
//!
//! 机器访存失败时引发异常，由 [`handle_exception`] 决定重试还是终止进程

pub mod context;
mod handler;

pub use handler::{handle_exception, ExceptionOutcome, ExceptionType, ProcessFault};
