mod physical;
mod table;

pub use physical::PhysicalMemory;
pub use table::{FrameOwner, GlobalFrameTable};
