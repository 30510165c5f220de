// 窗口呈现

pub mod surface;

pub use surface::{FrameSurface, SharedFrame};
