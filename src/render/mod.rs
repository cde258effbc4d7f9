pub mod camera;
pub mod frame;
pub mod gpu;
pub mod offscreen;
pub mod pipeline;
pub mod text;
