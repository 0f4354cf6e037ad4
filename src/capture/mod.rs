pub mod camera;
pub mod controller;
pub mod encode;
pub mod loop_worker;

pub use camera::{Camera, Facing, StreamLease};
pub use controller::CaptureController;
pub use encode::encode_jpeg;
pub use loop_worker::{capture_loop, LoopExit, StageContext};
