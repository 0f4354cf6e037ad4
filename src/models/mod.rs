pub mod frame;
pub mod result;

pub use frame::{representative_frames, Frame, JPEG_MIME_TYPE};
pub use result::{ExportHandles, ScanResult, PLACEHOLDER_EXPORT};
