/// Device module - the backend seam (buffers, images, transfer command lists)

// Module declarations
pub mod buffer;
pub mod image;
pub mod command;
pub mod device;

#[cfg(test)]
pub mod mock_device;

// Re-export everything
pub use buffer::*;
pub use image::*;
pub use command::*;
pub use device::*;
