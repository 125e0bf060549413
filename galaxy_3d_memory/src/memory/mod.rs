/// Memory module - buffers, suballocations, vectors and images

// Module declarations
pub mod free_list;
pub mod buffer;
pub mod suballocation;
pub mod vector;
pub mod image;
pub mod descriptor;
mod readiness;

// Re-export everything
pub use free_list::*;
pub use buffer::*;
pub use suballocation::*;
pub use vector::*;
pub use image::*;
pub use descriptor::*;
pub(crate) use readiness::Readiness;
