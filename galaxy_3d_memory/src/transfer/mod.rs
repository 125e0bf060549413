/// Transfer module - queued uploads and copies recorded once per frame

// Module declarations
pub mod transfer_queue;
pub mod transfer_data;
pub mod copy_regions;
pub mod transfer_manager;

// Re-export everything
pub use transfer_queue::*;
pub use transfer_data::*;
pub use copy_regions::*;
pub use transfer_manager::*;
