pub mod align;
pub mod retire_queue;

pub use align::{align, align_all, lcm};
pub use retire_queue::RetireQueue;
