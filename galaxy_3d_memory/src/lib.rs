/*!
# Galaxy 3D Memory

GPU memory core for the Galaxy 3D engine: growable sub-allocated buffers and
a per-frame transfer manager.

The crate is backend-agnostic. A backend (e.g. `galaxy_3d_memory_vulkan`)
implements the [`MemoryDevice`](galaxy3d::device::MemoryDevice) seam; this
crate does the bookkeeping on top of it.

## Architecture

- **BufferHandle**: one GPU buffer split by a first-fit free list; grows on demand
- **SuballocationHandle**: a live range of a buffer, stable across growth
- **BufferVector / DeviceVector / HostVector**: resizable arrays in a buffer
- **TransferManager**: queues uploads and copies, records them once per frame
  on the transfer queue with queue-family ownership barriers
- **DescriptorBindingRegistry**: tracks descriptor bindings to rewrite after growth
- **MemoryContext**: ties a device, a transfer manager and the registry together

## Frame protocol

```text
enqueue (any time) -> submit_now() -> graphics submit (waits on the semaphore) -> dump()
```
*/

// Internal modules
mod error;
mod config;
mod context;
mod device;
mod memory;
mod transfer;
pub mod log;
pub mod utils;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Configuration
    pub use crate::config::{
        MemoryConfig, DEFAULT_GROWTH_FACTOR, DEFAULT_STAGING_BUFFER_SIZE, DEFAULT_TRANSFER_BATCH_LIMIT,
    };

    // Context
    pub use crate::context::MemoryContext;

    // Logging sub-module (types and sink control, NOT macros)
    pub mod log {
        pub use crate::log::{
            Logger, LogEntry, LogSeverity, DefaultLogger,
            set_logger, reset_logger, set_min_severity, min_severity,
        };
    }

    // Backend seam
    pub mod device {
        pub use crate::device::*;
    }

    // Buffers, suballocations, vectors, images, descriptor rebinding
    pub mod memory {
        pub use crate::memory::*;
    }

    // Transfer pipeline
    pub mod transfer {
        pub use crate::transfer::*;
    }

    // Alignment helpers
    pub mod utils {
        pub use crate::utils::*;
    }
}
