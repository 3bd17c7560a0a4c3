//! meshsync daemon: per-folder coordinators, the bus they announce changes
//! on, and the host-level orchestrator that keeps them connected.

pub mod bus;
pub mod channel;
pub mod coordinator;
pub mod debounce;
mod error;
pub mod orchestrator;
pub mod retry;
mod runtime;
pub mod skip;
pub mod slot;
pub mod watcher;

pub use bus::memory::MemoryBus;
pub use bus::BusError;
pub use channel::{exchange_name, queue_name, NotificationChannel};
pub use coordinator::{CoordinatorState, FolderContext, FolderCoordinator};
pub use error::DaemonError;
pub use orchestrator::{Orchestrator, RECONNECT_WAIT};
pub use runtime::{init_tracing, run, start_blocking};
pub use watcher::{ChannelWatch, FolderWatch, FsEvent, FsEventKind, NotifyWatch};
