//! LabBook Core - process plumbing shared by the LabBook binaries
//!
//! Logging, progress display, signal handling and stage command execution.
//! The lock protocol itself lives in `labbook-lock`.

pub mod command;
pub mod logging;
pub mod progress;
pub mod scoped_dir;
pub mod shutdown;

// Re-exports for convenience
pub use command::{CommandError, run_command};
pub use logging::{IndicatifLogger, Verbosity, init_logging};
pub use progress::ProgressContext;
pub use scoped_dir::ScopedChdir;
pub use shutdown::{install_signal_handlers, is_shutdown_requested, shutdown_flag};
