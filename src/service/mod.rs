pub mod pid;
pub mod signals;
pub mod updater;

pub use pid::PidFile;
pub use signals::SignalHandler;
pub use updater::{RunMode, UpdaterService};
