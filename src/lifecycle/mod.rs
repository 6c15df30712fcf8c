mod machine;
mod reload;
mod signals;
mod state;
mod types;


pub use machine::{LifecycleCore, SignalDiagnostics, WorkGate};
pub use reload::{NoReload, ReloadHandler};
pub use signals::{SignalListener, SignalReceiver};
pub use state::StateCell;
pub use types::{
    Dispatch, IgnoreReason, ProcessState, SignalEvent, SignalKind, StopReason, EXIT_CLEAN,
    EXIT_FAILURE, EXIT_GRACE_EXPIRED, EXIT_SIGNAL_BASE,
};
