pub mod auth;
pub mod clock;
pub mod controller;
pub mod error;
pub mod progress;
pub mod store;

pub use auth::{AuthSession, LocalPinSession};
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{ElectionListController, ListState, ReadOutcome, ScreenEvent, UnlockOutcome};
pub use error::ListError;
pub use progress::{
    compute, progress_of, ProgressClock, ProgressConfig, ProgressPhase, ProgressState,
    ProgressSubscription,
};
pub use store::KeyValueStore;
