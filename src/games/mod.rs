pub mod types;
pub mod deriver;
pub mod coordinator;
pub mod session;
pub mod test_framework;

pub use types::*;
pub use deriver::OutcomeDeriver;
pub use coordinator::{RequestCoordinator, Resolution};
pub use session::{GameSession, SessionSnapshot};
