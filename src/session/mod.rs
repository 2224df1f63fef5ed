/// Session orchestration on top of the stores and the token issuer.

mod service;
mod sweeper;

pub use service::{LoginOutcome, SessionService};
pub use sweeper::spawn_sweeper;
