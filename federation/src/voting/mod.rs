//! Community voting over chat rooms: the per-proposal session and tally,
//! and the coordinator that drives a proposal from broadcast through
//! finalize.

mod coordinator;
mod session;

pub use coordinator::{CoordinatorError, SharedVotingCoordinator, VotingCoordinator};
pub use session::{Vote, VotingSession};
