//! The two-player update: players, labels, per-player state and the
//! alternating step that drives both optimizers.

pub mod labels;
mod player;
mod running_stat;
mod state;
mod step;

pub use player::Player;
pub use running_stat::RunningStat;
pub use state::{PlayerLosses, PlayerState, TrainState};
pub use step::{Criterion, GanStep, GanStepConfig};
pub(crate) use step::noise_seed;
