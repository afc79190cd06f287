//! Run lifecycle orchestration: the hard-stop cascade, crash recovery of
//! interrupted runs, and the exited-process reaper.

pub mod hard_stop;
pub mod reaper;
pub mod recovery;
