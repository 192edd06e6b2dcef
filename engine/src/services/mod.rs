//! Engine services — synchronization, release association, flakiness
//! analysis.

pub mod flakiness;
pub mod releases;
pub mod sync;
