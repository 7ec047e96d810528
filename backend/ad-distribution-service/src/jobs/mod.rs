//! Background jobs

pub mod fairness_refresh;

pub use fairness_refresh::{run_refresh_cycle, start_fairness_refresh};
