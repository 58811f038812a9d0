//! Command line tracker for personal metrics. Value trackers record numbers with a unit, event
//! trackers record occurrences. Logged data can be charted per day, month or year and events can
//! be laid out on a calendar heatmap.
//!

pub mod cli;
pub mod engine;
pub mod storage;
pub mod utils;
