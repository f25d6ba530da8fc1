//! Utility modules for modrun

pub mod logging;
