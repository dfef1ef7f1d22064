pub mod queue_drainer;
pub mod signal_expiry;
