pub mod monitor;
pub mod notifier;
