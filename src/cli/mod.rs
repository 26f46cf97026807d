pub mod cache;
pub mod convert;
pub mod preload;
pub mod rate;
pub mod setup;
pub mod tax;
pub mod ui;
