pub mod controller;

pub use controller::{CONFIG_ENV, Herald, find_config_file};
