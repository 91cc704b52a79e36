#![doc = include_str!("../README.md")]
mod client;
mod config;
mod constants;
mod data;
mod stats;

pub use client::*;
pub use config::*;
pub use constants::*;
pub use data::*;
pub use stats::*;
