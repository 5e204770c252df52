#![doc = include_str!("RUSTDOC.md")]

pub mod app;
pub mod auth;
pub mod database;
pub mod logger;
pub mod relay;
pub mod session;
pub mod util;

#[cfg(test)]
pub mod test_support;
