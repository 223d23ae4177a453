//! Thin command-line client for a running `helpline_server`

pub mod client;
pub mod commands;
pub mod display;

pub use client::{HelplineClient, DEFAULT_SERVER};
