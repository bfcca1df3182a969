//! rolldown-lib: Build and watch orchestration for the rolldown command line.
//!
//! This crate sits between the command line and the bundling engine:
//! - `config`: loading config files and expanding them into build configs
//! - `session`: running build sessions one after another, closing each one
//! - `watch`: turning the engine's watch events into a restartable rebuild loop
//! - `report`: formatting finished outputs for the terminal
//! - `engine`: the contract with the engine, plus a pass-through engine

pub mod config;
pub mod console;
pub mod engine;
pub mod options;
pub mod report;
pub mod session;
pub mod watch;
