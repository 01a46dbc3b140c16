//! fusedvm - fused kernel state of virtual machines and containers
//!
//! This library rebuilds, from the kernel traces of a host, its guests and
//! their nested guests, one time-indexed state tree where every physical CPU
//! shows which machine, virtual CPU, container and thread it ran, and in what
//! mode (user, system call, interrupt, idle).
//!
//! Events of every trace are fed, merged and time-ordered, to a
//! [`engine::FusedEngine`]. The resulting tree lives in a
//! [`store::StateStore`]; [`info`] answers machine- and container-level
//! questions over it.

pub mod attributes;
pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod event;
pub mod handlers;
pub mod info;
pub mod json_output;
pub mod layout;
pub mod model;
pub mod namespace;
pub mod registry;
pub mod store;
pub mod values;

pub use error::{FusedError, Result};
