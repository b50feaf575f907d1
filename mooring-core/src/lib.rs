//! Mooring core: the service container that sequences named services through
//! their lifecycles, and the phased deployment pipeline built on top of it.
//!
//! The two engines are layered bottom-up:
//!
//! - [`container`] holds services, resolves their dependency edges and drives
//!   start/stop transitions honoring the dependency partial order.
//! - [`deployment`] walks a deployment unit (and its sub-deployments) through
//!   ordered phases of processors that share a typed [`attachment`] bag, and
//!   registers services into the container as a side effect.
mod error;
pub use error::{AnyError, AnyResult};

pub mod attachment;
pub mod config;
pub mod container;
pub mod deployment;
pub mod name;
pub mod orchestrator;
pub mod util;

pub use name::ServiceName;
