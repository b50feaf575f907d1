//! Mooring services: the deployment processors that turn exploded archives
//! into running services, and the service decorators they use.
//!
//! - [`structure`] discovers what an archive is made of: manifest, EAR
//!   modules and the annotation index.
//! - [`ee`] describes EE modules and installs their managed beans.
//! - [`appclient`] selects and launches an application client.
//! - [`naming`] is the registry components are bound into.
//! - [`common`] holds [`AsyncService`](common::AsyncService), which moves a
//!   service's lifecycle bodies onto an executor.
//!
//! Processors share state through the attachment keys in [`keys`].
pub mod appclient;
pub mod archive;
pub mod common;
pub mod ee;
pub mod keys;
pub mod naming;
pub mod structure;
