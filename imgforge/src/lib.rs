//! Machine-image build orchestrator.
//!
//! A build is a fixed sequence of [`step::Step`]s run by a [`pipeline::Pipeline`]
//! against one virtualization backend. Steps acquire backend resources (virtual
//! switches, VMs, mounted media) and record them in a typed [`state::BuildState`];
//! the pipeline guarantees every entered step is cleaned up in reverse order,
//! however the forward pass ended.
//!
//! - **[`core`]**: Pure logic (command wrapping, path confinement, plain types).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting helpers (process execution, PowerShell, config).
//! - **[`driver`]**: The capability trait every backend implements.
//! - **[`communicator`]**: Remote command execution and file transfer, including
//!   the chroot decorator.
//!
//! [`build`] assembles the step list for a configured target and runs it.

pub mod build;
pub mod cancel;
pub mod communicator;
pub mod core;
pub mod driver;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod state;
pub mod step;
pub mod steps;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod ui;
