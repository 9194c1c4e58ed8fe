//! Side-effecting helpers: process execution, PowerShell, configuration.

pub mod config;
pub mod powershell;
pub mod process;
