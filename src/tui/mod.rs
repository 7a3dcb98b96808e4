//! TUI debugger.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register and run-state view
//! - Hex memory view with the data region and current instruction highlighted
//! - Step/run/breakpoint controls
//! - Disassembly view

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
