// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! The orchestration component: engine, render loop and command log. */

pub mod command_log;
pub mod engine;
pub mod render_loop;

pub use engine::{ComputeEngine, EngineConfig};
