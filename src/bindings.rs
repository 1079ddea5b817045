// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Resources and how dispatches bind them. */

pub mod bind_style;
pub mod coordinator;
pub mod resource;
pub(crate) mod resource_tracking;
pub mod visible_to;

pub use bind_style::BindStyle;
