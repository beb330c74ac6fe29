//! Generation core for annotated multi-pass laser-cladding robot programs.
//!
//! Upstream tooling supplies raw motions and commanded speeds; this crate
//! recovers the process semantics (approach, deposit, depart, repeated
//! passes) and emits a decorated instruction stream through an
//! [`sink::InstructionSink`] supplied by the host. Rendering controller
//! syntax and file management stay on the host side of that seam.

pub mod annotation;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod ids;
pub mod passloop;
pub mod process;
pub mod session;
pub mod sink;
