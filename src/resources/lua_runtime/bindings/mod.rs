//! Engine services exposed to scripts as global tables.
//!
//! - [`log`] - `log.trace` .. `log.critical`, routed to the `log` facade
//! - [`keyboard`] - `Keyboard.is_pressed` and the `Keyboard.keys` name table

pub mod keyboard;
pub mod log;
