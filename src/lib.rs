//! NES/SNES pad driver for Raspberry Pi GPIO
//!
//! Polls up to five pads, or four behind a multiplexing adapter, over a
//! shared clock/latch shift register bus and reports each of them as a
//! button/axis input device.

pub mod config;
pub mod controller;
pub mod gpio;
pub mod sink;
