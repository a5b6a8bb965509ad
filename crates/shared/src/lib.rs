//! Address, command and payload model shared by the engine client and its
//! front ends.

pub mod domain;
pub mod error;
pub mod protocol;
pub mod wire;
