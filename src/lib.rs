//! Front end for the magnifier explorer: a command session, a pseudo-C
//! decompiler and logging setup shared by the binary and its tests.

pub mod logging;
pub mod pseudo_c;
pub mod session;

pub use pseudo_c::PseudoCDecompiler;
pub use session::{Outcome, Session};
