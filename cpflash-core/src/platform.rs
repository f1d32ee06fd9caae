//! Provides platform-specific functionality.
//!
//! This module holds the defaults that differ between operating systems (where
//! removable media is mounted, what the board's control port is called) and
//! the enumeration of currently mounted board volumes.
//!
//! It uses conditional compilation (`#[cfg]`) to expose the correct implementation
//! for the target OS. Each submodule exposes the same public API, so the rest
//! of the library can use it without worrying about the underlying platform.

#[cfg(not(target_os = "windows"))]
mod unix;
#[cfg(not(target_os = "windows"))]
pub use self::unix::*;

#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "windows")]
pub use self::windows::*;
