//! The core, UI-agnostic library for the `cpflash` utility.
//!
//! `cpflash-core` is designed to be used as a library by any front-end. It
//! turns a source file into something a board can run and puts it on the
//! board: either a script copied onto a `CIRCUITPY` drive, or a sketch that is
//! compiled, converted to UF2 and dropped onto the bootloader volume after the
//! board has been reset into its bootloader.
//!
//! The library is structured into several key modules:
//! - [`project`]: The per-run [`Project`] configuration and the [`Action`] set.
//! - [`sketch`]: Resolves the sketch entry point for a source file.
//! - [`toolchain`]: Runs the external compiler, UF2 converter and `mpy-cross`.
//! - [`reset`]: Requests the UF2 bootloader over the serial control port.
//! - [`volume`]: Finds the mounted board volume.
//! - [`poll`]: The bounded, cancellable wait used while the volume mounts.
//! - [`flash`]: The [`Flasher`] that sequences all of the above.
//! - [`platform`]: OS-specific defaults and mount-table enumeration.
//!
//! External effects (processes, serial ports, the filesystem) sit behind
//! small traits so front-ends and tests can substitute them.
//!
//! ## Example: Flashing a Sketch with State Reporting
//!
//! ```rust,no_run
//! use cpflash_core::{Action, Flasher, Project};
//! use cpflash_core::deliver::FsCopier;
//! use cpflash_core::platform;
//! use cpflash_core::reset::SerialPortOpener;
//! use cpflash_core::toolchain::ProcessRunner;
//! use cpflash_core::volume::DEFAULT_LABELS;
//! use std::sync::{Arc, atomic::AtomicBool};
//!
//! fn main() -> cpflash_core::Result<()> {
//!     let project = Project::new("path/to/blink", "blink.ino");
//!     let volumes = platform::default_probe(DEFAULT_LABELS);
//!
//!     // A shared flag to allow for graceful cancellation.
//!     let running = Arc::new(AtomicBool::new(true));
//!
//!     let flasher = Flasher::new(&ProcessRunner, &SerialPortOpener, &*volumes, &FsCopier);
//!     let report = flasher.run(Action::Uf2, &project, running, |state| {
//!         println!("{state:?}");
//!     })?;
//!
//!     println!("Delivered {}", report.destination.display());
//!     Ok(())
//! }
//! ```

pub mod deliver;
pub mod error;
pub mod flash;
pub mod platform;
pub mod poll;
pub mod project;
pub mod reset;
pub mod sketch;
pub mod toolchain;
pub mod volume;

pub use error::{FlashError, Result};
pub use flash::{FlashOptions, FlashReport, FlashState, Flasher};
pub use project::{Action, Project};
