//! Error types for the build-and-deliver workflows.

use std::path::PathBuf;
use thiserror::Error;

/// Classified failure of a workflow phase.
///
/// Every variant names the phase that failed so a front-end can tell a
/// toolchain failure apart from a missing volume without string matching.
#[derive(Debug, Error)]
pub enum FlashError {
    /// The source file could not be mapped to a build entry point.
    #[error("cannot resolve sketch for {path}: {reason}")]
    Resolve { path: PathBuf, reason: String },

    /// The compiler (sketch or script) exited non-zero or could not be launched.
    #[error("compile failed{}:\n{diagnostics}", exit_suffix(.code))]
    Compile {
        code: Option<i32>,
        diagnostics: String,
    },

    /// The UF2 converter exited non-zero or could not be launched.
    #[error("convert failed{}:\n{diagnostics}", exit_suffix(.code))]
    Convert {
        code: Option<i32>,
        diagnostics: String,
    },

    /// No reset could be attempted on the control port.
    #[error("board not found on {port}: {reason}")]
    ResetUnavailable { port: String, reason: String },

    /// No recognized volume appeared in time.
    #[error(
        "target volume not found in {root}; is the bootloader active and the device mounted?"
    )]
    VolumeNotFound { root: PathBuf },

    /// Delivering the artifact to the volume failed.
    #[error("copy of {from} to {to} failed: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Preparing the build directory failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" (exit status {code})"),
        None => String::new(),
    }
}

/// Result type for cpflash operations
pub type Result<T> = std::result::Result<T, FlashError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_and_volume_failures_are_distinguishable() {
        let compile = FlashError::Compile {
            code: Some(1),
            diagnostics: "main.ino:3: error".into(),
        };
        let volume = FlashError::VolumeNotFound {
            root: PathBuf::from("/media/user"),
        };

        let compile = compile.to_string();
        assert!(compile.starts_with("compile failed (exit status 1)"));
        assert!(compile.contains("main.ino:3: error"));
        assert!(volume.to_string().contains("is the bootloader active"));
    }

    #[test]
    fn launch_failures_omit_exit_status() {
        let err = FlashError::Convert {
            code: None,
            diagnostics: "no such file".into(),
        };
        assert_eq!(err.to_string(), "convert failed:\nno such file");
    }
}
