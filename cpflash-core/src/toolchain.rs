//! Invocation of the external compiler, UF2 converter and script compiler.
//!
//! Tools are launched through a [`ToolRunner`] so the workflow can be driven
//! by test doubles. Every launch happens inside a [`BuildContext`], which
//! carries the working directory the tool must see.
use crate::error::{FlashError, Result};
use crate::sketch::SketchDescriptor;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Application base address handed to the converter (SAMD51 behind a 16 KiB
/// UF2 bootloader).
pub const UF2_BASE_ADDRESS: u32 = 0x4000;

/// The working directory a tool runs in.
///
/// The context only lives for the duration of one tool call. It is applied to
/// the child process, never to this process, so the caller's working
/// directory is the same on every exit path.
#[derive(Debug)]
pub struct BuildContext<'a> {
    dir: &'a Path,
}

impl<'a> BuildContext<'a> {
    pub fn enter(dir: &'a Path) -> Self {
        log::trace!("entering build context {}", dir.display());
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        self.dir
    }
}

impl Drop for BuildContext<'_> {
    fn drop(&mut self) {
        log::trace!("leaving build context {}", self.dir.display());
    }
}

/// Completed tool run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    /// Captured stdout followed by stderr.
    pub output: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs an external program to completion and captures its output.
pub trait ToolRunner {
    fn run(&self, program: &Path, args: &[OsString], ctx: &BuildContext<'_>) -> io::Result<ToolOutput>;
}

/// [`ToolRunner`] backed by [`std::process::Command`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, program: &Path, args: &[OsString], ctx: &BuildContext<'_>) -> io::Result<ToolOutput> {
        let out = Command::new(program)
            .args(args)
            .current_dir(ctx.dir())
            .output()?;

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));
        Ok(ToolOutput {
            code: out.status.code(),
            output,
        })
    }
}

/// Which step a tool run belongs to, for classifying its failure.
#[derive(Clone, Copy, Debug)]
enum Step {
    Compile,
    Convert,
}

fn run_step(
    runner: &dyn ToolRunner,
    step: Step,
    program: &Path,
    args: &[OsString],
    ctx: &BuildContext<'_>,
) -> Result<ToolOutput> {
    log::debug!(
        "running {} {}",
        program.display(),
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let failure = |code: Option<i32>, diagnostics: String| match step {
        Step::Compile => FlashError::Compile { code, diagnostics },
        Step::Convert => FlashError::Convert { code, diagnostics },
    };

    let out = runner
        .run(program, args, ctx)
        .map_err(|e| failure(None, format!("failed to launch {}: {e}", program.display())))?;

    if !out.success() {
        return Err(failure(out.code, out.output));
    }
    if !out.output.trim().is_empty() {
        log::debug!("{}", out.output.trim_end());
    }
    Ok(out)
}

/// Builds the sketch with the external compiler.
///
/// Runs `<compiler> --pref build.path=<build-dir> --verify [--verbose] <entry>`
/// from inside the sketch directory.
///
/// # Errors
///
/// Returns [`FlashError::Compile`] with the captured output if the compiler
/// cannot be launched or exits non-zero.
pub fn compile_sketch(
    runner: &dyn ToolRunner,
    compiler: &Path,
    sketch: &SketchDescriptor,
    verbose: u8,
) -> Result<ToolOutput> {
    let ctx = BuildContext::enter(&sketch.entry_dir);

    let mut build_path = OsString::from("build.path=");
    build_path.push(sketch.build_dir());

    let mut args: Vec<OsString> = vec!["--pref".into(), build_path, "--verify".into()];
    if verbose >= 2 {
        args.push("--verbose".into());
    }
    args.push(sketch.entry_name.clone().into());

    run_step(runner, Step::Compile, compiler, &args, &ctx)
}

/// Converts the compiled binary into a UF2 image.
///
/// # Errors
///
/// Returns [`FlashError::Convert`] with the captured output if the converter
/// cannot be launched or exits non-zero.
pub fn convert_image(
    runner: &dyn ToolRunner,
    converter: &Path,
    sketch: &SketchDescriptor,
) -> Result<ToolOutput> {
    let ctx = BuildContext::enter(&sketch.entry_dir);

    let mut output = OsString::from("--output=");
    output.push(sketch.image_path());

    let args: Vec<OsString> = vec![
        "--convert".into(),
        format!("--base={UF2_BASE_ADDRESS:#x}").into(),
        output,
        sketch.binary_path().into(),
    ];

    run_step(runner, Step::Convert, converter, &args, &ctx)
}

/// Compiles a script to bytecode with `mpy-cross`.
///
/// The output lands in `build/<stem>.mpy` next to the source and its path is
/// returned.
///
/// # Errors
///
/// Returns [`FlashError::Io`] if the build directory cannot be created and
/// [`FlashError::Compile`] if the script compiler fails.
pub fn compile_script(
    runner: &dyn ToolRunner,
    script_compiler: &Path,
    source: &Path,
) -> Result<PathBuf> {
    let dir = source.parent().unwrap_or(Path::new(""));
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let build_dir = dir.join(crate::sketch::BUILD_DIR);
    std::fs::create_dir_all(&build_dir)?;
    let output = build_dir.join(format!("{stem}.mpy"));

    let ctx = BuildContext::enter(dir);
    let args: Vec<OsString> = vec!["-o".into(), output.clone().into(), source.into()];
    run_step(runner, Step::Compile, script_compiler, &args, &ctx)?;
    Ok(output)
}
