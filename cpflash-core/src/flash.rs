//! Sequences resolving, building, resetting, waiting and copying into the
//! workflows behind each [`Action`].
//!
//! The UF2 workflow walks through these states:
//!
//! ```text
//! Compiling -> Converting -> AwaitingVolume -> Copying -> Done
//!      \            \               \              \
//!       +------------+---------------+--------------+--> Failed
//! ```
//!
//! Script workflows skip the UF2 steps: they optionally compile to `.mpy`,
//! locate the volume once and copy.
use crate::deliver::Copier;
use crate::error::{FlashError, Result};
use crate::poll::poll;
use crate::project::{Action, Project};
use crate::reset::{BoardResetter, PortOpener, SETTLE_DELAY};
use crate::sketch;
use crate::toolchain::{self, ToolRunner};
use crate::volume::{Volume, VolumeProbe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Workflow progress, reported through the state callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlashState {
    Compiling,
    Converting,
    AwaitingVolume,
    Copying,
    Done,
    Failed,
}

/// Timing and port settings for the UF2 workflow.
#[derive(Clone, Debug)]
pub struct FlashOptions {
    /// Control port used to request the bootloader.
    pub port: String,
    /// Pause between two looks for the volume.
    pub poll_interval: Duration,
    /// How long to wait for the volume to mount.
    pub poll_timeout: Duration,
    /// How long DTR stays asserted during a reset.
    pub settle: Duration,
}

impl Default for FlashOptions {
    fn default() -> Self {
        Self {
            port: crate::platform::DEFAULT_CONTROL_PORT.to_string(),
            poll_interval: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(10),
            settle: SETTLE_DELAY,
        }
    }
}

/// Outcome of a successful run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlashReport {
    /// The file that was delivered.
    pub artifact: PathBuf,
    /// The volume it was delivered to.
    pub volume: Volume,
    /// Where it landed.
    pub destination: PathBuf,
}

/// Where a script lands on the volume.
#[derive(Clone, Copy, Debug)]
enum Placement {
    /// At the volume root under a fixed name.
    Renamed(&'static str),
    /// At the volume root, keeping its name.
    KeepName,
    /// Under `lib/`, keeping its path below the project's `lib/`.
    Library,
}

/// Runs workflows against injected collaborators.
pub struct Flasher<'a> {
    runner: &'a dyn ToolRunner,
    ports: &'a dyn PortOpener,
    volumes: &'a dyn VolumeProbe,
    copier: &'a dyn Copier,
    options: FlashOptions,
}

impl<'a> Flasher<'a> {
    pub fn new(
        runner: &'a dyn ToolRunner,
        ports: &'a dyn PortOpener,
        volumes: &'a dyn VolumeProbe,
        copier: &'a dyn Copier,
    ) -> Self {
        Self {
            runner,
            ports,
            volumes,
            copier,
            options: FlashOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FlashOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs `action` for `project`.
    ///
    /// # Arguments
    ///
    /// * `running` - Cleared by the caller to cancel; an interrupted wait for
    ///   the volume ends as [`FlashError::VolumeNotFound`].
    /// * `on_state` - Called on every state change, ending with either
    ///   [`FlashState::Done`] or [`FlashState::Failed`].
    ///
    /// # Errors
    ///
    /// Returns the classified failure of the first phase that failed. Nothing
    /// is delivered after a failed build, and nothing is retried.
    pub fn run(
        &self,
        action: Action,
        project: &Project,
        running: Arc<AtomicBool>,
        mut on_state: impl FnMut(FlashState),
    ) -> Result<FlashReport> {
        log::info!("Running {} for {}", action, project.source.display());

        let compile = action.compiles_script();
        let result = match action {
            Action::Uf2 => self.flash_uf2(project, &running, &mut on_state),
            Action::CopyAsMain => {
                self.deliver_script(project, Placement::Renamed("main.py"), compile, &mut on_state)
            }
            Action::CopyAsCode => {
                self.deliver_script(project, Placement::Renamed("code.py"), compile, &mut on_state)
            }
            Action::Copy | Action::CopyCompile => {
                self.deliver_script(project, Placement::KeepName, compile, &mut on_state)
            }
            Action::Lib | Action::LibCompile => {
                self.deliver_script(project, Placement::Library, compile, &mut on_state)
            }
        };

        match &result {
            Ok(report) => {
                log::info!("Delivered {}", report.destination.display());
                on_state(FlashState::Done);
            }
            Err(e) => {
                log::debug!("{action} failed: {e}");
                on_state(FlashState::Failed);
            }
        }
        result
    }

    fn flash_uf2(
        &self,
        project: &Project,
        running: &AtomicBool,
        on_state: &mut dyn FnMut(FlashState),
    ) -> Result<FlashReport> {
        on_state(FlashState::Compiling);
        let sketch = sketch::resolve(&project.source_path())?;
        log::info!("Compiling {}", sketch.entry_path().display());
        toolchain::compile_sketch(self.runner, &project.compiler(), &sketch, project.verbose)?;

        on_state(FlashState::Converting);
        log::info!("Converting {}", sketch.binary_path().display());
        toolchain::convert_image(self.runner, &project.converter(), &sketch)?;

        on_state(FlashState::AwaitingVolume);
        let volume = match &project.target {
            Some(target) => Volume::from_target(target),
            None => {
                self.request_bootloader();
                self.await_volume(running)?
            }
        };

        on_state(FlashState::Copying);
        let destination = volume.path.join(&sketch.image_name);
        self.deliver(sketch.image_path(), volume, destination)
    }

    fn deliver_script(
        &self,
        project: &Project,
        placement: Placement,
        compile: bool,
        on_state: &mut dyn FnMut(FlashState),
    ) -> Result<FlashReport> {
        let source = project.source_path();
        let artifact = if compile {
            on_state(FlashState::Compiling);
            toolchain::compile_script(self.runner, &project.script_compiler(), &source)?
        } else {
            source.clone()
        };

        on_state(FlashState::AwaitingVolume);
        let volume = match &project.target {
            Some(target) => Volume::from_target(target),
            None => self.volumes.locate().ok_or_else(|| FlashError::VolumeNotFound {
                root: self.volumes.root().to_path_buf(),
            })?,
        };

        on_state(FlashState::Copying);
        let destination = match placement {
            Placement::Renamed(name) => volume.path.join(name),
            Placement::KeepName => volume.path.join(file_name(&artifact)),
            Placement::Library => volume
                .path
                .join("lib")
                .join(library_path(project, &source, &artifact)),
        };
        self.deliver(artifact, volume, destination)
    }

    /// Asks the board to enter its bootloader. Failure only means no reset was
    /// possible; the board may already be sitting in its bootloader.
    fn request_bootloader(&self) {
        let mut resetter =
            BoardResetter::new(self.ports, self.options.port.as_str()).with_settle(self.options.settle);
        if let Err(e) = resetter.request_bootloader() {
            log::warn!("{e}; waiting for an already mounted volume");
        }
    }

    fn await_volume(&self, running: &AtomicBool) -> Result<Volume> {
        log::info!(
            "Waiting up to {:?} for a volume in {}",
            self.options.poll_timeout,
            self.volumes.root().display()
        );
        let found = poll(
            || self.volumes.locate(),
            self.options.poll_interval,
            self.options.poll_timeout,
            running,
        );

        if found.is_none() && !running.load(Ordering::SeqCst) {
            log::warn!("Interrupted while waiting for the volume");
        }
        found.ok_or_else(|| FlashError::VolumeNotFound {
            root: self.volumes.root().to_path_buf(),
        })
    }

    fn deliver(&self, artifact: PathBuf, volume: Volume, destination: PathBuf) -> Result<FlashReport> {
        log::info!(
            "Copying {} to {}",
            artifact.display(),
            destination.display()
        );
        self.copier
            .copy(&artifact, &destination)
            .map_err(|source| FlashError::Copy {
                from: artifact.clone(),
                to: destination.clone(),
                source,
            })?;

        Ok(FlashReport {
            artifact,
            volume,
            destination,
        })
    }
}

fn file_name(path: &Path) -> PathBuf {
    path.file_name().map(PathBuf::from).unwrap_or_default()
}

/// Path of a library file below the volume's `lib/`.
///
/// Files inside the project's `lib/` keep their sub-directories; anything
/// else lands directly in `lib/`. The extension follows the artifact, so a
/// compiled library keeps its `.mpy` extension.
fn library_path(project: &Project, source: &Path, artifact: &Path) -> PathBuf {
    let lib_root = std::path::absolute(project.root.join("lib"))
        .unwrap_or_else(|_| project.root.join("lib"));

    let relative = source
        .strip_prefix(&lib_root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| file_name(source));

    match artifact.extension() {
        Some(ext) => relative.with_extension(ext),
        None => relative,
    }
}
