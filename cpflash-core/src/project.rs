//! Per-run configuration: what to build, where the tools live, and which
//! workflow to run.
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Executable name of the sketch compiler.
pub const COMPILER_BIN: &str = "arduino";
/// Executable name of the binary-to-UF2 converter.
pub const CONVERTER_BIN: &str = "uf2conv.py";
/// Executable name of the script compiler.
pub const SCRIPT_COMPILER_BIN: &str = "mpy-cross";

/// The workflow to run for a source file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Action {
    /// Copy the script to the volume as `main.py`.
    #[default]
    CopyAsMain,
    /// Copy the script to the volume as `code.py`.
    CopyAsCode,
    /// Copy the script, keeping its filename.
    Copy,
    /// Compile the script to `.mpy` and copy the result.
    CopyCompile,
    /// Copy the file into the volume's `lib/` directory.
    Lib,
    /// Compile to `.mpy` and copy into the volume's `lib/` directory.
    LibCompile,
    /// Build a sketch, convert it to UF2 and deliver it through the bootloader.
    Uf2,
}

impl Action {
    /// All actions, in the order they are listed to users.
    pub const ALL: [Action; 7] = [
        Action::CopyAsMain,
        Action::CopyAsCode,
        Action::Copy,
        Action::CopyCompile,
        Action::Lib,
        Action::LibCompile,
        Action::Uf2,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::CopyAsMain => "copy-as-main",
            Action::CopyAsCode => "copy-as-code",
            Action::Copy => "copy",
            Action::CopyCompile => "copy-compile",
            Action::Lib => "lib",
            Action::LibCompile => "lib-compile",
            Action::Uf2 => "uf2",
        }
    }

    /// Whether the action runs the script compiler before delivery.
    pub fn compiles_script(self) -> bool {
        matches!(self, Action::CopyCompile | Action::LibCompile)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase().replace('_', "-");
        Action::ALL
            .into_iter()
            .find(|action| action.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<_> = Action::ALL.iter().map(|a| a.name()).collect();
                format!("unknown action '{s}' [available: {}]", names.join(", "))
            })
    }
}

/// Immutable configuration for one invocation.
#[derive(Clone, Debug)]
pub struct Project {
    /// Root directory of the project.
    pub root: PathBuf,
    /// Source file, absolute or relative to `root`.
    pub source: PathBuf,
    /// Directory holding the sketch compiler; `PATH` lookup when unset.
    pub compiler_dir: Option<PathBuf>,
    /// Directory holding the UF2 converter; `PATH` lookup when unset.
    pub converter_dir: Option<PathBuf>,
    /// Directory holding the script compiler; `PATH` lookup when unset.
    pub script_compiler_dir: Option<PathBuf>,
    /// Volume to deliver to, bypassing reset and discovery.
    pub target: Option<PathBuf>,
    /// Verbosity requested by the user (0 = quiet).
    pub verbose: u8,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>, source: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            source: source.into(),
            compiler_dir: None,
            converter_dir: None,
            script_compiler_dir: None,
            target: None,
            verbose: 0,
        }
    }

    /// The source file as an absolute path.
    pub fn source_path(&self) -> PathBuf {
        let joined = self.root.join(&self.source);
        std::path::absolute(&joined).unwrap_or(joined)
    }

    pub fn compiler(&self) -> PathBuf {
        tool_path(self.compiler_dir.as_deref(), COMPILER_BIN)
    }

    pub fn converter(&self) -> PathBuf {
        tool_path(self.converter_dir.as_deref(), CONVERTER_BIN)
    }

    pub fn script_compiler(&self) -> PathBuf {
        tool_path(self.script_compiler_dir.as_deref(), SCRIPT_COMPILER_BIN)
    }
}

fn tool_path(dir: Option<&Path>, bin: &str) -> PathBuf {
    match dir {
        Some(dir) => dir.join(bin),
        None => PathBuf::from(bin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_parse_from_their_names() {
        for action in Action::ALL {
            assert_eq!(action.name().parse::<Action>(), Ok(action));
        }
        assert_eq!("COPY_AS_CODE".parse::<Action>(), Ok(Action::CopyAsCode));
        assert!("flash".parse::<Action>().unwrap_err().contains("uf2"));
    }

    #[test]
    fn relative_sources_resolve_against_the_root() {
        let project = Project::new("/work/blink", "src/blink.ino");
        assert_eq!(project.source_path(), Path::new("/work/blink/src/blink.ino"));

        let project = Project::new("/work/blink", "/elsewhere/main.py");
        assert_eq!(project.source_path(), Path::new("/elsewhere/main.py"));
    }

    #[test]
    fn tools_fall_back_to_path_lookup() {
        let mut project = Project::new(".", "main.ino");
        assert_eq!(project.compiler(), Path::new("arduino"));

        project.converter_dir = Some("/opt/uf2/utils".into());
        assert_eq!(project.converter(), Path::new("/opt/uf2/utils/uf2conv.py"));
    }
}
