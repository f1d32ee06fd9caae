//! Maps a source file to the sketch entry point that actually gets built.
//!
//! A sketch is a directory `foo/` whose entry point is `foo/foo.ino`. Editing
//! a header or implementation file inside it still has to build `foo.ino`,
//! so auxiliary files are resolved to the entry point of their directory.
use crate::error::{FlashError, Result};
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Extension of a sketch entry point.
pub const ENTRY_EXTENSION: &str = "ino";
/// Extension of the converted, flashable image.
pub const IMAGE_EXTENSION: &str = "uf2";
/// Build output directory, relative to the entry point's directory.
pub const BUILD_DIR: &str = "build";

/// Translation units that belong to a sketch but are not its entry point.
const AUX_EXTENSIONS: &[&str] = &["h", "hh", "hpp", "c", "cc", "cpp", "cxx"];

/// Derived names for one sketch build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SketchDescriptor {
    /// Filename of the entry point (e.g. `blink.ino`).
    pub entry_name: String,
    /// Directory the entry point lives in.
    pub entry_dir: PathBuf,
    /// Filename of the compiled binary (e.g. `blink.bin`).
    pub binary_name: String,
    /// Filename of the flashable image (e.g. `blink.uf2`).
    pub image_name: String,
}

impl SketchDescriptor {
    fn for_entry(entry_dir: &Path, entry_name: String) -> Self {
        let stem = Path::new(&entry_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| entry_name.clone());

        Self {
            binary_name: format!("{stem}.bin"),
            image_name: format!("{stem}.{IMAGE_EXTENSION}"),
            entry_name,
            entry_dir: entry_dir.to_path_buf(),
        }
    }

    pub fn entry_path(&self) -> PathBuf {
        self.entry_dir.join(&self.entry_name)
    }

    pub fn build_dir(&self) -> PathBuf {
        self.entry_dir.join(BUILD_DIR)
    }

    pub fn binary_path(&self) -> PathBuf {
        self.build_dir().join(&self.binary_name)
    }

    pub fn image_path(&self) -> PathBuf {
        self.build_dir().join(&self.image_name)
    }
}

/// Resolves the sketch entry point for `source`.
///
/// An `.ino` file is its own entry point. For an auxiliary file the entry
/// point is named after the containing directory; when that directory has no
/// usable name the parent directory is tried once before giving up.
///
/// `.` and `..` components are folded away first, so `a/src/../x.h` belongs
/// to the sketch in `a`.
///
/// # Errors
///
/// Returns [`FlashError::Resolve`] if the file is not a sketch source or no
/// directory name can be determined.
pub fn resolve(source: &Path) -> Result<SketchDescriptor> {
    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let dir = normalize(source.parent().unwrap_or(Path::new("")));

    if ext == ENTRY_EXTENSION {
        let entry_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| resolve_error(source, "missing file name"))?;
        return Ok(SketchDescriptor::for_entry(&dir, entry_name));
    }

    if !AUX_EXTENSIONS.contains(&ext.as_str()) {
        return Err(resolve_error(source, "not a sketch source file"));
    }

    let (entry_dir, name) = sketch_dir_name(&dir)
        .ok_or_else(|| resolve_error(source, "cannot determine the sketch directory name"))?;
    log::debug!(
        "{} belongs to sketch {}",
        source.display(),
        entry_dir.display()
    );
    Ok(SketchDescriptor::for_entry(
        entry_dir,
        format!("{name}.{ENTRY_EXTENSION}"),
    ))
}

/// Folds `.` and `..` components without touching the filesystem.
///
/// `..` directly below the root stays at the root; leading `..` of a relative
/// path are kept.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out
}

/// Returns the directory that names the sketch together with that name.
///
/// `dir` must already be normalized.
fn sketch_dir_name(dir: &Path) -> Option<(&Path, String)> {
    let named = |d: &Path| {
        d.file_name()
            .map(OsStr::to_string_lossy)
            .filter(|n| !n.is_empty())
            .map(|n| n.into_owned())
    };

    if let Some(name) = named(dir) {
        return Some((dir, name));
    }
    let parent = dir.parent()?;
    named(parent).map(|name| (parent, name))
}

fn resolve_error(path: &Path, reason: &str) -> FlashError {
    FlashError::Resolve {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_point_resolves_to_itself() {
        let sketch = resolve(Path::new("/work/blink/blink.ino")).unwrap();
        assert_eq!(sketch.entry_name, "blink.ino");
        assert_eq!(sketch.entry_dir, Path::new("/work/blink"));
        assert_eq!(sketch.entry_path(), Path::new("/work/blink/blink.ino"));
    }

    #[test]
    fn entry_point_need_not_match_its_directory() {
        let sketch = resolve(Path::new("/work/project/main.ino")).unwrap();
        assert_eq!(sketch.entry_name, "main.ino");
        assert_eq!(sketch.image_path(), Path::new("/work/project/build/main.uf2"));
        assert_eq!(sketch.binary_path(), Path::new("/work/project/build/main.bin"));
    }

    #[test]
    fn aux_files_resolve_to_their_directory_name() {
        for file in ["thing.h", "thing.cpp", "thing.C", "thing.hpp"] {
            let source = Path::new("project/src").join(file);
            let sketch = resolve(&source).unwrap();
            assert_eq!(sketch.entry_name, "src.ino", "for {file}");
            assert_eq!(sketch.entry_dir, Path::new("project/src"));
            assert_eq!(sketch.binary_name, "src.bin");
            assert_eq!(sketch.image_name, "src.uf2");
        }
    }

    #[test]
    fn parent_components_climb_out_of_the_directory() {
        let sketch = resolve(Path::new("/work/project/src/../thing.h")).unwrap();
        assert_eq!(sketch.entry_name, "project.ino");
        assert_eq!(sketch.entry_dir, Path::new("/work/project"));
        assert_eq!(sketch.image_path(), Path::new("/work/project/build/project.uf2"));

        let sketch = resolve(Path::new("/work/./blink/leds/../leds.cpp")).unwrap();
        assert_eq!(sketch.entry_name, "blink.ino");
        assert_eq!(sketch.entry_dir, Path::new("/work/blink"));
    }

    #[test]
    fn entry_point_directory_is_normalized() {
        let sketch = resolve(Path::new("/work/blink/build/../blink.ino")).unwrap();
        assert_eq!(sketch.entry_dir, Path::new("/work/blink"));
    }

    #[test]
    fn climbing_past_the_root_is_an_error() {
        let err = resolve(Path::new("/work/../../thing.h")).unwrap_err();
        assert!(matches!(err, FlashError::Resolve { .. }));
    }

    #[test]
    fn normalize_keeps_leading_parents_of_relative_paths() {
        assert_eq!(normalize(Path::new("../a/./b/..")), Path::new("../a"));
        assert_eq!(normalize(Path::new("/..")), Path::new("/"));
        assert_eq!(normalize(Path::new("a/..")), Path::new(""));
    }

    #[test]
    fn unresolvable_directory_is_an_error() {
        let err = resolve(Path::new("/thing.h")).unwrap_err();
        assert!(matches!(err, FlashError::Resolve { .. }));
    }

    #[test]
    fn non_sketch_files_are_rejected() {
        let err = resolve(Path::new("/work/code.py")).unwrap_err();
        assert!(err.to_string().contains("not a sketch source"));
    }
}
