//! Board volumes and how to find one.
//!
//! A board shows up as a removable drive whose label says what it is running:
//! `CIRCUITPY` for the interpreter, a `*BOOT` label for the UF2 bootloader.
//! [`VolumeLocator`] checks `<mount root>/<label>` in label order; the
//! OS-specific probes live in [`crate::platform`].
use std::fmt;
use std::path::{Path, PathBuf};

/// Volume label of a board running CircuitPython.
pub const CIRCUITPY_LABEL: &str = "CIRCUITPY";

/// Labels recognized by default, in precedence order: the normal-run volume
/// first, then the UF2 bootloader volumes.
pub const DEFAULT_LABELS: &[&str] = &[CIRCUITPY_LABEL, "ITSYM4BOOT", "FEATHERBOOT"];

/// A mounted board volume.
///
/// A volume has no identity beyond "a mounted path carrying one of the
/// recognized labels"; it is discovered fresh each time it is needed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Volume {
    /// The recognized label (e.g. `CIRCUITPY`).
    pub label: String,
    /// Absolute path of the mount point.
    pub path: PathBuf,
}

impl Volume {
    /// A volume supplied by the user rather than discovered.
    pub fn from_target(path: &Path) -> Self {
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            label,
            path: path.to_path_buf(),
        }
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<12} {}", self.label, self.path.display())
    }
}

/// Something that can look for a board volume right now.
pub trait VolumeProbe {
    fn locate(&self) -> Option<Volume>;

    /// The directory searched, for error reporting.
    fn root(&self) -> &Path;
}

/// Checks `<mount root>/<label>` for each recognized label, in order.
#[derive(Clone, Debug)]
pub struct VolumeLocator {
    root: PathBuf,
    labels: Vec<String>,
}

impl VolumeLocator {
    pub fn new(root: impl Into<PathBuf>, labels: &[&str]) -> Self {
        Self {
            root: root.into(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    /// Builds a locator whose root is `template` expanded from the process
    /// environment (see [`expand_mount_root`]).
    pub fn from_template(template: &str, labels: &[&str]) -> Self {
        Self::new(
            expand_mount_root(template, |var| std::env::var(var).ok()),
            labels,
        )
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl VolumeProbe for VolumeLocator {
    fn locate(&self) -> Option<Volume> {
        self.labels.iter().find_map(|label| {
            let path = self.root.join(label);
            log::trace!("checking {}", path.display());
            path.exists().then(|| Volume {
                label: label.clone(),
                path,
            })
        })
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

/// Expands a leading `~` and any `$VAR` / `${VAR}` references in `template`.
///
/// `~` expands to `$HOME`. Unknown variables expand to an empty string.
pub fn expand_mount_root(template: &str, lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    if rest == "~" || rest.starts_with("~/") {
        out.push_str(&lookup("HOME").unwrap_or_default());
        rest = &rest[1..];
    }

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, tail) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], &braced[end + 1..]),
                None => ("", after),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], &after[end..])
        };

        if name.is_empty() {
            out.push('$');
        } else {
            out.push_str(&lookup(name).unwrap_or_default());
        }
        rest = tail;
    }
    out.push_str(rest);

    PathBuf::from(out)
}
