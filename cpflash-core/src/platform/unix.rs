use crate::volume::{Volume, VolumeLocator, VolumeProbe};
use std::path::Path;

/// Where the desktop automounter places removable media.
#[cfg(target_os = "macos")]
pub const DEFAULT_MOUNT_ROOT: &str = "/Volumes";
#[cfg(not(target_os = "macos"))]
pub const DEFAULT_MOUNT_ROOT: &str = "/media/$USER";

/// The CDC-ACM node a freshly plugged board shows up as.
#[cfg(target_os = "macos")]
pub const DEFAULT_CONTROL_PORT: &str = "/dev/cu.usbmodem1101";
#[cfg(not(target_os = "macos"))]
pub const DEFAULT_CONTROL_PORT: &str = "/dev/ttyACM0";

/// The probe a front-end should wait on: `<mount root>/<label>` for each label.
pub fn default_probe(labels: &'static [&'static str]) -> Box<dyn VolumeProbe> {
    Box::new(VolumeLocator::from_template(DEFAULT_MOUNT_ROOT, labels))
}

/// Helper to match a mount point against the recognized labels.
///
/// Automounters name the mount point after the filesystem label, so the last
/// path component is the label.
fn label_of(mount_point: &Path, labels: &[&str]) -> Option<usize> {
    let name = mount_point.file_name()?.to_string_lossy();
    labels.iter().position(|label| *label == name)
}

/// Lists every mounted volume that carries one of `labels`.
///
/// Unlike [`crate::volume::VolumeLocator`], which only probes the configured
/// mount root, this asks the OS for its full mount table, so boards mounted
/// somewhere unexpected still show up.
///
/// Volumes are returned in label precedence order.
pub fn mounted_volumes(labels: &[&str]) -> Vec<Volume> {
    let disks = sysinfo::Disks::new_with_refreshed_list();

    let mut found: Vec<(usize, Volume)> = disks
        .iter()
        .filter_map(|disk| {
            let mount_point = disk.mount_point();
            let rank = label_of(mount_point, labels)?;
            Some((
                rank,
                Volume {
                    label: labels[rank].to_string(),
                    path: mount_point.to_path_buf(),
                },
            ))
        })
        .collect();

    found.sort_by_key(|(rank, _)| *rank);
    found.into_iter().map(|(_, volume)| volume).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_come_from_the_last_component() {
        let labels = ["CIRCUITPY", "ITSYM4BOOT"];
        assert_eq!(label_of(Path::new("/media/ada/ITSYM4BOOT"), &labels), Some(1));
        assert_eq!(label_of(Path::new("/media/ada/CIRCUITPY"), &labels), Some(0));
        assert_eq!(label_of(Path::new("/media/ada/USBSTICK"), &labels), None);
        assert_eq!(label_of(Path::new("/"), &labels), None);
    }

    #[test]
    fn default_probe_expands_the_mount_root() {
        let probe = default_probe(&["CIRCUITPY"]);
        assert!(!probe.root().to_string_lossy().contains('$'));
    }
}
