use crate::volume::{Volume, VolumeProbe};
use std::path::Path;

/// Root of the system drive. Windows mounts board volumes on their own drive
/// letters, so [`default_probe`] asks the mount table instead of probing
/// below this root.
pub const DEFAULT_MOUNT_ROOT: &str = "${SystemDrive}\\";

/// The COM port a freshly plugged board usually enumerates as.
pub const DEFAULT_CONTROL_PORT: &str = "COM3";

/// Lists every mounted volume whose filesystem label is one of `labels`.
///
/// Volumes are returned in label precedence order.
pub fn mounted_volumes(labels: &[&str]) -> Vec<Volume> {
    let disks = sysinfo::Disks::new_with_refreshed_list();

    let mut found: Vec<(usize, Volume)> = disks
        .iter()
        .filter_map(|disk| {
            let name = disk.name().to_string_lossy();
            let rank = labels.iter().position(|label| *label == name)?;
            Some((
                rank,
                Volume {
                    label: labels[rank].to_string(),
                    path: disk.mount_point().to_path_buf(),
                },
            ))
        })
        .collect();

    found.sort_by_key(|(rank, _)| *rank);
    found.into_iter().map(|(_, volume)| volume).collect()
}

/// Finds board volumes by label in the OS mount table, on every drive letter.
pub struct MountTable {
    labels: &'static [&'static str],
}

impl VolumeProbe for MountTable {
    fn locate(&self) -> Option<Volume> {
        mounted_volumes(self.labels).into_iter().next()
    }

    fn root(&self) -> &Path {
        Path::new("the mounted drives")
    }
}

/// The probe a front-end should wait on: the mount table, in label order.
pub fn default_probe(labels: &'static [&'static str]) -> Box<dyn VolumeProbe> {
    Box::new(MountTable { labels })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_table_only_reports_recognized_labels() {
        let labels: &'static [&'static str] = &["NO-SUCH-BOARD-LABEL"];
        assert_eq!(default_probe(labels).locate(), None);
    }
}
