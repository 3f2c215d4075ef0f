//! Block device listing through `lsblk`.

use super::run_tool;
use blkcrypt_core::{
    shell, AttributeMap, BlkcryptError, CommandRunner, Config, DeviceIdentifier, Result,
};
use nix::sys::stat::{stat, SFlag};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Span;

/// Columns requested for a single device, in the order passed to `lsblk -o`.
pub const LSBLK_FIELDS: [&str; 29] = [
    "NAME",
    "KNAME",
    "MAJ:MIN",
    "FSTYPE",
    "MOUNTPOINT",
    "LABEL",
    "UUID",
    "RA",
    "RO",
    "RM",
    "MODEL",
    "SIZE",
    "STATE",
    "OWNER",
    "GROUP",
    "MODE",
    "ALIGNMENT",
    "MIN-IO",
    "OPT-IO",
    "PHY-SEC",
    "LOG-SEC",
    "ROTA",
    "SCHED",
    "RQ-SIZE",
    "TYPE",
    "DISC-ALN",
    "DISC-GRAN",
    "DISC-MAX",
    "DISC-ZERO",
];

/// Result of [`Lsblk::list`]: one device's attributes, or every device path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    Attributes(AttributeMap),
    Devices(Vec<String>),
}

pub struct Lsblk {
    runner: Arc<dyn CommandRunner>,
    tool: String,
    dev_root: PathBuf,
    span: Span,
}

impl Lsblk {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &Config) -> Self {
        Self {
            runner,
            tool: config.tools.lsblk.clone(),
            dev_root: config.dev_root.clone(),
            span: tracing::debug_span!("lsblk"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Attributes of a single device, keyed by `lsblk` column name.
    pub fn info(&self, device_path: &str) -> Result<AttributeMap> {
        let _enter = self.span.enter();

        let command_line = format!(
            "{} -b -d -i -n -P -o {} {}",
            self.tool,
            LSBLK_FIELDS.join(","),
            device_path
        );
        let output = run_tool(self.runner.as_ref(), &self.tool, &command_line)?;
        if !output.success() {
            return Err(BlkcryptError::ListBlockDevice(output.stderr.trim().to_string()));
        }

        parse_pairs(&output.stdout)
    }

    /// Every device path on the host, enumerated by `by`.
    ///
    /// Paths are kept in `lsblk` order, and only those that exist under the
    /// device root are returned.
    pub fn devices(&self, by: DeviceIdentifier) -> Result<Vec<String>> {
        let _enter = self.span.enter();

        let command_line = format!("{} -b -a -l -i -n -o {}", self.tool, by);
        let output = run_tool(self.runner.as_ref(), &self.tool, &command_line)?;
        if !output.success() {
            return Err(BlkcryptError::ListBlockDevice(output.stderr.trim().to_string()));
        }

        let mut devices = Vec::new();
        for line in output.stdout.trim().lines() {
            let Some(token) = line.split_whitespace().next() else {
                continue;
            };

            match self
                .candidate_paths(by, token)
                .into_iter()
                .find(|path| path.exists())
            {
                Some(path) => devices.push(path.to_string_lossy().into_owned()),
                None => tracing::debug!(token, "no device node found, skipping"),
            }
        }

        Ok(devices)
    }

    /// Like [`Lsblk::devices`], parsing the identifier column first. An unknown
    /// column is rejected before `lsblk` runs.
    pub fn devices_named(&self, by: &str) -> Result<Vec<String>> {
        let by: DeviceIdentifier = by.parse()?;
        self.devices(by)
    }

    pub fn list(&self, device_path: Option<&str>, by: &str) -> Result<Listing> {
        match device_path {
            Some(path) => self.info(path).map(Listing::Attributes),
            None => self.devices_named(by).map(Listing::Devices),
        }
    }

    fn candidate_paths(&self, by: DeviceIdentifier, token: &str) -> Vec<PathBuf> {
        match by {
            DeviceIdentifier::Uuid => vec![self.dev_root.join("disk/by-uuid").join(token)],
            DeviceIdentifier::Label => vec![self.dev_root.join("disk/by-label").join(token)],
            DeviceIdentifier::Name | DeviceIdentifier::Kname => vec![
                self.dev_root.join(token),
                self.dev_root.join("mapper").join(token),
            ],
        }
    }
}

/// Parse `lsblk -P` output (`KEY="value"` pairs) into an attribute map.
///
/// Only requested columns are kept. Newer `lsblk` releases print `MAJ_MIN`
/// for `MAJ:MIN` and `MIN_IO` for `MIN-IO`; those are stored under the
/// requested spelling.
pub fn parse_pairs(stdout: &str) -> Result<AttributeMap> {
    let mut data = AttributeMap::new();

    for token in shell::split(stdout.trim())? {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        if let Some(field) = requested_field(key) {
            data.insert(field.to_string(), value.trim().to_string());
        }
    }

    Ok(data)
}

fn requested_field(key: &str) -> Option<&'static str> {
    LSBLK_FIELDS.iter().copied().find(|field| {
        *field == key || field.replace(|c: char| c == ':' || c == '-', "_") == key
    })
}

/// Whether `path` is a block special file.
pub fn is_block_device(path: impl AsRef<Path>) -> Result<bool> {
    let st = stat(path.as_ref()).map_err(std::io::Error::from)?;
    Ok(SFlag::from_bits_truncate(st.st_mode & SFlag::S_IFMT.bits()) == SFlag::S_IFBLK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blkcrypt_core::test_utils::MockCommandRunner;
    use std::fs;

    const SDA1_LEGACY: &str = r#"NAME="sda1" KNAME="sda1" MAJ:MIN="8:1" FSTYPE="ext4" MOUNTPOINT="/boot" LABEL="" UUID="0b9c6f1e-5c61-4a4b-9f3e-2d1b4c8e7a10" RA="128" RO="0" RM="0" MODEL="" SIZE="536870912" STATE="" OWNER="root" GROUP="disk" MODE="brw-rw----" ALIGNMENT="0" MIN-IO="512" OPT-IO="0" PHY-SEC="512" LOG-SEC="512" ROTA="0" SCHED="mq-deadline" RQ-SIZE="64" TYPE="part" DISC-ALN="0" DISC-GRAN="512" DISC-MAX="2147450880" DISC-ZERO="0"
"#;

    const SDA_MODERN: &str = r#"NAME="sda" KNAME="sda" MAJ_MIN="8:0" FSTYPE="" MOUNTPOINT="" LABEL="" UUID="" RA="128" RO="0" RM="0" MODEL="Samsung SSD 860 EVO 500GB" SIZE="500107862016" STATE="running" OWNER="root" GROUP="disk" MODE="brw-rw----" ALIGNMENT="0" MIN_IO="512" OPT_IO="0" PHY_SEC="512" LOG_SEC="512" ROTA="0" SCHED="mq-deadline" RQ_SIZE="64" TYPE="disk" DISC_ALN="0" DISC_GRAN="512" DISC_MAX="2147450880" DISC_ZERO="0"
"#;

    fn info_command(device: &str) -> String {
        format!("lsblk -b -d -i -n -P -o {} {}", LSBLK_FIELDS.join(","), device)
    }

    fn lister(runner: &MockCommandRunner, dev_root: &Path) -> Lsblk {
        let config = Config {
            dev_root: dev_root.to_path_buf(),
            ..Config::default()
        };
        Lsblk::new(Arc::new(runner.clone()), &config)
    }

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn parses_every_requested_field() {
        let data = parse_pairs(SDA1_LEGACY).unwrap();
        assert_eq!(data.len(), LSBLK_FIELDS.len());
        assert_eq!(data["TYPE"], "part");
        assert_eq!(data["FSTYPE"], "ext4");
        assert_eq!(data["MAJ:MIN"], "8:1");
        assert_eq!(data["LABEL"], "");
        assert_eq!(data["SIZE"], "536870912");
    }

    #[test]
    fn keeps_quoted_spaces_and_normalizes_underscore_columns() {
        let data = parse_pairs(SDA_MODERN).unwrap();
        assert_eq!(data["MODEL"], "Samsung SSD 860 EVO 500GB");
        assert_eq!(data["MAJ:MIN"], "8:0");
        assert_eq!(data["MIN-IO"], "512");
        assert_eq!(data["RQ-SIZE"], "64");
        assert!(!data.contains_key("MAJ_MIN"));
        assert_eq!(data.len(), LSBLK_FIELDS.len());
    }

    #[test]
    fn drops_unrequested_keys_and_fragments() {
        let data = parse_pairs(r#"NAME="sdb" PARTUUID="abcd" stray TYPE="disk""#).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data["NAME"], "sdb");
        assert_eq!(data["TYPE"], "disk");
    }

    #[test]
    fn parsing_is_idempotent() {
        assert_eq!(parse_pairs(SDA1_LEGACY).unwrap(), parse_pairs(SDA1_LEGACY).unwrap());
    }

    #[test]
    fn info_runs_lsblk_for_the_device() {
        let runner = MockCommandRunner::new().succeed(&info_command("/dev/sda1"), SDA1_LEGACY);
        let dir = tempfile::tempdir().unwrap();

        let data = lister(&runner, dir.path()).info("/dev/sda1").unwrap();
        assert_eq!(data["NAME"], "sda1");
        assert_eq!(runner.calls(), vec![info_command("/dev/sda1")]);
    }

    #[test]
    fn info_failure_carries_stderr() {
        let runner = MockCommandRunner::new().fail(
            &info_command("/dev/nope"),
            "lsblk: /dev/nope: not a block device\n",
        );
        let dir = tempfile::tempdir().unwrap();

        let err = lister(&runner, dir.path()).info("/dev/nope").unwrap_err();
        match err {
            BlkcryptError::ListBlockDevice(msg) => {
                assert_eq!(msg, "lsblk: /dev/nope: not a block device")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn devices_by_name_keep_order_and_fall_back_to_mapper() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "sdb");
        touch(dir.path(), "sda1");
        touch(dir.path(), "mapper/vg0-root");

        let runner = MockCommandRunner::new().succeed(
            "lsblk -b -a -l -i -n -o NAME",
            "sdb\nsda1\n\n   \nvg0-root\nloop7\n",
        );

        let devices = lister(&runner, dir.path())
            .devices(DeviceIdentifier::Name)
            .unwrap();
        let root = dir.path().to_string_lossy();
        assert_eq!(
            devices,
            vec![
                format!("{root}/sdb"),
                format!("{root}/sda1"),
                format!("{root}/mapper/vg0-root"),
            ]
        );
    }

    #[test]
    fn devices_by_uuid_and_label_use_disk_links() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "disk/by-uuid/1111-2222");
        touch(dir.path(), "disk/by-label/data");

        let runner = MockCommandRunner::new()
            .succeed("lsblk -b -a -l -i -n -o UUID", "\n1111-2222\n3333-4444\n")
            .succeed("lsblk -b -a -l -i -n -o LABEL", "data\nghost\n");
        let lsblk = lister(&runner, dir.path());
        let root = dir.path().to_string_lossy();

        assert_eq!(
            lsblk.devices(DeviceIdentifier::Uuid).unwrap(),
            vec![format!("{root}/disk/by-uuid/1111-2222")]
        );
        assert_eq!(
            lsblk.devices(DeviceIdentifier::Label).unwrap(),
            vec![format!("{root}/disk/by-label/data")]
        );
    }

    #[test]
    fn nonexistent_paths_are_excluded_for_every_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockCommandRunner::new();
        for by in DeviceIdentifier::ALL {
            runner = runner.succeed(&format!("lsblk -b -a -l -i -n -o {by}"), "ghost\n");
        }
        let lsblk = lister(&runner, dir.path());

        for by in DeviceIdentifier::ALL {
            assert!(lsblk.devices(by).unwrap().is_empty(), "{by} reported a ghost");
        }
    }

    #[test]
    fn invalid_identifier_fails_before_running_lsblk() {
        let runner = MockCommandRunner::new();
        let dir = tempfile::tempdir().unwrap();

        let err = lister(&runner, dir.path()).devices_named("PARTUUID").unwrap_err();
        assert!(matches!(err, BlkcryptError::InvalidIdentifier(_)));
        assert_eq!(runner.call_count(), 0);
    }

    #[test]
    fn list_dispatches_on_device_argument() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "sda1");
        let runner = MockCommandRunner::new()
            .succeed("lsblk -b -a -l -i -n -o KNAME", "sda1\n")
            .succeed(&info_command("/dev/sda1"), SDA1_LEGACY);
        let lsblk = lister(&runner, dir.path());

        match lsblk.list(None, "KNAME").unwrap() {
            Listing::Devices(devices) => assert_eq!(devices.len(), 1),
            other => panic!("expected devices, got {other:?}"),
        }
        match lsblk.list(Some("/dev/sda1"), "bogus").unwrap() {
            Listing::Attributes(data) => assert_eq!(data["UUID"], "0b9c6f1e-5c61-4a4b-9f3e-2d1b4c8e7a10"),
            other => panic!("expected attributes, got {other:?}"),
        }
    }

    #[test]
    fn enumeration_failure_carries_stderr() {
        let runner = MockCommandRunner::new().fail("lsblk -b -a -l -i -n -o NAME", "boom\n");
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            lister(&runner, dir.path()).devices(DeviceIdentifier::Name),
            Err(BlkcryptError::ListBlockDevice(msg)) if msg == "boom"
        ));
    }

    #[test]
    fn regular_and_character_files_are_not_block_devices() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(!is_block_device(file.path()).unwrap());
        assert!(!is_block_device("/dev/null").unwrap());
    }

    #[test]
    fn real_block_node_is_detected() {
        use std::os::unix::fs::FileTypeExt;

        let Ok(entries) = fs::read_dir("/dev") else {
            return;
        };
        let node = entries.flatten().find(|entry| {
            entry
                .file_type()
                .map(|kind| kind.is_block_device())
                .unwrap_or(false)
        });
        // Containers often ship a /dev without any block nodes.
        let Some(node) = node else {
            return;
        };
        assert!(is_block_device(node.path()).unwrap());
    }

    #[test]
    fn stat_failure_is_an_error() {
        assert!(matches!(
            is_block_device("/nonexistent/blkcrypt/dev"),
            Err(BlkcryptError::IoError(_))
        ));
    }
}
