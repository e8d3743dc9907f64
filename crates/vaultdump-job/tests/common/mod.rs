//! Shared fixtures: stub tools and a recording store.

#![allow(dead_code)]

use std::fs;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use flate2::read::GzDecoder;
use vaultdump_store::{RemoteStore, StoreError};

/// Write an executable shell script.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// An export tool that writes `a.txt` into its `--out` directory after
/// sleeping `sleep_secs`, and appends one line to `log` per invocation.
pub fn stub_export(dir: &Path, sleep_secs: &str, log: &Path) -> PathBuf {
    write_script(
        dir,
        "stub-export",
        &format!(
            r#"out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --out) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo invoked >> "{log}"
sleep {sleep_secs}
printf 'hello' > "$out/a.txt"
echo "wrote $out/a.txt""#,
            log = log.display(),
        ),
    )
}

/// Extract every regular file in a .tar.gz into (relative path, contents).
pub fn read_archive(path: &Path) -> Vec<(String, Vec<u8>)> {
    let file = fs::File::open(path).unwrap();
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut entries = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry
            .path()
            .unwrap()
            .to_string_lossy()
            .trim_start_matches("./")
            .to_string();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        entries.push((name, data));
    }
    entries.sort();
    entries
}

/// Copies each uploaded file into `dest` under its key, or always fails.
pub struct RecordingStore {
    dest: PathBuf,
    fail: bool,
    pub calls: AtomicU32,
    pub keys: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new(dest: &Path) -> Self {
        Self {
            dest: dest.to_path_buf(),
            fail: false,
            calls: AtomicU32::new(0),
            keys: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(dest: &Path) -> Self {
        Self {
            fail: true,
            ..Self::new(dest)
        }
    }

    pub fn stored(&self, key: &str) -> PathBuf {
        self.dest.join(key)
    }
}

#[async_trait]
impl RemoteStore for RecordingStore {
    async fn put_file(&self, local_path: &Path, key: &str) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StoreError::Remote {
                key: key.to_string(),
                message: "bucket unavailable".to_string(),
            });
        }
        let target = self.dest.join(key);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::copy(local_path, &target).map_err(|e| StoreError::Open {
            path: local_path.to_path_buf(),
            source: Box::new(e),
        })?;
        self.keys.lock().unwrap().push(key.to_string());
        Ok(())
    }

    fn location(&self, key: &str) -> String {
        format!("memory://{key}")
    }
}
