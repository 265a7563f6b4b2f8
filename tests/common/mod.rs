//! Shared fixtures for integration tests
//!
//! `FakeEngine` stands in for a database cluster: a data directory of plain
//! files and a log directory where every write lands in the current segment.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tempfile::TempDir;
use walkdir::WalkDir;

use walvault::codec::ArtifactCodec;
use walvault::config::settings::KdfSettings;
use walvault::config::{Settings, VaultPaths};
use walvault::crypto::SecureString;
use walvault::engine::SourceEngine;
use walvault::offsite::OffsiteTransport;
use walvault::orchestrator::Orchestrator;
use walvault::VaultResult;

pub const PASSWORD: &str = "correct horse battery staple";

struct EngineState {
    segment: u32,
    dirty: bool,
    switches: u32,
}

/// In-process engine over two plain directories
#[derive(Clone)]
pub struct FakeEngine {
    data_dir: PathBuf,
    wal_dir: PathBuf,
    state: Rc<RefCell<EngineState>>,
}

pub fn segment_name(n: u32) -> String {
    format!("{:08X}{:08X}{:08X}", 1, 0, n)
}

impl FakeEngine {
    pub fn new(root: &Path) -> Self {
        let data_dir = root.join("cluster");
        let wal_dir = root.join("cluster_wal");
        fs::create_dir_all(data_dir.join("base").join("1")).unwrap();
        fs::create_dir_all(data_dir.join("global")).unwrap();
        fs::create_dir_all(&wal_dir).unwrap();

        fs::write(data_dir.join("PG_VERSION"), "16\n").unwrap();
        fs::write(
            data_dir.join("postgresql.auto.conf"),
            "# Do not edit this file manually!\n",
        )
        .unwrap();
        fs::write(data_dir.join("global").join("pg_control"), vec![7u8; 8192]).unwrap();
        fs::write(data_dir.join("base").join("1").join("1259"), vec![1u8; 16384]).unwrap();

        let engine = Self {
            data_dir,
            wal_dir,
            state: Rc::new(RefCell::new(EngineState {
                segment: 1,
                dirty: false,
                switches: 0,
            })),
        };
        engine.touch_segment(1);
        engine
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn wal_dir(&self) -> &Path {
        &self.wal_dir
    }

    pub fn switches(&self) -> u32 {
        self.state.borrow().switches
    }

    fn touch_segment(&self, n: u32) {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.wal_dir.join(segment_name(n)))
            .unwrap();
    }

    /// Write a table row: changes a data file and appends to the current segment
    pub fn write(&self, table: &str, row: &str) {
        let path = self.data_dir.join("base").join("1").join(table);
        let mut file = OpenOptions::new().create(true).append(true).open(path).unwrap();
        writeln!(file, "{}", row).unwrap();

        let mut state = self.state.borrow_mut();
        let mut segment = OpenOptions::new()
            .append(true)
            .open(self.wal_dir.join(segment_name(state.segment)))
            .unwrap();
        writeln!(segment, "INSERT INTO {} VALUES ('{}')", table, row).unwrap();
        state.dirty = true;
    }
}

impl SourceEngine for FakeEngine {
    fn describe(&self) -> String {
        "fake@localhost:5432/app".into()
    }

    fn ping(&self) -> VaultResult<()> {
        Ok(())
    }

    fn check_privileges(&self) -> VaultResult<()> {
        Ok(())
    }

    fn server_version(&self) -> VaultResult<String> {
        Ok("16.4".into())
    }

    fn base_backup(&self, dest: &Path) -> VaultResult<()> {
        copy_tree(&self.data_dir, dest);
        Ok(())
    }

    fn current_segment(&self) -> VaultResult<Option<String>> {
        Ok(Some(segment_name(self.state.borrow().segment)))
    }

    fn switch_segment(&self) -> VaultResult<()> {
        let next = {
            let mut state = self.state.borrow_mut();
            if !state.dirty {
                return Ok(());
            }
            state.segment += 1;
            state.dirty = false;
            state.switches += 1;
            state.segment
        };
        self.touch_segment(next);
        Ok(())
    }
}

/// Copies packages into a local "remote" directory
pub struct DirTransport {
    pub dir: PathBuf,
}

impl OffsiteTransport for DirTransport {
    fn destination(&self) -> String {
        self.dir.display().to_string()
    }

    fn send(&self, package: &Path) -> VaultResult<String> {
        let dest = self.dir.join(package.file_name().unwrap());
        fs::copy(package, &dest)?;
        Ok(dest.display().to_string())
    }
}

pub fn copy_tree(src: &Path, dest: &Path) {
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.unwrap();
        let target = dest.join(entry.path().strip_prefix(src).unwrap());
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).unwrap();
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

/// Relative path to contents of every file under `root`
pub fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(root).unwrap().display().to_string();
            (relative, fs::read(e.path()).unwrap())
        })
        .collect()
}

/// A store, a fake cluster and an orchestrator wired together
pub struct Harness {
    pub temp: TempDir,
    pub paths: VaultPaths,
    pub settings: Settings,
    pub engine: FakeEngine,
}

impl Harness {
    /// Compressed and encrypted artifacts, cheap key derivation
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let engine = FakeEngine::new(temp.path());
        let paths = VaultPaths::with_base_dir(temp.path().join("store"));
        paths.ensure_directories().unwrap();

        let mut settings = Settings::default();
        settings.source.data_dir = engine.data_dir().to_path_buf();
        settings.source.wal_dir = engine.wal_dir().to_path_buf();
        settings.source.connect_attempts = 1;
        settings.source.connect_retry_delay_secs = 0;
        settings.codec.compress = true;
        settings.codec.encrypt = true;
        settings.codec.kdf = KdfSettings {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        };

        Self {
            temp,
            paths,
            settings,
            engine,
        }
    }

    pub fn codec_with(&self, password: &str) -> ArtifactCodec {
        ArtifactCodec::new(&self.settings.codec, Some(SecureString::from(password))).unwrap()
    }

    pub fn orchestrator(&self) -> Orchestrator {
        self.orchestrator_with_password(PASSWORD)
    }

    pub fn orchestrator_with_password(&self, password: &str) -> Orchestrator {
        Orchestrator::new(
            self.paths.clone(),
            self.settings.clone(),
            self.codec_with(password),
            Box::new(self.engine.clone()),
        )
    }

    pub fn stored_segment_files(&self) -> usize {
        fs::read_dir(self.paths.wal_dir()).unwrap().count()
    }
}
