//! Local netDb: the directory of router-info files the engine samples from.
//!
//! Router infos are opaque signed blobs dropped into the directory by a
//! locally running router. We never parse them; only their file names and
//! modification times matter here.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, SystemTime};

use regex::Regex;
use tracing::warn;

/// Router infos older than this are dropped at load time; peers that stale
/// are unlikely to still be reachable.
const MAX_AGE: Duration = Duration::from_secs(96 * 60 * 60);

static ROUTER_INFO_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^routerInfo-[A-Za-z0-9\-=~]+\.dat$").expect("pattern is valid")
});

/// One router-info file, read fully into memory.
#[derive(Debug, Clone)]
pub struct RouterInfo {
    pub name: String,
    pub mod_time: SystemTime,
    pub data: Vec<u8>,
}

/// Source of router infos. The engine only ever pulls a full snapshot;
/// ordering is unspecified.
pub trait NetDb: Send + Sync {
    fn router_infos(&self) -> io::Result<Vec<RouterInfo>>;
}

/// NetDb backed by a local directory tree.
pub struct LocalNetDb {
    path: PathBuf,
}

impl LocalNetDb {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LocalNetDb { path: path.into() }
    }
}

impl NetDb for LocalNetDb {
    fn router_infos(&self) -> io::Result<Vec<RouterInfo>> {
        let mut out = Vec::new();
        let now = SystemTime::now();
        walk(&self.path, now, &mut out)?;
        Ok(out)
    }
}

fn walk(dir: &Path, now: SystemTime, out: &mut Vec<RouterInfo>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                warn!("skipping {}: {e}", path.display());
                continue;
            }
        };

        if meta.is_dir() {
            walk(&path, now, out)?;
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if !ROUTER_INFO_NAME.is_match(&name) {
            continue;
        }

        let mod_time = match meta.modified() {
            Ok(t) => t,
            Err(e) => {
                warn!("skipping {}: no modification time: {e}", path.display());
                continue;
            }
        };
        if too_old(mod_time, now) {
            continue;
        }

        match fs::read(&path) {
            Ok(data) => out.push(RouterInfo { name, mod_time, data }),
            Err(e) => warn!("skipping {}: {e}", path.display()),
        }
    }

    Ok(())
}

fn too_old(mod_time: SystemTime, now: SystemTime) -> bool {
    now.duration_since(mod_time).unwrap_or_default() > MAX_AGE
}
