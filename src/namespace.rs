//! Per-request identifiers and isolated output directories.

use crate::util::ensure_dir;
use anyhow::{Context, Result};
use rand::Rng;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Isolated on-disk workspace for one request: `<output>/<id>/scenes/`.
#[derive(Debug, Clone)]
pub struct Namespace {
    pub id: String,
    pub root: PathBuf,
    pub scenes_dir: PathBuf,
}

impl Namespace {
    /// Resolves the layout for an existing id without touching the disk.
    pub fn at(output_dir: &Path, id: &str) -> Self {
        let root = output_dir.join(id);
        let scenes_dir = root.join("scenes");
        Self {
            id: id.to_string(),
            root,
            scenes_dir,
        }
    }
}

/// Builds `<YYYYMMDD_HHMMSS>_<client>_<4 random digits>`.
///
/// Unique enough for one process: a collision needs the same second, the same
/// client and the same random draw.
pub fn request_id(client_addr: &str, now: OffsetDateTime) -> String {
    let stamp = format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    );
    let nonce: u16 = rand::rng().random_range(1000..10000);
    format!("{stamp}_{}_{nonce}", sanitize_client(client_addr))
}

/// Keeps ASCII alphanumerics; everything else (dots, colons, brackets) becomes `_`.
pub fn sanitize_client(client_addr: &str) -> String {
    let cleaned: String = client_addr
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// Allocates a fresh id and creates its directory tree.
pub fn allocate(output_dir: &Path, client_addr: &str, now: OffsetDateTime) -> Result<Namespace> {
    ensure_dir(output_dir)?;
    loop {
        let ns = Namespace::at(output_dir, &request_id(client_addr, now));
        // create_dir (not create_dir_all) so a concurrent claim of the same id fails here.
        match std::fs::create_dir(&ns.root) {
            Ok(()) => {
                ensure_dir(&ns.scenes_dir)?;
                return Ok(ns);
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err).with_context(|| format!("create_dir {}", ns.root.display()));
            }
        }
    }
}
