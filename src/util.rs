use crate::config::Hashing;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use time::format_description::well_known::Rfc3339;

pub fn ensure_dir(p: &Path) -> Result<()> {
    std::fs::create_dir_all(p).with_context(|| format!("create_dir_all {}", p.display()))
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Rounds to one decimal place, the precision used for report timeframes.
pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Content fingerprint of an uploaded video.
pub fn hash_file(hashing: &Hashing, path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| "open file")?;
    let meta = f.metadata().with_context(|| "metadata")?;
    let size = meta.len();

    match hashing.mode.as_str() {
        "full_sha256" => {
            let mut h = Sha256::new();
            let mut buf = vec![0u8; 1024 * 1024];
            loop {
                let n = f.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                h.update(&buf[..n]);
            }
            Ok(format!("{:x}", h.finalize()))
        }
        "fast_2x16mb" => {
            let w = hashing.fast_window_bytes.min(size);
            let mut h = Sha256::new();

            if w > 0 {
                f.seek(SeekFrom::Start(0))?;
                let mut head = vec![0u8; w as usize];
                f.read_exact(&mut head)?;
                h.update(&head);

                if size > w {
                    f.seek(SeekFrom::Start(size - w))?;
                    let mut tail = vec![0u8; w as usize];
                    f.read_exact(&mut tail)?;
                    h.update(&tail);
                }
            }

            h.update(size.to_le_bytes());
            Ok(format!("{:x}", h.finalize()))
        }
        _ => anyhow::bail!("unknown hashing.mode: {}", hashing.mode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round1_keeps_one_decimal() {
        assert_eq!(round1(10.04), 10.0);
        assert_eq!(round1(3.36), 3.4);
        assert_eq!(round1(0.0), 0.0);
    }

    #[test]
    fn fast_hash_depends_on_content() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, b"frame-data-a").unwrap();
        std::fs::write(&b, b"frame-data-b").unwrap();

        let hashing = Hashing::default();
        let ha = hash_file(&hashing, &a).unwrap();
        let hb = hash_file(&hashing, &b).unwrap();
        assert_ne!(ha, hb);
        assert_eq!(ha, hash_file(&hashing, &a).unwrap());
    }
}
