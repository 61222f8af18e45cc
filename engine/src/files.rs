use crate::audio::clip::WriteOutcome;
use std::{fs, io, path::Path};
use tracing::debug;

/// 64-bit content hash of a file's bytes.
pub fn hash_file(path: &Path) -> io::Result<u64> {
    Ok(seahash::hash(&fs::read(path)?))
}

#[cfg(target_os = "linux")]
mod ficlone {
    // FICLONE = _IOW(0x94, 9, int)
    nix::ioctl_write_int!(ficlone, 0x94, 9);
}

/// Copy-on-write clone of `src` into `dst`.
#[cfg(target_os = "linux")]
pub fn reflink(src: &Path, dst: &Path) -> io::Result<()> {
    use std::os::fd::AsRawFd;

    let source = fs::File::open(src)?;
    let target = fs::File::create(dst)?;
    match unsafe { ficlone::ficlone(target.as_raw_fd(), source.as_raw_fd() as _) } {
        Ok(_) => Ok(()),
        Err(errno) => {
            drop(target);
            let _ = fs::remove_file(dst);
            Err(io::Error::from(errno))
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn reflink(_src: &Path, _dst: &Path) -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

/// Reflinks when the filesystem supports it, byte-copies otherwise.
pub fn reflink_or_copy(src: &Path, dst: &Path) -> io::Result<WriteOutcome> {
    match reflink(src, dst) {
        Ok(()) => Ok(WriteOutcome::Reflinked),
        Err(e) => {
            debug!(
                "Reflink '{}' -> '{}' failed ({e}), copying instead",
                src.display(),
                dst.display()
            );
            fs::copy(src, dst)?;
            Ok(WriteOutcome::Copied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_follows_content() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"same bytes").unwrap();
        fs::write(&b, b"same bytes").unwrap();
        assert_eq!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
        fs::write(&b, b"other bytes").unwrap();
        assert_ne!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
    }

    #[test]
    fn clone_or_copy_reproduces_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.wav");
        let dst = dir.path().join("dst.wav");
        fs::write(&src, vec![7_u8; 8192]).unwrap();
        let outcome = reflink_or_copy(&src, &dst).unwrap();
        assert!(matches!(
            outcome,
            WriteOutcome::Reflinked | WriteOutcome::Copied
        ));
        assert_eq!(fs::read(&dst).unwrap(), vec![7_u8; 8192]);
    }
}
