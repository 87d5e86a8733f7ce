use std::fs::{self, File};
use std::io;
use std::path::Path;

#[cfg(target_os = "linux")]
use std::sync::atomic::{AtomicBool, Ordering};

use crate::aio::{JobSpec, Size, Source};

/// Track whether O_NOATIME is supported to avoid repeated failed open() attempts.
/// After the first EPERM, we never try O_NOATIME again (saves one syscall per file).
#[cfg(target_os = "linux")]
static NOATIME_SUPPORTED: AtomicBool = AtomicBool::new(true);

/// Open a file with O_NOATIME on Linux to avoid atime inode writes.
/// Caches whether O_NOATIME works to avoid double-open on every file.
#[cfg(target_os = "linux")]
fn open_noatime(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    if NOATIME_SUPPORTED.load(Ordering::Relaxed) {
        match fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NOATIME)
            .open(path)
        {
            Ok(f) => return Ok(f),
            Err(ref e) if e.raw_os_error() == Some(libc::EPERM) => {
                // O_NOATIME requires file ownership or CAP_FOWNER
                NOATIME_SUPPORTED.store(false, Ordering::Relaxed);
            }
            Err(e) => return Err(e),
        }
    }
    File::open(path)
}

#[cfg(not(target_os = "linux"))]
fn open_noatime(path: &Path) -> io::Result<File> {
    File::open(path)
}

/// Hint sequential access so the kernel reads ahead aggressively.
#[cfg(target_os = "linux")]
fn advise_sequential(file: &File, len: u64) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let ret = unsafe {
        libc::posix_fadvise(
            file.as_raw_fd(),
            0,
            len as libc::off_t,
            libc::POSIX_FADV_SEQUENTIAL,
        )
    };
    // posix_fadvise returns the error number instead of setting errno
    if ret != 0 {
        return Err(io::Error::from_raw_os_error(ret));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn advise_sequential(_file: &File, _len: u64) -> io::Result<()> {
    Ok(())
}

enum Handle {
    File(File),
    Stdin,
}

/// One opened input, ready to be counted.
pub struct Input {
    label: Option<String>,
    size: Size,
    handle: Handle,
}

impl Input {
    /// Open a regular file and record its size.
    ///
    /// Anything that is not a regular file (directories, FIFOs, devices) is
    /// rejected: only a lone stdin may have an unknown size.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = open_noatime(path)?;
        let metadata = file.metadata()?;
        if !metadata.file_type().is_file() {
            let kind = if metadata.is_dir() {
                io::ErrorKind::IsADirectory
            } else {
                io::ErrorKind::InvalidInput
            };
            return Err(io::Error::new(kind, "not a regular file"));
        }
        let len = metadata.len();
        advise_sequential(&file, len)?;
        Ok(Self {
            label: Some(path.to_string_lossy().into_owned()),
            size: Size::Known(len),
            handle: Handle::File(file),
        })
    }

    /// Standard input as a stream of unknown length.
    pub fn stdin() -> Self {
        Self {
            label: None,
            size: Size::Unknown,
            handle: Handle::Stdin,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn spec(&self) -> JobSpec {
        JobSpec {
            label: self.label.clone(),
            size: self.size,
        }
    }

    #[cfg(unix)]
    pub fn raw_fd(&self) -> std::os::unix::io::RawFd {
        use std::os::unix::io::AsRawFd;
        match &self.handle {
            Handle::File(f) => f.as_raw_fd(),
            Handle::Stdin => libc::STDIN_FILENO,
        }
    }

    pub fn into_source(self) -> Source {
        match self.handle {
            Handle::File(f) => Source::File(f),
            Handle::Stdin => Source::Stream(Box::new(io::stdin())),
        }
    }
}
