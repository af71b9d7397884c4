//! 宿主机目录下的文件系统 [`HostFileSystem`]

use super::*;
use spin::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

struct HostFile {
    file: Mutex<File>,
}

impl OpenFile for HostFile {
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset as u64))?;
        let mut total = 0;
        while total < buf.len() {
            match file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset as u64))?;
        file.write_all(buf)?;
        Ok(buf.len())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.file.lock().metadata()?.len() as usize)
    }
}

/// 把文件名映射到 `root` 目录下的宿主文件
pub struct HostFileSystem {
    root: PathBuf,
}

impl HostFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

fn not_found(name: &str, error: io::Error) -> StorageError {
    if error.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(name.to_string())
    } else {
        StorageError::Io(error)
    }
}

impl FileSystem for HostFileSystem {
    fn open(&self, name: &str) -> Result<Arc<dyn OpenFile>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.path(name))
            .map_err(|e| not_found(name, e))?;
        let file: Arc<dyn OpenFile> = Arc::new(HostFile {
            file: Mutex::new(file),
        });
        Ok(file)
    }

    fn create(&self, name: &str, size: usize) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path(name))
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    StorageError::AlreadyExists(name.to_string())
                } else {
                    StorageError::Io(e)
                }
            })?;
        file.set_len(size as u64)?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        fs::remove_file(self.path(name)).map_err(|e| not_found(name, e))
    }
}
