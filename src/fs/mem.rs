//! 内存中的文件系统 [`MemFileSystem`]

use super::*;
use hashbrown::HashMap;
use spin::RwLock;

struct MemFile {
    data: RwLock<Vec<u8>>,
}

impl OpenFile for MemFile {
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let data = self.data.read();
        if offset >= data.len() {
            return Ok(0);
        }
        let count = buf.len().min(data.len() - offset);
        buf[..count].copy_from_slice(&data[offset..offset + count]);
        Ok(count)
    }

    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize> {
        let mut data = self.data.write();
        let end = offset + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.data.read().len())
    }
}

/// 以文件名为键的内存文件表
pub struct MemFileSystem {
    files: RwLock<HashMap<String, Arc<MemFile>>>,
}

impl Default for MemFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFileSystem {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
        }
    }

    /// 放入（或替换）一个文件
    pub fn insert(&self, name: &str, contents: Vec<u8>) {
        let file = Arc::new(MemFile {
            data: RwLock::new(contents),
        });
        self.files.write().insert(name.to_string(), file);
    }

    /// 文件内容的拷贝
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files
            .read()
            .get(name)
            .map(|file| file.data.read().clone())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.files.read().contains_key(name)
    }
}

impl FileSystem for MemFileSystem {
    fn open(&self, name: &str) -> Result<Arc<dyn OpenFile>> {
        match self.files.read().get(name) {
            Some(file) => {
                let file: Arc<dyn OpenFile> = file.clone();
                Ok(file)
            }
            None => Err(StorageError::NotFound(name.to_string())),
        }
    }

    fn create(&self, name: &str, size: usize) -> Result<()> {
        let mut files = self.files.write();
        if files.contains_key(name) {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }
        let file = Arc::new(MemFile {
            data: RwLock::new(vec![0; size]),
        });
        files.insert(name.to_string(), file);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.files
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }
}
