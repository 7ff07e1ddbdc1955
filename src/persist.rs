//! 参数文件的读写
//!
//! 文件格式为 4 字节魔数、小端 u32 版本号，之后是 bincode 编码的数据。

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryLoadError {
    #[error("无法读取参数文件 {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("参数文件格式错误: {0}")]
    Format(#[from] bincode::Error),
    #[error("参数文件类型不匹配")]
    Magic,
    #[error("参数文件版本不匹配: 期望 {expected}，实际 {found}")]
    Version { expected: u32, found: u32 },
    #[error("参数无效: {0}")]
    Invalid(String),
}

pub(crate) fn save<T: Serialize>(path: &Path, magic: &[u8; 4], version: u32, value: &T) -> Result<(), RegistryLoadError> {
    let io_err = |source| RegistryLoadError::Io { path: path.to_path_buf(), source };
    let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
    writer.write_all(magic).map_err(io_err)?;
    writer.write_all(&version.to_le_bytes()).map_err(io_err)?;
    bincode::serialize_into(&mut writer, value)?;
    writer.flush().map_err(io_err)?;
    Ok(())
}

pub(crate) fn load<T: DeserializeOwned>(path: &Path, magic: &[u8; 4], version: u32) -> Result<T, RegistryLoadError> {
    let io_err = |source| RegistryLoadError::Io { path: path.to_path_buf(), source };
    let mut reader = BufReader::new(File::open(path).map_err(io_err)?);

    let mut header = [0u8; 4];
    reader.read_exact(&mut header).map_err(io_err)?;
    if &header != magic {
        return Err(RegistryLoadError::Magic);
    }
    reader.read_exact(&mut header).map_err(io_err)?;
    let found = u32::from_le_bytes(header);
    if found != version {
        return Err(RegistryLoadError::Version { expected: version, found });
    }

    Ok(bincode::deserialize_from(reader)?)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_header_checks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("params.bin");
        save(&path, b"TEST", 2, &vec![1u32, 2, 3]).unwrap();
        assert_eq!(load::<Vec<u32>>(&path, b"TEST", 2).unwrap(), vec![1, 2, 3]);
        assert!(matches!(load::<Vec<u32>>(&path, b"OTHR", 2), Err(RegistryLoadError::Magic)));
        assert!(matches!(
            load::<Vec<u32>>(&path, b"TEST", 3),
            Err(RegistryLoadError::Version { expected: 3, found: 2 })
        ));

        std::fs::write(&path, b"TE").unwrap();
        assert!(matches!(load::<Vec<u32>>(&path, b"TEST", 2), Err(RegistryLoadError::Io { .. })));
    }
}
