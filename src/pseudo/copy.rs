//! # 赝势文件复制
//!
//! 把解析得到的赝势复制到 `pseudo_dir`：
//! - 目标不存在同名文件：复制（保留权限和访问/修改时间）
//! - 同名且内容逐字节相同：直接复用
//! - 同名但内容不同，或比较失败：改名为 `stem_1.ext`、`stem_2.ext` … 直到可用
//!
//! ## 依赖关系
//! - 被 `commands/input.rs` 使用
//! - 使用 `pseudo/resolver.rs` 的 `PseudoMap`

use super::resolver::PseudoMap;
use crate::error::{Result, SlabQeError};
use std::collections::BTreeMap;
use std::fs::{self, File, FileTimes};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// 单个文件的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyAction {
    Copied,
    Reused,
    /// 同名文件内容不同，以新名称复制
    Renamed,
}

/// 目标目录中的文件名及其来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRecord {
    pub file_name: String,
    pub action: CopyAction,
}

/// 复制全部赝势到 `dest_dir`，返回 元素 → 目标目录中的文件名
pub fn copy_pseudos(pseudos: &PseudoMap, dest_dir: &Path) -> Result<BTreeMap<String, CopyRecord>> {
    fs::create_dir_all(dest_dir).map_err(|e| SlabQeError::FileWriteError {
        path: dest_dir.display().to_string(),
        source: e,
    })?;

    let mut records = BTreeMap::new();
    for (element, src) in pseudos {
        let record = copy_one(src, dest_dir)?;
        records.insert(element.clone(), record);
    }
    Ok(records)
}

fn copy_one(src: &Path, dest_dir: &Path) -> Result<CopyRecord> {
    let file_name = src
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SlabQeError::InvalidArgument(format!("not a file path: {}", src.display())))?
        .to_string();

    let target = dest_dir.join(&file_name);
    if !target.exists() {
        copy_preserving_times(src, &target)?;
        return Ok(CopyRecord {
            file_name,
            action: CopyAction::Copied,
        });
    }

    if same_content(src, &target).unwrap_or(false) {
        return Ok(CopyRecord {
            file_name,
            action: CopyAction::Reused,
        });
    }

    let (stem, ext) = split_name(&file_name);
    let mut n = 1usize;
    let (name, path) = loop {
        let name = format!("{}_{}{}", stem, n, ext);
        let path = dest_dir.join(&name);
        if !path.exists() {
            break (name, path);
        }
        n += 1;
    };

    copy_preserving_times(src, &path)?;
    Ok(CopyRecord {
        file_name: name,
        action: CopyAction::Renamed,
    })
}

/// 复制内容，补上访问/修改时间，最后套用源文件权限
///
/// 时间必须在权限之前设置：源文件只读时，目标套用权限后不可再写。
fn copy_preserving_times(src: &Path, dest: &Path) -> Result<()> {
    let read_err = |e| SlabQeError::FileReadError {
        path: src.display().to_string(),
        source: e,
    };
    let write_err = |e| SlabQeError::FileWriteError {
        path: dest.display().to_string(),
        source: e,
    };

    let meta = fs::metadata(src).map_err(read_err)?;
    let mut reader = File::open(src).map_err(read_err)?;
    let mut writer = File::create(dest).map_err(write_err)?;
    io::copy(&mut reader, &mut writer).map_err(write_err)?;

    let mut times = FileTimes::new();
    if let Ok(t) = meta.accessed() {
        times = times.set_accessed(t);
    }
    if let Ok(t) = meta.modified() {
        times = times.set_modified(t);
    }
    writer.set_times(times).map_err(write_err)?;
    drop(writer);

    fs::set_permissions(dest, meta.permissions()).map_err(write_err)
}

/// 逐字节比较两个文件
fn same_content(a: &Path, b: &Path) -> std::io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }

    let mut ra = BufReader::new(File::open(a)?);
    let mut rb = BufReader::new(File::open(b)?);
    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];

    loop {
        let n = ra.read(&mut buf_a)?;
        if n == 0 {
            return Ok(rb.read(&mut buf_b)? == 0);
        }
        rb.read_exact(&mut buf_b[..n])?;
        if buf_a[..n] != buf_b[..n] {
            return Ok(false);
        }
    }
}

/// `Na.pbe.UPF` → (`Na.pbe`, `.UPF`)
fn split_name(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(i) if i > 0 => (&file_name[..i], &file_name[i..]),
        _ => (file_name, ""),
    }
}

/// 目标目录中的完整路径
pub fn destination_path(dest_dir: &Path, record: &CopyRecord) -> PathBuf {
    dest_dir.join(&record.file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn map(entries: &[(&str, &Path)]) -> PseudoMap {
        entries
            .iter()
            .map(|(el, p)| (el.to_string(), p.to_path_buf()))
            .collect()
    }

    #[test]
    fn test_copy_then_reuse() {
        let src_dir = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let dest_dir = dest.path().join("nested/pseudo");
        let src = src_dir.path().join("Na.upf");
        fs::write(&src, b"<UPF version=\"2.0.1\">").unwrap();

        let pseudos = map(&[("Na", &src)]);
        let first = copy_pseudos(&pseudos, &dest_dir).unwrap();
        assert_eq!(first["Na"].file_name, "Na.upf");
        assert_eq!(first["Na"].action, CopyAction::Copied);

        let second = copy_pseudos(&pseudos, &dest_dir).unwrap();
        assert_eq!(second["Na"].file_name, "Na.upf");
        assert_eq!(second["Na"].action, CopyAction::Reused);
        assert!(!dest_dir.join("Na_1.upf").exists());
    }

    #[test]
    fn test_conflicting_content_gets_suffix() {
        let src_dir = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::write(dest.path().join("Na.upf"), b"old").unwrap();
        fs::write(dest.path().join("Na_1.upf"), b"older").unwrap();

        let src = src_dir.path().join("Na.upf");
        fs::write(&src, b"new").unwrap();

        let records = copy_pseudos(&map(&[("Na", &src)]), dest.path()).unwrap();
        assert_eq!(records["Na"].file_name, "Na_2.upf");
        assert_eq!(records["Na"].action, CopyAction::Renamed);
        assert_eq!(fs::read(dest.path().join("Na_2.upf")).unwrap(), b"new");
        assert_eq!(fs::read(dest.path().join("Na.upf")).unwrap(), b"old");
    }

    #[test]
    fn test_same_length_different_bytes() {
        let src_dir = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::write(dest.path().join("O.UPF"), b"abcd").unwrap();
        let src = src_dir.path().join("O.UPF");
        fs::write(&src, b"abce").unwrap();

        let records = copy_pseudos(&map(&[("O", &src)]), dest.path()).unwrap();
        assert_eq!(records["O"].file_name, "O_1.UPF");
    }

    #[test]
    fn test_modification_time_preserved() {
        let src_dir = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let src = src_dir.path().join("Fe.psp");
        fs::write(&src, b"fe").unwrap();

        let past = SystemTime::now() - Duration::from_secs(86_400);
        File::options()
            .write(true)
            .open(&src)
            .unwrap()
            .set_times(FileTimes::new().set_modified(past))
            .unwrap();

        let records = copy_pseudos(&map(&[("Fe", &src)]), dest.path()).unwrap();
        let copied = destination_path(dest.path(), &records["Fe"]);
        let mtime = fs::metadata(copied).unwrap().modified().unwrap();
        let diff = mtime
            .duration_since(past)
            .unwrap_or_else(|e| e.duration());
        assert!(diff < Duration::from_secs(2));
    }

    #[test]
    fn test_read_only_source() {
        let src_dir = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let src = src_dir.path().join("Na.upf");
        fs::write(&src, b"na").unwrap();
        let mut perms = fs::metadata(&src).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&src, perms).unwrap();

        let records = copy_pseudos(&map(&[("Na", &src)]), dest.path()).unwrap();
        assert_eq!(records["Na"].action, CopyAction::Copied);

        let copied = dest.path().join("Na.upf");
        assert_eq!(fs::read(&copied).unwrap(), b"na");
        assert!(fs::metadata(&copied).unwrap().permissions().readonly());

        // 再次复制：内容相同，直接复用
        let again = copy_pseudos(&map(&[("Na", &src)]), dest.path()).unwrap();
        assert_eq!(again["Na"].action, CopyAction::Reused);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_destination_is_renamed() {
        use std::os::unix::fs::PermissionsExt;

        let src_dir = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let src = src_dir.path().join("Cl.upf");
        fs::write(&src, b"same bytes").unwrap();
        let existing = dest.path().join("Cl.upf");
        fs::write(&existing, b"same bytes").unwrap();
        fs::set_permissions(&existing, fs::Permissions::from_mode(0o000)).unwrap();

        // root 仍可读取，比较不会失败
        if File::open(&existing).is_ok() {
            return;
        }

        let records = copy_pseudos(&map(&[("Cl", &src)]), dest.path()).unwrap();
        assert_eq!(records["Cl"].file_name, "Cl_1.upf");
        assert_eq!(records["Cl"].action, CopyAction::Renamed);
        assert_eq!(fs::read(dest.path().join("Cl_1.upf")).unwrap(), b"same bytes");

        fs::set_permissions(&existing, fs::Permissions::from_mode(0o644)).unwrap();
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("Na.pbe.UPF"), ("Na.pbe", ".UPF"));
        assert_eq!(split_name("Na"), ("Na", ""));
        assert_eq!(split_name(".hidden"), (".hidden", ""));
    }
}
