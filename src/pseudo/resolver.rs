//! # 赝势文件查找
//!
//! 在搜索目录（不递归）中为每个元素挑选一个赝势文件。
//!
//! ## 匹配规则
//! 元素符号（不区分大小写）出现在文件名中，且前后紧邻字符都不是 ASCII 字母。
//! `Na` 匹配 `Na.upf`、`na_pbe_v1.UPF`，不匹配 `NaCl.psf`。
//!
//! ## 多个候选时
//! 1. 扩展名优先级（区分大小写，见 `EXTENSION_PREFERENCE`，其余排最后）
//! 2. 文件名较短者优先
//! 3. 文件名字典序
//!
//! 找不到的元素不会在这里提示用户：`PseudoResolution::commit` 接受调用方回调补齐，
//! 回调也给不出时返回 `MissingPseudopotential`。
//!
//! ## 依赖关系
//! - 被 `commands/input.rs` 使用

use crate::error::{Result, SlabQeError};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// 已知赝势扩展名，按优先级排列
pub const EXTENSION_PREFERENCE: &[&str] = &[
    ".upf", ".UPF", ".psp", ".PSP", ".psf", ".PSF", ".pseudo", ".PSEUDO", ".dat", ".DAT",
];

/// 元素 → 赝势文件路径
pub type PseudoMap = BTreeMap<String, PathBuf>;

/// 查找结果：已解析条目 + 按输入顺序排列的未解析元素
#[derive(Debug, Clone, Default)]
pub struct PseudoResolution {
    pub resolved: PseudoMap,
    pub missing: Vec<String>,
}

impl PseudoResolution {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// 用回调补齐缺失元素，得到完整映射
    pub fn commit<F>(self, mut fallback: F) -> Result<PseudoMap>
    where
        F: FnMut(&str) -> Option<PathBuf>,
    {
        let mut map = self.resolved;
        for element in self.missing {
            let path = fallback(&element).ok_or_else(|| SlabQeError::MissingPseudopotential {
                element: element.clone(),
            })?;
            if !path.is_file() {
                return Err(SlabQeError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
            map.insert(element, absolutize(&path));
        }
        Ok(map)
    }
}

/// 为每个元素在 `search_dir` 中查找赝势
pub fn resolve_pseudos(elements: &[String], search_dir: Option<&Path>) -> Result<PseudoResolution> {
    if elements.is_empty() {
        return Err(SlabQeError::InvalidArgument(
            "no elements to resolve pseudopotentials for".to_string(),
        ));
    }

    let candidates = match search_dir {
        Some(dir) if dir.is_dir() => list_regular_files(dir)?,
        _ => Vec::new(),
    };

    let mut resolution = PseudoResolution::default();
    for element in elements {
        let best = candidates
            .iter()
            .filter(|(name, _)| element_in_filename(element, name))
            .min_by(|(a, _), (b, _)| rank(a).cmp(&rank(b)).then_with(|| a.cmp(b)));

        match best {
            Some((_, path)) => {
                resolution.resolved.insert(element.clone(), path.clone());
            }
            None => resolution.missing.push(element.clone()),
        }
    }

    Ok(resolution)
}

/// 目录下的普通文件 (文件名, 绝对路径)；符号链接按目标判断
fn list_regular_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = fs::read_dir(dir).map_err(|e| SlabQeError::FileReadError {
        path: dir.display().to_string(),
        source: e,
    })?;

    let dir = absolutize(dir);
    Ok(entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| {
            // 非 UTF-8 文件名按替换字符参与匹配，路径保持原样
            let name = e.file_name().to_string_lossy().into_owned();
            (name, dir.join(e.file_name()))
        })
        .collect())
}

/// 元素符号是否以非字母边界出现在文件名中（不区分大小写）
pub fn element_in_filename(element: &str, filename: &str) -> bool {
    if element.is_empty() {
        return false;
    }
    let name = filename.to_ascii_lowercase();
    let needle = element.to_ascii_lowercase();
    let bytes = name.as_bytes();

    name.match_indices(&needle).any(|(start, m)| {
        let end = start + m.len();
        let before_ok = start == 0 || !bytes[start - 1].is_ascii_alphabetic();
        let after_ok = end == bytes.len() || !bytes[end].is_ascii_alphabetic();
        before_ok && after_ok
    })
}

/// 排序键：(扩展名优先级, 文件名长度)
fn rank(filename: &str) -> (usize, usize) {
    let ext = extension_with_dot(filename);
    let pref = EXTENSION_PREFERENCE
        .iter()
        .position(|&e| e == ext)
        .unwrap_or(EXTENSION_PREFERENCE.len());
    (pref, filename.chars().count())
}

/// 带点的扩展名；隐藏文件 (`.upf`) 视为无扩展名
fn extension_with_dot(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(i) if filename[..i].trim_start_matches('.').is_empty() => "",
        Some(i) => &filename[i..],
        None => "",
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
