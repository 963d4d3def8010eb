//! 目录名与文件名的清洗规则
//!
//! - 设备目录名只保留 ASCII 字母数字、`-`、`_`
//! - 文件名只保留最后一个路径分量，其余字符替换为 `_`
//! - 冲突后缀：`photo.jpg` -> `photo_1.jpg` -> `photo_2.jpg`

/// 设备目录名最大长度
pub const MAX_LABEL_LEN: usize = 64;

/// 文件名最大字节数（为后缀和临时文件前缀留出余量）
pub const MAX_FILENAME_LEN: usize = 200;

/// 清洗后为空时使用的目录名
pub const FALLBACK_LABEL: &str = "Unknown";

/// 清洗设备标签，得到可用作目录名的字符串
///
/// 连续空白折叠为一个 `_`，允许集合以外的字符直接丢弃。
pub fn sanitize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut pending_space = false;

    for c in label.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            if pending_space && !out.is_empty() {
                out.push('_');
            }
            pending_space = false;
            out.push(c);
        }
    }

    let trimmed: String = out
        .trim_matches('_')
        .chars()
        .take(MAX_LABEL_LEN)
        .collect();
    if trimmed.is_empty() {
        FALLBACK_LABEL.to_string()
    } else {
        trimmed
    }
}

/// 清洗客户端声明的文件名
///
/// 主名和扩展名分开清洗：主名清洗后为空（例如全是非 ASCII 字符）时换成
/// 生成的名字，但保留扩展名，`照片.jpg` 得到 `upload-1a2b3c4d.jpg`。
pub fn sanitize_filename(claimed: &str) -> String {
    // 同时处理 Unix 和 Windows 分隔符，只取最后一段
    let base = claimed.rsplit(['/', '\\']).next().unwrap_or_default();
    let (stem, ext) = split_extension(base);

    let replaced: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    // 去掉开头的点和下划线：不产生隐藏文件，也排除 `..`
    let cleaned = replaced.trim_start_matches(['.', '_']).trim_end_matches('.');
    let stem = if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        generated_filename()
    } else {
        cleaned.to_string()
    };

    let ext: String = ext
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    let name = if ext.is_empty() {
        stem
    } else {
        format!("{stem}.{ext}")
    };

    truncate_filename(&name, MAX_FILENAME_LEN)
}

/// 生成替代文件名，用于声明的文件名为空或无法使用时
pub fn generated_filename() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("upload-{}", &id[..8])
}

/// 拆分为 (主名, 扩展名)，扩展名不含点
///
/// 以点开头且没有其他点的名字视为没有扩展名。
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// 返回第 `n` 个冲突候选名；`n == 0` 即原名
pub fn suffixed_name(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    match split_extension(name) {
        (stem, Some(ext)) => format!("{stem}_{n}.{ext}"),
        (stem, None) => format!("{stem}_{n}"),
    }
}

/// 扩展名是否在允许列表中（大小写无关）；空列表表示全部允许
pub fn extension_allowed(name: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match split_extension(name).1 {
        Some(ext) => allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// 按字节截断，尽量保留扩展名（名字只含 ASCII，按字节切安全）
fn truncate_filename(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_string();
    }
    match split_extension(name) {
        (stem, Some(ext)) if ext.len() + 2 < max => {
            let keep = max - ext.len() - 1;
            format!("{}.{}", &stem[..keep.min(stem.len())], ext)
        }
        _ => name[..max].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_allow_list() {
        assert_eq!(sanitize_label("Android"), "Android");
        assert_eq!(sanitize_label("Windows PC"), "Windows_PC");
        assert_eq!(sanitize_label("  Pixel   8 \t Pro "), "Pixel_8_Pro");
        assert_eq!(sanitize_label("../../etc"), "etc");
        assert_eq!(sanitize_label("a/b\\c:d"), "abcd");
        assert_eq!(sanitize_label("小米"), FALLBACK_LABEL);
        assert_eq!(sanitize_label(""), FALLBACK_LABEL);
    }

    #[test]
    fn test_label_only_safe_chars() {
        for label in ["iPhone", "x y z", "<script>", "name\0null", "ümlaut-é_ok"] {
            let name = sanitize_label(label);
            assert!(!name.is_empty());
            assert!(
                name.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
                "{:?} -> {:?}",
                label,
                name
            );
        }
    }

    #[test]
    fn test_label_truncated() {
        let long = "a".repeat(500);
        assert_eq!(sanitize_label(&long).len(), MAX_LABEL_LEN);
    }

    #[test]
    fn test_filename_strips_directories() {
        assert_eq!(sanitize_filename("photo.jpg"), "photo.jpg");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\IMG 001.JPG"), "IMG_001.JPG");
        assert_eq!(sanitize_filename(".bashrc"), "bashrc");
        assert_eq!(sanitize_filename("photo."), "photo");
        assert_eq!(sanitize_filename("my photo (1).png"), "my_photo__1_.png");
    }

    #[test]
    fn test_filename_empty_stem_is_generated() {
        for claimed in ["", "..", "/", "dir/", "...", "???"] {
            let name = sanitize_filename(claimed);
            assert!(name.starts_with("upload-"), "{:?} -> {:?}", claimed, name);
            assert!(!name.contains('.'), "{:?} -> {:?}", claimed, name);
        }

        let name = sanitize_filename("照片.jpg");
        assert!(name.starts_with("upload-"));
        assert!(name.ends_with(".jpg"));
    }

    #[test]
    fn test_filename_truncation_keeps_extension() {
        let long = format!("{}.jpeg", "x".repeat(400));
        let name = sanitize_filename(&long);
        assert_eq!(name.len(), MAX_FILENAME_LEN);
        assert!(name.ends_with(".jpeg"));
    }

    #[test]
    fn test_generated_filename() {
        let name = generated_filename();
        assert!(name.starts_with("upload-"));
        assert_eq!(name.len(), "upload-".len() + 8);
    }

    #[test]
    fn test_suffixed_name() {
        assert_eq!(suffixed_name("photo.jpg", 0), "photo.jpg");
        assert_eq!(suffixed_name("photo.jpg", 1), "photo_1.jpg");
        assert_eq!(suffixed_name("archive.tar.gz", 2), "archive.tar_2.gz");
        assert_eq!(suffixed_name("README", 3), "README_3");
    }

    #[test]
    fn test_extension_allowed() {
        let allowed = vec!["jpg".to_string(), "png".to_string()];
        assert!(extension_allowed("a.JPG", &allowed));
        assert!(extension_allowed("a.png", &allowed));
        assert!(!extension_allowed("a.exe", &allowed));
        assert!(!extension_allowed("noext", &allowed));
        assert!(extension_allowed("anything.bin", &[]));
    }
}
