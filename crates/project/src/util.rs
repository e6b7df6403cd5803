use std::path::{Path, PathBuf};

use path_clean::PathClean;

/// Resolves a path written inside a build file against `base`, translating
/// Windows separators and collapsing `.`/`..` segments.  
/// 將建置檔中的路徑依 `base` 解析，轉換 Windows 分隔符號並折疊 `.`/`..`。
pub fn normalize_path(raw: &str, base: &Path) -> PathBuf {
    let converted = if cfg!(windows) {
        raw.to_string()
    } else {
        raw.replace('\\', "/")
    };
    let candidate = Path::new(converted.trim());
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    };
    joined.clean()
}

/// Case-insensitive comparison used for host lookups of document paths.
pub(crate) fn paths_equal_ignore_case(left: &Path, right: &Path) -> bool {
    let left = left.to_string_lossy();
    let right = right.to_string_lossy();
    left.to_lowercase() == right.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_are_joined_and_cleaned() {
        let base = Path::new("/repo/src/app");
        let resolved = normalize_path("..\\build\\common.props", base);
        assert_eq!(resolved, PathBuf::from("/repo/src/build/common.props"));
    }

    #[test]
    fn absolute_paths_keep_their_root() {
        let resolved = normalize_path("/opt/sdk/./targets/Sdk.targets", Path::new("/repo"));
        assert_eq!(resolved, PathBuf::from("/opt/sdk/targets/Sdk.targets"));
    }

    #[test]
    fn case_insensitive_equality() {
        assert!(paths_equal_ignore_case(
            Path::new("/Repo/Build.PROPS"),
            Path::new("/repo/build.props")
        ));
        assert!(!paths_equal_ignore_case(
            Path::new("/repo/a.props"),
            Path::new("/repo/b.props")
        ));
    }
}
