//! Project path hashing
//!
//! Maps an absolute project path to the directory inside the annotation
//! repository that holds its document. The digest of the normalized path
//! keeps unrelated projects apart; the basename prefix is only there so a
//! person browsing the repository can tell the directories apart.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// File name of the per-project annotation document
pub const DOCUMENT_FILE_NAME: &str = "annotations.json";

/// Number of hex characters of the SHA-256 digest kept in directory names
const DIGEST_LEN: usize = 16;

/// Lexically normalize a project path.
///
/// Backslashes become `/`, empty and `.` segments are dropped, `..` pops the
/// previous segment (never above the root) and trailing separators go away.
/// A leading `/` and a Windows drive prefix such as `C:` are kept. The
/// filesystem is never consulted.
pub fn normalize_project_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let absolute = unified.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                // Keep a drive prefix pinned in place like a root.
                match segments.last() {
                    Some(&"..") => segments.push(".."),
                    Some(last) if !is_drive(last) => {
                        segments.pop();
                    }
                    Some(_) => {}
                    None if !absolute => segments.push(".."),
                    None => {}
                }
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

fn is_drive(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Directory name `<basename>_<digest>` for a project
pub fn project_dir_name(project_path: &str) -> String {
    let normalized = normalize_project_path(project_path);

    let digest = Sha256::digest(normalized.as_bytes());
    let hex = format!("{digest:x}");

    let basename = normalized
        .rsplit('/')
        .find(|s| !s.is_empty() && *s != "." && !is_drive(s))
        .unwrap_or("root");
    let sanitized: String = basename
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    format!("{}_{}", sanitized, &hex[..DIGEST_LEN])
}

/// Location of a project's annotation document inside `repo_root`
pub fn location_for(project_path: &str, repo_root: &Path) -> PathBuf {
    repo_root
        .join(project_dir_name(project_path))
        .join(DOCUMENT_FILE_NAME)
}

/// Express `file_path` relative to `project_path`, using `/` separators.
///
/// Absolute paths under the project lose the project prefix. Anything else
/// (already relative, or outside the project) is returned normalized.
pub fn relative_file_path(project_path: &str, file_path: &str) -> String {
    let project = normalize_project_path(project_path);
    let file = normalize_project_path(file_path);

    let prefix = if project.ends_with('/') {
        project
    } else {
        format!("{project}/")
    };

    match file.strip_prefix(&prefix) {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => file,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_normalize_variants() {
        for variant in [
            "/tmp/proj",
            "/tmp/proj/",
            "/tmp/./proj",
            "/tmp//proj",
            "/tmp/x/../proj",
            "\\tmp\\proj",
            "/tmp/proj/.",
        ] {
            assert_eq!(normalize_project_path(variant), "/tmp/proj", "variant {variant}");
        }
    }

    #[test]
    fn test_normalize_does_not_escape_root() {
        assert_eq!(normalize_project_path("/../../etc"), "/etc");
        assert_eq!(normalize_project_path("/"), "/");
        assert_eq!(normalize_project_path("../../x"), "../../x");
        assert_eq!(normalize_project_path("./"), ".");
    }

    #[test]
    fn test_normalize_windows_drive() {
        assert_eq!(
            normalize_project_path("C:\\Users\\dev\\..\\dev\\app\\"),
            "C:/Users/dev/app"
        );
        assert_eq!(normalize_project_path("C:\\..\\app"), "C:/app");
    }

    #[test]
    fn test_location_is_deterministic() {
        let root = Path::new("/repo");
        let expected = location_for("/tmp/proj", root);
        for variant in ["/tmp/proj/", "/tmp/./proj", "\\tmp\\proj", "/tmp/a/../proj"] {
            assert_eq!(location_for(variant, root), expected);
        }
    }

    #[test]
    fn test_location_layout() {
        let location = location_for("/home/dev/my-app", Path::new("/repo"));
        let dir = location.parent().unwrap().file_name().unwrap().to_str().unwrap();
        assert!(dir.starts_with("my_app_"));
        let digest = dir.strip_prefix("my_app_").unwrap();
        assert_eq!(digest.len(), DIGEST_LEN);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(location.file_name().unwrap(), DOCUMENT_FILE_NAME);
        assert!(location.starts_with("/repo"));
    }

    #[test]
    fn test_digest_is_sha256_prefix() {
        // sha256("/tmp/proj")
        let hex = format!("{:x}", Sha256::digest(b"/tmp/proj"));
        assert_eq!(project_dir_name("/tmp/proj"), format!("proj_{}", &hex[..16]));
    }

    #[test]
    fn test_same_basename_different_projects() {
        assert_ne!(project_dir_name("/a/app"), project_dir_name("/b/app"));
    }

    #[test]
    fn test_uniqueness_over_many_paths() {
        let names: HashSet<String> = (0..5000)
            .map(|i| project_dir_name(&format!("/work/team{}/project-{}", i % 37, i)))
            .collect();
        assert_eq!(names.len(), 5000);
    }

    #[test]
    fn test_root_basename() {
        assert!(project_dir_name("/").starts_with("root_"));
    }

    #[test]
    fn test_relative_file_path() {
        assert_eq!(relative_file_path("/tmp/proj", "/tmp/proj/src/a.ts"), "src/a.ts");
        assert_eq!(relative_file_path("/tmp/proj/", "/tmp/proj/a.ts"), "a.ts");
        assert_eq!(relative_file_path("C:\\proj", "C:\\proj\\src\\a.ts"), "src/a.ts");
        assert_eq!(relative_file_path("/tmp/proj", "src/a.ts"), "src/a.ts");
        assert_eq!(relative_file_path("/tmp/proj", "/tmp/project2/a.ts"), "/tmp/project2/a.ts");
    }
}
