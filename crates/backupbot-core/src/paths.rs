use std::path::PathBuf;

/// Expand a leading `~` to the user's home directory.
///
/// Only the first character is considered. If the home directory cannot be
/// resolved the input is returned unchanged.
pub fn expand_path(path: &str) -> PathBuf {
    expand_with_home(path, dirs::home_dir())
}

fn expand_with_home(path: &str, home: Option<PathBuf>) -> PathBuf {
    let Some(rest) = path.strip_prefix('~') else {
        return PathBuf::from(path);
    };
    let Some(home) = home else {
        return PathBuf::from(path);
    };
    let mut out = home.into_os_string();
    out.push(rest);
    PathBuf::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_leading_tilde() {
        let home = Some(PathBuf::from("/home/op"));
        assert_eq!(
            expand_with_home("~/data", home.clone()),
            PathBuf::from("/home/op/data")
        );
        assert_eq!(expand_with_home("~", home), PathBuf::from("/home/op"));
    }

    #[test]
    fn leaves_other_paths_alone() {
        let home = Some(PathBuf::from("/home/op"));
        assert_eq!(
            expand_with_home("/etc/~hosts", home.clone()),
            PathBuf::from("/etc/~hosts")
        );
        assert_eq!(expand_with_home("rel/path", home), PathBuf::from("rel/path"));
    }

    #[test]
    fn unresolvable_home_returns_input() {
        assert_eq!(expand_with_home("~/data", None), PathBuf::from("~/data"));
    }
}
