//! Cross-platform filename sanitisation for thumbnail names.

/// Replace characters the filesystem rejects, strip leading/trailing dots
/// and spaces, clamp to 255 bytes, and substitute `unnamed` when nothing
/// is left.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if is_invalid_char(c) { '_' } else { c })
        .collect();

    let mut out = replaced.trim_matches(['.', ' ']).to_owned();

    if out.len() > 255 {
        let mut end = 255;
        while !out.is_char_boundary(end) {
            end -= 1;
        }
        out.truncate(end);
        out = out.trim_matches(['.', ' ']).to_owned();
    }

    if out.is_empty() {
        out = "unnamed".to_owned();
    }
    out
}

#[cfg(windows)]
fn is_invalid_char(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
}

#[cfg(not(windows))]
fn is_invalid_char(c: char) -> bool {
    c == '/'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slashes_become_underscores() {
        assert_eq!(sanitize_filename("a/b"), "a_b");
    }

    #[test]
    fn dots_and_spaces_stripped() {
        assert_eq!(sanitize_filename(" .song. "), "song");
    }

    #[test]
    fn empty_becomes_unnamed() {
        assert_eq!(sanitize_filename("..."), "unnamed");
        assert_eq!(sanitize_filename(""), "unnamed");
    }

    #[test]
    fn unicode_only_name_survives() {
        let name = "歌曲名稱";
        let out = sanitize_filename(name);
        assert_eq!(out, name);
        assert!(!out.is_empty());
        assert!(out.len() <= 255);
    }

    #[test]
    fn long_multibyte_name_clamped_at_char_boundary() {
        let name = "音".repeat(120); // 360 bytes
        let out = sanitize_filename(&name);
        assert!(out.len() <= 255);
        assert!(!out.is_empty());
        // still valid UTF-8 made of whole characters
        assert!(out.chars().all(|c| c == '音'));
    }
}
