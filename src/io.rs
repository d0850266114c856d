use std::path::{Path, PathBuf};

use crate::result::{err_msg, Result};

/// Strip characters from a title that are problematic in file names
pub fn sanitize_title(title: &str) -> String {
    title
        .split(['\'', '"', '/', '\\', '|', '~', '$', '#'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Find an output path that does not collide with an existing file.
///
/// Check filenames one by one until one does not exist:
/// `<title><ext>`, then `<title> (<count>)<ext>` for the 2nd and up.
pub fn find_unused_path(out_dir: &Path, title: &str, dot_ext: &str) -> Result<PathBuf> {
    let mut output = out_dir.to_path_buf();

    output.push(format!("{title}{dot_ext}"));
    if !output.exists() {
        return Ok(output);
    }

    for n in 2u16.. {
        output.set_file_name(format!("{title} ({n}){dot_ext}"));
        if !output.exists() {
            return Ok(output);
        }
    }

    Err(err_msg(
        "Code is broken or you have really REALLY too much files with the same title",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_lose_their_problematic_characters() {
        assert_eq!(sanitize_title("a/b\\c"), "a b c");
        assert_eq!(sanitize_title("it's | \"here\"~"), "it s here");
        assert_eq!(sanitize_title("plain title"), "plain title");
    }

    #[test]
    fn collisions_get_a_counter_suffix() {
        let dir = tempfile::tempdir().unwrap();

        let first = find_unused_path(dir.path(), "clip", ".mp4").unwrap();
        assert_eq!(first, dir.path().join("clip.mp4"));

        std::fs::write(&first, b"x").unwrap();
        let second = find_unused_path(dir.path(), "clip", ".mp4").unwrap();
        assert_eq!(second, dir.path().join("clip (2).mp4"));
    }
}
