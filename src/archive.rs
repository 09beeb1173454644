use std::{
    collections::HashSet,
    fs::File,
    io::{self, BufWriter},
    path::{Path, PathBuf},
};

use tracing::{debug, warn};
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

/// Writes every existing file from `members` into a zip at `destination`.
/// Missing files are skipped, as are repeated member names. Returns how
/// many files were stored.
pub fn write_zip(destination: &Path, members: &[PathBuf]) -> io::Result<usize> {
    let file = File::create(destination)?;
    let mut writer = ZipWriter::new(BufWriter::new(file));
    // mp3 is already compressed
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    let mut seen = HashSet::new();
    let mut stored = 0;

    for member in members {
        let Some(name) = member.file_name().and_then(|name| name.to_str()) else {
            warn!("Skipping archive member with unusable name: {:?}", member);
            continue;
        };
        if !member.is_file() {
            debug!("Skipping missing archive member {:?}", member);
            continue;
        }
        if !seen.insert(name.to_string()) {
            debug!("Skipping duplicate archive member {name}");
            continue;
        }

        writer.start_file(name, options).map_err(io::Error::other)?;
        let mut source = File::open(member)?;
        io::copy(&mut source, &mut writer)?;
        stored += 1;
    }

    let mut inner = writer.finish().map_err(io::Error::other)?;
    io::Write::flush(&mut inner)?;
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn archive_contains_only_produced_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("One.mp3");
        let second = dir.path().join("Two.mp3");
        std::fs::write(&first, b"first").unwrap();
        std::fs::write(&second, b"second").unwrap();
        let missing = dir.path().join("Three.mp3");

        let zip_path = dir.path().join("playlist.zip");
        let stored = write_zip(&zip_path, &[first, missing, second]).unwrap();
        assert_eq!(stored, 2);

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let mut names: Vec<_> = archive.file_names().map(ToString::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["One.mp3", "Two.mp3"]);

        let mut contents = String::new();
        archive
            .by_name("Two.mp3")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "second");
    }

    #[test]
    fn repeated_names_are_stored_once() {
        let dir = tempfile::tempdir().unwrap();
        let song = dir.path().join("Same.mp3");
        std::fs::write(&song, b"x").unwrap();

        let zip_path = dir.path().join("playlist.zip");
        let stored = write_zip(&zip_path, &[song.clone(), song]).unwrap();
        assert_eq!(stored, 1);
    }

    #[test]
    fn nothing_produced_gives_an_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("playlist.zip");
        let stored = write_zip(&zip_path, &[dir.path().join("gone.mp3")]).unwrap();
        assert_eq!(stored, 0);
        assert!(zip_path.exists());
    }
}
