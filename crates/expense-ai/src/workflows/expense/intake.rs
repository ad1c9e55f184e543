use super::domain::{ReceiptId, ReceiptSource};
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("unable to read receipt directory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("receipt {0} appears more than once in the batch")]
    DuplicateReceipt(ReceiptId),
    #[error("receipt {0} was not found in the receipts directory")]
    NotFound(String),
    #[error("receipt {0} resolves outside the receipts directory")]
    OutsideRoot(String),
    #[error("receipt {0} is not a .jpg, .jpeg or .png file")]
    NotAnImage(String),
}

/// Directory that caller-supplied receipt paths must resolve inside.
#[derive(Debug, Clone)]
pub struct ReceiptRoot {
    root: PathBuf,
}

impl ReceiptRoot {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, IntakeError> {
        let dir = dir.as_ref();
        let root = dir.canonicalize().map_err(|source| IntakeError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve `raw` against the root. `..` and symlinks are followed before
    /// the containment check, and only existing image files are accepted.
    pub fn resolve(&self, raw: &str) -> Result<ReceiptSource, IntakeError> {
        let resolved = self
            .root
            .join(raw)
            .canonicalize()
            .map_err(|_| IntakeError::NotFound(raw.to_string()))?;
        if !resolved.starts_with(&self.root) {
            return Err(IntakeError::OutsideRoot(raw.to_string()));
        }
        if !resolved.is_file() || !is_receipt_image(&resolved) {
            return Err(IntakeError::NotAnImage(raw.to_string()));
        }
        Ok(ReceiptSource::new(resolved))
    }

    pub fn resolve_all<S: AsRef<str>>(&self, raw: &[S]) -> Result<Vec<ReceiptSource>, IntakeError> {
        raw.iter().map(|path| self.resolve(path.as_ref())).collect()
    }
}

/// Receipt images directly inside `dir`, sorted by file name.
pub fn discover_receipts(dir: impl AsRef<Path>) -> Result<Vec<ReceiptSource>, IntakeError> {
    let dir = dir.as_ref();
    let io_error = |source| IntakeError::Io {
        path: dir.display().to_string(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_file() && is_receipt_image(&path) {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    Ok(paths.into_iter().map(ReceiptSource::new).collect())
}

fn is_receipt_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_images_case_insensitively_in_name_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        for name in ["b_taxi.PNG", "a_dinner.jpg", "c_hotel.JPEG", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"img").expect("write fixture");
        }
        std::fs::create_dir(dir.path().join("nested.jpg")).expect("nested dir");

        let ids: Vec<String> = discover_receipts(dir.path())
            .expect("directory scans")
            .iter()
            .map(|source| source.receipt_id().0)
            .collect();
        assert_eq!(ids, vec!["a_dinner.jpg", "b_taxi.PNG", "c_hotel.JPEG"]);
    }

    fn receipts_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir(dir.path().join("trip")).expect("trip dir");
        std::fs::write(dir.path().join("trip/lunch.jpg"), b"img").expect("write image");
        std::fs::write(dir.path().join("notes.txt"), b"text").expect("write notes");
        dir
    }

    #[test]
    fn resolves_images_inside_the_root() {
        let dir = receipts_dir();
        let root = ReceiptRoot::new(dir.path()).expect("root exists");

        let source = root.resolve("trip/lunch.jpg").expect("inside root");
        assert!(source.path().starts_with(root.path()));
        assert_eq!(source.receipt_id().0, "lunch.jpg");

        let sources = root
            .resolve_all(&["trip/../trip/lunch.jpg"])
            .expect("normalised path stays inside");
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn rejects_paths_that_escape_or_are_not_images() {
        let outer = receipts_dir();
        std::fs::create_dir(outer.path().join("root")).expect("root dir");
        std::fs::write(outer.path().join("secret.png"), b"img").expect("write secret");
        let root = ReceiptRoot::new(outer.path().join("root")).expect("root exists");

        assert!(matches!(
            root.resolve("../secret.png"),
            Err(IntakeError::OutsideRoot(_))
        ));
        let absolute = outer.path().join("secret.png").display().to_string();
        assert!(matches!(
            root.resolve(&absolute),
            Err(IntakeError::OutsideRoot(_))
        ));
        assert!(matches!(
            root.resolve("missing.jpg"),
            Err(IntakeError::NotFound(_))
        ));
        assert!(matches!(
            root.resolve("../notes.txt"),
            Err(IntakeError::OutsideRoot(_))
        ));

        let flat = ReceiptRoot::new(outer.path()).expect("root exists");
        assert!(matches!(
            flat.resolve("notes.txt"),
            Err(IntakeError::NotAnImage(_))
        ));
        assert!(matches!(flat.resolve("root"), Err(IntakeError::NotAnImage(_))));
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let result = discover_receipts("/definitely/not/here");
        assert!(matches!(result, Err(IntakeError::Io { .. })));
    }
}
