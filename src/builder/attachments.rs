use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

/// An opened multipart file. The handle is closed when this value drops.
#[derive(Debug)]
pub struct Attachment {
    pub field: String,
    pub file_name: String,
    pub path: PathBuf,
    pub len: u64,
    pub file: File,
}

impl Attachment {
    pub fn open(field: impl Into<String>, path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        Ok(Self {
            field: field.into(),
            file_name,
            path: path.to_path_buf(),
            len: metadata.len(),
            file,
        })
    }
}

/// Finds a multipart `src`, first match wins:
/// `<request dir>/<request stem>/<src>`, `<request dir>/<src>`,
/// `<collection root>/<src>`, then `src` itself.
pub fn resolve_attachment_path(src: &str, request_path: &Path, collection_root: &Path) -> PathBuf {
    let given = PathBuf::from(src);
    if given.is_absolute() {
        return given;
    }

    let request_dir = request_path.parent().unwrap_or_else(|| Path::new("."));
    let mut candidates = Vec::with_capacity(3);
    if let Some(stem) = request_path.file_stem() {
        candidates.push(request_dir.join(stem).join(&given));
    }
    candidates.push(request_dir.join(&given));
    candidates.push(collection_root.join(&given));

    candidates
        .into_iter()
        .find(|candidate| candidate.is_file())
        .unwrap_or(given)
}
