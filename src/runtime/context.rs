use std::collections::HashSet;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use bytes::Bytes;
use futures::stream;
use tempdir::TempDir;
use tokio::sync::mpsc;
use crate::runtime::engine::ContextStream;
use crate::runtime::error::RuntimeError;

const ALWAYS_SENT: [&str; 2] = ["Dockerfile", ".dockerignore"];
const ARCHIVE_CHUNK_SIZE: usize = 64 * 1024;
const ARCHIVE_CHANNEL_DEPTH: usize = 4;

#[derive(Clone)]
struct GeneratedFile {
    name: String,
    contents: Vec<u8>,
    mode: u32,
}

/// Directory handed to the engine as a build context.
///
/// A staged context owns a temporary directory that is removed when the
/// context is dropped, whether the build succeeded or not. A context over an
/// existing directory never writes to it: generated files only live in the
/// archive.
pub(crate) struct BuildContext {
    dir: PathBuf,
    staging: Option<TempDir>,
    generated: Vec<GeneratedFile>,
}

impl BuildContext {
    pub(crate) fn stage(temp_root: &Path, prefix: &str) -> Result<Self, RuntimeError> {
        fs::create_dir_all(temp_root)?;
        let prefix: String = prefix
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        let staging = TempDir::new_in(temp_root, &prefix)?;
        debug!("Staged build context {}", staging.path().display());

        Ok(BuildContext {
            dir: staging.path().to_path_buf(),
            staging: Some(staging),
            generated: Vec::new(),
        })
    }

    pub(crate) fn in_directory(dir: &Path) -> Self {
        BuildContext {
            dir: dir.to_path_buf(),
            staging: None,
            generated: Vec::new(),
        }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn is_staged(&self) -> bool {
        self.staging.is_some()
    }

    pub(crate) fn add_file(&mut self, name: &str, contents: &[u8], mode: u32) -> Result<(), RuntimeError> {
        if self.is_staged() {
            let path = self.dir.join(name);
            fs::write(&path, contents)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&path, fs::Permissions::from_mode(mode))?;
            }
        }

        self.generated.retain(|file| file.name != name);
        self.generated.push(GeneratedFile {
            name: name.to_string(),
            contents: contents.to_vec(),
            mode,
        });
        Ok(())
    }

    /// Top-level entries of the directory left out of the archive.
    pub(crate) fn ignored_files(&self, whitelist: &[String]) -> Result<Vec<String>, RuntimeError> {
        let keep = self.kept_names(whitelist);
        let mut ignored = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if !keep.contains(name.as_str()) && !ALWAYS_SENT.contains(&name.as_str()) {
                ignored.push(name);
            }
        }

        ignored.sort();
        Ok(ignored)
    }

    /// Tar archive with the generated files plus the whitelisted files from disk.
    ///
    /// Whitelisted files are checked up front. The archive itself is written
    /// on a blocking thread and handed out in chunks, so an installer is never
    /// held in memory. Must be called from within a tokio runtime.
    pub(crate) fn archive(&self, whitelist: &[String]) -> Result<ContextStream, RuntimeError> {
        let generated: HashSet<&str> = self.generated.iter().map(|file| file.name.as_str()).collect();
        let mut files = Vec::new();

        for name in whitelist.iter().filter(|name| !generated.contains(name.as_str())) {
            let path = self.dir.join(name);
            if !path.is_file() {
                return Err(RuntimeError::SourceNotFound(path.display().to_string()));
            }
            files.push((path, name.clone()));
        }

        let generated = self.generated.clone();
        let (sender, receiver) = mpsc::channel(ARCHIVE_CHANNEL_DEPTH);

        tokio::task::spawn_blocking(move || {
            let errors = sender.clone();
            match write_archive(ChannelWriter(sender), &files, &generated) {
                Ok(()) => {}
                // receiver gone, nobody is reading anymore
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => debug!("Build context stream dropped"),
                Err(e) => {
                    let _ = errors.blocking_send(Err(RuntimeError::from(e)));
                }
            }
        });

        Ok(Box::pin(stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|chunk| (chunk, receiver))
        })))
    }

    /// Removes the staging directory now, reporting failures instead of
    /// ignoring them as drop does.
    pub(crate) fn cleanup(mut self) -> Result<(), RuntimeError> {
        if let Some(staging) = self.staging.take() {
            debug!("Removing build context {}", staging.path().display());
            staging.close()?;
        }
        Ok(())
    }

    fn kept_names<'a>(&'a self, whitelist: &'a [String]) -> HashSet<&'a str> {
        whitelist
            .iter()
            .map(String::as_str)
            .chain(self.generated.iter().map(|file| file.name.as_str()))
            .collect()
    }
}

/// Writer that forwards each buffered chunk to the archive stream.
struct ChannelWriter(mpsc::Sender<Result<Bytes, RuntimeError>>);

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "build context receiver dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn write_archive(writer: ChannelWriter, files: &[(PathBuf, String)], generated: &[GeneratedFile]) -> io::Result<()> {
    let mut builder = tar::Builder::new(BufWriter::with_capacity(ARCHIVE_CHUNK_SIZE, writer));

    for (path, name) in files {
        builder.append_path_with_name(path, name)?;
    }

    for file in generated {
        let mut header = tar::Header::new_gnu();
        header.set_size(file.contents.len() as u64);
        header.set_mode(file.mode);
        header.set_mtime(0);
        builder.append_data(&mut header, &file.name, file.contents.as_slice())?;
    }

    builder.into_inner()?.flush()
}
