use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tar::{Archive, Builder, HeaderMode};
use tokio::io::AsyncRead;
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use utils::ChannelWriter;
use walkdir::WalkDir;

use crate::errors::{DataTransferError, Result};

/// Not `Interrupted`: `write_all`, `read_exact` and `io::copy` retry on that kind.
fn cancelled_error() -> io::Error {
    io::Error::other("cancelled")
}

/// Sync writer that stops as soon as the token is cancelled and remembers whether the failure
/// came from its side.
struct CancellableWriter<W> {
    inner: W,
    token: CancellationToken,
    failed: bool,
}

impl<W: Write> Write for CancellableWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.token.is_cancelled() {
            self.failed = true;
            return Err(cancelled_error());
        }
        self.inner.write(buf).inspect_err(|_| self.failed = true)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().inspect_err(|_| self.failed = true)
    }
}

struct CancellableReader<R> {
    inner: R,
    token: CancellationToken,
}

impl<R: Read> Read for CancellableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.token.is_cancelled() {
            return Err(cancelled_error());
        }
        self.inner.read(buf)
    }
}

/// Writes a tar archive of the contents of `dir` into `writer`.
///
/// Entries are sorted by path and carry deterministic headers (no owners, fixed mtime), so the
/// same tree always produces the same bytes. Paths inside the archive are relative to `dir`.
/// The writer is shut down on success; on failure the reader sees an error instead of the end of
/// the stream.
pub async fn archive_directory(dir: impl AsRef<Path>, writer: ChannelWriter, token: CancellationToken) -> Result<()> {
    let dir = dir.as_ref().to_path_buf();
    info!("Archiving {dir:?}");

    let mut out = CancellableWriter {
        inner: SyncIoBridge::new(writer),
        token: token.clone(),
        failed: false,
    };

    let (out, result) = tokio::task::spawn_blocking(move || {
        let result = write_archive(&dir, &mut out);
        (out, result)
    })
    .await?;

    let CancellableWriter { inner, failed, .. } = out;

    let result = match result {
        Ok(()) => {
            let mut inner = inner;
            tokio::task::spawn_blocking(move || inner.shutdown())
                .await?
                .map_err(|e| DataTransferError::pipe("failed to close archive stream", e))
        },
        Err((path, e)) => {
            let err = if token.is_cancelled() {
                DataTransferError::Cancelled
            } else if failed {
                DataTransferError::pipe("failed to write archive", e)
            } else {
                DataTransferError::Archive { path, source: e }
            };

            if !token.is_cancelled() {
                let writer = inner.into_inner();
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {},
                    _ = writer.abort(err.to_io_error()) => {},
                }
            }
            Err(err)
        },
    };

    debug!("Archiver done: {result:?}");
    result
}

fn write_archive<W: Write>(dir: &Path, out: &mut W) -> std::result::Result<(), (PathBuf, io::Error)> {
    let mut builder = Builder::new(out);
    builder.mode(HeaderMode::Deterministic);
    builder.follow_symlinks(false);

    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            (path, io::Error::from(e))
        })?;

        let path = entry.path();
        let Ok(rel) = path.strip_prefix(dir) else {
            continue;
        };
        if rel.as_os_str().is_empty() {
            continue;
        }

        if entry.file_type().is_dir() {
            builder.append_dir(rel, path)
        } else {
            builder.append_path_with_name(path, rel)
        }
        .map_err(|e| (path.to_path_buf(), e))?;
    }

    builder.finish().map_err(|e| (dir.to_path_buf(), e))
}

/// Unpacks the tar stream read from `reader` into `output_dir`, creating it if needed.
pub async fn extract_archive<R>(reader: R, output_dir: impl AsRef<Path>, token: CancellationToken) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let output_dir = output_dir.as_ref().to_path_buf();
    info!("Extracting into {output_dir:?}");

    let input = CancellableReader {
        inner: SyncIoBridge::new(reader),
        token: token.clone(),
    };

    let result = tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&output_dir).map_err(|e| (output_dir.clone(), e))?;
        let mut archive = Archive::new(input);
        archive.set_preserve_permissions(true);
        archive.unpack(&output_dir).map_err(|e| (output_dir, e))
    })
    .await?;

    match result {
        Ok(()) => Ok(()),
        Err(_) if token.is_cancelled() => Err(DataTransferError::Cancelled),
        Err((path, e)) => Err(DataTransferError::Archive { path, source: e }),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use utils::pipe;

    use super::*;

    fn populate(dir: &Path) {
        fs::create_dir_all(dir.join("sub/deeper")).unwrap();
        fs::write(dir.join("b.txt"), b"bbbb").unwrap();
        fs::write(dir.join("a.txt"), b"a").unwrap();
        fs::write(dir.join("sub/c.bin"), vec![7u8; 10_000]).unwrap();
        fs::write(dir.join("sub/deeper/d"), b"").unwrap();
    }

    async fn archive_bytes(dir: &Path) -> Vec<u8> {
        let (writer, stream) = pipe(4);
        let task = tokio::spawn(archive_directory(dir.to_path_buf(), writer, CancellationToken::new()));

        let mut out = Vec::new();
        stream.reader().read_to_end(&mut out).await.unwrap();
        task.await.unwrap().unwrap();
        out
    }

    #[tokio::test]
    async fn test_archive_is_deterministic_and_sorted() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());

        let first = archive_bytes(dir.path()).await;
        let second = archive_bytes(dir.path()).await;
        assert_eq!(first, second);

        let mut archive = Archive::new(&first[..]);
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().trim_end_matches('/').to_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub", "sub/c.bin", "sub/deeper", "sub/deeper/d"]);
    }

    #[tokio::test]
    async fn test_round_trip_through_extract() {
        let src = TempDir::new().unwrap();
        populate(src.path());
        let dst = TempDir::new().unwrap();

        let (writer, stream) = pipe(4);
        let token = CancellationToken::new();
        let archiver = tokio::spawn(archive_directory(src.path().to_path_buf(), writer, token.clone()));
        extract_archive(stream.reader(), dst.path().join("out"), token).await.unwrap();
        archiver.await.unwrap().unwrap();

        assert_eq!(fs::read(dst.path().join("out/b.txt")).unwrap(), b"bbbb");
        assert_eq!(fs::read(dst.path().join("out/sub/c.bin")).unwrap(), vec![7u8; 10_000]);
        assert!(dst.path().join("out/sub/deeper/d").is_file());
    }

    #[tokio::test]
    async fn test_missing_directory_aborts_the_pipe() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");

        let (writer, stream) = pipe(4);
        let task = tokio::spawn(archive_directory(missing.clone(), writer, CancellationToken::new()));

        let mut out = Vec::new();
        assert!(stream.reader().read_to_end(&mut out).await.is_err());

        match task.await.unwrap() {
            Err(DataTransferError::Archive { path, .. }) => assert_eq!(path, missing),
            r => panic!("unexpected result {r:?}"),
        }
    }

    #[test]
    fn test_cancelled_wrappers_fail_std_helpers() {
        let token = CancellationToken::new();
        token.cancel();

        let mut out = CancellableWriter {
            inner: Vec::new(),
            token: token.clone(),
            failed: false,
        };
        let err = out.write_all(b"data").unwrap_err();
        assert_ne!(err.kind(), io::ErrorKind::Interrupted);
        assert!(out.failed);

        let mut input = CancellableReader {
            inner: &b"more data"[..],
            token,
        };
        assert!(io::copy(&mut input, &mut io::sink()).is_err());
        assert!(input.read_exact(&mut [0u8; 4]).is_err());
    }

    #[tokio::test]
    async fn test_cancel_stops_archiving() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("big"), vec![1u8; 4 << 20]).unwrap();

        // Nobody reads, so the archiver parks on the full pipe until cancelled.
        let (writer, stream) = pipe(1);
        let token = CancellationToken::new();
        let task = tokio::spawn(archive_directory(dir.path().to_path_buf(), writer, token.clone()));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        token.cancel();
        drop(stream);

        let r = tokio::time::timeout(std::time::Duration::from_secs(10), task).await.unwrap().unwrap();
        assert!(r.unwrap_err().is_cancelled());
    }
}
