//! Gzipped tarballs for blobs, compiled packages and log bundles.

use std::fs::File;
use std::path::Path;

use anyhow::Context;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};

/// Extract `archive` into `dest`. Entries escaping `dest` are refused.
pub(crate) async fn unpack(archive: &Path, dest: &Path) -> anyhow::Result<()> {
    let (archive, dest) = (archive.to_path_buf(), dest.to_path_buf());
    blocking(move || {
        let file = File::open(&archive)
            .with_context(|| format!("Opening archive {}", archive.display()))?;
        Archive::new(GzDecoder::new(file))
            .unpack(&dest)
            .with_context(|| format!("Extracting {} into {}", archive.display(), dest.display()))
    })
    .await
}

/// Tarball of everything under `dir`, with entry paths relative to it.
pub(crate) async fn pack_dir(dir: &Path, dest: &Path) -> anyhow::Result<()> {
    let (dir, dest) = (dir.to_path_buf(), dest.to_path_buf());
    blocking(move || {
        let mut builder = builder(&dest)?;
        builder
            .append_dir_all(".", &dir)
            .with_context(|| format!("Archiving {}", dir.display()))?;
        finish(builder, &dest)
    })
    .await
}

/// Tarball of `files`, named relative to `base`.
pub(crate) async fn pack_files(base: &Path, files: Vec<String>, dest: &Path) -> anyhow::Result<()> {
    let (base, dest) = (base.to_path_buf(), dest.to_path_buf());
    blocking(move || {
        let mut builder = builder(&dest)?;
        for name in &files {
            builder
                .append_path_with_name(base.join(name), name)
                .with_context(|| format!("Archiving {name}"))?;
        }
        finish(builder, &dest)
    })
    .await
}

fn builder(dest: &Path) -> anyhow::Result<Builder<GzEncoder<File>>> {
    let file = File::create(dest).with_context(|| format!("Creating {}", dest.display()))?;
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    Ok(builder)
}

fn finish(builder: Builder<GzEncoder<File>>, dest: &Path) -> anyhow::Result<()> {
    builder
        .into_inner()
        .and_then(GzEncoder::finish)
        .with_context(|| format!("Writing {}", dest.display()))?;
    Ok(())
}

async fn blocking<F>(work: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .context("Archive worker stopped")?
}
