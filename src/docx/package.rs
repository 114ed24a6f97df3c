use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, Write};

use anyhow::{anyhow, Context};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Limits applied while inflating a package, against decompression bombs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InflateGuard {
    /// Smallest accepted compressed/uncompressed ratio for an entry.
    pub min_inflate_ratio: f64,
    /// Entries up to this many bytes are not ratio-checked.
    pub grace_entry_size: u64,
    pub max_entry_size: u64,
}

impl Default for InflateGuard {
    fn default() -> Self {
        Self {
            min_inflate_ratio: 0.001,
            grace_entry_size: 100 * 1024,
            max_entry_size: u32::MAX as u64,
        }
    }
}

impl InflateGuard {
    pub fn check(&self, name: &str, compressed: u64, size: u64) -> anyhow::Result<()> {
        if size > self.max_entry_size {
            return Err(anyhow!(
                "zip entry {name} too large: {size} bytes (limit {})",
                self.max_entry_size
            ));
        }
        if size <= self.grace_entry_size {
            return Ok(());
        }
        let ratio = compressed as f64 / size as f64;
        if ratio < self.min_inflate_ratio {
            return Err(anyhow!(
                "zip bomb suspected in {name}: inflate ratio {ratio:.6} below {} ({compressed} -> {size} bytes)",
                self.min_inflate_ratio
            ));
        }
        Ok(())
    }
}

pub struct DocxPackage {
    pub entries: Vec<DocxEntry>,
}

pub struct DocxEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl DocxPackage {
    pub fn from_bytes(bytes: &[u8], guard: &InflateGuard) -> anyhow::Result<Self> {
        Self::from_reader(Cursor::new(bytes), guard)
    }

    fn from_reader<R: Read + Seek>(reader: R, guard: &InflateGuard) -> anyhow::Result<Self> {
        let mut zip = ZipArchive::new(reader).context("read zip")?;
        let mut entries = Vec::new();
        for i in 0..zip.len() {
            let file = zip.by_index(i).context("zip entry")?;
            let name = file.name().to_string();
            let size = file.size();
            guard.check(&name, file.compressed_size(), size)?;
            let compression = file.compression();
            let last_modified = file.last_modified().unwrap_or_default();
            let unix_mode = file.unix_mode();
            let is_dir = file.is_dir();

            // The declared size is not trusted: read one byte past it to
            // detect entries that inflate beyond what the header says, and
            // preallocate no more than an entry the guard waves through.
            let mut data = Vec::with_capacity(size.min(guard.grace_entry_size) as usize);
            file.take(size.saturating_add(1))
                .read_to_end(&mut data)
                .with_context(|| format!("read zip entry: {name}"))?;
            if data.len() as u64 > size {
                return Err(anyhow!(
                    "zip entry {name} inflates past its declared size of {size} bytes"
                ));
            }
            entries.push(DocxEntry {
                name,
                data,
                compression,
                last_modified,
                unix_mode,
                is_dir,
            });
        }
        Ok(Self { entries })
    }

    pub fn get(&self, name: &str) -> Option<&DocxEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Serializes the package. Entries named in `replacements` get new data;
    /// replacement names not yet in the package are appended as new entries.
    pub fn write_with_replacements(
        &self,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> anyhow::Result<Vec<u8>> {
        let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
        for ent in &self.entries {
            let data = replacements.get(&ent.name).unwrap_or(&ent.data);
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(ent.name.as_str(), opts)
                    .with_context(|| format!("add zip dir: {}", ent.name))?;
            } else {
                write_entry(&mut zout, &ent.name, data, opts)?;
            }
        }

        let mut added: Vec<&String> = replacements
            .keys()
            .filter(|name| !self.contains(name))
            .collect();
        added.sort();
        for name in added {
            let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            write_entry(&mut zout, name, &replacements[name], opts)?;
        }

        let cursor = zout.finish().context("finish zip")?;
        Ok(cursor.into_inner())
    }
}

fn write_entry<W: Write + Seek>(
    zout: &mut ZipWriter<W>,
    name: &str,
    data: &[u8],
    opts: SimpleFileOptions,
) -> anyhow::Result<()> {
    zout.start_file(name, opts)
        .with_context(|| format!("start zip file: {name}"))?;
    zout.write_all(data)
        .with_context(|| format!("write zip file: {name}"))?;
    Ok(())
}
