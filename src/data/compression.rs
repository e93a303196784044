//! Transparent compression for CSV files.
//!
//! The codec is picked from the path suffix (`data.csv.gz`). When reading, a
//! file without a known suffix is also checked against each codec's magic
//! bytes, so a gzip file saved as `data.csv` still loads.

use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::Path;

use crate::error::{ConvertError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Gzip,
    Bzip2,
    Xz,
    Zstd,
    Zip,
}

impl Codec {
    pub const ALL: [Codec; 5] = [Codec::Gzip, Codec::Bzip2, Codec::Xz, Codec::Zstd, Codec::Zip];

    pub const fn name(self) -> &'static str {
        match self {
            Codec::Gzip => "gzip",
            Codec::Bzip2 => "bzip2",
            Codec::Xz => "xz",
            Codec::Zstd => "zstd",
            Codec::Zip => "zip",
        }
    }

    /// Recognized suffixes, lowercase with the leading dot.
    pub const fn extensions(self) -> &'static [&'static str] {
        match self {
            Codec::Gzip => &[".gz", ".gzip"],
            Codec::Bzip2 => &[".bz2", ".bzip2"],
            Codec::Xz => &[".xz"],
            Codec::Zstd => &[".zst", ".zstd"],
            Codec::Zip => &[".zip"],
        }
    }

    const fn magic_bytes(self) -> &'static [u8] {
        match self {
            Codec::Gzip => &[0x1f, 0x8b],
            Codec::Bzip2 => b"BZh",
            Codec::Xz => &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00],
            Codec::Zstd => &[0x28, 0xb5, 0x2f, 0xfd],
            Codec::Zip => &[0x50, 0x4b, 0x03, 0x04],
        }
    }

    /// Codec whose suffix ends the file name, with the matched suffix.
    pub fn from_path(path: &Path) -> Option<(Codec, &'static str)> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        Codec::ALL.into_iter().find_map(|codec| {
            codec
                .extensions()
                .iter()
                .find(|ext| name.ends_with(*ext))
                .map(|ext| (codec, *ext))
        })
    }

    fn from_magic(bytes: &[u8]) -> Option<Codec> {
        Codec::ALL.into_iter().find(|codec| codec.matches_magic(bytes))
    }

    fn matches_magic(self, bytes: &[u8]) -> bool {
        if !bytes.starts_with(self.magic_bytes()) {
            return false;
        }
        match self {
            // "BZh", block size '1'..='9', then a block or end-of-stream marker.
            Codec::Bzip2 => {
                const BLOCK: &[u8] = &[0x31, 0x41, 0x59, 0x26, 0x53, 0x59];
                const END: &[u8] = &[0x17, 0x72, 0x45, 0x38, 0x50, 0x90];
                matches!(bytes.get(3), Some(b'1'..=b'9'))
                    && bytes
                        .get(4..10)
                        .is_some_and(|marker| marker == BLOCK || marker == END)
            }
            _ => true,
        }
    }
}

/// Split a trailing codec suffix off a file name, keeping its original case.
pub fn strip_codec_suffix(file_name: &str) -> (&str, &str) {
    match Codec::from_path(Path::new(file_name)) {
        Some((_, ext)) => file_name.split_at(file_name.len() - ext.len()),
        None => (file_name, ""),
    }
}

/// Read a whole file, decompressing it when a codec is detected.
pub fn read_all(path: &Path) -> Result<Vec<u8>> {
    let raw = std::fs::read(path).map_err(|e| ConvertError::io(path, e))?;
    let codec = Codec::from_path(path)
        .map(|(codec, _)| codec)
        .or_else(|| Codec::from_magic(&raw));

    let Some(codec) = codec else {
        return Ok(raw);
    };
    log::debug!("decompressing {} as {}", path.display(), codec.name());
    decompress(codec, raw).map_err(|e| ConvertError::io(path, e))
}

fn decompress(codec: Codec, raw: Vec<u8>) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    match codec {
        Codec::Gzip => {
            flate2::read::MultiGzDecoder::new(raw.as_slice()).read_to_end(&mut out)?;
        }
        Codec::Bzip2 => {
            bzip2::read::MultiBzDecoder::new(raw.as_slice()).read_to_end(&mut out)?;
        }
        Codec::Xz => {
            xz2::read::XzDecoder::new_multi_decoder(raw.as_slice()).read_to_end(&mut out)?;
        }
        Codec::Zstd => {
            zstd::stream::read::Decoder::new(raw.as_slice())?.read_to_end(&mut out)?;
        }
        Codec::Zip => {
            let mut archive = zip::ZipArchive::new(Cursor::new(raw))?;
            if archive.len() != 1 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("expected one file in the zip archive, found {}", archive.len()),
                ));
            }
            archive.by_index(0)?.read_to_end(&mut out)?;
        }
    }
    Ok(out)
}

/// A CSV destination, possibly compressed.
///
/// Encoders write their trailers in [`CsvSink::finish`]; dropping a sink
/// without finishing it may leave a truncated file.
pub enum CsvSink {
    Plain(BufWriter<File>),
    Gzip(flate2::write::GzEncoder<BufWriter<File>>),
    Bzip2(bzip2::write::BzEncoder<BufWriter<File>>),
    Xz(xz2::write::XzEncoder<BufWriter<File>>),
    Zstd(zstd::stream::write::Encoder<'static, BufWriter<File>>),
    Zip(zip::ZipWriter<BufWriter<File>>),
}

impl CsvSink {
    /// Wrap an open file. `entry` names the single member of a zip archive.
    pub fn wrap(file: File, codec: Option<Codec>, entry: &str) -> std::io::Result<Self> {
        let file = BufWriter::new(file);
        Ok(match codec {
            None => CsvSink::Plain(file),
            Some(Codec::Gzip) => CsvSink::Gzip(flate2::write::GzEncoder::new(
                file,
                flate2::Compression::default(),
            )),
            Some(Codec::Bzip2) => CsvSink::Bzip2(bzip2::write::BzEncoder::new(
                file,
                bzip2::Compression::default(),
            )),
            Some(Codec::Xz) => CsvSink::Xz(xz2::write::XzEncoder::new(file, 6)),
            Some(Codec::Zstd) => CsvSink::Zstd(zstd::stream::write::Encoder::new(file, 3)?),
            Some(Codec::Zip) => {
                let mut zip = zip::ZipWriter::new(file);
                zip.start_file(entry, zip::write::SimpleFileOptions::default())?;
                CsvSink::Zip(zip)
            }
        })
    }

    /// Write any trailer and flush everything down to the file.
    pub fn finish(self) -> std::io::Result<()> {
        let file = match self {
            CsvSink::Plain(w) => w,
            CsvSink::Gzip(w) => w.finish()?,
            CsvSink::Bzip2(w) => w.finish()?,
            CsvSink::Xz(w) => w.finish()?,
            CsvSink::Zstd(w) => w.finish()?,
            CsvSink::Zip(w) => w.finish()?,
        };
        file.into_inner().map_err(|e| e.into_error())?;
        Ok(())
    }

    fn inner(&mut self) -> &mut dyn Write {
        match self {
            CsvSink::Plain(w) => w,
            CsvSink::Gzip(w) => w,
            CsvSink::Bzip2(w) => w,
            CsvSink::Xz(w) => w,
            CsvSink::Zstd(w) => w,
            CsvSink::Zip(w) => w,
        }
    }
}

impl Write for CsvSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner().flush()
    }
}

/// Create `path` for writing, compressing when its suffix names a codec.
///
/// Zip output holds a single entry named after the file without `.zip`.
pub fn create_writer(path: &Path) -> Result<CsvSink> {
    let file = File::create(path).map_err(|e| ConvertError::io(path, e))?;
    let codec = Codec::from_path(path);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let entry = match codec {
        Some((Codec::Zip, ext)) => &file_name[..file_name.len() - ext.len()],
        _ => file_name.as_str(),
    };
    CsvSink::wrap(file, codec.map(|(codec, _)| codec), entry).map_err(|e| ConvertError::io(path, e))
}
