//! Packaging collaborator: writes an [AssembledDocument] as a single-chapter EPUB 2 or EPUB 3.
//!
//! The archive is built in a temporary file next to the destination and renamed into place
//! only after it is complete, so a failed write leaves nothing behind.

use crate::model::{artifact_file_name, AssembledDocument};
use chrono::{DateTime, SecondsFormat, Utc};
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const CONTAINER_XML: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n  <rootfiles>\n    <rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\"/>\n  </rootfiles>\n</container>";
const MIMETYPE: &[u8] = b"application/epub+zip";
const OEBPS_PREFIX: &str = "OEBPS/";
const CHAPTER_FILE: &str = "chapter-1.xhtml";
const PUBLISHER: &str = "Article to EPUB Converter";

/// EPUB format version.
///
/// Default is EPUB 3 (OPF 3.0, nav.xhtml, HTML5 chapter). `Epub2` targets legacy readers (OPF 2.0, NCX, XHTML 1.1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EpubVersion {
    #[default]
    Epub3,
    Epub2,
}

/// Errors from the packaging step.
#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("Cannot write EPUB: document title is empty.")]
    EmptyTitle,

    #[error("Cannot write EPUB: document author is empty.")]
    EmptyAuthor,

    #[error("Cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create EPUB file in {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move EPUB into place at {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write EPUB archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl From<std::io::Error> for PackagingError {
    fn from(e: std::io::Error) -> Self {
        PackagingError::Zip(zip::result::ZipError::Io(e))
    }
}

/// Anything that can turn an assembled document into a file at `path`.
pub trait Packager {
    fn package(&self, document: &AssembledDocument, path: &Path) -> Result<(), PackagingError>;
}

/// EPUB writer options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpubPackager {
    pub version: EpubVersion,
    /// Include toc.ncx in EPUB 3 for legacy readers. EPUB 2 always has one.
    pub include_ncx: bool,
    /// Insert a visible table-of-contents page before the chapter.
    pub include_toc_page: bool,
}

impl Packager for EpubPackager {
    fn package(&self, document: &AssembledDocument, path: &Path) -> Result<(), PackagingError> {
        validate_document(document)?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|source| PackagingError::OutputDir {
            path: dir.clone(),
            source,
        })?;
        let staged =
            tempfile::NamedTempFile::new_in(&dir).map_err(|source| PackagingError::CreateFile {
                path: dir.clone(),
                source,
            })?;

        let mut zip = ZipWriter::new(staged.as_file());
        self.write_archive(document, Utc::now(), &mut zip)?;
        zip.finish()?;

        staged
            .persist(path)
            .map_err(|e| PackagingError::Persist {
                path: path.to_path_buf(),
                source: e.error,
            })?;
        tracing::info!(path = %path.display(), "EPUB written");
        Ok(())
    }
}

impl EpubPackager {
    fn write_archive(
        &self,
        document: &AssembledDocument,
        modified: DateTime<Utc>,
        zip: &mut ZipWriter<impl Write + Seek>,
    ) -> Result<(), PackagingError> {
        let options_stored = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .unix_permissions(0o644);
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o644);

        // Mimetype first, uncompressed
        zip.start_file("mimetype", options_stored)?;
        zip.write_all(MIMETYPE)?;

        zip.start_file("META-INF/container.xml", options)?;
        zip.write_all(CONTAINER_XML)?;

        let include_ncx = self.version == EpubVersion::Epub2 || self.include_ncx;
        put(zip, options, "content.opf", &self.opf(document, modified, include_ncx))?;
        if self.version == EpubVersion::Epub3 {
            put(zip, options, "nav.xhtml", &nav_xhtml())?;
        }
        if include_ncx {
            put(zip, options, "toc.ncx", &ncx(document))?;
        }
        if self.include_toc_page {
            put(zip, options, "toc.xhtml", &toc_page_xhtml(document))?;
        }
        put(zip, options, CHAPTER_FILE, &self.chapter(document))?;
        Ok(())
    }

    fn opf(
        &self,
        document: &AssembledDocument,
        modified: DateTime<Utc>,
        include_ncx: bool,
    ) -> String {
        let (version, spine_attr) = match self.version {
            EpubVersion::Epub3 => ("3.0", ""),
            EpubVersion::Epub2 => ("2.0", " toc=\"ncx\""),
        };
        // EPUB 3 requires a last-modified stamp; EPUB 2 has no such property.
        let modified_meta = match self.version {
            EpubVersion::Epub3 => format!(
                "    <meta property=\"dcterms:modified\">{}</meta>\n",
                modified.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            EpubVersion::Epub2 => String::new(),
        };

        let mut manifest = String::new();
        if self.version == EpubVersion::Epub3 {
            manifest.push_str(
                "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
            );
        }
        if include_ncx {
            manifest.push_str(
                "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
            );
        }
        let mut spine = String::new();
        if self.include_toc_page {
            manifest.push_str(
                "    <item id=\"toc-page\" href=\"toc.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
            );
            spine.push_str("    <itemref idref=\"toc-page\"/>\n");
        }
        manifest.push_str(&format!(
            "    <item id=\"chapter-1\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
            CHAPTER_FILE
        ));
        spine.push_str("    <itemref idref=\"chapter-1\"/>\n");

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="book-id" version="{version}">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="book-id">{id}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:creator>{creator}</dc:creator>
    <dc:publisher>{publisher}</dc:publisher>
    <dc:language>en</dc:language>
{modified_meta}  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine{spine_attr}>
{spine}  </spine>
</package>
"#,
            version = version,
            id = xml_escape(&identifier(document)),
            title = xml_escape(&document.title),
            creator = xml_escape(&document.author),
            publisher = PUBLISHER,
            modified_meta = modified_meta,
            manifest = manifest,
            spine_attr = spine_attr,
            spine = spine,
        )
    }

    fn chapter(&self, document: &AssembledDocument) -> String {
        let title = xml_escape(&document.title);
        let head = match self.version {
            EpubVersion::Epub3 => "<!DOCTYPE html>",
            EpubVersion::Epub2 => {
                "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.1//EN\" \"http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd\">"
            }
        };
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
{head}
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta charset="UTF-8"/>
  <title>{title}</title>
</head>
<body>
<h1>{title}</h1>
{body}
</body>
</html>
"#,
            head = head,
            title = title,
            body = document.body_html
        )
    }
}

fn put(
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
    name: &str,
    content: &str,
) -> Result<(), PackagingError> {
    zip.start_file(format!("{}{}", OEBPS_PREFIX, name), options)?;
    zip.write_all(content.as_bytes())?;
    Ok(())
}

fn validate_document(document: &AssembledDocument) -> Result<(), PackagingError> {
    if document.title.trim().is_empty() {
        return Err(PackagingError::EmptyTitle);
    }
    if document.author.trim().is_empty() {
        return Err(PackagingError::EmptyAuthor);
    }
    Ok(())
}

fn identifier(document: &AssembledDocument) -> String {
    match &document.source_url {
        Some(url) if !url.is_empty() => url.clone(),
        _ => format!(
            "urn:articlepub:{}",
            artifact_file_name(&document.title).trim_end_matches(".epub")
        ),
    }
}

fn nav_xhtml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
  <meta charset="UTF-8"/>
  <title>Table of Contents</title>
</head>
<body>
  <nav epub:type="toc">
    <h1>Contents</h1>
    <ol>
      <li><a href="{}">Article</a></li>
    </ol>
  </nav>
</body>
</html>
"#,
        CHAPTER_FILE
    )
}

fn toc_page_xhtml(document: &AssembledDocument) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta charset="UTF-8"/>
  <title>Table of Contents</title>
</head>
<body>
  <h1>Table of Contents</h1>
  <ol>
    <li><a href="{}">{}</a></li>
  </ol>
</body>
</html>
"#,
        CHAPTER_FILE,
        xml_escape(&document.title)
    )
}

fn ncx(document: &AssembledDocument) -> String {
    let title = xml_escape(&document.title);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{uid}"/>
  </head>
  <docTitle>
    <text>{title}</text>
  </docTitle>
  <navMap>
    <navPoint id="navpoint-1" playOrder="1">
      <navLabel><text>{title}</text></navLabel>
      <content src="{chapter}"/>
    </navPoint>
  </navMap>
</ncx>
"#,
        uid = xml_escape(&identifier(document)),
        title = title,
        chapter = CHAPTER_FILE
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
