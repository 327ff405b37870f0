//! METS manifest of a workspace's file groups.
//!
//! Only the `fileSec` is modeled: `fileGrp/@USE`, `file/@ID`,
//! `file/@MIMETYPE` and the `FLocat` hrefs. Everything outside the `fileSec`
//! (header, descriptive metadata, structure maps) is kept byte for byte and
//! written back unchanged, so `file/@ID` references stay valid.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use quick_xml::escape::escape;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use crate::workspace::WorkspaceError;

const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

const EMPTY_HEAD: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<mets:mets xmlns:mets=\"http://www.loc.gov/METS/\" xmlns:xlink=\"http://www.w3.org/1999/xlink\">\n  ";
const EMPTY_TAIL: &str = "\n</mets:mets>\n";

/// Errors while parsing a METS document.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("document is not UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed attribute: {0}")]
    Attribute(#[from] AttrError),

    #[error("{0}")]
    Structure(String),
}

/// One `mets:file` of a file group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFile {
    /// `@ID` of the file.
    pub id: String,

    /// Href of the `FLocat` with `LOCTYPE="URL"`.
    pub url: Option<String>,

    /// Href of the `FLocat` with `LOCTYPE="OTHER" OTHERLOCTYPE="FILE"`,
    /// relative to the workspace directory.
    pub local_filename: Option<String>,

    /// `@MIMETYPE`, if declared.
    pub mimetype: Option<String>,
}

impl ManifestFile {
    /// Create a file entry pointing at a fetchable location.
    pub fn remote(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: Some(url.into()),
            local_filename: None,
            mimetype: None,
        }
    }

    /// Create a file entry that only exists locally.
    pub fn local(id: impl Into<String>, local_filename: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: None,
            local_filename: Some(local_filename.into()),
            mimetype: None,
        }
    }

    /// Builder method to set the MIME type.
    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }
}

/// Named file groups of a METS document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// File groups by `@USE`.
    pub file_groups: BTreeMap<String, Vec<ManifestFile>>,

    /// Document text before the `fileSec`.
    head: String,

    /// Document text after the `fileSec`.
    tail: String,

    /// Namespace prefix of the METS elements (`mets` in OCR-D documents).
    prefix: Option<String>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            file_groups: BTreeMap::new(),
            head: EMPTY_HEAD.to_string(),
            tail: EMPTY_TAIL.to_string(),
            prefix: Some("mets".to_string()),
        }
    }
}

impl Manifest {
    /// Parse a METS document.
    pub fn from_slice(bytes: &[u8], origin: &str) -> Result<Self, WorkspaceError> {
        Self::parse(bytes).map_err(|source| WorkspaceError::Manifest {
            location: origin.to_string(),
            source,
        })
    }

    /// Read a manifest from disk.
    pub async fn load(path: &Path) -> Result<Self, WorkspaceError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| WorkspaceError::io(path, source))?;
        Self::from_slice(&bytes, &path.display().to_string())
    }

    /// Write the manifest to disk.
    pub async fn save(&self, path: &Path) -> Result<(), WorkspaceError> {
        tokio::fs::write(path, self.to_xml())
            .await
            .map_err(|source| WorkspaceError::io(path, source))
    }

    /// The full document with the current file groups.
    pub fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(self.head.len() + self.tail.len() + 1024);
        xml.push_str(&self.head);
        self.write_file_sec(&mut xml);
        xml.push_str(&self.tail);
        xml
    }

    /// Files of a group; empty if the group does not exist.
    pub fn find_files(&self, group: &str) -> &[ManifestFile] {
        self.file_groups
            .get(group)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Mutable files of a group, if it exists.
    pub fn files_mut(&mut self, group: &str) -> Option<&mut Vec<ManifestFile>> {
        self.file_groups.get_mut(group)
    }

    /// Returns true if the group is declared.
    pub fn has_group(&self, group: &str) -> bool {
        self.file_groups.contains_key(group)
    }

    /// Add a file to a group, creating the group if needed.
    pub fn add_file(&mut self, group: impl Into<String>, file: ManifestFile) {
        self.file_groups.entry(group.into()).or_default().push(file);
    }

    fn parse(bytes: &[u8]) -> Result<Self, ManifestError> {
        let text = std::str::from_utf8(bytes)?;
        let mut reader = Reader::from_str(text);
        let mut groups = FileSecParser::default();

        let mut depth = 0usize;
        let mut root_prefix = None;
        let mut root_end = None;
        let mut sec_start = None;
        let mut sec_range = None;
        let mut sec_prefix = None;

        loop {
            let before = reader.buffer_position() as usize;
            match reader.read_event()? {
                Event::Start(e) => {
                    if depth == 0 {
                        root_prefix = prefix_of(&e);
                    }
                    depth += 1;
                    if e.local_name().as_ref() == b"fileSec" && sec_range.is_none() {
                        sec_start = Some(before);
                        sec_prefix = prefix_of(&e);
                    }
                    groups.open(&e)?;
                }
                Event::Empty(e) => {
                    if depth == 0 {
                        root_prefix = prefix_of(&e);
                        root_end = Some(before);
                    }
                    if e.local_name().as_ref() == b"fileSec" && sec_range.is_none() {
                        sec_range = Some((before, reader.buffer_position() as usize));
                        sec_prefix = prefix_of(&e);
                    }
                    groups.open(&e)?;
                    groups.close(e.local_name().as_ref());
                }
                Event::End(e) => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        root_end = Some(before);
                    }
                    if e.local_name().as_ref() == b"fileSec" && sec_range.is_none() {
                        if let Some(start) = sec_start.take() {
                            sec_range = Some((start, reader.buffer_position() as usize));
                        }
                    }
                    groups.close(e.local_name().as_ref());
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let (head, tail) = match (sec_range, root_end) {
            (Some((start, end)), _) => (&text[..start], &text[end..]),
            // a self-closing root cannot take a fileSec
            (None, Some(end)) if depth == 0 && text[end..].trim_start().starts_with("</") => {
                (&text[..end], &text[end..])
            }
            _ => {
                return Err(ManifestError::Structure(
                    "document has no root element to hold a fileSec".to_string(),
                ))
            }
        };

        Ok(Self {
            file_groups: groups.groups,
            head: head.to_string(),
            tail: tail.to_string(),
            prefix: sec_prefix.or(root_prefix),
        })
    }

    fn write_file_sec(&self, xml: &mut String) {
        let p = match &self.prefix {
            Some(prefix) => format!("{}:", prefix),
            None => String::new(),
        };

        let _ = writeln!(xml, "<{p}fileSec xmlns:xlink=\"{XLINK_NS}\">");
        for (group, files) in &self.file_groups {
            let _ = writeln!(xml, "    <{p}fileGrp USE=\"{}\">", escape(group.as_str()));
            for file in files {
                let _ = write!(xml, "      <{p}file ID=\"{}\"", escape(file.id.as_str()));
                if let Some(mimetype) = &file.mimetype {
                    let _ = write!(xml, " MIMETYPE=\"{}\"", escape(mimetype.as_str()));
                }
                xml.push_str(">\n");
                if let Some(local) = &file.local_filename {
                    let _ = writeln!(
                        xml,
                        "        <{p}FLocat LOCTYPE=\"OTHER\" OTHERLOCTYPE=\"FILE\" xlink:href=\"{}\"/>",
                        escape(local.as_str())
                    );
                }
                if let Some(url) = &file.url {
                    let _ = writeln!(
                        xml,
                        "        <{p}FLocat LOCTYPE=\"URL\" xlink:href=\"{}\"/>",
                        escape(url.as_str())
                    );
                }
                let _ = writeln!(xml, "      </{p}file>");
            }
            let _ = writeln!(xml, "    </{p}fileGrp>");
        }
        let _ = write!(xml, "  </{p}fileSec>");
    }
}

/// Collects `fileGrp`/`file`/`FLocat` while the document streams by.
#[derive(Default)]
struct FileSecParser {
    groups: BTreeMap<String, Vec<ManifestFile>>,
    group: Option<String>,
    file: Option<ManifestFile>,
}

impl FileSecParser {
    fn open(&mut self, e: &BytesStart<'_>) -> Result<(), ManifestError> {
        match e.local_name().as_ref() {
            b"fileGrp" => {
                let name = required(e, b"USE", "fileGrp")?;
                self.groups.entry(name.clone()).or_default();
                self.group = Some(name);
            }
            b"file" if self.group.is_some() => {
                self.file = Some(ManifestFile {
                    id: required(e, b"ID", "file")?,
                    url: None,
                    local_filename: None,
                    mimetype: attribute(e, b"MIMETYPE")?,
                });
            }
            b"FLocat" => {
                if let Some(file) = self.file.as_mut() {
                    let href = required(e, b"href", "FLocat")?;
                    let is_local = attribute(e, b"LOCTYPE")?.as_deref() == Some("OTHER")
                        && attribute(e, b"OTHERLOCTYPE")?.as_deref() == Some("FILE");
                    let slot = if is_local {
                        &mut file.local_filename
                    } else {
                        &mut file.url
                    };
                    slot.get_or_insert(href);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, local_name: &[u8]) {
        match local_name {
            b"file" => {
                if let (Some(group), Some(file)) = (&self.group, self.file.take()) {
                    self.groups.entry(group.clone()).or_default().push(file);
                }
            }
            b"fileGrp" => self.group = None,
            _ => {}
        }
    }
}

fn prefix_of(e: &BytesStart<'_>) -> Option<String> {
    e.name()
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
}

fn attribute(e: &BytesStart<'_>, local_name: &[u8]) -> Result<Option<String>, ManifestError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == local_name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn required(e: &BytesStart<'_>, local_name: &[u8], element: &str) -> Result<String, ManifestError> {
    attribute(e, local_name)?.ok_or_else(|| {
        ManifestError::Structure(format!(
            "{} without {}",
            element,
            String::from_utf8_lossy(local_name)
        ))
    })
}
