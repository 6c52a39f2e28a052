//! Application manifest reading and identity patching.
//!
//! See <https://learn.microsoft.com/en-us/windows/win32/sbscs/application-manifests> for the manifest schema.

use std::{
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use log::{debug, trace, warn};
use roxmltree::{Document, Node, ParsingOptions};

use crate::{constants::*, errors::*, resource::*, util::*};

/// Text encoding of a manifest, including its byte order mark.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TextEncoding {
    Utf8,
    Utf8Bom,
    Utf16Le,
    Utf16LeBom,
    Utf16BeBom,
}

/// Decode manifest bytes into text.
///
/// A UTF-16 byte order mark takes precedence over a UTF-8 byte order mark. Without one, data where
/// at least 8 of the first 32 characters have a zero high byte is treated as UTF-16LE, and
/// everything else as UTF-8. Invalid sequences are replaced.
pub fn decode_text(bytes: &[u8]) -> (String, TextEncoding) {
    match bytes {
        [0xff, 0xfe, rest @ ..] => {
            (String::from_utf16_lossy(&u16_units(rest, true)), TextEncoding::Utf16LeBom)
        }
        [0xfe, 0xff, rest @ ..] => {
            (String::from_utf16_lossy(&u16_units(rest, false)), TextEncoding::Utf16BeBom)
        }
        [0xef, 0xbb, 0xbf, rest @ ..] => {
            (String::from_utf8_lossy(rest).into_owned(), TextEncoding::Utf8Bom)
        }
        _ => {
            let zero_high_bytes = bytes.iter().take(64).skip(1).step_by(2).filter(|&&b| b == 0).count();
            if zero_high_bytes >= 8 {
                (String::from_utf16_lossy(&u16_units(bytes, true)), TextEncoding::Utf16Le)
            } else {
                (String::from_utf8_lossy(bytes).into_owned(), TextEncoding::Utf8)
            }
        }
    }
}

/// Encode text in the given encoding, including its byte order mark.
pub fn encode_text(text: &str, encoding: TextEncoding) -> Vec<u8> {
    match encoding {
        TextEncoding::Utf8 => text.as_bytes().to_vec(),
        TextEncoding::Utf8Bom => [&[0xef, 0xbb, 0xbf][..], text.as_bytes()].concat(),
        TextEncoding::Utf16Le | TextEncoding::Utf16LeBom => {
            let bom = (encoding == TextEncoding::Utf16LeBom).then_some(0xfeff);
            bom.into_iter().chain(text.encode_utf16()).flat_map(u16::to_le_bytes).collect()
        }
        TextEncoding::Utf16BeBom => {
            Some(0xfeff).into_iter().chain(text.encode_utf16()).flat_map(u16::to_be_bytes).collect()
        }
    }
}

fn parse_document(xml: &str) -> Result<Document<'_>, ManifestError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Ok(Document::parse_with_options(xml, options)?)
}

/// Find the `assemblyIdentity` child of the root element, preferring the `asm.v1` namespace.
fn find_assembly_identity<'a, 'input>(document: &'a Document<'input>) -> Option<Node<'a, 'input>> {
    let root = document.root_element();
    let find = |namespace: Option<&str>| {
        root.children().find(|node| {
            node.is_element()
                && node.tag_name().name() == MANIFEST_ASSEMBLY_IDENTITY
                && node.tag_name().namespace() == namespace
        })
    };
    find(Some(MANIFEST_NAMESPACE_ASM_V1)).or_else(|| find(None))
}

/// Returns the declared assembly identity name of a manifest.
///
/// # Returns
/// Returns `None` if the manifest is blank or has no identity name, or an error if it is not valid XML.
pub fn assembly_identity(xml: &str) -> Result<Option<String>, ManifestError> {
    let xml = xml.trim_end_matches('\0');
    if xml.trim().is_empty() {
        return Ok(None);
    }
    let document = parse_document(xml)?;
    Ok(find_assembly_identity(&document)
        .and_then(|node| node.attribute(MANIFEST_NAME_ATTRIBUTE))
        .map(str::to_string))
}

/// Returns the text of the embedded manifest of a resource source.
///
/// The manifest is looked up with the resource ids 1 and 2.
pub fn embedded_manifest<S: ResourceSource + ?Sized>(source: &S) -> Option<String> {
    [CREATEPROCESS_MANIFEST_RESOURCE_ID, ISOLATIONAWARE_MANIFEST_RESOURCE_ID]
        .into_iter()
        .find_map(|id| source.load(RT_MANIFEST, &ResourceEntryName::ID(id as u32)))
        .filter(|data| !data.is_empty())
        .map(|data| {
            let (text, encoding) = decode_text(&data);
            debug!("manifest: {} bytes as {:?}", data.len(), encoding);
            text
        })
}

/// Read the declared assembly identity name from the embedded manifest of the executable at the path.
///
/// Returns `None` if the file has no manifest, the manifest is not valid XML or declares no identity name.
pub fn read_assembly_identity<P: AsRef<Path>>(path: P) -> Option<String> {
    let path = path.as_ref();
    let resources = match ResourceDirectory::from_file(path) {
        Ok(resources) => resources,
        Err(e) => {
            warn!("{}: could not read resources: {}", path.display(), e);
            return None;
        }
    };
    let manifest = embedded_manifest(&resources)?;
    match assembly_identity(&manifest) {
        Ok(identity) => {
            debug!("{}: assembly identity {:?}", path.display(), identity);
            identity
        }
        Err(e) => {
            warn!("{}: could not parse manifest: {}", path.display(), e);
            None
        }
    }
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Replace the `assemblyIdentity/@name` attribute of a manifest.
///
/// Only the attribute value changes, every other character of the manifest is kept. The attribute
/// is added after the element name if it does not exist.
///
/// # Returns
/// Returns an error if the manifest is not valid XML or has no `assemblyIdentity` element.
pub fn patch_assembly_identity(xml: &str, identity: &str) -> Result<String, ManifestError> {
    let document = parse_document(xml)?;
    let node = find_assembly_identity(&document).ok_or(ManifestError::MissingAssemblyIdentity)?;
    let value = escape_attribute(identity);

    let attribute = node
        .attributes()
        .find(|attribute| {
            attribute.name() == MANIFEST_NAME_ATTRIBUTE && attribute.namespace().is_none()
        });
    let (range, replacement) = match attribute {
        Some(attribute) => {
            trace!("replacing {:?} at {:?}", attribute.value(), attribute.range_value());
            (attribute.range_value(), value)
        }
        None => {
            let start = node.range().start + 1;
            let name_end = xml[start..]
                .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
                .map(|end| start + end)
                .unwrap_or(xml.len());
            trace!("inserting {} attribute at {}", MANIFEST_NAME_ATTRIBUTE, name_end);
            (name_end..name_end, format!(" {}=\"{}\"", MANIFEST_NAME_ATTRIBUTE, value))
        }
    };

    let mut patched = String::with_capacity(xml.len() + replacement.len());
    patched.push_str(&xml[..range.start]);
    patched.push_str(&replacement);
    patched.push_str(&xml[range.end..]);
    Ok(patched)
}

/// Create a copy of a manifest template with the assembly identity name replaced, in a new
/// uniquely named file in the system temporary directory.
///
/// # Returns
/// Returns the path of the patched manifest, or an error if the template does not exist, is not
/// valid XML, has no `assemblyIdentity` element, or the copy could not be written.
pub fn create_patched_manifest<P: AsRef<Path>>(
    template: P, identity: &str,
) -> Result<PathBuf, ManifestError> {
    create_patched_manifest_in(template, identity, std::env::temp_dir())
}

/// Create a copy of a manifest template with the assembly identity name replaced, in a new
/// uniquely named file in the directory.
pub fn create_patched_manifest_in<P: AsRef<Path>, D: AsRef<Path>>(
    template: P, identity: &str, directory: D,
) -> Result<PathBuf, ManifestError> {
    let template = template.as_ref();
    let bytes = std::fs::read(template).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ManifestError::MissingTemplate(template.to_path_buf()),
        _ => ManifestError::IOError(e),
    })?;

    let (text, encoding) = decode_text(&bytes);
    if encode_text(&text, encoding) != bytes {
        return Err(ManifestError::UnsupportedEncoding);
    }
    let patched = patch_assembly_identity(&text, identity)?;

    let mut file = tempfile::Builder::new()
        .prefix("patched_manifest_")
        .suffix(".manifest")
        .tempfile_in(directory)?;
    file.write_all(&encode_text(&patched, encoding))?;
    let (_, path) = file.keep().map_err(|e| e.error)?;
    debug!("patched {} as {:?} into {}", template.display(), identity, path.display());
    Ok(path)
}

/// Sanitize text for use as an assembly identity name.
///
/// Surrounding whitespace is removed, every character that is not alphanumeric, `.`, `-` or `_`
/// becomes `.`, runs of `.` are collapsed and leading and trailing `.` are removed.
pub fn sanitize_identity(text: &str) -> String {
    let mut sanitized = String::with_capacity(text.len());
    for c in text.trim().chars() {
        let c = if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '.' };
        if c == '.' && sanitized.ends_with('.') {
            continue;
        }
        sanitized.push(c);
    }
    sanitized.trim_matches('.').to_string()
}

/// Derive an assembly identity name from a company and product name.
///
/// Returns `company.product.Launcher`, `product.Launcher`, `company.Launcher` or `Launcher`,
/// depending on which of the sanitized names are non-empty.
pub fn derive_identity(company: &str, product: &str) -> String {
    [sanitize_identity(company), sanitize_identity(product)]
        .into_iter()
        .filter(|part| !part.is_empty())
        .chain([LAUNCHER_IDENTITY_SUFFIX.to_string()])
        .collect::<Vec<_>>()
        .join(".")
}

/// Returns the sanitized identity, or the fallback if nothing remains after sanitizing.
pub fn ensure_valid_identity(identity: &str, fallback: &str) -> String {
    let sanitized = sanitize_identity(identity);
    if sanitized.is_empty() { fallback.to_string() } else { sanitized }
}
