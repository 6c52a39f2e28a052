//! Version information resource parsing.
//!
//! See <https://learn.microsoft.com/en-us/windows/win32/menurc/vs-versioninfo> for the layout of the block.

use std::{mem::size_of, path::Path};

use debug_ignore::DebugIgnore;
use log::{debug, trace, warn};

use crate::{constants::*, errors::*, resource::*, types::*, util::*};

const MAX_VERSION_DEPTH: usize = 8;
const VERSION_TYPE_TEXT: u16 = 1;

/// Node of a version information block.
///
/// Every node carries a key, a binary or text value and child nodes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VersionNode {
    key:        String,
    value_type: u16,
    value:      DebugIgnore<Vec<u8>>,
    children:   Vec<VersionNode>,
}
impl VersionNode {
    fn parse(data: &[u8], offset: usize, level: usize) -> Result<(Self, usize), ResourceError> {
        if level >= MAX_VERSION_DEPTH {
            return Err(ResourceError::InvalidTable("version block nesting too deep".into()));
        }
        let header = read_at::<VersionHeader>(data, offset)?;
        let length = header.length as usize;
        let end = offset + length;
        if length < size_of::<VersionHeader>() || end > data.len() {
            return Err(ResourceError::InvalidTable(format!(
                "version node at {:#x} with length {:#x} outside block ({:#x})",
                offset,
                length,
                data.len()
            )));
        }

        let key_start = offset + size_of::<VersionHeader>();
        let (key, consumed) = read_u16_string(&data[key_start..end]);

        // text values are measured in 16 bit characters
        let value_size = if header.type_ == VERSION_TYPE_TEXT {
            header.value_length as usize * 2
        } else {
            header.value_length as usize
        };
        let value_start = aligned_to(key_start + consumed, 4).min(end);
        let value_end = (value_start + value_size).min(end);
        trace!(
            "{} {:?} type {} value {:#x?}..{:#x?}",
            "--".repeat(level + 1),
            key,
            header.type_,
            value_start,
            value_end
        );

        let mut children = Vec::new();
        let mut child_offset = aligned_to(value_end, 4);
        while child_offset + size_of::<VersionHeader>() <= end {
            if read_at::<VersionHeader>(data, child_offset)?.length == 0 {
                break;
            }
            let (child, child_length) = Self::parse(&data[..end], child_offset, level + 1)?;
            children.push(child);
            child_offset = aligned_to(child_offset + child_length, 4);
        }

        Ok((
            Self {
                key,
                value_type: header.type_,
                value: data[value_start..value_end].to_vec().into(),
                children,
            },
            length,
        ))
    }

    /// Returns the key of the node.
    pub fn key(&self) -> &str { &self.key }

    /// Returns the raw value of the node.
    pub fn value(&self) -> &[u8] { &self.value }

    /// Returns whether the value of the node is text.
    pub fn is_text(&self) -> bool { self.value_type == VERSION_TYPE_TEXT }

    /// Returns the value of the node as text, up to the first NUL character.
    pub fn text(&self) -> String { read_u16_string(&self.value).0 }

    /// Returns the child nodes.
    pub fn children(&self) -> &[VersionNode] { &self.children }

    /// Returns the first child with the key, compared case-insensitively.
    pub fn child(&self, key: &str) -> Option<&VersionNode> {
        self.children.iter().find(|child| child.key.eq_ignore_ascii_case(key))
    }
}

/// Parsed version information resource.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VersionInfo {
    root: VersionNode,
}
impl VersionInfo {
    /// Parse a version information block.
    ///
    /// # Returns
    /// Returns an error if any node of the block is malformed.
    pub fn parse(data: &[u8]) -> Result<Self, ResourceError> {
        let (root, _) = VersionNode::parse(data, 0, 0)?;
        if !root.key.eq_ignore_ascii_case(VS_VERSION_INFO_KEY) {
            return Err(ResourceError::InvalidTable(format!(
                "unexpected version block key {:?}",
                root.key
            )));
        }
        Ok(Self { root })
    }

    /// Load the version information resource from a resource source.
    ///
    /// # Returns
    /// Returns `None` if the source contains no version information, or an error if it is malformed.
    pub fn from_resources<S: ResourceSource + ?Sized>(
        source: &S,
    ) -> Result<Option<Self>, ResourceError> {
        let data = source.load(RT_VERSION, &ResourceEntryName::ID(1)).or_else(|| {
            source.names(RT_VERSION).first().and_then(|name| source.load(RT_VERSION, name))
        });
        match data {
            Some(data) if !data.is_empty() => Self::parse(&data).map(Some),
            _ => Ok(None),
        }
    }

    /// Returns the root node of the block.
    pub fn root(&self) -> &VersionNode { &self.root }

    /// Look up a node by a backslash separated path such as `\StringFileInfo\040904B0\ProductName`.
    /// Path segments are compared case-insensitively. The empty path or `\` returns the root node.
    pub fn query(&self, path: &str) -> Option<&VersionNode> {
        path.split('\\')
            .filter(|segment| !segment.is_empty())
            .try_fold(&self.root, |node, segment| node.child(segment))
    }

    /// Returns the fixed file information of the block, if present.
    pub fn fixed_file_info(&self) -> Option<FixedFileInfo> {
        let info = read::<FixedFileInfo>(self.root.value()).ok()?;
        if info.signature != VS_FIXEDFILEINFO_SIGNATURE {
            return None;
        }
        Some(info)
    }

    /// Returns the declared (language, codepage) pairs in table order.
    pub fn translations(&self) -> Vec<(LANGID, WORD)> {
        let Some(node) = self.query(&format!("\\{}\\{}", VS_VAR_FILE_INFO, VS_TRANSLATION)) else {
            return Vec::new();
        };
        node.value()
            .chunks_exact(4)
            .map(|pair| {
                (u16::from_le_bytes([pair[0], pair[1]]), u16::from_le_bytes([pair[2], pair[3]]))
            })
            .collect()
    }

    /// Returns the string value of the key in the string table of the language and codepage.
    pub fn query_string(&self, language: LANGID, codepage: WORD, key: &str) -> Option<String> {
        let path = format!("\\{}\\{:04X}{:04X}\\{}", VS_STRING_FILE_INFO, language, codepage, key);
        let value = self.query(&path).map(VersionNode::text);
        trace!("{}: {:?}", path, value);
        value
    }

    /// Returns the first non-blank value of the key.
    ///
    /// The string tables of all declared translations are searched in declared order, followed by
    /// the US English Unicode table.
    pub fn string_value(&self, key: &str) -> Option<String> {
        self.translations()
            .into_iter()
            .chain([(LANGUAGE_ID_EN_US, CODE_PAGE_ID_EN_US)])
            .filter_map(|(language, codepage)| self.query_string(language, codepage, key))
            .find(|value| !value.trim().is_empty())
    }
}

/// Read the first non-blank value of a version string field of the executable at the path.
///
/// Returns `None` if the field is absent or blank, or if the file has no valid version information.
pub fn string_value<P: AsRef<Path>>(path: P, key: &str) -> Option<String> {
    let path = path.as_ref();
    let version_info = ResourceDirectory::from_file(path)
        .map_err(ResourceError::from)
        .and_then(|resources| VersionInfo::from_resources(&resources));
    match version_info {
        Ok(Some(version_info)) => {
            let value = version_info.string_value(key);
            debug!("{}: {} = {:?}", path.display(), key, value);
            value
        }
        Ok(None) => {
            debug!("{}: no version information", path.display());
            None
        }
        Err(e) => {
            warn!("{}: could not read version information: {}", path.display(), e);
            None
        }
    }
}

/// Convert free-form version text into a four part numeric version.
///
/// Every run of digits becomes one component, e.g. `6000.0.23f1 (1c4764c07fb4)` becomes `6000.0.23.1`.
/// Missing components are filled with zeros and additional components are dropped.
/// Returns `None` if the text contains no digits.
pub fn numeric_file_version(raw: &str) -> Option<String> {
    let mut numbers = Vec::new();
    let mut current: Option<u64> = None;
    for c in raw.chars() {
        match c.to_digit(10) {
            Some(digit) => {
                let value = current.unwrap_or(0) * 10 + digit as u64;
                current = Some(value.min(i32::MAX as u64));
            }
            None => numbers.extend(current.take()),
        }
    }
    numbers.extend(current);
    if numbers.is_empty() {
        return None;
    }
    numbers.resize(4, 0);
    Some(numbers.iter().map(|number| number.to_string()).collect::<Vec<_>>().join("."))
}
