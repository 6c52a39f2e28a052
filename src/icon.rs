//! Icon resource extraction.
//!
//! Icons are stored in an executable as one `RT_GROUP_ICON` resource holding a directory of
//! sizes, and one `RT_ICON` resource per size holding the image data. [`IconContainer`]
//! reassembles them into a standalone `.ico` file. See
//! <https://devblogs.microsoft.com/oldnewthing/20120720-00/?p=7083> for the differences between
//! the two directory layouts.

use std::{
    io::Write,
    mem::size_of,
    path::{Path, PathBuf},
};

use debug_ignore::DebugIgnore;
use log::{debug, warn};
use zerocopy::IntoBytes;

use crate::{constants::*, errors::*, resource::*, types::*, util::*};

/// One image of an icon.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct IconImage {
    pub width:       u8,
    pub height:      u8,
    pub color_count: u8,
    pub reserved:    u8,
    pub planes:      u16,
    pub bit_count:   u16,
    pub data:        DebugIgnore<Vec<u8>>,
}
impl IconImage {
    /// Returns the width in pixels, where a stored width of 0 means 256.
    pub fn real_width(&self) -> u32 { if self.width == 0 { 256 } else { self.width as u32 } }

    /// Returns the height in pixels, where a stored height of 0 means 256.
    pub fn real_height(&self) -> u32 { if self.height == 0 { 256 } else { self.height as u32 } }
}

/// Icon made of multiple images, in the order of preference declared by its directory.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct IconContainer {
    images: Vec<IconImage>,
}
impl IconContainer {
    /// Create an icon from images.
    pub fn new(images: Vec<IconImage>) -> Self { Self { images } }

    /// Load the first icon group of a resource source and all icon images it references.
    ///
    /// The first enumerated icon group is used, falling back to the groups with id 1 and 2.
    ///
    /// # Returns
    /// Returns an error if there is no icon group, if its directory is malformed, or if any
    /// referenced icon image is missing. Partial icons are never returned.
    pub fn from_resources<S: ResourceSource + ?Sized>(source: &S) -> Result<Self, ResourceError> {
        let group = source
            .names(RT_GROUP_ICON)
            .into_iter()
            .next()
            .and_then(|name| source.load(RT_GROUP_ICON, &name))
            .or_else(|| source.load(RT_GROUP_ICON, &ResourceEntryName::ID(1)))
            .or_else(|| source.load(RT_GROUP_ICON, &ResourceEntryName::ID(2)))
            .ok_or_else(|| ResourceError::MissingResource("icon group".into()))?;

        let entries = parse_group_directory(&group)?;
        let mut images = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = entry.id;
            let data = source
                .load(RT_ICON, &ResourceEntryName::ID(id as u32))
                .ok_or_else(|| ResourceError::MissingResource(format!("icon #{}", id)))?;
            debug!(
                "icon #{}: {}x{} {} bpp, {} bytes (declared {})",
                id,
                entry.width,
                entry.height,
                { entry.bit_count },
                data.len(),
                { entry.bytes }
            );
            images.push(IconImage {
                width:       entry.width,
                height:      entry.height,
                color_count: entry.color_count,
                reserved:    entry.reserved,
                planes:      entry.planes,
                bit_count:   entry.bit_count,
                data:        data.into_owned().into(),
            });
        }
        Ok(Self { images })
    }

    /// Parse a standalone `.ico` file.
    ///
    /// # Returns
    /// Returns an error if the header is not an icon header or any entry points outside the data.
    pub fn parse(data: &[u8]) -> Result<Self, ResourceError> {
        let directory = read_icon_directory(data)?;
        let mut images = Vec::with_capacity(directory.count as usize);
        for index in 0..directory.count as usize {
            let entry = read_at::<IconFileEntry>(
                data,
                ICON_DIRECTORY_SIZE + index * ICON_FILE_ENTRY_SIZE,
            )?;
            let start = entry.offset as usize;
            let image = start
                .checked_add(entry.bytes as usize)
                .and_then(|end| data.get(start..end))
                .ok_or_else(|| {
                    ResourceError::InvalidTable(format!("icon image {} outside of file", index))
                })?;
            images.push(IconImage {
                width:       entry.width,
                height:      entry.height,
                color_count: entry.color_count,
                reserved:    entry.reserved,
                planes:      entry.planes,
                bit_count:   entry.bit_count,
                data:        image.to_vec().into(),
            });
        }
        Ok(Self { images })
    }

    /// Returns the images in directory order.
    pub fn images(&self) -> &[IconImage] { &self.images }

    /// Returns the directory entries of the standalone file, with offsets computed for the
    /// images laid out contiguously after the directory.
    pub fn directory(&self) -> Vec<IconFileEntry> {
        let mut offset = ICON_DIRECTORY_SIZE + ICON_FILE_ENTRY_SIZE * self.images.len();
        self.images
            .iter()
            .map(|image| {
                let entry = IconFileEntry {
                    width:       image.width,
                    height:      image.height,
                    color_count: image.color_count,
                    reserved:    image.reserved,
                    planes:      image.planes,
                    bit_count:   image.bit_count,
                    bytes:       image.data.len() as u32,
                    offset:      offset as u32,
                };
                offset += image.data.len();
                entry
            })
            .collect()
    }

    /// Build the standalone `.ico` file.
    pub fn build(&self) -> Vec<u8> {
        let directory = self.directory();
        let size = directory
            .last()
            .map(|entry| entry.offset as usize + entry.bytes as usize)
            .unwrap_or(ICON_DIRECTORY_SIZE);

        let mut data = Vec::with_capacity(size);
        data.extend_from_slice(
            IconDirectory {
                reserved: 0,
                type_:    ICON_TYPE_ICON,
                count:    self.images.len() as u16,
            }
            .as_bytes(),
        );
        for entry in &directory {
            data.extend_from_slice(entry.as_bytes());
        }
        for image in &self.images {
            data.extend_from_slice(&image.data);
        }
        data
    }

    /// Write the standalone `.ico` file to a new uniquely named file in the directory.
    ///
    /// # Returns
    /// Returns the path of the written file.
    pub fn write_in<P: AsRef<Path>>(&self, directory: P, stem: &str) -> std::io::Result<PathBuf> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}_icon_", stem))
            .suffix(".ico")
            .tempfile_in(directory)?;
        file.write_all(&self.build())?;
        let (_, path) = file.keep().map_err(|e| e.error)?;
        debug!("wrote {} icon images to {}", self.images.len(), path.display());
        Ok(path)
    }

    /// Returns the best image of the icon: the largest one, then the one with the highest bit depth.
    pub fn best(&self) -> Option<&IconImage> {
        self.images
            .iter()
            .max_by_key(|image| (image.real_width() * image.real_height(), image.bit_count))
    }

    /// Decode the best image of the icon.
    #[cfg(feature = "images")]
    pub fn best_image(&self) -> Result<image::RgbaImage, ResourceError> {
        let best = self.best().ok_or_else(|| ResourceError::MissingResource("icon image".into()))?;
        debug!("decoding {}x{} {} bpp icon image", best.real_width(), best.real_height(), best.bit_count);
        let single = Self::new(vec![best.clone()]);
        let image = image::load_from_memory_with_format(&single.build(), image::ImageFormat::Ico)?;
        Ok(image.into_rgba8())
    }
}

fn read_icon_directory(data: &[u8]) -> Result<IconDirectory, ResourceError> {
    let directory = read::<IconDirectory>(data)?;
    if directory.type_ != ICON_TYPE_ICON {
        return Err(ResourceError::InvalidTable(format!(
            "icon directory type {}",
            { directory.type_ }
        )));
    }
    if directory.count == 0 || directory.count as usize > ICON_MAX_ENTRIES {
        return Err(ResourceError::InvalidTable(format!(
            "icon directory count {}",
            { directory.count }
        )));
    }
    Ok(directory)
}

/// Parse the directory of an icon group resource.
///
/// # Returns
/// Returns an error if the header is not an icon header, if the entry count is zero or above 256,
/// or if the directory is truncated.
pub fn parse_group_directory(data: &[u8]) -> Result<Vec<IconDirectoryEntry>, ResourceError> {
    let directory = read_icon_directory(data)?;
    let count = directory.count as usize;
    let required = size_of::<IconDirectory>() + count * size_of::<IconDirectoryEntry>();
    if data.len() < required {
        return Err(ResourceError::InvalidTable(format!(
            "icon group directory truncated ({} < {})",
            data.len(),
            required
        )));
    }
    (0..count)
        .map(|index| {
            read_at::<IconDirectoryEntry>(data, ICON_DIRECTORY_SIZE + index * ICON_GROUP_ENTRY_SIZE)
                .map_err(ResourceError::from)
        })
        .collect()
}

/// Extract the complete icon of the executable at the path.
///
/// Returns `None` if the file has no icon, or if its icon resources are malformed or incomplete.
pub fn extract_icon<P: AsRef<Path>>(path: P) -> Option<IconContainer> {
    let path = path.as_ref();
    let icon = ResourceDirectory::from_file(path)
        .map_err(ResourceError::from)
        .and_then(|resources| IconContainer::from_resources(&resources));
    match icon {
        Ok(icon) => Some(icon),
        Err(ResourceError::MissingResource(resource)) => {
            debug!("{}: no icon: missing {}", path.display(), resource);
            None
        }
        Err(e) => {
            warn!("{}: could not extract icon: {}", path.display(), e);
            None
        }
    }
}

/// Extract the complete icon of the executable at the path into a new `.ico` file in the
/// system temporary directory.
///
/// Returns the path of the written file, or `None` if the executable has no valid icon or the
/// file could not be written.
pub fn extract_icon_file<P: AsRef<Path>>(path: P) -> Option<PathBuf> {
    extract_icon_file_in(path, std::env::temp_dir())
}

/// Extract the complete icon of the executable at the path into a new `.ico` file in the directory.
pub fn extract_icon_file_in<P: AsRef<Path>, D: AsRef<Path>>(
    path: P, directory: D,
) -> Option<PathBuf> {
    let path = path.as_ref();
    let icon = extract_icon(path)?;
    let stem = path.file_stem().map(|stem| stem.to_string_lossy()).unwrap_or_default();
    match icon.write_in(directory, &stem) {
        Ok(file) => Some(file),
        Err(e) => {
            warn!("{}: could not write icon: {}", path.display(), e);
            None
        }
    }
}

/// Decode a single preview image of the icon of the executable at the path.
///
/// On Windows the shell icon extraction is used, which may scale the icon. Elsewhere the best
/// image of the complete icon is decoded. Returns `None` if no icon could be decoded.
#[cfg(feature = "images")]
pub fn preview_icon<P: AsRef<Path>>(path: P) -> Option<image::RgbaImage> {
    let path = path.as_ref();
    #[cfg(windows)]
    {
        crate::shell::extract_shell_icon(path)
    }
    #[cfg(not(windows))]
    {
        match extract_icon(path)?.best_image() {
            Ok(image) => Some(image),
            Err(e) => {
                warn!("{}: could not decode icon: {}", path.display(), e);
                None
            }
        }
    }
}
