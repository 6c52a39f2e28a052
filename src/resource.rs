//! Data types for parsing the resource section.
//! The resource section contains the resource directory and the resource data.
//! See <https://learn.microsoft.com/en-us/windows/win32/debug/pe-format#the-rsrc-section> for more information.

use std::{
    borrow::{Borrow, Cow},
    collections::HashSet,
    fmt,
    mem::size_of,
    path::Path,
};

use ahash::RandomState;
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use log::{debug, error, trace, warn};

use crate::{errors::*, image::Image, types::*, util::*};

/// Type, name and language levels, with room for nested tables some linkers emit.
const MAX_RESOURCE_DEPTH: usize = 8;

/// Read access to the typed, named binary blobs embedded in an executable.
///
/// Parsers for icons, version information and manifests only depend on this trait,
/// so they can be driven by an in-memory [`ResourceDirectory`] as well as by a parsed file.
pub trait ResourceSource {
    /// Returns the names of all resources of the given type, in directory order.
    fn names(&self, kind: u16) -> Vec<ResourceEntryName>;

    /// Returns the data of the resource with the given type and name.
    /// If the resource exists in multiple languages, the first one is returned.
    fn load(&self, kind: u16, name: &ResourceEntryName) -> Option<Cow<'_, [u8]>>;
}

/// Portable executable resource directory.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct ResourceDirectory {
    pub(crate) virtual_address: u32,
    pub(crate) root:            ResourceTable,
}
impl ResourceDirectory {
    /// Parse the resource directory from the given image at the given base address.
    /// The virtual address is used to resolve the resource data offsets and has to correspond to the virtual address of the resource directory in the source image.
    ///
    /// # Returns
    /// Returns an error if the resource directory at the given address is invalid.
    pub fn parse(
        image: &[u8], base_address: u32, virtual_address: u32,
    ) -> Result<Self, ImageReadError> {
        let mut visited = HashSet::with_hasher(RandomState::new());
        let root = ResourceTable::parse(image, base_address, virtual_address, 0, 0, &mut visited)?;
        Ok(Self {
            virtual_address,
            root,
        })
    }

    /// Open the executable at the path as a data file and parse its resource directory.
    ///
    /// # Returns
    /// Returns an empty directory if the image has no resources, or an error if the file could not be read or is not a valid image.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ImageReadError> {
        let image = Image::parse_file(path)?;
        Ok(image.into_resource_directory().unwrap_or_default())
    }

    /// Returns the virtual address of the resource directory in the source image.
    pub fn virtual_address(&self) -> u32 { self.virtual_address }

    /// Returns the root resource table.
    /// The root resource table contains the top-level resource entries.
    pub fn root(&self) -> &ResourceTable { &self.root }

    /// Insert resource data of the given type and name, in the default language table.
    /// Existing data with the same type and name is replaced.
    pub fn insert_data(&mut self, kind: u16, name: ResourceEntryName, data: Vec<u8>) {
        let kind = ResourceEntryName::ID(kind as u32);
        if !matches!(self.root.get(&kind), Some(ResourceEntry::Table(_))) {
            self.root.insert(&kind, ResourceEntry::Table(ResourceTable::default()));
        }
        if let Some(ResourceEntry::Table(names)) = self.root.get_mut(&kind) {
            let mut languages = ResourceTable::default();
            languages.insert(
                ResourceEntryName::ID(crate::constants::LANGUAGE_ID_EN_US as u32),
                ResourceEntry::Data(ResourceData::new(data)),
            );
            names.insert(&name, ResourceEntry::Table(languages));
        }
    }
}

impl ResourceSource for ResourceDirectory {
    fn names(&self, kind: u16) -> Vec<ResourceEntryName> {
        match self.root.get(ResourceEntryName::ID(kind as u32)) {
            Some(ResourceEntry::Table(table)) => table.entries.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    fn load(&self, kind: u16, name: &ResourceEntryName) -> Option<Cow<'_, [u8]>> {
        let table = self.root.get(ResourceEntryName::ID(kind as u32))?.as_table()?;
        let data = match table.get(name)? {
            ResourceEntry::Data(data) => data,
            ResourceEntry::Table(languages) => languages.first_data()?,
        };
        debug!("loaded resource {} of type {}: {} bytes", name, kind, data.data().len());
        Some(Cow::Borrowed(data.data()))
    }
}

/// Portable executable resource table.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct ResourceTable {
    pub(crate) data:    ResourceDirectoryTable,
    pub(crate) entries: IndexMap<ResourceEntryName, ResourceEntry>,
}
impl ResourceTable {
    /// Every table may be reached from a single entry only, so the work is bounded by the
    /// number of tables in the section.
    fn parse(
        image: &[u8], base_address: u32, virtual_address: u32, directory_offset: u32, level: usize,
        visited: &mut HashSet<u32, RandomState>,
    ) -> Result<Self, ImageReadError> {
        if level >= MAX_RESOURCE_DEPTH {
            return Err(ImageReadError::InvalidSection("resource table nesting too deep".into()));
        }
        if !visited.insert(directory_offset) {
            return Err(ImageReadError::InvalidSection(format!(
                "resource table at {:#x?} referenced more than once",
                directory_offset
            )));
        }
        let table_offset = base_address as usize + directory_offset as usize;
        let resource_table = read_at::<ResourceDirectoryTable>(image, table_offset)?;
        trace!("{} {:#x?}", "--".repeat(level + 1), resource_table);

        let mut entries = IndexMap::new();

        let mut entry_offset = table_offset + size_of::<ResourceDirectoryTable>();
        for _ in 0..(resource_table.number_of_name_entries as u32
            + resource_table.number_of_id_entries as u32)
        {
            let entry = read_at::<ResourceDirectoryEntry>(image, entry_offset)?;
            trace!("{} {:#x?}", "--".repeat(level + 1), entry);
            entry_offset += size_of::<ResourceDirectoryEntry>();

            let name =
                ResourceEntryName::parse(image, base_address, entry.name_offset_or_integer_id)?;

            if entry.data_entry_or_subdirectory_offset & 0x80000000 != 0 {
                entries.insert(
                    name,
                    ResourceEntry::Table(ResourceTable::parse(
                        image,
                        base_address,
                        virtual_address,
                        entry.data_entry_or_subdirectory_offset ^ 0x80000000,
                        level + 1,
                        visited,
                    )?),
                );
                continue;
            }

            let data = read_at::<ResourceDataEntry>(
                image,
                base_address as usize + entry.data_entry_or_subdirectory_offset as usize,
            )?;
            // calculate as i64 and convert to u64 first to check for padding
            let address = base_address as i64 + data.data_rva as i64 - virtual_address as i64;
            let mut address = address as u64;
            if address & 0xffffffffff000000 == 0xffffffffff000000 {
                warn!(
                    "{} resource data entry address {:#x?} seems to be packed, ignoring padding",
                    "--".repeat(level + 1),
                    address
                );
                address ^= 0xffffffffff000000;
            }
            trace!("{} {:#x?} {:#x?}", "--".repeat(level + 1), address, data);
            let end = address.saturating_add(data.size as u64);
            if end > image.len() as u64 {
                error!(
                    "{} resource data entry address {:#x?} with size {:#x?} ({:#x?}) outside valid range ({:#x?})",
                    "--".repeat(level + 1),
                    address,
                    data.size,
                    end,
                    image.len()
                );
                continue;
            }
            entries.insert(
                name,
                ResourceEntry::Data(ResourceData {
                    codepage: data.codepage,
                    data:     image[address as usize..end as usize].to_vec().into(),
                }),
            );
        }
        Ok(Self {
            data: resource_table,
            entries,
        })
    }

    /// Get a resource entry from the table.
    pub fn get<N: Borrow<ResourceEntryName>>(&self, name: N) -> Option<&ResourceEntry> {
        self.entries.get(name.borrow())
    }

    /// Get a mutable resource entry from the table.
    pub fn get_mut<N: Borrow<ResourceEntryName>>(&mut self, name: N) -> Option<&mut ResourceEntry> {
        self.entries.get_mut(name.borrow())
    }

    /// Insert a resource entry into the table.
    /// If an entry with the given name already exists, it will be replaced.
    /// # Returns
    /// The replaced entry.
    pub fn insert<N: Borrow<ResourceEntryName>>(
        &mut self, name: N, entry: ResourceEntry,
    ) -> Option<ResourceEntry> {
        let name = name.borrow();
        let entry = self.entries.insert(name.clone(), entry);
        if entry.is_none() {
            match name {
                ResourceEntryName::Name(_) => self.data.number_of_name_entries += 1,
                ResourceEntryName::ID(_) => self.data.number_of_id_entries += 1,
            }
        }
        entry
    }

    /// Returns the entries in the table.
    pub fn entries(&self) -> Vec<&ResourceEntryName> { self.entries.keys().collect() }

    /// Returns the first data entry in the table or its child tables.
    pub fn first_data(&self) -> Option<&ResourceData> {
        self.entries.values().find_map(|entry| match entry {
            ResourceEntry::Data(data) => Some(data),
            ResourceEntry::Table(table) => table.first_data(),
        })
    }
}

/// Raw resource data.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct ResourceData {
    data:     DebugIgnore<Vec<u8>>,
    codepage: u32,
}
impl ResourceData {
    /// Create resource data with the default codepage.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data:     data.into(),
            codepage: 0,
        }
    }

    /// Returns the raw data.
    pub fn data(&self) -> &[u8] { &self.data }

    /// Returns the codepage of the data.
    pub fn codepage(&self) -> u32 { self.codepage }
}

/// Resource entry in a resource table.
/// This can be either a child table or raw data.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ResourceEntry {
    Table(ResourceTable),
    Data(ResourceData),
}
impl ResourceEntry {
    /// Returns the child table if the entry is a table.
    pub fn as_table(&self) -> Option<&ResourceTable> {
        match self {
            ResourceEntry::Table(table) => Some(table),
            ResourceEntry::Data(_) => None,
        }
    }

    /// Returns the data if the entry is raw data.
    pub fn as_data(&self) -> Option<&ResourceData> {
        match self {
            ResourceEntry::Table(_) => None,
            ResourceEntry::Data(data) => Some(data),
        }
    }
}

/// Resource directory entry name.
/// This can either be a raw id or a name.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum ResourceEntryName {
    // raw id
    ID(u32),
    // 2 byte size + data
    Name(Vec<u8>),
}
impl ResourceEntryName {
    fn parse(image: &[u8], offset: u32, id: u32) -> Result<Self, ReadError> {
        if id & 0x80000000 == 0 {
            return Ok(Self::ID(id));
        }
        trace!("reading resource name {:#x?}", id);
        let address = offset as usize + (id ^ 0x80000000) as usize;
        let length = read_at::<u16>(image, address)? as usize;
        // size is in 16 bit characters so it needs to be doubled
        let data = image
            .get(address..address + 2 + length * 2)
            .ok_or_else(|| ReadError(format!("resource name at {:#x}", address)))?;
        trace!("resource name: {:x?}", data);
        Ok(Self::Name(data.to_vec()))
    }

    pub fn from_string<S: AsRef<str>>(string: S) -> Self {
        let units = string.as_ref().encode_utf16().collect::<Vec<_>>();
        let mut data = Vec::with_capacity(units.len() * 2 + 2);
        data.extend_from_slice(&(units.len() as u16).to_le_bytes());
        data.extend(units.iter().flat_map(|c| c.to_le_bytes()));
        Self::Name(data)
    }

    pub fn to_string(&self) -> Option<String> {
        match self {
            Self::ID(_) => None,
            Self::Name(data) => {
                let units = u16_units(data.get(2..).unwrap_or_default(), true);
                Some(String::from_utf16_lossy(&units))
            }
        }
    }
}

impl fmt::Display for ResourceEntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ID(id) => write!(f, "#{}", id),
            Self::Name(_) => write!(f, "{}", self.to_string().unwrap_or_default()),
        }
    }
}
