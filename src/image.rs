//! Portable executable image representation.
//!
//! See <https://learn.microsoft.com/en-us/windows/win32/debug/pe-format> for more information.

use std::borrow::Cow;

use ahash::RandomState;
use indexmap::IndexMap;
use log::debug;

use crate::{constants::*, errors::*, header::MachineType, resource::*, types::*, util::*};

/// Image data directory type enumeration.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum DataDirectoryType {
    ExportTable,
    ImportTable,
    ResourceTable,
    ExceptionTable,
    CertificateTable,
    BaseRelocationTable,
    Debug,
    Architecture,
    GlobalPtr,
    TLSTable,
    LoadConfigTable,
    BoundImport,
    IAT,
    DelayImportDescriptor,
    CLRRuntimeHeader,
    Reserved,
}

/// Portable executable image representation.
///
/// The image is only ever read as data. Nothing in it is loaded or executed.
#[derive(Debug, Clone)]
pub struct Image<'a> {
    pub(crate) image: Cow<'a, [u8]>,

    pub(crate) coff_header:           CoffHeader,
    pub(crate) standard_header:       StandardHeader,
    pub(crate) windows_header:        GenericWindowsHeader,
    pub(crate) header_data_directory: IndexMap<DataDirectoryType, ImageDataDirectory, RandomState>,
    pub(crate) section_table:         Vec<SectionHeader>,

    pub(crate) resource_directory: Option<ResourceDirectory>,
}

impl<'a> Image<'a> {
    /// Parse a portable executable image from a byte slice.
    ///
    /// # Returns
    /// Returns the `Image`, or an error if the byte slice is not a valid portable executable image or is missing required headers.
    pub fn parse<R: Into<Cow<'a, [u8]>>>(image: R) -> Result<Self, ImageReadError> {
        let image = image.into();

        let pe_dos_magic = read_at::<u16>(&image, 0)?;
        debug!("pe_dos_magic: {:#x?}", pe_dos_magic);
        if pe_dos_magic != PE_DOS_MAGIC {
            return Err(ImageReadError::InvalidHeader("no dos magic".into()));
        }

        let pe_signature_offset = read_at::<u32>(&image, PE_PTR_OFFSET as usize)? as usize;
        debug!("pe_signature_offset: {:#x?}", pe_signature_offset);

        let pe_signature = read_at::<u32>(&image, pe_signature_offset)?;
        debug!("pe_signature: {:#x?}", pe_signature);
        if pe_signature != PE_NT_SIGNATURE {
            return Err(ImageReadError::InvalidHeader("no pe signature".into()));
        }

        let coff_header_offset = pe_signature_offset + 4;
        let coff_header = read_at::<CoffHeader>(&image, coff_header_offset)?;
        debug!("{:#x?}: {:#x?}", coff_header_offset, coff_header);
        if coff_header.size_of_optional_header < 24 {
            return Err(ImageReadError::InvalidHeader("optional header too small".into()));
        }

        let standard_header_offset = coff_header_offset + 20;
        let standard_header = read_at::<StandardHeader>(&image, standard_header_offset)?;
        debug!("{:#x?}: {:#x?}", standard_header_offset, standard_header);

        let (windows_header, optional_header_dd_offset) = {
            if standard_header.magic == PE_32_MAGIC && coff_header.size_of_optional_header >= 96 {
                let windows_header =
                    read_at::<WindowsHeader<u32>>(&image, standard_header_offset + 28)?;
                (GenericWindowsHeader::WindowsHeader32(windows_header), standard_header_offset + 96)
            } else if standard_header.magic == PE_64_MAGIC
                && coff_header.size_of_optional_header >= 112
            {
                let windows_header =
                    read_at::<WindowsHeader<u64>>(&image, standard_header_offset + 24)?;
                (
                    GenericWindowsHeader::WindowsHeader64(windows_header),
                    standard_header_offset + 112,
                )
            } else {
                return Err(ImageReadError::InvalidHeader("invalid optional header".into()));
            }
        };
        debug!("windows header: {:#x?}", windows_header);

        if image.len() <= optional_header_dd_offset {
            return Err(ImageReadError::InvalidHeader(
                "image truncated after optional header".into(),
            ));
        }

        let number_of_rva_and_sizes = windows_header.number_of_rva_and_sizes();
        let mut header_data_directory =
            IndexMap::<DataDirectoryType, ImageDataDirectory, _>::with_hasher(RandomState::new());
        use DataDirectoryType::*;
        for (index, &header) in [
            ExportTable,
            ImportTable,
            ResourceTable,
            ExceptionTable,
            CertificateTable,
            BaseRelocationTable,
            Debug,
            Architecture,
            GlobalPtr,
            TLSTable,
            LoadConfigTable,
            BoundImport,
            IAT,
            DelayImportDescriptor,
            CLRRuntimeHeader,
            Reserved,
        ]
        .iter()
        .enumerate()
        {
            if (index as u32) < number_of_rva_and_sizes {
                let offset = optional_header_dd_offset + index * 8;
                let data = read_at::<ImageDataDirectory>(&image, offset)?;
                header_data_directory.insert(header, data);
                debug!("{:#x?}: {:?}: {:#x?}", offset, header, data);
            }
        }

        let section_table_offset =
            standard_header_offset + coff_header.size_of_optional_header as usize;
        let mut section_table = Vec::with_capacity(coff_header.number_of_sections as usize);
        for index in 0..coff_header.number_of_sections as usize {
            let offset = section_table_offset + index * 40;
            let section_header = read_at::<SectionHeader>(&image, offset)?;
            debug!(
                "{:#x?}: {}: {:#x?}",
                offset,
                section_header.name().unwrap_or("?".to_string()),
                section_header
            );
            section_table.push(section_header);
        }

        let mut resource_directory = None;
        if let Some(resource_data) = header_data_directory.get(&DataDirectoryType::ResourceTable) {
            if resource_data.virtual_address > 0 && resource_data.size > 0 {
                let section = section_table
                    .iter()
                    .find(|section| section.contains(resource_data.virtual_address));
                match section {
                    Some(section) => {
                        debug!(
                            "found resource directory in {} section: {:#x?}",
                            section.name().unwrap_or("?".to_string()),
                            section
                        );
                        // the directory may start anywhere inside the section
                        let base_address = section.pointer_to_raw_data as u64
                            + (resource_data.virtual_address - section.virtual_address) as u64;
                        let base_address = u32::try_from(base_address).map_err(|_| {
                            ImageReadError::InvalidSection("resource directory offset".into())
                        })?;
                        resource_directory = Some(ResourceDirectory::parse(
                            &image,
                            base_address,
                            resource_data.virtual_address,
                        )?);
                    }
                    None => {
                        return Err(ImageReadError::InvalidSection(
                            "resource directory outside of all sections".into(),
                        ));
                    }
                }
            }
        }

        Ok(Self {
            image,
            coff_header,
            standard_header,
            windows_header,
            header_data_directory,
            section_table,
            resource_directory,
        })
    }

    /// Parse a portable executable image from a file.
    ///
    /// # Returns
    /// Returns the `Image`, or an error if the file could not be read, is not a valid portable executable image or is missing required headers.
    pub fn parse_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ImageReadError> {
        let data = std::fs::read(path)?;
        Self::parse(data)
    }

    /// Returns the current resource directory or `None` if the image does not contain a resource directory.
    pub fn resource_directory(&self) -> Option<&ResourceDirectory> {
        self.resource_directory.as_ref()
    }

    /// Consumes the image and returns its resource directory.
    pub fn into_resource_directory(self) -> Option<ResourceDirectory> { self.resource_directory }

    /// Returns the target machine of the image.
    pub fn machine_type(&self) -> MachineType { MachineType::from(self.coff_header.machine) }

    /// Returns the subsystem running the image.
    pub fn subsystem(&self) -> WORD { self.windows_header.subsystem() }

    /// Returns the raw image data.
    pub fn data(&self) -> &[u8] { &self.image }

    /// Returns the parsed coff header.
    pub fn coff_header(&self) -> &CoffHeader { &self.coff_header }

    /// Returns the parsed standard header.
    pub fn standard_header(&self) -> &StandardHeader { &self.standard_header }

    /// Returns the parsed windows header.
    pub fn windows_header(&self) -> &GenericWindowsHeader { &self.windows_header }

    /// Returns the data directory for the requested header.
    pub fn data_directory(&self, directory: DataDirectoryType) -> Option<&ImageDataDirectory> {
        self.header_data_directory.get(&directory)
    }

    /// Returns all section tables existing in the image.
    pub fn section_table(&self) -> &[SectionHeader] { &self.section_table }
}
