//! Windows API and binary constants.

#![allow(non_upper_case_globals)]

pub type DWORD = u32;
pub type WORD = u16;
pub type LANGID = WORD;


pub const VS_COMMENTS: &str = "Comments";
pub const VS_COMPANY_NAME: &str = "CompanyName";
pub const VS_FILE_DESCRIPTION: &str = "FileDescription";
pub const VS_FILE_VERSION: &str = "FileVersion";
pub const VS_INTERNAL_NAME: &str = "InternalName";
pub const VS_LEGAL_COPYRIGHT: &str = "LegalCopyright";
pub const VS_LEGAL_TRADEMARKS: &str = "LegalTrademarks";
pub const VS_ORIGINAL_FILENAME: &str = "OriginalFilename";
pub const VS_PRIVATE_BUILD: &str = "PrivateBuild";
pub const VS_PRODUCT_NAME: &str = "ProductName";
pub const VS_PRODUCT_VERSION: &str = "ProductVersion";
pub const VS_SPECIAL_BUILD: &str = "SpecialBuild";

pub const VS_VERSION_INFO_KEY: &str = "VS_VERSION_INFO";
pub const VS_STRING_FILE_INFO: &str = "StringFileInfo";
pub const VS_VAR_FILE_INFO: &str = "VarFileInfo";
pub const VS_TRANSLATION: &str = "Translation";


// https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-lcid/a9eac961-e77d-41a6-90a5-ce1a8b0cdb9c
pub const LANGUAGE_ID_EN_US: LANGID = 1033; // 0x0409, en-US
// https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-ucoderef/28fefe92-d66c-4b03-90a9-97b473223d43
pub const CODE_PAGE_ID_EN_US: LANGID = 1200; // 0x04B0, UTF-16LE


// https://docs.microsoft.com/en-us/windows/win32/api/verrsrc/ns-verrsrc-vs_fixedfileinfo

pub const VS_FIXEDFILEINFO_SIGNATURE: DWORD = 0xFEEF04BD;


// https://docs.microsoft.com/en-us/windows/win32/debug/pe-format

pub const PE_DOS_MAGIC: WORD = 0x5a4d; // MZ
pub const PE_PTR_OFFSET: DWORD = 0x03c;
pub const PE_NT_SIGNATURE: DWORD = 0x00004550; // PE00
pub const PE_32_MAGIC: WORD = 0x010b;
pub const PE_64_MAGIC: WORD = 0x020b;


// https://learn.microsoft.com/en-us/windows/win32/debug/pe-format#machine-types

pub const IMAGE_FILE_MACHINE_UNKNOWN: WORD = 0x0000;
pub const IMAGE_FILE_MACHINE_I386: WORD = 0x014c;
pub const IMAGE_FILE_MACHINE_ARMNT: WORD = 0x01c4;
pub const IMAGE_FILE_MACHINE_AMD64: WORD = 0x8664;
pub const IMAGE_FILE_MACHINE_ARM64: WORD = 0xaa64;


// https://docs.microsoft.com/en-us/windows/win32/menurc/resource-types

pub const RT_ICON: WORD = 0x03;
pub const RT_GROUP_ICON: WORD = 0x0E;
pub const RT_VERSION: WORD = 0x10;
pub const RT_MANIFEST: WORD = 0x18;

// https://learn.microsoft.com/en-us/windows/win32/menurc/newheader

pub const ICON_TYPE_ICON: WORD = 1;
pub const ICON_MAX_ENTRIES: usize = 256;
pub const ICON_DIRECTORY_SIZE: usize = 6;
pub const ICON_GROUP_ENTRY_SIZE: usize = 14;
pub const ICON_FILE_ENTRY_SIZE: usize = 16;


// https://learn.microsoft.com/en-us/windows/win32/sbscs/application-manifests

pub const MANIFEST_NAMESPACE_ASM_V1: &str = "urn:schemas-microsoft-com:asm.v1";
pub const MANIFEST_ASSEMBLY_IDENTITY: &str = "assemblyIdentity";
pub const MANIFEST_NAME_ATTRIBUTE: &str = "name";
pub const CREATEPROCESS_MANIFEST_RESOURCE_ID: WORD = 1;
pub const ISOLATIONAWARE_MANIFEST_RESOURCE_ID: WORD = 2;

pub const LAUNCHER_IDENTITY_SUFFIX: &str = "Launcher";
