//! Target machine inspection from the DOS and PE header prefix of a file.

use std::{
    fmt,
    fs::File,
    io::{ErrorKind, Read, Seek, SeekFrom},
    path::Path,
};

use log::{debug, warn};

use crate::{constants::*, errors::*, util::*};

/// Target machine architecture of an executable.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum MachineType {
    X64,
    X86,
    Arm64,
    Arm,
    #[default]
    Unknown,
}

impl MachineType {
    /// Returns the short architecture name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MachineType::X64 => "x64",
            MachineType::X86 => "x86",
            MachineType::Arm64 => "arm64",
            MachineType::Arm => "arm",
            MachineType::Unknown => "unknown",
        }
    }

    /// Returns the runtime identifier used when publishing a replacement executable for this architecture.
    pub const fn runtime_identifier(&self) -> &'static str {
        match self {
            MachineType::X86 => "win-x86",
            MachineType::Arm64 => "win-arm64",
            _ => "win-x64",
        }
    }
}

impl From<WORD> for MachineType {
    fn from(machine: WORD) -> Self {
        match machine {
            IMAGE_FILE_MACHINE_AMD64 => MachineType::X64,
            IMAGE_FILE_MACHINE_I386 => MachineType::X86,
            IMAGE_FILE_MACHINE_ARM64 => MachineType::Arm64,
            IMAGE_FILE_MACHINE_ARMNT => MachineType::Arm,
            _ => MachineType::Unknown,
        }
    }
}

impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Read the target machine of the executable at the path.
///
/// Only the header prefix of the file is read. Any failure to read the file, a short read or a
/// signature mismatch yields [`MachineType::Unknown`].
pub fn machine_type<P: AsRef<Path>>(path: P) -> MachineType {
    let path = path.as_ref();
    match File::open(path).map_err(ImageReadError::from).and_then(|mut file| read_machine(&mut file))
    {
        Ok(machine) => {
            let machine_type = MachineType::from(machine);
            debug!("{}: machine {:#06x} ({})", path.display(), machine, machine_type);
            machine_type
        }
        Err(ImageReadError::IOError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
            debug!("{}: file too short for pe headers", path.display());
            MachineType::Unknown
        }
        Err(ImageReadError::IOError(e)) => {
            warn!("{}: could not read header: {}", path.display(), e);
            MachineType::Unknown
        }
        Err(e) => {
            debug!("{}: {}", path.display(), e);
            MachineType::Unknown
        }
    }
}

/// Read the raw machine field from the headers of a seekable reader.
pub fn read_machine<R: Read + Seek>(reader: &mut R) -> Result<WORD, ImageReadError> {
    let mut buffer = [0u8; 4];

    reader.read_exact(&mut buffer[..2])?;
    if read::<u16>(&buffer)? != PE_DOS_MAGIC {
        return Err(ImageReadError::InvalidHeader("no dos magic".into()));
    }

    reader.seek(SeekFrom::Start(PE_PTR_OFFSET as u64))?;
    reader.read_exact(&mut buffer)?;
    let pe_signature_offset = read::<u32>(&buffer)?;

    reader.seek(SeekFrom::Start(pe_signature_offset as u64))?;
    reader.read_exact(&mut buffer)?;
    if read::<u32>(&buffer)? != PE_NT_SIGNATURE {
        return Err(ImageReadError::InvalidHeader("no pe signature".into()));
    }

    reader.read_exact(&mut buffer[..2])?;
    Ok(read::<u16>(&buffer)?)
}
