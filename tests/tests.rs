use exeident::{constants::*, *};
use std::{
    borrow::Cow,
    io::Cursor,
    path::Path,
    sync::Once,
    time::{Duration, Instant},
};

static INIT_LOGGER: Once = Once::new();
fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::builder()
            .is_test(false)
            .filter_level(log::LevelFilter::Info)
            .format_timestamp(None)
            .format_module_path(false)
            .format_level(true)
            .format_target(false)
            .write_style(env_logger::WriteStyle::Auto)
            .init();
    });
}

const SECTION_VIRTUAL_ADDRESS: u32 = 0x1000;
const SECTION_OFFSET: usize = 0x200;

enum Name {
    Id(u32),
    Text(&'static str),
}

struct Resource {
    kind: u16,
    name: Name,
    data: Vec<u8>,
}

fn resource(kind: u16, id: u32, data: Vec<u8>) -> Resource {
    Resource {
        kind,
        name: Name::Id(id),
        data,
    }
}

fn named_resource(kind: u16, name: &'static str, data: Vec<u8>) -> Resource {
    Resource {
        kind,
        name: Name::Text(name),
        data,
    }
}

fn put_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn push_table(buffer: &mut Vec<u8>, named: usize, ids: usize) -> usize {
    let offset = buffer.len();
    buffer.resize(offset + 16 + 8 * (named + ids), 0);
    put_u16(buffer, offset + 12, named as u16);
    put_u16(buffer, offset + 14, ids as u16);
    offset
}

fn set_entry(buffer: &mut [u8], table: usize, index: usize, name: u32, target: u32) {
    put_u32(buffer, table + 16 + index * 8, name);
    put_u32(buffer, table + 16 + index * 8 + 4, target);
}

/// Serialize a type, name and language resource tree with one language per resource.
fn build_resource_section(resources: &[Resource], virtual_address: u32) -> Vec<u8> {
    let mut kinds: Vec<(u16, Vec<&Resource>)> = Vec::new();
    for resource in resources {
        match kinds.iter_mut().find(|(kind, _)| *kind == resource.kind) {
            Some((_, entries)) => entries.push(resource),
            None => kinds.push((resource.kind, vec![resource])),
        }
    }

    let mut buffer = Vec::new();
    let mut names = Vec::new();
    let mut blobs = Vec::new();
    let root = push_table(&mut buffer, 0, kinds.len());
    for (kind_index, (kind, entries)) in kinds.iter().enumerate() {
        let named = entries.iter().filter(|entry| matches!(entry.name, Name::Text(_))).count();
        let table = push_table(&mut buffer, named, entries.len() - named);
        set_entry(&mut buffer, root, kind_index, *kind as u32, 0x8000_0000 | table as u32);
        for (index, entry) in entries.iter().enumerate() {
            let languages = push_table(&mut buffer, 0, 1);
            let name = match &entry.name {
                Name::Id(id) => *id,
                Name::Text(text) => {
                    names.push((table + 16 + index * 8, *text));
                    0
                }
            };
            set_entry(&mut buffer, table, index, name, 0x8000_0000 | languages as u32);
            let data_entry = buffer.len();
            buffer.resize(data_entry + 16, 0);
            set_entry(&mut buffer, languages, 0, 1033, data_entry as u32);
            blobs.push((data_entry, &entry.data));
        }
    }
    for (entry, text) in names {
        let offset = buffer.len();
        let units = text.encode_utf16().collect::<Vec<_>>();
        buffer.extend_from_slice(&(units.len() as u16).to_le_bytes());
        buffer.extend(units.iter().flat_map(|unit| unit.to_le_bytes()));
        put_u32(&mut buffer, entry, 0x8000_0000 | offset as u32);
    }
    for (entry, data) in blobs {
        buffer.resize(buffer.len().next_multiple_of(4), 0);
        let offset = buffer.len();
        buffer.extend_from_slice(data);
        put_u32(&mut buffer, entry, virtual_address + offset as u32);
        put_u32(&mut buffer, entry + 4, data.len() as u32);
    }
    buffer
}

/// Build a minimal PE32+ image with a single resource section.
fn build_image(machine: u16, resources: &[Resource]) -> Vec<u8> {
    let section = if resources.is_empty() {
        Vec::new()
    } else {
        build_resource_section(resources, SECTION_VIRTUAL_ADDRESS)
    };
    build_image_with_section(machine, &section)
}

fn build_image_with_section(machine: u16, section: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; SECTION_OFFSET];
    put_u16(&mut data, 0, PE_DOS_MAGIC);
    put_u32(&mut data, PE_PTR_OFFSET as usize, 0x40);
    put_u32(&mut data, 0x40, PE_NT_SIGNATURE);

    put_u16(&mut data, 0x44, machine);
    put_u16(&mut data, 0x46, !section.is_empty() as u16);
    put_u16(&mut data, 0x54, 240);
    put_u16(&mut data, 0x56, 0x0022);

    let optional = 0x58;
    put_u16(&mut data, optional, PE_64_MAGIC);
    put_u16(&mut data, optional + 24 + 44, 2);
    put_u32(&mut data, optional + 24 + 84, 16);

    if !section.is_empty() {
        put_u32(&mut data, optional + 112 + 16, SECTION_VIRTUAL_ADDRESS);
        put_u32(&mut data, optional + 112 + 20, section.len() as u32);

        let header = optional + 240;
        data[header..header + 8].copy_from_slice(b".rsrc\0\0\0");
        put_u32(&mut data, header + 8, section.len() as u32);
        put_u32(&mut data, header + 12, SECTION_VIRTUAL_ADDRESS);
        put_u32(&mut data, header + 16, section.len() as u32);
        put_u32(&mut data, header + 20, SECTION_OFFSET as u32);
        put_u32(&mut data, header + 36, 0x4000_0040);
    }
    data.extend_from_slice(section);
    data
}

fn write_image(directory: &Path, name: &str, machine: u16, resources: &[Resource]) -> std::path::PathBuf {
    let path = directory.join(name);
    std::fs::write(&path, build_image(machine, resources)).unwrap();
    path
}

fn utf16z(text: &str) -> Vec<u8> {
    text.encode_utf16().chain([0]).flat_map(u16::to_le_bytes).collect()
}

fn pad(data: &mut Vec<u8>) { data.resize(data.len().next_multiple_of(4), 0); }

fn version_node(
    key: &str, value_type: u16, value_length: u16, value: &[u8], children: &[Vec<u8>],
) -> Vec<u8> {
    let mut node = vec![0u8; 6];
    node.extend(utf16z(key));
    pad(&mut node);
    node.extend_from_slice(value);
    for child in children {
        pad(&mut node);
        node.extend_from_slice(child);
    }
    let length = node.len() as u16;
    put_u16(&mut node, 0, length);
    put_u16(&mut node, 2, value_length);
    put_u16(&mut node, 4, value_type);
    node
}

fn version_string(key: &str, value: &str) -> Vec<u8> {
    version_node(key, 1, value.encode_utf16().count() as u16 + 1, &utf16z(value), &[])
}

/// Build a version block with the given translation table and string tables.
fn version_block(translations: &[(u16, u16)], tables: &[(&str, Vec<(&str, &str)>)]) -> Vec<u8> {
    let fixed = [
        VS_FIXEDFILEINFO_SIGNATURE,
        0x0001_0000,
        0x0001_0002,
        0x0003_0004,
        0x0001_0002,
        0x0003_0004,
        0x3f,
        0,
        0x0004_0004,
        1,
        0,
        0,
        0,
    ]
    .iter()
    .flat_map(|value: &u32| value.to_le_bytes())
    .collect::<Vec<u8>>();

    let string_tables = tables
        .iter()
        .map(|(key, strings)| {
            let strings =
                strings.iter().map(|(key, value)| version_string(key, value)).collect::<Vec<_>>();
            version_node(key, 1, 0, &[], &strings)
        })
        .collect::<Vec<_>>();
    let mut children = vec![version_node(VS_STRING_FILE_INFO, 1, 0, &[], &string_tables)];
    if !translations.is_empty() {
        let value = translations
            .iter()
            .flat_map(|(language, codepage)| [language.to_le_bytes(), codepage.to_le_bytes()])
            .flatten()
            .collect::<Vec<u8>>();
        let translation = version_node(VS_TRANSLATION, 0, value.len() as u16, &value, &[]);
        children.push(version_node(VS_VAR_FILE_INFO, 1, 0, &[], &[translation]));
    }
    version_node(VS_VERSION_INFO_KEY, 0, fixed.len() as u16, &fixed, &children)
}

fn png_icon(size: u32) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(size, size, image::Rgba([0x20, 0x80, 0xff, 0xff]));
    let mut data = Cursor::new(Vec::new());
    image.write_to(&mut data, image::ImageFormat::Png).unwrap();
    data.into_inner()
}

/// Build an icon group directory from (size, id, declared byte length) entries.
fn group_icon(entries: &[(u8, u16, u32)]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&ICON_TYPE_ICON.to_le_bytes());
    data.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for &(size, id, bytes) in entries {
        data.extend_from_slice(&[size, size, 0, 0]);
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&32u16.to_le_bytes());
        data.extend_from_slice(&bytes.to_le_bytes());
        data.extend_from_slice(&id.to_le_bytes());
    }
    data
}

fn icon_resources() -> Vec<Resource> {
    vec![
        resource(RT_GROUP_ICON, 1, group_icon(&[(32, 7, 0), (16, 8, 12)])),
        resource(RT_ICON, 7, png_icon(32)),
        resource(RT_ICON, 8, png_icon(16)),
    ]
}

const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<assembly xmlns="urn:schemas-microsoft-com:asm.v1" manifestVersion="1.0">
  <assemblyIdentity version="1.0.0.0" processorArchitecture="amd64" name="Acme.Space.Game.Launcher" type="win32"/>
  <dependency>
    <dependentAssembly>
      <assemblyIdentity type="win32" name="Microsoft.Windows.Common-Controls" version="6.0.0.0"/>
    </dependentAssembly>
  </dependency>
</assembly>
"#;

const TEMPLATE: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n\
<!-- launcher manifest -->\r\n\
<assembly xmlns=\"urn:schemas-microsoft-com:asm.v1\"   manifestVersion='1.0'>\r\n\
\t<assemblyIdentity  type=\"win32\" name='Launcher.Template'\r\n      version=\"1.0.0.0\" />\r\n\
\t<dependency><dependentAssembly><assemblyIdentity name=\"Microsoft.Windows.Common-Controls\" type=\"win32\" version=\"6.0.0.0\"/></dependentAssembly></dependency>\r\n\
</assembly>\r\n";

#[test]
fn read_machine_types() {
    init_logger();

    let directory = tempfile::tempdir().unwrap();
    for (machine, expected) in [
        (IMAGE_FILE_MACHINE_AMD64, MachineType::X64),
        (IMAGE_FILE_MACHINE_I386, MachineType::X86),
        (IMAGE_FILE_MACHINE_ARM64, MachineType::Arm64),
        (IMAGE_FILE_MACHINE_ARMNT, MachineType::Arm),
        (0x1234, MachineType::Unknown),
    ] {
        let path = write_image(directory.path(), "machine.exe", machine, &[]);
        assert_eq!(machine_type(&path), expected, "machine {:#06x}", machine);
    }
    assert_eq!(MachineType::X64.to_string(), "x64");
    assert_eq!(MachineType::Arm64.runtime_identifier(), "win-arm64");
    assert_eq!(MachineType::Unknown.runtime_identifier(), "win-x64");
}

#[test]
fn read_machine_of_non_executables() {
    init_logger();

    let directory = tempfile::tempdir().unwrap();
    let text = directory.path().join("readme.txt");
    std::fs::write(&text, "not an executable").unwrap();
    assert_eq!(machine_type(&text), MachineType::Unknown);

    let short = directory.path().join("short.exe");
    std::fs::write(&short, b"MZ").unwrap();
    assert_eq!(machine_type(&short), MachineType::Unknown);

    assert_eq!(machine_type(directory.path().join("missing.exe")), MachineType::Unknown);

    let mut data = build_image(IMAGE_FILE_MACHINE_AMD64, &[]);
    data[0x40..0x44].copy_from_slice(b"XX\0\0");
    assert!(matches!(
        read_machine(&mut Cursor::new(data)),
        Err(ImageReadError::InvalidHeader(_))
    ));
}

#[test]
fn parse_image() {
    init_logger();

    let data = build_image(IMAGE_FILE_MACHINE_I386, &icon_resources());
    let image = Image::parse(&data[..]).unwrap();

    assert_eq!(image.machine_type(), MachineType::X86);
    assert_eq!(image.subsystem(), 2);
    assert_eq!(image.data().len(), data.len());
    assert_eq!(
        image.data_directory(DataDirectoryType::ResourceTable).map(|entry| entry.virtual_address),
        Some(SECTION_VIRTUAL_ADDRESS)
    );
    assert_eq!(image.section_table().len(), 1);
    assert_eq!(image.section_table()[0].name().as_deref(), Some(".rsrc"));

    let directory = image.resource_directory().unwrap();
    assert_eq!(directory.virtual_address(), SECTION_VIRTUAL_ADDRESS);
    assert_eq!(directory.names(RT_ICON), vec![ResourceEntryName::ID(7), ResourceEntryName::ID(8)]);

    let empty = build_image(IMAGE_FILE_MACHINE_AMD64, &[]);
    assert!(Image::parse(&empty[..]).unwrap().resource_directory().is_none());
    assert!(Image::parse(&b"MZ"[..]).is_err());
}

#[test]
fn reject_shared_resource_tables() {
    init_logger();

    // every entry of a table points to the same next table
    let mut section = Vec::new();
    let tables = (0..7).map(|_| push_table(&mut section, 0, 20)).collect::<Vec<_>>();
    for pair in tables.windows(2) {
        for index in 0..20 {
            set_entry(&mut section, pair[0], index, index as u32 + 1, 0x8000_0000 | pair[1] as u32);
        }
    }
    let last = *tables.last().unwrap();
    put_u16(&mut section, last + 14, 0);

    let start = Instant::now();
    let result = Image::parse(build_image_with_section(IMAGE_FILE_MACHINE_AMD64, &section));
    assert!(matches!(result, Err(ImageReadError::InvalidSection(_))));
    assert!(start.elapsed() < Duration::from_secs(1));

    // a table containing itself
    let mut section = Vec::new();
    let root = push_table(&mut section, 0, 1);
    set_entry(&mut section, root, 0, RT_ICON as u32, 0x8000_0000 | root as u32);
    let result = Image::parse(build_image_with_section(IMAGE_FILE_MACHINE_AMD64, &section));
    assert!(matches!(result, Err(ImageReadError::InvalidSection(_))));

    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("shared.exe");
    std::fs::write(&path, build_image_with_section(IMAGE_FILE_MACHINE_AMD64, &section)).unwrap();
    assert!(extract_icon(&path).is_none());
    assert_eq!(machine_type(&path), MachineType::X64);
}

#[test]
fn load_named_resources() {
    init_logger();

    let data = build_image(
        IMAGE_FILE_MACHINE_AMD64,
        &[
            named_resource(10, "CONFIG", b"config data".to_vec()),
            resource(10, 3, b"numbered".to_vec()),
        ],
    );
    let directory = Image::parse(&data[..]).unwrap().into_resource_directory().unwrap();

    let names = directory.names(10);
    assert_eq!(names.len(), 2);
    assert_eq!(names[0].to_string().as_deref(), Some("CONFIG"));
    assert_eq!(names[0], ResourceEntryName::from_string("CONFIG"));
    assert_eq!(
        directory.load(10, &ResourceEntryName::from_string("CONFIG")).as_deref(),
        Some(&b"config data"[..])
    );
    assert_eq!(
        directory.load(10, &ResourceEntryName::ID(3)).as_deref(),
        Some(&b"numbered"[..])
    );
    assert!(directory.load(10, &ResourceEntryName::ID(4)).is_none());
    assert!(directory.load(RT_ICON, &ResourceEntryName::ID(3)).is_none());
}

#[test]
fn resolve_version_strings_in_declared_order() {
    init_logger();

    let block = version_block(
        &[(0x0407, 0x04e4), (0x0409, 0x04b0)],
        &[
            ("040704E4", vec![(VS_PRODUCT_NAME, "   "), (VS_COMPANY_NAME, "Firma")]),
            ("040904B0", vec![(VS_PRODUCT_NAME, "Space Game"), (VS_COMPANY_NAME, "Acme")]),
        ],
    );
    let info = VersionInfo::parse(&block).unwrap();

    assert_eq!(info.translations(), vec![(0x0407, 0x04e4), (0x0409, 0x04b0)]);
    assert_eq!(info.string_value(VS_PRODUCT_NAME).as_deref(), Some("Space Game"));
    assert_eq!(info.string_value(VS_COMPANY_NAME).as_deref(), Some("Firma"));
    assert_eq!(info.string_value(VS_COMMENTS), None);
    assert_eq!(
        info.query("\\stringfileinfo\\040704e4\\companyname").map(VersionNode::text).as_deref(),
        Some("Firma")
    );

    let fixed = info.fixed_file_info().unwrap();
    assert_eq!({ fixed.signature }, VS_FIXEDFILEINFO_SIGNATURE);
}

#[test]
fn resolve_version_strings_with_fallback_table() {
    init_logger();

    // no translation table
    let block = version_block(
        &[],
        &[
            ("041104B0", vec![(VS_FILE_DESCRIPTION, "Japanese only")]),
            ("040904B0", vec![(VS_FILE_VERSION, "1.2.3.4")]),
        ],
    );
    let info = VersionInfo::parse(&block).unwrap();
    assert!(info.translations().is_empty());
    assert_eq!(info.string_value(VS_FILE_VERSION).as_deref(), Some("1.2.3.4"));
    assert_eq!(info.string_value(VS_FILE_DESCRIPTION), None);
}

#[test]
fn read_version_strings_from_files() {
    init_logger();

    let directory = tempfile::tempdir().unwrap();
    let block = version_block(&[(0x0409, 0x04b0)], &[("040904B0", vec![(VS_PRODUCT_NAME, "Space Game")])]);
    let path = write_image(
        directory.path(),
        "game.exe",
        IMAGE_FILE_MACHINE_AMD64,
        &[resource(RT_VERSION, 1, block)],
    );
    assert_eq!(string_value(&path, VS_PRODUCT_NAME).as_deref(), Some("Space Game"));
    assert_eq!(string_value(&path, VS_COMPANY_NAME), None);

    let bare = write_image(directory.path(), "bare.exe", IMAGE_FILE_MACHINE_AMD64, &[]);
    assert_eq!(string_value(&bare, VS_PRODUCT_NAME), None);

    let malformed = write_image(
        directory.path(),
        "malformed.exe",
        IMAGE_FILE_MACHINE_AMD64,
        &[resource(RT_VERSION, 1, vec![0xff; 10])],
    );
    assert_eq!(string_value(&malformed, VS_PRODUCT_NAME), None);
    assert!(VersionInfo::parse(&[0xff; 10]).is_err());
}

#[test]
fn convert_numeric_file_versions() {
    assert_eq!(numeric_file_version("6000.0.23f1 (1c4764c07fb4)").as_deref(), Some("6000.0.23.1"));
    assert_eq!(numeric_file_version("1.2").as_deref(), Some("1.2.0.0"));
    assert_eq!(numeric_file_version("v99999999999").as_deref(), Some("2147483647.0.0.0"));
    assert_eq!(numeric_file_version("release"), None);
}

#[test]
fn reconstruct_icon() {
    init_logger();

    let data = build_image(IMAGE_FILE_MACHINE_AMD64, &icon_resources());
    let directory = Image::parse(&data[..]).unwrap().into_resource_directory().unwrap();
    let icon = IconContainer::from_resources(&directory).unwrap();

    let images = icon.images();
    assert_eq!(images.len(), 2);
    assert_eq!((images[0].width, images[1].width), (32, 16));
    assert_eq!(&images[0].data[..], &png_icon(32)[..]);

    let file = icon.build();
    assert_eq!(u16::from_le_bytes([file[2], file[3]]), ICON_TYPE_ICON);
    assert_eq!(u16::from_le_bytes([file[4], file[5]]), 2);

    let entries = icon.directory();
    let mut offset = (ICON_DIRECTORY_SIZE + 2 * ICON_FILE_ENTRY_SIZE) as u32;
    for (entry, image) in entries.iter().zip(images) {
        // declared lengths in the group directory are ignored
        assert_eq!({ entry.bytes } as usize, image.data.len());
        assert_eq!({ entry.offset }, offset);
        offset += entry.bytes;
    }
    assert_eq!(file.len(), offset as usize);

    assert_eq!(IconContainer::parse(&file).unwrap(), icon);
}

#[test]
fn reject_incomplete_icons() {
    init_logger();

    let directory = tempfile::tempdir().unwrap();
    let path = write_image(
        directory.path(),
        "broken.exe",
        IMAGE_FILE_MACHINE_AMD64,
        &[
            resource(RT_GROUP_ICON, 1, group_icon(&[(32, 7, 0), (16, 8, 0)])),
            resource(RT_ICON, 7, png_icon(32)),
        ],
    );
    assert!(extract_icon(&path).is_none());
    assert!(extract_icon_file_in(&path, directory.path()).is_none());

    let resources = ResourceDirectory::from_file(&path).unwrap();
    assert!(matches!(
        IconContainer::from_resources(&resources),
        Err(ResourceError::MissingResource(_))
    ));

    let bare = write_image(directory.path(), "bare.exe", IMAGE_FILE_MACHINE_AMD64, &[]);
    assert!(extract_icon(&bare).is_none());
}

#[test]
fn reject_malformed_icon_groups() {
    let valid = group_icon(&[(32, 1, 0)]);
    assert_eq!(parse_group_directory(&valid).unwrap().len(), 1);

    let mut cursor = valid.clone();
    cursor[2] = 2;
    assert!(parse_group_directory(&cursor).is_err(), "cursor type");

    let empty = group_icon(&[]);
    assert!(parse_group_directory(&empty).is_err(), "zero entries");

    let mut oversized = valid.clone();
    oversized[4..6].copy_from_slice(&257u16.to_le_bytes());
    assert!(parse_group_directory(&oversized).is_err(), "257 entries");

    let mut truncated = group_icon(&[(32, 1, 0), (16, 2, 0)]);
    truncated.truncate(truncated.len() - 3);
    assert!(parse_group_directory(&truncated).is_err(), "truncated directory");

    assert!(IconContainer::parse(&cursor).is_err());
}

struct MapSource(Vec<(u16, ResourceEntryName, Vec<u8>)>);
impl ResourceSource for MapSource {
    fn names(&self, _kind: u16) -> Vec<ResourceEntryName> { Vec::new() }

    fn load(&self, kind: u16, name: &ResourceEntryName) -> Option<Cow<'_, [u8]>> {
        self.0
            .iter()
            .find(|(entry_kind, entry_name, _)| *entry_kind == kind && entry_name == name)
            .map(|(_, _, data)| Cow::Borrowed(&data[..]))
    }
}

#[test]
fn select_icon_group() {
    init_logger();

    let data = build_image(
        IMAGE_FILE_MACHINE_AMD64,
        &[
            named_resource(RT_GROUP_ICON, "MAINICON", group_icon(&[(16, 8, 0)])),
            resource(RT_GROUP_ICON, 1, group_icon(&[(32, 7, 0)])),
            resource(RT_ICON, 7, png_icon(32)),
            resource(RT_ICON, 8, png_icon(16)),
        ],
    );
    let directory = Image::parse(&data[..]).unwrap().into_resource_directory().unwrap();
    let icon = IconContainer::from_resources(&directory).unwrap();
    assert_eq!(icon.images().len(), 1);
    assert_eq!(icon.images()[0].width, 16, "first enumerated group");

    // without enumeration the ids 1 and 2 are probed
    let source = MapSource(vec![
        (RT_GROUP_ICON, ResourceEntryName::ID(2), group_icon(&[(32, 7, 0)])),
        (RT_ICON, ResourceEntryName::ID(7), png_icon(32)),
    ]);
    let icon = IconContainer::from_resources(&source).unwrap();
    assert_eq!(icon.images()[0].real_width(), 32);

    let source = MapSource(vec![(RT_ICON, ResourceEntryName::ID(7), png_icon(32))]);
    assert!(IconContainer::from_resources(&source).is_err());
}

#[test]
fn write_icon_file() {
    init_logger();

    let directory = tempfile::tempdir().unwrap();
    let path = write_image(directory.path(), "SpaceGame.exe", IMAGE_FILE_MACHINE_AMD64, &icon_resources());

    let icon_path = extract_icon_file_in(&path, directory.path()).unwrap();
    let file_name = icon_path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("SpaceGame_icon_"), "{}", file_name);
    assert!(file_name.ends_with(".ico"), "{}", file_name);
    assert_eq!(icon_path.parent(), Some(directory.path()));

    let written = std::fs::read(&icon_path).unwrap();
    assert_eq!(written, extract_icon(&path).unwrap().build());

    let decoded = image::load_from_memory_with_format(&written, image::ImageFormat::Ico).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (32, 32));
}

#[test]
fn decode_best_icon_image() {
    init_logger();

    let data = build_image(IMAGE_FILE_MACHINE_AMD64, &icon_resources());
    let directory = Image::parse(&data[..]).unwrap().into_resource_directory().unwrap();
    let icon = IconContainer::from_resources(&directory).unwrap();

    assert_eq!(icon.best().map(IconImage::real_width), Some(32));
    let best = icon.best_image().unwrap();
    assert_eq!(best.dimensions(), (32, 32));
    assert_eq!(best.get_pixel(4, 4), &image::Rgba([0x20, 0x80, 0xff, 0xff]));
}

#[cfg(not(windows))]
#[test]
fn preview_icon_from_file() {
    init_logger();

    let directory = tempfile::tempdir().unwrap();
    let path = write_image(directory.path(), "game.exe", IMAGE_FILE_MACHINE_AMD64, &icon_resources());
    assert_eq!(preview_icon(&path).unwrap().dimensions(), (32, 32));

    let bare = write_image(directory.path(), "bare.exe", IMAGE_FILE_MACHINE_AMD64, &[]);
    assert!(preview_icon(&bare).is_none());
}

#[test]
fn decode_manifest_text() {
    let text = "<assembly/>";

    let utf16le = [&[0xff, 0xfe][..], &encode_text(text, TextEncoding::Utf16Le)[..]].concat();
    assert_eq!(decode_text(&utf16le), (text.to_string(), TextEncoding::Utf16LeBom));

    let utf16be = text.encode_utf16().flat_map(u16::to_be_bytes).collect::<Vec<_>>();
    let utf16be = [&[0xfe, 0xff][..], &utf16be[..]].concat();
    assert_eq!(decode_text(&utf16be), (text.to_string(), TextEncoding::Utf16BeBom));

    let utf8 = [&[0xef, 0xbb, 0xbf][..], text.as_bytes()].concat();
    assert_eq!(decode_text(&utf8), (text.to_string(), TextEncoding::Utf8Bom));

    // 8 zero bytes at odd positions are enough for UTF-16LE
    let eight = encode_text("abcdefgh", TextEncoding::Utf16Le);
    assert_eq!(decode_text(&eight), ("abcdefgh".to_string(), TextEncoding::Utf16Le));

    let seven = [&encode_text("abcdefg", TextEncoding::Utf16Le)[..], &b"hh"[..]].concat();
    assert_eq!(decode_text(&seven).1, TextEncoding::Utf8);

    assert_eq!(decode_text(text.as_bytes()), (text.to_string(), TextEncoding::Utf8));

    for encoding in [
        TextEncoding::Utf8,
        TextEncoding::Utf8Bom,
        TextEncoding::Utf16Le,
        TextEncoding::Utf16LeBom,
        TextEncoding::Utf16BeBom,
    ] {
        assert_eq!(decode_text(&encode_text(MANIFEST, encoding)), (MANIFEST.to_string(), encoding));
    }
}

#[test]
fn read_assembly_identities() {
    init_logger();

    assert_eq!(assembly_identity(MANIFEST).unwrap().as_deref(), Some("Acme.Space.Game.Launcher"));
    assert_eq!(
        assembly_identity("<assembly><assemblyIdentity name=\"Plain.App\"/></assembly>")
            .unwrap()
            .as_deref(),
        Some("Plain.App")
    );
    assert_eq!(
        assembly_identity("<assembly xmlns=\"urn:schemas-microsoft-com:asm.v1\"><assemblyIdentity version=\"1.0.0.0\"/></assembly>").unwrap(),
        None
    );
    assert_eq!(assembly_identity("  \r\n").unwrap(), None);
    assert!(assembly_identity("<assembly>").is_err());

    let directory = tempfile::tempdir().unwrap();
    let utf8 = write_image(
        directory.path(),
        "utf8.exe",
        IMAGE_FILE_MACHINE_AMD64,
        &[resource(RT_MANIFEST, 1, encode_text(MANIFEST, TextEncoding::Utf8Bom))],
    );
    assert_eq!(read_assembly_identity(&utf8).as_deref(), Some("Acme.Space.Game.Launcher"));

    let isolation_aware = write_image(
        directory.path(),
        "utf16.exe",
        IMAGE_FILE_MACHINE_AMD64,
        &[resource(RT_MANIFEST, 2, encode_text(MANIFEST, TextEncoding::Utf16Le))],
    );
    assert_eq!(
        read_assembly_identity(&isolation_aware).as_deref(),
        Some("Acme.Space.Game.Launcher")
    );

    let invalid = write_image(
        directory.path(),
        "invalid.exe",
        IMAGE_FILE_MACHINE_AMD64,
        &[resource(RT_MANIFEST, 1, b"<assembly><assemblyIdentity".to_vec())],
    );
    assert_eq!(read_assembly_identity(&invalid), None);

    let bare = write_image(directory.path(), "bare.exe", IMAGE_FILE_MACHINE_AMD64, &[]);
    assert_eq!(read_assembly_identity(&bare), None);
}

#[test]
fn patch_manifest_text() {
    init_logger();

    let patched = patch_assembly_identity(TEMPLATE, "Acme.Space.Game.Launcher").unwrap();
    assert_eq!(patched, TEMPLATE.replace("'Launcher.Template'", "'Acme.Space.Game.Launcher'"));

    let escaped = patch_assembly_identity(TEMPLATE, "A&B").unwrap();
    assert!(escaped.contains("name='A&amp;B'"));
    assert_eq!(assembly_identity(&escaped).unwrap().as_deref(), Some("A&B"));

    let missing_name = "<assembly xmlns=\"urn:schemas-microsoft-com:asm.v1\"><assemblyIdentity version=\"1.0.0.0\"/></assembly>";
    assert_eq!(
        patch_assembly_identity(missing_name, "Game.Launcher").unwrap(),
        "<assembly xmlns=\"urn:schemas-microsoft-com:asm.v1\"><assemblyIdentity name=\"Game.Launcher\" version=\"1.0.0.0\"/></assembly>"
    );

    assert!(matches!(
        patch_assembly_identity("<assembly><dependency/></assembly>", "Game.Launcher"),
        Err(ManifestError::MissingAssemblyIdentity)
    ));
    assert!(matches!(
        patch_assembly_identity("<assembly>", "Game.Launcher"),
        Err(ManifestError::InvalidXml(_))
    ));
}

#[test]
fn patch_manifest_files() {
    init_logger();

    let directory = tempfile::tempdir().unwrap();
    let template = directory.path().join("app.manifest");
    std::fs::write(&template, TEMPLATE).unwrap();

    let patched = create_patched_manifest_in(&template, "Acme.Game.Launcher", directory.path()).unwrap();
    let file_name = patched.file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("patched_manifest_"), "{}", file_name);
    assert!(file_name.ends_with(".manifest"), "{}", file_name);
    assert_eq!(
        std::fs::read_to_string(&patched).unwrap(),
        TEMPLATE.replace("'Launcher.Template'", "'Acme.Game.Launcher'")
    );
    assert_eq!(std::fs::read_to_string(&template).unwrap(), TEMPLATE, "template unchanged");

    // the text encoding and byte order mark of the template are kept
    let body = &TEMPLATE[TEMPLATE.find("<!--").unwrap()..];
    let utf16 = directory.path().join("utf16.manifest");
    std::fs::write(&utf16, encode_text(body, TextEncoding::Utf16LeBom)).unwrap();
    let patched = create_patched_manifest_in(&utf16, "Acme.Game.Launcher", directory.path()).unwrap();
    let bytes = std::fs::read(&patched).unwrap();
    assert_eq!(&bytes[..2], &[0xff, 0xfe]);
    assert_eq!(
        decode_text(&bytes),
        (body.replace("'Launcher.Template'", "'Acme.Game.Launcher'"), TextEncoding::Utf16LeBom)
    );

    assert!(matches!(
        create_patched_manifest_in(directory.path().join("missing.manifest"), "X", directory.path()),
        Err(ManifestError::MissingTemplate(_))
    ));

    let invalid_utf8 = directory.path().join("invalid.manifest");
    std::fs::write(&invalid_utf8, b"<assembly>\xff</assembly>").unwrap();
    assert!(matches!(
        create_patched_manifest_in(&invalid_utf8, "X", directory.path()),
        Err(ManifestError::UnsupportedEncoding)
    ));
}

#[test]
fn sanitize_and_derive_identities() {
    assert_eq!(sanitize_identity("  Acme Studios, Inc.  "), "Acme.Studios.Inc");
    assert_eq!(sanitize_identity("..my--game_2.."), "my--game_2");
    assert_eq!(sanitize_identity("a . . b"), "a.b");
    assert_eq!(sanitize_identity("Ünïcödé"), "Ünïcödé");
    assert_eq!(sanitize_identity(" !?* "), "");

    assert_eq!(derive_identity("Acme Studios", "Space Game"), "Acme.Studios.Space.Game.Launcher");
    assert_eq!(derive_identity("", "Space Game"), "Space.Game.Launcher");
    assert_eq!(derive_identity("Acme", "  "), "Acme.Launcher");
    assert_eq!(derive_identity("...", ""), "Launcher");

    assert_eq!(ensure_valid_identity(" My Game ", "Fallback.Launcher"), "My.Game");
    assert_eq!(ensure_valid_identity(" ... ", "Fallback.Launcher"), "Fallback.Launcher");
}

#[test]
fn inspect_executable_identity() {
    init_logger();

    let directory = tempfile::tempdir().unwrap();
    let block = version_block(
        &[(0x0409, 0x04b0)],
        &[(
            "040904B0",
            vec![
                (VS_PRODUCT_NAME, "Space Game"),
                (VS_COMPANY_NAME, "Acme Studios"),
                (VS_FILE_DESCRIPTION, "Space Game Player"),
                (VS_FILE_VERSION, "6000.0.23f1 (1c4764c07fb4)"),
                (VS_PRODUCT_VERSION, " "),
                (VS_LEGAL_COPYRIGHT, "(c) Acme"),
            ],
        )],
    );
    let mut resources = icon_resources();
    resources.push(resource(RT_VERSION, 1, block));
    resources.push(resource(RT_MANIFEST, 1, MANIFEST.as_bytes().to_vec()));
    let path = write_image(directory.path(), "SpaceGame.exe", IMAGE_FILE_MACHINE_AMD64, &resources);

    let identity = ExecutableIdentity::inspect(&path);
    assert_eq!(identity.product_name, "Space Game");
    assert_eq!(identity.company_name, "Acme Studios");
    assert_eq!(identity.version, "6000.0.23f1 (1c4764c07fb4)");
    assert_eq!(identity.product_version, None);
    assert_eq!(identity.description.as_deref(), Some("Space Game Player"));
    assert_eq!(identity.copyright.as_deref(), Some("(c) Acme"));
    assert_eq!(identity.numeric_version().as_deref(), Some("6000.0.23.1"));
    assert_eq!(identity.assembly_identity.as_deref(), Some("Acme.Space.Game.Launcher"));
    assert_eq!(identity.machine, MachineType::X64);
    assert_eq!(identity.icon.as_ref().map(|icon| icon.images().len()), Some(2));
    assert!(identity.markers.manifest_identity);
    assert!(!identity.markers.original_backup);
    assert_eq!(identity.derived_identity(), "Acme.Studios.Space.Game.Launcher");

    std::fs::write(directory.path().join("SpaceGame_original.exe"), b"MZ").unwrap();
    let identity = ExecutableIdentity::inspect(&path);
    assert!(identity.markers.original_backup);
    assert!(identity.is_patched());
}

#[test]
fn inspect_executable_without_resources() {
    init_logger();

    let directory = tempfile::tempdir().unwrap();
    let bare = write_image(directory.path(), "Bare Game.exe", IMAGE_FILE_MACHINE_ARM64, &[]);
    let identity = ExecutableIdentity::inspect(&bare);
    assert_eq!(identity.product_name, "Bare Game");
    assert_eq!(identity.company_name, "");
    assert_eq!(identity.version, "");
    assert_eq!(identity.icon, None);
    assert_eq!(identity.machine, MachineType::Arm64);
    assert!(!identity.is_patched());
    assert_eq!(identity.derived_identity(), "Bare.Game.Launcher");

    let block = version_block(&[], &[("040904B0", vec![(VS_FILE_DESCRIPTION, "Described Game")])]);
    let described = write_image(
        directory.path(),
        "described.exe",
        IMAGE_FILE_MACHINE_AMD64,
        &[resource(RT_VERSION, 1, block)],
    );
    assert_eq!(ExecutableIdentity::inspect(&described).product_name, "Described Game");
}

#[test]
fn write_identity_artifacts() {
    init_logger();

    let directory = tempfile::tempdir().unwrap();
    let block = version_block(
        &[(0x0409, 0x04b0)],
        &[("040904B0", vec![(VS_PRODUCT_NAME, "Space Game"), (VS_COMPANY_NAME, "Acme")])],
    );
    let mut resources = icon_resources();
    resources.push(resource(RT_VERSION, 1, block));
    let path = write_image(directory.path(), "SpaceGame.exe", IMAGE_FILE_MACHINE_AMD64, &resources);
    let template = directory.path().join("app.manifest");
    std::fs::write(&template, TEMPLATE).unwrap();

    let output = tempfile::tempdir().unwrap();
    let identity = ExecutableIdentity::inspect(&path);
    let artifacts = identity.write_artifacts_in(&template, "  ", output.path()).unwrap();
    assert_eq!(artifacts.identity, "Acme.Space.Game.Launcher");

    let icon = artifacts.icon.unwrap();
    assert!(icon.file_name().unwrap().to_string_lossy().starts_with("SpaceGame_icon_"));
    assert_eq!(std::fs::read(&icon).unwrap(), identity.icon.as_ref().unwrap().build());
    assert_eq!(
        assembly_identity(&std::fs::read_to_string(&artifacts.manifest).unwrap()).unwrap().as_deref(),
        Some("Acme.Space.Game.Launcher")
    );

    let artifacts = identity.write_artifacts_in(&template, "Custom Name!", output.path()).unwrap();
    assert_eq!(artifacts.identity, "Custom.Name");

    let missing = identity.write_artifacts_in(output.path().join("missing.manifest"), "X", output.path());
    assert!(matches!(missing, Err(ArtifactError::Manifest(ManifestError::MissingTemplate(_)))));

    // failed writes leave no files behind
    let empty = tempfile::tempdir().unwrap();
    let missing = identity.write_artifacts_in(empty.path().join("missing.manifest"), "X", empty.path());
    assert!(missing.is_err());
    let invalid = directory.path().join("invalid.manifest");
    std::fs::write(&invalid, "<assembly>").unwrap();
    assert!(identity.write_artifacts_in(&invalid, "X", empty.path()).is_err());
    assert_eq!(std::fs::read_dir(empty.path()).unwrap().count(), 0);
}

#[test]
fn read_in_memory_resources() {
    init_logger();

    let mut directory = ResourceDirectory::default();
    for resource in icon_resources() {
        let Name::Id(id) = resource.name else { unreachable!() };
        directory.insert_data(resource.kind, ResourceEntryName::ID(id), resource.data);
    }
    directory.insert_data(RT_MANIFEST, ResourceEntryName::ID(1), MANIFEST.as_bytes().to_vec());
    directory.insert_data(
        RT_VERSION,
        ResourceEntryName::ID(1),
        version_block(&[], &[("040904B0", vec![(VS_PRODUCT_NAME, "First")])]),
    );
    // replaces the previous data
    directory.insert_data(
        RT_VERSION,
        ResourceEntryName::ID(1),
        version_block(&[], &[("040904B0", vec![(VS_PRODUCT_NAME, "Second")])]),
    );

    assert_eq!(directory.names(RT_VERSION).len(), 1);
    let info = VersionInfo::from_resources(&directory).unwrap().unwrap();
    assert_eq!(info.string_value(VS_PRODUCT_NAME).as_deref(), Some("Second"));
    assert_eq!(IconContainer::from_resources(&directory).unwrap().images().len(), 2);
    assert_eq!(
        embedded_manifest(&directory).and_then(|manifest| assembly_identity(&manifest).unwrap()),
        Some("Acme.Space.Game.Launcher".to_string())
    );

    let identity = ExecutableIdentity::from_resources(
        Path::new("Memory.exe"),
        &directory,
        MachineType::Unknown,
    );
    assert_eq!(identity.product_name, "Second");
    assert!(identity.markers.manifest_identity);
}
