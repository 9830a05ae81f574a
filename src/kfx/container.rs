//! KFX container serialization and header parsing.
//!
//! Container layout:
//! - Header: `CONT` magic + version + header_len + ci_offset + ci_len
//! - Entity table (indexed by `$413`/`$414`)
//! - Doc symbols Ion (indexed by `$415`/`$416`)
//! - Format capabilities Ion (indexed by `$594`/`$595`)
//! - Container info Ion
//! - kfxgen info
//! - Entity payloads (after header_len)
//!
//! All integers in the binary framing are little-endian.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::kfx::fragment::{Fragment, FragmentData, FragmentList};
use crate::kfx::ion::{self, IonParser, IonValue, StructBuilder};
use crate::kfx::symbols::{LocalSymbols, sym};

/// Container magic bytes.
pub const CONTAINER_MAGIC: &[u8; 4] = b"CONT";
/// Entity magic bytes.
pub const ENTITY_MAGIC: &[u8; 4] = b"ENTY";
pub const CONTAINER_VERSION: u16 = 2;
pub const ENTITY_VERSION: u16 = 1;
/// magic(4) + version(2) + header_len(4) + ci_offset(4) + ci_len(4)
pub const HEADER_SIZE: usize = 18;
/// id(4) + type(4) + offset(8) + length(8)
pub const ENTITY_ENTRY_SIZE: usize = 24;
const CHUNK_SIZE: i64 = 4096;

const ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// `len` characters of `[A-Z0-9]` derived from the SHA-1 of `input`.
///
/// An empty input yields a fresh random string instead.
pub fn alphanumeric_digest(input: &str, len: usize) -> String {
    let digest = if input.is_empty() {
        random_seed()
    } else {
        sha1_smol::Sha1::from(input).digest().bytes()
    };
    (0..len)
        .map(|i| ID_CHARSET[digest[i % digest.len()] as usize % ID_CHARSET.len()] as char)
        .collect()
}

fn random_seed() -> [u8; 20] {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut hasher = sha1_smol::Sha1::new();
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    hasher.digest().bytes()
}

/// Container id for a document: `CR!` followed by 28 characters `[A-Z0-9]`.
pub fn container_id(doc_id: &str) -> String {
    format!("CR!{}", alphanumeric_digest(doc_id, 28))
}

/// Entity table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLoc {
    /// Fragment id symbol.
    pub id: u32,
    /// Fragment type symbol.
    pub type_id: u32,
    /// Offset of the payload, relative to the end of the header.
    pub offset: u64,
    pub length: u64,
}

/// Serialized entity ready for container output.
#[derive(Debug, Clone)]
pub struct SerializedEntity {
    pub id: u32,
    pub entity_type: u32,
    pub data: Vec<u8>,
}

/// `{$410: 0, $411: 0}` entity header.
fn entity_header() -> Vec<u8> {
    ion::encode(
        &StructBuilder::new()
            .int(sym::COMPRESSION_TYPE, 0)
            .int(sym::DRM_SCHEME, 0)
            .build(),
    )
}

/// Wrap a fragment payload in its `ENTY` header. Raw media is stored
/// verbatim, everything else as an Ion stream.
pub fn create_entity_data(data: &FragmentData) -> Vec<u8> {
    let header = entity_header();
    let header_len = 10 + header.len();

    let mut out = Vec::new();
    out.extend_from_slice(ENTITY_MAGIC);
    out.extend_from_slice(&ENTITY_VERSION.to_le_bytes());
    out.extend_from_slice(&(header_len as u32).to_le_bytes());
    out.extend_from_slice(&header);
    match data {
        FragmentData::Ion(value) => out.extend_from_slice(&ion::encode(value)),
        FragmentData::Raw(bytes) => out.extend_from_slice(bytes),
    }
    out
}

/// Serialize every entity fragment, interning fragment ids as it goes.
///
/// Container fragments (`$270`, `$593`) live in the header, not in the
/// entity table.
pub fn serialize_entities(fragments: &FragmentList, symbols: &mut LocalSymbols) -> Vec<SerializedEntity> {
    fragments
        .iter()
        .filter(|f| !crate::kfx::symbols::is_container_fragment(f.ftype))
        .map(|f| SerializedEntity {
            id: symbols.get_or_intern(&f.fid),
            entity_type: f.ftype,
            data: create_entity_data(&f.data),
        })
        .collect()
}

/// Serialize a complete KFX container.
///
/// `fragments` must already hold every fragment, `$593` included. The
/// symbol table is encoded after all entity ids are interned, so `symbols`
/// is final once this returns.
pub fn serialize_container(
    container_id: &str,
    fragments: &FragmentList,
    symbols: &mut LocalSymbols,
    settings: &Settings,
) -> Result<Vec<u8>> {
    let entities = serialize_entities(fragments, symbols);
    let symtab = ion::encode(&symbols.symbol_table_value());
    let format_caps = fragments
        .first_of_type(sym::FORMAT_CAPABILITIES)
        .and_then(Fragment::as_ion)
        .map(|value| {
            ion::encode(&IonValue::Annotated(
                vec![sym::FORMAT_CAPABILITIES],
                Box::new(value.clone()),
            ))
        })
        .unwrap_or_default();

    let mut entity_table = Vec::with_capacity(entities.len() * ENTITY_ENTRY_SIZE);
    let mut payload = Vec::new();
    for entity in &entities {
        entity_table.extend_from_slice(&entity.id.to_le_bytes());
        entity_table.extend_from_slice(&entity.entity_type.to_le_bytes());
        entity_table.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        entity_table.extend_from_slice(&(entity.data.len() as u64).to_le_bytes());
        payload.extend_from_slice(&entity.data);
    }
    let payload_sha1 = sha1_smol::Sha1::from(&payload).digest().to_string();

    let entity_table_offset = HEADER_SIZE;
    let symtab_offset = entity_table_offset + entity_table.len();
    let format_caps_offset = symtab_offset + symtab.len();

    let (fc_offset, fc_length) = if format_caps.is_empty() {
        (None, None)
    } else {
        (
            Some(IonValue::Int(format_caps_offset as i64)),
            Some(IonValue::Int(format_caps.len() as i64)),
        )
    };
    let container_info = ion::encode(
        &StructBuilder::new()
            .string(sym::CONTAINER_ID, container_id)
            .int(sym::COMPRESSION_TYPE, 0)
            .int(sym::DRM_SCHEME, 0)
            .int(sym::CHUNK_SIZE, CHUNK_SIZE)
            .int(sym::INDEX_TABLE_OFFSET, entity_table_offset as i64)
            .int(sym::INDEX_TABLE_LENGTH, entity_table.len() as i64)
            .int(sym::SYMBOL_TABLE_OFFSET, symtab_offset as i64)
            .int(sym::SYMBOL_TABLE_LENGTH, symtab.len() as i64)
            .maybe(sym::FORMAT_CAPABILITIES_OFFSET, fc_offset)
            .maybe(sym::FORMAT_CAPABILITIES_LENGTH, fc_length)
            .build(),
    );
    let container_info_offset = format_caps_offset + format_caps.len();

    let kfxgen_info = format!(
        "[{{key:kfxgen_package_version,value:{}}},{{key:kfxgen_application_version,value:{}}},{{key:kfxgen_payload_sha1,value:{}}},{{key:kfxgen_acr,value:{}}}]",
        settings.generator_version, settings.application_version, payload_sha1, container_id
    );

    let header_len = container_info_offset + container_info.len() + kfxgen_info.len();
    let header_len = u32::try_from(header_len)
        .map_err(|_| Error::MalformedContent(format!("container header of {header_len} bytes")))?;

    let mut out = Vec::with_capacity(header_len as usize + payload.len());
    out.extend_from_slice(CONTAINER_MAGIC);
    out.extend_from_slice(&CONTAINER_VERSION.to_le_bytes());
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&(container_info_offset as u32).to_le_bytes());
    out.extend_from_slice(&(container_info.len() as u32).to_le_bytes());
    out.extend_from_slice(&entity_table);
    out.extend_from_slice(&symtab);
    out.extend_from_slice(&format_caps);
    out.extend_from_slice(&container_info);
    out.extend_from_slice(kfxgen_info.as_bytes());
    out.extend_from_slice(&payload);

    log::debug!(
        "container {container_id}: {} entities, {} symbols, {} bytes",
        entities.len(),
        symbols.len(),
        out.len()
    );
    Ok(out)
}

// --- Reading ---

/// Fixed container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version: u16,
    /// Offset of the first entity payload.
    pub header_len: usize,
    pub container_info_offset: usize,
    pub container_info_length: usize,
}

/// Fields of the container info struct.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerInfo {
    pub container_id: String,
    pub index: Option<(usize, usize)>,
    pub doc_symbols: Option<(usize, usize)>,
    pub format_capabilities: Option<(usize, usize)>,
}

fn read_u32_le(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
}

fn read_u64_le(data: &[u8], offset: usize) -> Option<u64> {
    data.get(offset..offset + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
}

fn malformed(what: &str) -> Error {
    Error::MalformedContent(what.to_string())
}

/// Parse the fixed 18-byte header.
pub fn parse_container_header(data: &[u8]) -> Result<ContainerHeader> {
    if data.len() < HEADER_SIZE {
        return Err(malformed("container shorter than its header"));
    }
    if &data[..4] != CONTAINER_MAGIC {
        return Err(malformed("not a KFX container"));
    }
    let field = |offset| read_u32_le(data, offset).map(|v| v as usize).ok_or_else(|| malformed("header"));
    Ok(ContainerHeader {
        version: u16::from_le_bytes([data[4], data[5]]),
        header_len: field(6)?,
        container_info_offset: field(10)?,
        container_info_length: field(14)?,
    })
}

/// Parse the container info struct located by `header`.
pub fn parse_container_info(data: &[u8], header: &ContainerHeader) -> Result<ContainerInfo> {
    let start = header.container_info_offset;
    let bytes = data
        .get(start..start + header.container_info_length)
        .ok_or_else(|| malformed("container info out of range"))?;
    let value = IonParser::new(bytes).parse()?;

    let int = |id| value.get(id).and_then(IonValue::as_int).map(|v| v as usize);
    let pair = |offset, length| int(offset).zip(int(length));
    Ok(ContainerInfo {
        container_id: value
            .get(sym::CONTAINER_ID)
            .and_then(IonValue::as_string)
            .unwrap_or_default()
            .to_string(),
        index: pair(sym::INDEX_TABLE_OFFSET, sym::INDEX_TABLE_LENGTH),
        doc_symbols: pair(sym::SYMBOL_TABLE_OFFSET, sym::SYMBOL_TABLE_LENGTH),
        format_capabilities: pair(sym::FORMAT_CAPABILITIES_OFFSET, sym::FORMAT_CAPABILITIES_LENGTH),
    })
}

/// Parse the entity table.
pub fn parse_index_table(table: &[u8]) -> Vec<EntityLoc> {
    table
        .chunks_exact(ENTITY_ENTRY_SIZE)
        .filter_map(|entry| {
            Some(EntityLoc {
                id: read_u32_le(entry, 0)?,
                type_id: read_u32_le(entry, 4)?,
                offset: read_u64_le(entry, 8)?,
                length: read_u64_le(entry, 16)?,
            })
        })
        .collect()
}

/// Payload of an entity with its `ENTY` header stripped.
pub fn entity_payload(data: &[u8]) -> &[u8] {
    if data.len() >= 10 && &data[..4] == ENTITY_MAGIC
        && let Some(header_len) = read_u32_le(data, 6)
        && (header_len as usize) <= data.len()
    {
        return &data[header_len as usize..];
    }
    data
}

/// Local symbols declared by a serialized `$ion_symbol_table`.
pub fn parse_doc_symbols(data: &[u8]) -> Result<Vec<String>> {
    let value = IonParser::new(data).parse()?;
    let symbols = value
        .unwrap_annotated()
        .get(sym::SYMBOLS)
        .and_then(IonValue::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.as_string().map(str::to_string))
        .collect();
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (FragmentList, LocalSymbols) {
        let mut symbols = LocalSymbols::new();
        let mut list = FragmentList::new();
        let story = symbols.get_or_intern("l1");
        list.push(Fragment::new(
            sym::STORYLINE,
            "l1",
            StructBuilder::new().symbol(sym::STORY_NAME, story).build(),
        ))
        .unwrap();
        list.push(Fragment::raw(sym::RAW_MEDIA, "resource/rsrc1", vec![0xAB; 5]))
            .unwrap();
        list.push(Fragment::root(
            sym::FORMAT_CAPABILITIES,
            IonValue::List(vec![StructBuilder::new().string(sym::KEY, "kfxgen.textBlock").build()]),
        ))
        .unwrap();
        list.push(Fragment::root(sym::DOCUMENT_DATA, StructBuilder::new().build()))
            .unwrap();
        (list, symbols)
    }

    #[test]
    fn test_container_id_format() {
        let id = container_id("urn:uuid:1234");
        assert!(id.starts_with("CR!"));
        assert_eq!(id.len(), 31);
        assert!(id[3..].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert_eq!(id, container_id("urn:uuid:1234"));
        assert_ne!(id, container_id("urn:uuid:5678"));
    }

    #[test]
    fn test_container_id_random_for_empty_document_id() {
        let a = container_id("");
        let b = container_id("");
        assert_eq!(a.len(), 31);
        assert_ne!(a, b);
    }

    #[test]
    fn test_entity_data_header() {
        let data = create_entity_data(&FragmentData::Raw(vec![1, 2, 3]));
        assert_eq!(&data[..4], b"ENTY");
        assert_eq!(u16::from_le_bytes([data[4], data[5]]), 1);
        let header = IonParser::new(&data[10..]).parse().unwrap();
        assert_eq!(header.get(sym::COMPRESSION_TYPE).and_then(IonValue::as_int), Some(0));
        assert_eq!(header.get(sym::DRM_SCHEME).and_then(IonValue::as_int), Some(0));
        assert_eq!(entity_payload(&data), &[1, 2, 3]);
    }

    #[test]
    fn test_serialize_and_parse_back() {
        let (list, mut symbols) = sample();
        let bytes = serialize_container("CR!TEST", &list, &mut symbols, &Settings::default()).unwrap();

        let header = parse_container_header(&bytes).unwrap();
        assert_eq!(header.version, 2);
        let info = parse_container_info(&bytes, &header).unwrap();
        assert_eq!(info.container_id, "CR!TEST");

        let (offset, length) = info.index.unwrap();
        assert_eq!(offset, HEADER_SIZE);
        let entities = parse_index_table(&bytes[offset..offset + length]);
        // $593 lives in the header.
        assert_eq!(entities.len(), 3);
        assert!(entities.iter().all(|e| e.type_id != sym::FORMAT_CAPABILITIES));
        assert_eq!(entities[0].offset, 0);
        assert_eq!(entities[1].offset, entities[0].length);

        let raw = &entities[1];
        let start = header.header_len + raw.offset as usize;
        let data = &bytes[start..start + raw.length as usize];
        assert_eq!(entity_payload(data), &[0xAB; 5]);

        let root = &entities[2];
        assert_eq!(root.id, sym::DOCUMENT_DATA);

        let (offset, length) = info.doc_symbols.unwrap();
        let locals = parse_doc_symbols(&bytes[offset..offset + length]).unwrap();
        assert_eq!(locals, ["l1", "resource/rsrc1"]);

        let (offset, length) = info.format_capabilities.unwrap();
        let caps = IonParser::new(&bytes[offset..offset + length]).parse().unwrap();
        assert!(matches!(caps, IonValue::Annotated(ref a, _) if a == &[sym::FORMAT_CAPABILITIES]));
    }

    #[test]
    fn test_kfxgen_info_hash() {
        let (list, mut symbols) = sample();
        let bytes = serialize_container("CR!TEST", &list, &mut symbols, &Settings::default()).unwrap();
        let header = parse_container_header(&bytes).unwrap();
        let info_end = header.container_info_offset + header.container_info_length;
        let kfxgen = std::str::from_utf8(&bytes[info_end..header.header_len]).unwrap();
        let digest = sha1_smol::Sha1::from(&bytes[header.header_len..]).digest().to_string();
        assert!(kfxgen.contains(&format!("kfxgen_payload_sha1,value:{digest}")));
        assert!(kfxgen.contains("kfxgen_acr,value:CR!TEST"));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(parse_container_header(b"CONT"), Err(Error::MalformedContent(_))));
        assert!(matches!(
            parse_container_header(&[0u8; 32]),
            Err(Error::MalformedContent(_))
        ));
    }
}
