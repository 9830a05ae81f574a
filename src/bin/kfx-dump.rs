//! kfx-dump - print the header, entity table and fragments of a KFX container

use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use ion_rs::v1_0::Binary;
use ion_rs::{
    AnyEncoding, Decoder, Element, ElementReader, ElementWriter, IntoAnnotatedElement, MapCatalog, Reader,
    SharedSymbolTable, WriteConfig, Writer, ion_list, ion_struct,
};

use kfxgen::kfx::container::{
    EntityLoc, entity_payload, parse_container_header, parse_container_info, parse_doc_symbols, parse_index_table,
};
use kfxgen::kfx::symbols::{
    LOCAL_MIN_ID, SHARED_MAX_ID, SHARED_TABLE_NAME, SHARED_TABLE_VERSION, SymbolCatalog, YJ_SYMBOL_NAMES, name_of,
};

/// Ion 1.0 binary version marker
const ION_BVM: [u8; 4] = [0xE0, 0x01, 0x00, 0xEA];

type DumpResult<T> = Result<T, Box<dyn Error>>;

/// Dump a KFX container for debugging
#[derive(Parser, Debug)]
#[command(name = "kfx-dump")]
#[command(version, about = "Dumps the header, entity table and fragments of a KFX container")]
struct Args {
    /// KFX container to dump
    file: PathBuf,

    /// Only print entity counts by type
    #[arg(short, long)]
    stat: bool,

    /// Only print fragments of this type (e.g. `storyline` or `$259`), repeatable
    #[arg(short = 't', long = "type")]
    types: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}: {e}", args.file.display());
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> DumpResult<()> {
    let catalog = SymbolCatalog::new();
    let types = args
        .types
        .iter()
        .map(|name| catalog.id_of(name).ok_or_else(|| format!("unknown fragment type {name:?}")))
        .collect::<Result<Vec<u32>, _>>()?;

    let data = fs::read(&args.file)?;
    let header = parse_container_header(&data)?;
    let info = parse_container_info(&data, &header)?;

    let doc_symbols = match info.doc_symbols {
        Some((offset, length)) => parse_doc_symbols(slice(&data, offset, length)?)?,
        None => Vec::new(),
    };
    let symbols = SymbolNames::new(doc_symbols);

    let entities = match info.index {
        Some((offset, length)) => parse_index_table(slice(&data, offset, length)?),
        None => Vec::new(),
    };

    if args.stat {
        print_stats(&entities, &symbols);
        return Ok(());
    }

    println!("Container version: {}", header.version);
    println!("Container id: {}", info.container_id);
    println!("Header length: {}", header.header_len);
    println!(
        "Container info: offset={}, length={}",
        header.container_info_offset, header.container_info_length
    );
    println!("Document symbols: {}", symbols.local.len());
    println!("Entities: {}", entities.len());
    println!();

    println!("=== Container info ===");
    let container_info = slice(&data, header.container_info_offset, header.container_info_length)?;
    print_ion(container_info, &symbols)?;
    if let Some((offset, length)) = info.format_capabilities {
        println!("=== Format capabilities ===");
        print_ion(slice(&data, offset, length)?, &symbols)?;
    }
    println!();

    println!("=== Entity table ===");
    for (i, entity) in entities.iter().enumerate() {
        println!(
            "{i:>5}  {:<24} {:<28} offset={} length={}",
            symbols.name(entity.type_id),
            symbols.name(entity.id),
            entity.offset,
            entity.length
        );
    }
    println!();

    for (i, entity) in entities.iter().enumerate() {
        let type_name = symbols.name(entity.type_id);
        if !types.is_empty() && !types.contains(&entity.type_id) {
            continue;
        }
        println!("=== Entity {i}: {type_name} {} ===", symbols.name(entity.id));
        let start = header.header_len + entity.offset as usize;
        let payload = entity_payload(slice(&data, start, entity.length as usize)?);
        if payload.starts_with(&ION_BVM) {
            print_ion(payload, &symbols)?;
        } else {
            println!("<{} raw bytes>", payload.len());
        }
        println!();
    }
    Ok(())
}

fn slice(data: &[u8], offset: usize, length: usize) -> DumpResult<&[u8]> {
    data.get(offset..offset + length)
        .ok_or_else(|| format!("range {offset}+{length} beyond end of file ({} bytes)", data.len()).into())
}

fn print_stats(entities: &[EntityLoc], symbols: &SymbolNames) {
    let mut counts: BTreeMap<String, (usize, u64)> = BTreeMap::new();
    for entity in entities {
        let entry = counts.entry(symbols.name(entity.type_id)).or_default();
        entry.0 += 1;
        entry.1 += entity.length;
    }
    println!("{:<28} {:>7} {:>10}", "type", "count", "bytes");
    for (name, (count, bytes)) in &counts {
        println!("{name:<28} {count:>7} {bytes:>10}");
    }
    println!("{:<28} {:>7}", "total", entities.len());
}

/// Shared YJ names followed by the container's local symbols.
struct SymbolNames {
    local: Vec<String>,
}

impl SymbolNames {
    fn new(local: Vec<String>) -> Self {
        Self { local }
    }

    fn name(&self, id: u32) -> String {
        if id >= LOCAL_MIN_ID
            && let Some(text) = self.local.get((id - LOCAL_MIN_ID) as usize)
        {
            return text.clone();
        }
        name_of(id).into_owned()
    }

    /// Every imported symbol text in SID order, starting at SID 10.
    fn imported(&self) -> Vec<String> {
        let mut all: Vec<String> = (0..SHARED_MAX_ID as usize)
            .map(|i| match YJ_SYMBOL_NAMES.get(i) {
                Some(name) => (*name).to_string(),
                None => format!("${}", i + 10),
            })
            .collect();
        all.extend(self.local.iter().cloned());
        all
    }
}

/// Ion binary preamble importing the YJ table extended with local symbols,
/// so entity payloads (which carry no symbol table) resolve against it.
fn preamble(max_id: usize) -> DumpResult<Vec<u8>> {
    let import = ion_struct! {
        "name": SHARED_TABLE_NAME,
        "version": SHARED_TABLE_VERSION,
        "max_id": max_id as i64,
    };
    let table: Element = ion_struct! {
        "imports": ion_list![import],
    }
    .with_annotations(["$ion_symbol_table"]);

    let mut writer = Writer::new(WriteConfig::<Binary>::new(), Vec::new())?;
    writer.write_element(&table)?;
    Ok(writer.close()?)
}

fn print_ion(data: &[u8], symbols: &SymbolNames) -> DumpResult<()> {
    let imported = symbols.imported();
    let mut catalog = MapCatalog::new();
    catalog.insert_table(SharedSymbolTable::new(
        SHARED_TABLE_NAME,
        SHARED_TABLE_VERSION as usize,
        imported.iter().map(String::as_str),
    )?);

    let mut stream = preamble(imported.len())?;
    stream.extend_from_slice(data.strip_prefix(&ION_BVM).unwrap_or(data));

    let mut reader = Reader::new(AnyEncoding.with_catalog(catalog), &stream[..])?;
    for element in reader.elements() {
        let element = element?;
        println!("{element}");
    }
    Ok(())
}
