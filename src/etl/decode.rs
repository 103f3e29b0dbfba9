use std::fs;
use std::io::{BufReader, Read};
use std::path::Path;

use log::info;
use xz::bufread::XzDecoder;

use crate::classify::classify;
use crate::codec::ByteReader;
use crate::data::feature::Type;
use crate::data::raw::{Member, MemberKind, RawNode, RawRelation, RawWay, Tag};
use crate::data::RawMapData;
use crate::errors::Result;
use crate::etl::Stage;
use crate::UserConfig;

pub const STAGE_NAME: &str = "decode";
pub const OUTPUT_FILE_NAME: &str = "raw_elements.rkyv";

/// Wire coordinates are fixed-point 1e-7 degrees.
const COORD_SCALE: f64 = 1e-7;

const KIND_SPARSE_POINTS: u8 = 1;
const KIND_DENSE_POINTS: u8 = 2;
const KIND_WAYS: u8 = 3;
const KIND_RELATIONS: u8 = 4;

/// Per-block string dictionary. Indices on the wire are 1-based; index 0 is
/// the reserved empty string doubling as the dense tag sentinel.
struct StringTable {
    entries: Vec<String>,
}

impl StringTable {
    fn read(reader: &mut ByteReader) -> Result<StringTable> {
        let count = usize::try_from(reader.read_varint()?)?;
        let mut entries = Vec::with_capacity(count + 1);
        entries.push(String::new());
        for _ in 0..count {
            entries.push(reader.read_string()?);
        }
        Ok(StringTable { entries })
    }

    fn get(&self, index: u64) -> Result<&str> {
        self.entries
            .get(usize::try_from(index)?)
            .map(String::as_str)
            .ok_or_else(|| format!("String index {} out of dictionary range", index).into())
    }

    fn tag(&self, key_index: u64, value_index: u64) -> Result<Tag> {
        Ok(Tag {
            key: self.get(key_index)?.to_string(),
            value: self.get(value_index)?.to_string(),
        })
    }
}

/// Accumulates `count` zig-zag deltas into absolute values, first delta
/// relative to zero.
fn read_delta_list(reader: &mut ByteReader, count: usize) -> Result<Vec<i64>> {
    let mut values = Vec::with_capacity(count);
    let mut acc = 0;
    for _ in 0..count {
        acc += reader.read_signed()?;
        values.push(acc);
    }
    Ok(values)
}

fn read_tags(reader: &mut ByteReader, strings: &StringTable) -> Result<Vec<Tag>> {
    let count = usize::try_from(reader.read_varint()?)?;
    let mut key_indices = Vec::with_capacity(count);
    for _ in 0..count {
        key_indices.push(reader.read_varint()?);
    }
    let mut tags = Vec::with_capacity(count);
    for key_index in key_indices {
        let value_index = reader.read_varint()?;
        tags.push(strings.tag(key_index, value_index)?);
    }
    Ok(tags)
}

fn decode_sparse_points(
    reader: &mut ByteReader,
    strings: &StringTable,
    out: &mut RawMapData,
) -> Result<()> {
    let count = usize::try_from(reader.read_varint()?)?;
    for _ in 0..count {
        let id = reader.read_varint()? as i64;
        let lat = reader.read_signed()? as f64 * COORD_SCALE;
        let lon = reader.read_signed()? as f64 * COORD_SCALE;
        let tag_count = usize::try_from(reader.read_varint()?)?;
        let mut tags = Vec::with_capacity(tag_count);
        for _ in 0..tag_count {
            let key_index = reader.read_varint()?;
            let value_index = reader.read_varint()?;
            tags.push(strings.tag(key_index, value_index)?);
        }
        out.nodes.insert(id, RawNode { id, lat, lon, tags });
    }
    Ok(())
}

fn decode_dense_points(
    reader: &mut ByteReader,
    strings: &StringTable,
    out: &mut RawMapData,
) -> Result<()> {
    let count = usize::try_from(reader.read_varint()?)?;
    let ids = read_delta_list(reader, count)?;
    let lats = read_delta_list(reader, count)?;
    let lons = read_delta_list(reader, count)?;

    let kv_len = usize::try_from(reader.read_varint()?)?;
    let mut key_vals = Vec::with_capacity(kv_len);
    for _ in 0..kv_len {
        key_vals.push(reader.read_varint()?);
    }

    let mut kv_index = 0;
    for record in 0..count {
        let mut tags = Vec::new();
        // An empty stream means no record in the batch carries tags;
        // otherwise each record owns one sentinel-terminated run of pairs.
        if !key_vals.is_empty() {
            loop {
                let key_index = *key_vals
                    .get(kv_index)
                    .ok_or("Dense tag stream shorter than the point batch")?;
                kv_index += 1;
                if key_index == 0 {
                    break;
                }
                let value_index = *key_vals
                    .get(kv_index)
                    .ok_or("Dense tag stream ends inside a pair")?;
                kv_index += 1;
                tags.push(strings.tag(key_index, value_index)?);
            }
        }
        out.nodes.insert(
            ids[record],
            RawNode {
                id: ids[record],
                lat: lats[record] as f64 * COORD_SCALE,
                lon: lons[record] as f64 * COORD_SCALE,
                tags,
            },
        );
    }
    Ok(())
}

fn decode_ways(reader: &mut ByteReader, strings: &StringTable, out: &mut RawMapData) -> Result<()> {
    let count = usize::try_from(reader.read_varint()?)?;
    for _ in 0..count {
        let id = reader.read_varint()? as i64;
        let tags = read_tags(reader, strings)?;
        let ref_count = usize::try_from(reader.read_varint()?)?;
        let point_refs = read_delta_list(reader, ref_count)?;
        let kind = classify(&tags);
        // Other is unreachable from the feature map, drop it right here.
        if kind != Type::Other {
            out.ways.insert(
                id,
                RawWay {
                    id,
                    tags,
                    point_refs,
                    kind,
                },
            );
        }
    }
    Ok(())
}

fn decode_relations(
    reader: &mut ByteReader,
    strings: &StringTable,
    out: &mut RawMapData,
) -> Result<()> {
    let count = usize::try_from(reader.read_varint()?)?;
    for _ in 0..count {
        let id = reader.read_varint()? as i64;
        let tags = read_tags(reader, strings)?;
        let member_count = usize::try_from(reader.read_varint()?)?;
        let member_ids = read_delta_list(reader, member_count)?;
        let mut member_kinds = Vec::with_capacity(member_count);
        for _ in 0..member_count {
            member_kinds.push(MemberKind::from_wire(reader.read_byte()?)?);
        }
        let mut members = Vec::with_capacity(member_count);
        for (ref_id, kind) in member_ids.into_iter().zip(member_kinds) {
            let role = strings.get(reader.read_varint()?)?.to_string();
            members.push(Member { kind, ref_id, role });
        }
        let kind = classify(&tags);
        if kind != Type::Other {
            out.relations.insert(
                id,
                RawRelation {
                    id,
                    tags,
                    members,
                    kind,
                },
            );
        }
    }
    Ok(())
}

/// Decodes one framed, decompressed block into the raw tables. Any
/// malformed content aborts the whole load.
pub fn decode_block(block: &[u8], out: &mut RawMapData) -> Result<()> {
    let mut reader = ByteReader::new(block);
    let strings = StringTable::read(&mut reader)?;
    let group_count = reader.read_varint()?;
    for _ in 0..group_count {
        match reader.read_byte()? {
            KIND_SPARSE_POINTS => decode_sparse_points(&mut reader, &strings, out)?,
            KIND_DENSE_POINTS => decode_dense_points(&mut reader, &strings, out)?,
            KIND_WAYS => decode_ways(&mut reader, &strings, out)?,
            KIND_RELATIONS => decode_relations(&mut reader, &strings, out)?,
            other => return Err(format!("Unknown record group kind {}", other).into()),
        }
    }
    Ok(())
}

pub struct DecodeStage<'a> {
    config: &'a UserConfig,
}

impl DecodeStage<'_> {
    pub fn new(config: &UserConfig) -> DecodeStage {
        DecodeStage { config }
    }
}

impl Stage for DecodeStage<'_> {
    type Input = Vec<Vec<u8>>;
    type Output = RawMapData;

    fn name(&self) -> &str {
        STAGE_NAME
    }

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        Ok(dir.join(OUTPUT_FILE_NAME).exists())
    }

    fn extract(&mut self, _dir: &Path) -> Result<Self::Input> {
        let file = fs::File::open(&self.config.data_path)?;
        let xz_reader = XzDecoder::new(BufReader::new(file));
        let mut bytes = Vec::new();
        BufReader::new(xz_reader).read_to_end(&mut bytes)?;

        let mut framing = ByteReader::new(&bytes);
        let mut blocks = Vec::new();
        while !framing.is_empty() {
            let block_len = usize::try_from(framing.read_varint()?)?;
            blocks.push(framing.read_bytes(block_len)?.to_vec());
        }
        info!(blocks = blocks.len() as u64; "Read container");
        Ok(blocks)
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let mut raw = RawMapData::default();
        for block in &input {
            decode_block(block, &mut raw)?;
        }
        info!(
            nodes = raw.nodes.len() as u64,
            ways = raw.ways.len() as u64,
            relations = raw.relations.len() as u64;
            "Decoding completed"
        );
        Ok(raw)
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        let bytes = rkyv::to_bytes::<_, 256>(&output)
            .map_err(|_| "Could not serialize raw element cache")?;
        fs::write(dir.join(OUTPUT_FILE_NAME), &bytes)?;
        Ok(())
    }
}
