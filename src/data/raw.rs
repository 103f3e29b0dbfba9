use crate::data::feature::Type;
use crate::errors::{Error, Result};

pub type ElementId = i64;

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// First tag with the given key, exact match.
pub fn get_tag<'a>(tags: &'a [Tag], key: &str) -> Option<&'a str> {
    tags.iter()
        .find(|tag| tag.key == key)
        .map(|tag| tag.value.as_str())
}

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Point,
    Polyline,
    Group,
}

impl MemberKind {
    pub fn from_wire(byte: u8) -> Result<MemberKind> {
        match byte {
            0 => Ok(MemberKind::Point),
            1 => Ok(MemberKind::Polyline),
            2 => Ok(MemberKind::Group),
            other => Err(Error::from(format!("Unknown member kind {}", other))),
        }
    }
}

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone)]
pub struct Member {
    pub kind: MemberKind,
    pub ref_id: ElementId,
    pub role: String,
}

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone)]
pub struct RawNode {
    pub id: ElementId,
    pub lat: f64,
    pub lon: f64,
    pub tags: Vec<Tag>,
}

/// An ordered path. `point_refs` may reference nodes missing from the
/// decoded set; resolution drops those silently.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone)]
pub struct RawWay {
    pub id: ElementId,
    pub tags: Vec<Tag>,
    pub point_refs: Vec<ElementId>,
    pub kind: Type,
}

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone)]
pub struct RawRelation {
    pub id: ElementId,
    pub tags: Vec<Tag>,
    pub members: Vec<Member>,
    pub kind: Type,
}
