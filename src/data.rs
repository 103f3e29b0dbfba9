use std::collections::HashMap;

use self::raw::{ElementId, RawNode, RawRelation, RawWay};

pub mod feature;
pub mod raw;

/// Raw tables decoded from the binary input. Ways and relations classified
/// `Other` are discarded at decode time and never reach these tables; nodes
/// are kept unconditionally since any way may reference them.

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone)]
pub struct RawMapData {
    pub nodes: HashMap<ElementId, RawNode>,
    pub ways: HashMap<ElementId, RawWay>,
    pub relations: HashMap<ElementId, RawRelation>,
}
