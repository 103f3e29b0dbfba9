use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use log::debug;

use crate::data::raw::{get_tag, ElementId, MemberKind, RawNode, RawWay, Tag};
use crate::data::RawMapData;

/// Semantic category of a polyline or group. `Other` is the "not of
/// interest" sentinel and never appears in a built `FeatureMap`.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    River,
    Mountain,
    Country,
    Region,
    District,
    City,
    OtherAdministrative,
    Other,
}

impl Type {
    pub const FEATURE_TYPES: [Type; 7] = [
        Type::River,
        Type::Mountain,
        Type::Country,
        Type::Region,
        Type::District,
        Type::City,
        Type::OtherAdministrative,
    ];

    /// Stable name, also used as the output file stem.
    pub fn name(self) -> &'static str {
        match self {
            Type::River => "RIVER",
            Type::Mountain => "MOUNTAIN",
            Type::Country => "COUNTRY",
            Type::Region => "REGION",
            Type::District => "DISTRICT",
            Type::City => "CITY",
            Type::OtherAdministrative => "OTHER_ADMINISTRATIVE",
            Type::Other => "OTHER",
        }
    }
}

#[derive(Debug)]
pub struct Point {
    pub lon: f64,
    pub lat: f64,
    pub tags: Vec<Tag>,
}

/// One `Rc<Point>` per source node id within a load; polylines sharing a
/// node share the allocation.
#[derive(Debug, Clone)]
pub struct Polyline {
    pub points: Vec<Rc<Point>>,
    pub tags: Vec<Tag>,
    pub kind: Type,
}

#[derive(Debug)]
pub struct Feature {
    pub name: String,
    pub polylines: Vec<Polyline>,
    pub tags: Vec<Tag>,
    pub kind: Type,
}

pub struct FeatureMap {
    features_by_type: HashMap<Type, Vec<Feature>>,
}

type PointCache = HashMap<ElementId, Rc<Point>>;

/// Resolves a way's point refs against the decoded node set, deduplicating
/// through `cache`. Unresolvable refs are dropped, order is preserved; the
/// second element counts the drops.
fn resolve_way(
    way: &RawWay,
    nodes: &HashMap<ElementId, RawNode>,
    cache: &mut PointCache,
) -> (Polyline, usize) {
    let mut points = Vec::with_capacity(way.point_refs.len());
    let mut skipped = 0;
    for point_ref in &way.point_refs {
        match nodes.get(point_ref) {
            Some(node) => {
                let point = cache.entry(*point_ref).or_insert_with(|| {
                    Rc::new(Point {
                        lon: node.lon,
                        lat: node.lat,
                        tags: node.tags.clone(),
                    })
                });
                points.push(Rc::clone(point));
            }
            None => skipped += 1,
        }
    }
    (
        Polyline {
            points,
            tags: way.tags.clone(),
            kind: way.kind,
        },
        skipped,
    )
}

impl FeatureMap {
    /// Builds the per-type feature lists. For each type, groups come first;
    /// ways already consumed as group members are excluded from the
    /// standalone pass, and standalone ways without a `name` tag are
    /// dropped rather than defaulted.
    pub fn build(raw: &RawMapData) -> FeatureMap {
        let mut cache = PointCache::new();
        let mut features_by_type = HashMap::new();

        for kind in Type::FEATURE_TYPES {
            let mut features = Vec::new();
            let mut consumed: HashSet<ElementId> = HashSet::new();
            let mut skipped_refs = 0;

            for relation in raw.relations.values().filter(|r| r.kind == kind) {
                let mut polylines = Vec::new();
                for member in &relation.members {
                    if member.kind != MemberKind::Polyline {
                        continue;
                    }
                    consumed.insert(member.ref_id);
                    if let Some(way) = raw.ways.get(&member.ref_id) {
                        let (polyline, skipped) = resolve_way(way, &raw.nodes, &mut cache);
                        skipped_refs += skipped;
                        polylines.push(polyline);
                    }
                }
                let name = get_tag(&relation.tags, "name").unwrap_or("Unknown");
                features.push(Feature {
                    name: name.to_string(),
                    polylines,
                    tags: relation.tags.clone(),
                    kind,
                });
            }

            for way in raw.ways.values().filter(|w| w.kind == kind) {
                if consumed.contains(&way.id) {
                    continue;
                }
                if let Some(name) = get_tag(&way.tags, "name") {
                    let (polyline, skipped) = resolve_way(way, &raw.nodes, &mut cache);
                    skipped_refs += skipped;
                    features.push(Feature {
                        name: name.to_string(),
                        polylines: vec![polyline],
                        tags: way.tags.clone(),
                        kind,
                    });
                }
            }

            if skipped_refs > 0 {
                debug!(kind = kind.name(), skipped_refs = skipped_refs as u64; "Dropped unresolvable point refs");
            }
            features_by_type.insert(kind, features);
        }

        FeatureMap { features_by_type }
    }

    pub fn features(&self, kind: Type) -> &[Feature] {
        self.features_by_type
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn polylines(&self, kind: Type) -> Vec<&Polyline> {
        self.features(kind)
            .iter()
            .flat_map(|feature| &feature.polylines)
            .collect()
    }

    /// Country borders, used as the reference layer of every image.
    pub fn borders(&self) -> Vec<&Polyline> {
        self.polylines(Type::Country)
    }
}
