use crate::data::feature::Type;
use crate::data::raw::{get_tag, Tag};

/// Assigns the semantic type of a way or relation from its tags. Rules are
/// evaluated in a fixed priority order; the first matching rule wins, so a
/// boundary that is also tagged as a waterway classifies as a river.
pub fn classify(tags: &[Tag]) -> Type {
    if get_tag(tags, "waterway") == Some("river") {
        Type::River
    } else if matches!(get_tag(tags, "natural"), Some("mountain_range") | Some("ridge")) {
        Type::Mountain
    } else if get_tag(tags, "boundary") == Some("administrative") {
        let admin_level = get_tag(tags, "admin_level")
            .and_then(|level| level.parse::<i32>().ok())
            .unwrap_or(0);
        match admin_level {
            2 => Type::Country,
            6 => Type::Region,
            7 => Type::District,
            8 => Type::City,
            _ => Type::OtherAdministrative,
        }
    } else {
        Type::Other
    }
}
