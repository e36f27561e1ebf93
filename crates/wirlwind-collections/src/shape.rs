//! Envelope shape per collection.
//!
//! Single-row collections publish the first row's fields at the top level;
//! multi-row collections wrap their rows under a known list key. `cpu` is
//! its own case: the first row hoists and the remainder becomes
//! `processes`.

/// How parsed rows map onto the published envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// First row's fields at the top level; extra rows discarded.
    Flat,
    /// First row hoists, rows 1.. attach under `processes`.
    CpuHoist,
    /// All rows wrapped under the named list key.
    ListUnder(&'static str),
}

/// Wrapper keys for the known multi-row collections. Anything unknown wraps
/// under `data`.
const COLLECTION_LIST_KEYS: &[(&str, &str)] = &[
    ("interfaces", "interfaces"),
    ("interface_detail", "interfaces"),
    ("bgp_summary", "peers"),
    ("neighbors", "neighbors"),
    ("log", "entries"),
    ("environment", "sensors"),
];

const SINGLE_ROW_COLLECTIONS: &[&str] = &["memory", "device_info"];

impl Shape {
    /// Resolve the shape for a collection name. Total: unknown names get
    /// the generic `data` wrapper.
    pub fn for_collection(name: &str) -> Shape {
        if name == "cpu" {
            return Shape::CpuHoist;
        }
        if SINGLE_ROW_COLLECTIONS.contains(&name) {
            return Shape::Flat;
        }
        COLLECTION_LIST_KEYS
            .iter()
            .find(|(coll, _)| *coll == name)
            .map(|&(_, key)| Shape::ListUnder(key))
            .unwrap_or(Shape::ListUnder("data"))
    }

    /// The list key, for shapes that have one.
    pub fn list_key(&self) -> Option<&'static str> {
        match self {
            Shape::ListUnder(key) => Some(key),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_bindings() {
        assert_eq!(Shape::for_collection("cpu"), Shape::CpuHoist);
        assert_eq!(Shape::for_collection("memory"), Shape::Flat);
        assert_eq!(Shape::for_collection("device_info"), Shape::Flat);
        assert_eq!(
            Shape::for_collection("interface_detail"),
            Shape::ListUnder("interfaces")
        );
        assert_eq!(Shape::for_collection("bgp_summary"), Shape::ListUnder("peers"));
        assert_eq!(Shape::for_collection("log"), Shape::ListUnder("entries"));
        assert_eq!(
            Shape::for_collection("environment"),
            Shape::ListUnder("sensors")
        );
    }

    #[test]
    fn unknown_collections_wrap_under_data() {
        assert_eq!(Shape::for_collection("mystery"), Shape::ListUnder("data"));
    }
}
