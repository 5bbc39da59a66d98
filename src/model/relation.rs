use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Target id recorded when a relation url carries no numeric work item id.
pub const UNRESOLVED_WORK_ITEM_ID: i32 = -1;

const WORK_ITEMS_SEGMENT: &str = "workItems/";

/// Semantic relation kinds understood by the client. Anything else the
/// server sends is kept verbatim in [`RelationLink::relation_type_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RelationType {
    #[default]
    Unknown,
    Parent,
    Child,
    Affects,
    AffectedBy,
    Related,
}

impl RelationType {
    pub const KNOWN: [RelationType; 5] = [
        RelationType::Parent,
        RelationType::Child,
        RelationType::Affects,
        RelationType::AffectedBy,
        RelationType::Related,
    ];

    /// Wire name of the relation kind. `Unknown` has none.
    pub fn wire_name(self) -> Option<&'static str> {
        match self {
            RelationType::Parent => Some("System.LinkTypes.Hierarchy-Reverse"),
            RelationType::Child => Some("System.LinkTypes.Hierarchy-Forward"),
            RelationType::Affects => Some("Microsoft.VSTS.Common.Affects-Forward"),
            RelationType::AffectedBy => Some("Microsoft.VSTS.Common.Affects-Reverse"),
            RelationType::Related => Some("System.LinkTypes.Related"),
            RelationType::Unknown => None,
        }
    }

    pub fn from_wire_name(name: &str) -> Self {
        match name {
            "System.LinkTypes.Hierarchy-Reverse" => RelationType::Parent,
            "System.LinkTypes.Hierarchy-Forward" => RelationType::Child,
            "Microsoft.VSTS.Common.Affects-Forward" => RelationType::Affects,
            "Microsoft.VSTS.Common.Affects-Reverse" => RelationType::AffectedBy,
            "System.LinkTypes.Related" => RelationType::Related,
            _ => RelationType::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelationType::Unknown => "unknown",
            RelationType::Parent => "parent",
            RelationType::Child => "child",
            RelationType::Affects => "affects",
            RelationType::AffectedBy => "affected-by",
            RelationType::Related => "related",
        }
    }

    /// Parse a short, human-facing kind name (`parent`, `child`, ...).
    pub fn parse_short(name: &str) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
            .unwrap_or(RelationType::Unknown)
    }
}

/// Extract the work item id that follows `workItems/` in a relation url.
pub fn work_item_id_from_url(url: &str) -> i32 {
    let Some(pos) = url.rfind(WORK_ITEMS_SEGMENT) else {
        return UNRESOLVED_WORK_ITEM_ID;
    };
    let tail = &url[pos + WORK_ITEMS_SEGMENT.len()..];
    let segment = tail.split(['/', '?', '#']).next().unwrap_or_default();
    segment.parse().unwrap_or(UNRESOLVED_WORK_ITEM_ID)
}

/// One relation as the server reported it.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationLink {
    pub relation_type_name: String,
    pub relation_type: RelationType,
    pub url: String,
    pub target_work_item_id: i32,
    pub attributes: Map<String, Value>,
}

impl RelationLink {
    pub fn new(relation_type_name: impl Into<String>, url: impl Into<String>) -> Self {
        let relation_type_name = relation_type_name.into();
        let url = url.into();
        Self {
            relation_type: RelationType::from_wire_name(&relation_type_name),
            target_work_item_id: work_item_id_from_url(&url),
            relation_type_name,
            url,
            attributes: Map::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Target id, or `None` when the url did not resolve to a work item.
    pub fn target_id(&self) -> Option<i32> {
        (self.target_work_item_id != UNRESOLVED_WORK_ITEM_ID).then_some(self.target_work_item_id)
    }
}

/// Relations of a work item in server order. Positions matter: removal on
/// the server addresses relations by index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationLinks {
    links: Vec<RelationLink>,
}

impl RelationLinks {
    pub fn new(links: Vec<RelationLink>) -> Self {
        Self { links }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RelationLink> {
        self.links.iter()
    }

    pub fn as_slice(&self) -> &[RelationLink] {
        &self.links
    }

    pub fn of_type(&self, relation_type: RelationType) -> Vec<&RelationLink> {
        self.links
            .iter()
            .filter(|link| link.relation_type == relation_type)
            .collect()
    }

    pub fn named(&self, relation_type_name: &str) -> Vec<&RelationLink> {
        self.links
            .iter()
            .filter(|link| link.relation_type_name == relation_type_name)
            .collect()
    }

    /// Index of the first relation pointing at `target_id`.
    pub fn position_of_target(&self, target_id: i32) -> Option<usize> {
        self.links
            .iter()
            .position(|link| link.target_work_item_id == target_id)
    }

    pub(crate) fn replace(&mut self, other: RelationLinks) {
        self.links = other.links;
    }
}

impl<'a> IntoIterator for &'a RelationLinks {
    type Item = &'a RelationLink;
    type IntoIter = std::slice::Iter<'a, RelationLink>;

    fn into_iter(self) -> Self::IntoIter {
        self.links.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for kind in RelationType::KNOWN {
            let wire = kind.wire_name().unwrap();
            assert_eq!(RelationType::from_wire_name(wire), kind);
            assert_eq!(RelationType::from_wire_name(wire).wire_name(), Some(wire));
        }
    }

    #[test]
    fn unknown_wire_name_maps_to_unknown() {
        assert_eq!(
            RelationType::from_wire_name("System.LinkTypes.Dependency-Forward"),
            RelationType::Unknown
        );
        assert_eq!(RelationType::from_wire_name(""), RelationType::Unknown);
        assert_eq!(RelationType::Unknown.wire_name(), None);
    }

    #[test]
    fn target_id_parsed_from_url() {
        assert_eq!(
            work_item_id_from_url("https://tfs-tfs/tfs/DefaultCollection/_apis/wit/workItems/42"),
            42
        );
        assert_eq!(
            work_item_id_from_url("https://tfs-tfs/tfs/_apis/wit/workItems/7?api-version=6.0"),
            7
        );
    }

    #[test]
    fn target_id_unresolved_without_segment() {
        assert_eq!(
            work_item_id_from_url("https://tfs-tfs/tfs/_apis/git/repositories/42"),
            UNRESOLVED_WORK_ITEM_ID
        );
        assert_eq!(
            work_item_id_from_url("https://tfs-tfs/tfs/_apis/wit/workItems/abc"),
            UNRESOLVED_WORK_ITEM_ID
        );
        assert_eq!(
            work_item_id_from_url("https://tfs-tfs/tfs/_apis/wit/workItems/"),
            UNRESOLVED_WORK_ITEM_ID
        );
    }

    #[test]
    fn link_resolves_kind_and_target() {
        let link = RelationLink::new(
            "System.LinkTypes.Hierarchy-Reverse",
            "https://tfs-tfs/tfs/_apis/wit/workItems/10",
        );
        assert_eq!(link.relation_type, RelationType::Parent);
        assert_eq!(link.target_id(), Some(10));

        let hyperlink = RelationLink::new("Hyperlink", "https://example.com/docs");
        assert_eq!(hyperlink.relation_type, RelationType::Unknown);
        assert_eq!(hyperlink.target_id(), None);
    }

    #[test]
    fn filters_and_positions_follow_server_order() {
        let links = RelationLinks::new(vec![
            RelationLink::new("System.LinkTypes.Related", "https://h/_apis/wit/workItems/1"),
            RelationLink::new("System.LinkTypes.Hierarchy-Forward", "https://h/_apis/wit/workItems/2"),
            RelationLink::new("System.LinkTypes.Hierarchy-Forward", "https://h/_apis/wit/workItems/3"),
            RelationLink::new("System.LinkTypes.Related", "https://h/_apis/wit/workItems/2"),
        ]);

        let children: Vec<i32> = links
            .of_type(RelationType::Child)
            .iter()
            .map(|l| l.target_work_item_id)
            .collect();
        assert_eq!(children, vec![2, 3]);
        assert_eq!(links.named("System.LinkTypes.Related").len(), 2);
        assert_eq!(links.position_of_target(2), Some(1));
        assert_eq!(links.position_of_target(99), None);
    }

    #[test]
    fn short_names_parse_case_insensitively() {
        assert_eq!(RelationType::parse_short("Parent"), RelationType::Parent);
        assert_eq!(RelationType::parse_short("affected-by"), RelationType::AffectedBy);
        assert_eq!(RelationType::parse_short("blocks"), RelationType::Unknown);
    }
}
