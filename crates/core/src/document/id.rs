/// Restaurant reference parsing.
///
/// `restaurantId` holds either the ID of a restaurant document or, for
/// reviews written against the map search before restaurants were
/// imported, an external place identifier (`ChIJ...`).

/// Shape of an external place identifier. Changing the bounds is a policy
/// change: add a new versioned constant rather than editing an old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceIdPolicy {
    pub prefix: &'static str,
    pub min_len: usize,
    pub max_len: usize,
}

pub const PLACE_ID_POLICY_V1: PlaceIdPolicy = PlaceIdPolicy {
    prefix: "ChIJ",
    min_len: 20,
    max_len: 40,
};

impl PlaceIdPolicy {
    pub fn matches(&self, candidate: &str) -> bool {
        candidate.starts_with(self.prefix)
            && (self.min_len..=self.max_len).contains(&candidate.len())
            && candidate
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestaurantRef<'a> {
    Place(&'a str),
    Document(&'a str),
    Invalid,
}

impl<'a> RestaurantRef<'a> {
    /// Classify a raw `restaurantId` under the current place-ID policy.
    pub fn parse(raw: &'a str) -> Self {
        Self::parse_with(raw, &PLACE_ID_POLICY_V1)
    }

    pub fn parse_with(raw: &'a str, policy: &PlaceIdPolicy) -> Self {
        if policy.matches(raw) {
            RestaurantRef::Place(raw)
        } else if !raw.trim().is_empty() {
            RestaurantRef::Document(raw)
        } else {
            RestaurantRef::Invalid
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, RestaurantRef::Invalid)
    }

    pub fn is_place(&self) -> bool {
        matches!(self, RestaurantRef::Place(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLACE: &str = "ChIJN1t_tDeuEmsRUsoyG83frY4";

    #[test]
    fn parse_place_id() {
        assert_eq!(RestaurantRef::parse(PLACE), RestaurantRef::Place(PLACE));
        assert!(RestaurantRef::parse(PLACE).is_place());
    }

    #[test]
    fn parse_document_id() {
        assert_eq!(RestaurantRef::parse("r1"), RestaurantRef::Document("r1"));
        // Right prefix, too short for a place ID.
        assert_eq!(RestaurantRef::parse("ChIJshort"), RestaurantRef::Document("ChIJshort"));
    }

    #[test]
    fn blank_is_invalid() {
        assert_eq!(RestaurantRef::parse(""), RestaurantRef::Invalid);
        assert_eq!(RestaurantRef::parse("   "), RestaurantRef::Invalid);
        assert!(!RestaurantRef::parse("").is_valid());
    }

    #[test]
    fn policy_bounds_are_inclusive() {
        let p = PLACE_ID_POLICY_V1;
        assert!(p.matches(&format!("ChIJ{}", "a".repeat(16))));
        assert!(!p.matches(&format!("ChIJ{}", "a".repeat(15))));
        assert!(p.matches(&format!("ChIJ{}", "a".repeat(36))));
        assert!(!p.matches(&format!("ChIJ{}", "a".repeat(37))));
        assert!(!p.matches(&format!("ChIJ{} ", "a".repeat(20))));
        assert!(!p.matches(&format!("XhIJ{}", "a".repeat(20))));
    }
}
