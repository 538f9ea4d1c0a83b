//! Facility names.

use crate::flowcell::Key;

/// The suffix marking a lab's test environment.
pub const TEST_SUFFIX: &str = "_test";

/// The name of a sequencing facility as used in Aero API paths.
///
/// Lab ids use underscores and may carry a [`TEST_SUFFIX`]; facility names
/// use hyphens and never carry the suffix, so a lab's test environment
/// reports to the same facility as the lab itself.
///
/// # Examples
///
/// ```
/// use qcpush::facility::Facility;
///
/// assert_eq!(Facility::from_lab_id("wgs_east").as_str(), "wgs-east");
/// assert_eq!(Facility::from_lab_id("wgs_east_test").as_str(), "wgs-east");
/// assert_eq!(Facility::from_lab_id("wgs_test_center").as_str(), "wgs-test-center");
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Facility(String);

impl Facility {
    /// Derives the facility name from a lab id.
    pub fn from_lab_id(lab_id: &str) -> Self {
        let lab_id = lab_id.strip_suffix(TEST_SUFFIX).unwrap_or(lab_id);
        Self(lab_id.replace('_', "-"))
    }

    /// Gets the facility name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Facility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&Key> for Facility {
    fn from(key: &Key) -> Self {
        Self::from_lab_id(key.lab_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_derives_facilities_from_lab_ids() {
        assert_eq!(Facility::from_lab_id("wgs_west").to_string(), "wgs-west");
        assert_eq!(
            Facility::from_lab_id("wgs_center_test").to_string(),
            "wgs-center"
        );
        assert_eq!(Facility::from_lab_id("wgs-east").to_string(), "wgs-east");
        assert_eq!(Facility::from_lab_id("_test").to_string(), "");
    }

    #[test]
    fn it_derives_facilities_from_keys_with_hyphenated_flowcells() {
        let key = Key::new("FC-1", "wgs_east_test");
        assert_eq!(Facility::from(&key).as_str(), "wgs-east");
    }
}
