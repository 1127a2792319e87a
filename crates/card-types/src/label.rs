//! Item labels recovered from reference image names.
//!
//! Reference images are named `<id>_<label>`, e.g. `sv02-031_Litleo` or
//! `base1-4_Charizard_holo`. The identifier segment becomes the catalog item id;
//! the label segment, split on word separators, becomes the display name.

use serde::{Deserialize, Serialize};

/// Separator between the identifier segment and the label segment.
pub const ID_SEPARATOR: char = '_';

/// Parsed identity of a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemLabel {
    /// Stable identifier segment
    pub item_id: String,
    /// Human-readable name
    pub display_name: String,
}

impl ItemLabel {
    /// Parse a file stem (name without extension).
    ///
    /// Names without a separator use the whole stem for both fields.
    pub fn parse(stem: &str) -> Self {
        let stem = stem.trim();
        match stem.split_once(ID_SEPARATOR) {
            Some((id, label)) if !id.is_empty() => {
                let display_name = display_name_from(label);
                Self {
                    item_id: id.to_string(),
                    display_name: if display_name.is_empty() {
                        id.to_string()
                    } else {
                        display_name
                    },
                }
            }
            _ => Self {
                item_id: stem.to_string(),
                display_name: display_name_from(stem),
            },
        }
    }
}

/// Split a label on `_` and `-` and join the words with single spaces.
pub fn display_name_from(label: &str) -> String {
    label
        .split(['_', '-'])
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_and_label() {
        let label = ItemLabel::parse("sv02-031_Litleo");
        assert_eq!(label.item_id, "sv02-031");
        assert_eq!(label.display_name, "Litleo");
    }

    #[test]
    fn test_multi_word_label() {
        let label = ItemLabel::parse("base1-4_Charizard_holo");
        assert_eq!(label.item_id, "base1-4");
        assert_eq!(label.display_name, "Charizard holo");

        let label = ItemLabel::parse("sv3-122_Mr-Mime");
        assert_eq!(label.display_name, "Mr Mime");
    }

    #[test]
    fn test_no_separator() {
        let label = ItemLabel::parse("pikachu");
        assert_eq!(label.item_id, "pikachu");
        assert_eq!(label.display_name, "pikachu");
    }

    #[test]
    fn test_empty_label_falls_back_to_id() {
        let label = ItemLabel::parse("xy1-1_");
        assert_eq!(label.item_id, "xy1-1");
        assert_eq!(label.display_name, "xy1-1");
    }

    #[test]
    fn test_leading_separator_uses_whole_stem() {
        let label = ItemLabel::parse("_orphan");
        assert_eq!(label.item_id, "_orphan");
        assert_eq!(label.display_name, "orphan");
    }
}
