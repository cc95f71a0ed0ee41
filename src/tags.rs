//! The label taxonomy of the tagger model.
//!
//! `selected_tags.csv` lists one row per output of the model, in output order.
//! Only the `name` and `category` columns matter here; every other column is
//! ignored. Names are normalized once at load time so that the store and the
//! search layer never see raw underscores.

use crate::{
    error::{Result, TaggerError},
    file::{ModelSource, TagCSVFile},
};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Emoticon tags whose underscores are part of the face and must survive.
#[rustfmt::skip]
pub const KAOMOJIS: [&str; 19] = [
    "0_0",
    "(o)_(o)",
    "+_+",
    "+_-",
    "._.",
    "<o>_<o>",
    "<|>_<|>",
    "=_=",
    ">_<",
    "3_3",
    "6_9",
    ">_o",
    "@_@",
    "^_^",
    "o_o",
    "u_u",
    "x_x",
    "|_|",
    "||_||",
];

pub fn fix_tag_underscore(tag: &str) -> String {
    if KAOMOJIS.contains(&tag) {
        tag.to_string()
    } else {
        tag.replace('_', " ")
    }
}

/// Each record in the CSV file
#[derive(Debug, Deserialize, Clone)]
struct TagRecord {
    name: String,
    category: TagCategory,
}

/// Tag category
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TagCategory {
    #[serde(rename = "0")]
    General,
    #[serde(rename = "1")]
    Artist,
    #[serde(rename = "3")]
    Copyright,
    #[serde(rename = "4")]
    Character,
    #[serde(rename = "5")]
    Meta,
    #[serde(rename = "9")]
    Rating,
    #[serde(other)]
    Other,
}

/// The labels the model predicts, split into the three groups the pipeline uses.
#[derive(Debug, Clone)]
pub struct LabelTags {
    names: Vec<String>,
    rating: Vec<usize>,
    general: Vec<usize>,
    character: Vec<usize>,
}

impl LabelTags {
    /// Load from the local CSV file
    pub fn load<P: AsRef<Path>>(csv_path: P) -> Result<Self> {
        let mut reader = csv::Reader::from_path(csv_path.as_ref())?;
        let records = reader
            .deserialize::<TagRecord>()
            .map(|record| record.map(|r| (r.name, r.category)))
            .collect::<Result<Vec<_>, _>>()?;

        let tags = Self::from_labels(records)?;
        info!(
            "Loaded {} labels ({} rating, {} general, {} character)",
            tags.len(),
            tags.rating.len(),
            tags.general.len(),
            tags.character.len()
        );
        Ok(tags)
    }

    pub async fn from_source(source: &ModelSource) -> Result<Self> {
        let csv_path = TagCSVFile::new(source).get().await?;
        Self::load(csv_path)
    }

    /// Builds the taxonomy from `(raw name, category)` pairs in model output order.
    pub fn from_labels<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, TagCategory)>,
        S: AsRef<str>,
    {
        let mut tags = Self {
            names: Vec::new(),
            rating: Vec::new(),
            general: Vec::new(),
            character: Vec::new(),
        };

        for (idx, (name, category)) in labels.into_iter().enumerate() {
            tags.names.push(fix_tag_underscore(name.as_ref()));
            match category {
                TagCategory::Rating => tags.rating.push(idx),
                TagCategory::General => tags.general.push(idx),
                TagCategory::Character => tags.character.push(idx),
                _ => {}
            }
        }

        if tags.names.is_empty() {
            return Err(TaggerError::Taxonomy("label table is empty".into()));
        }
        Ok(tags)
    }

    /// Total number of labels, which is the length of every probability vector.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, idx: usize) -> &str {
        &self.names[idx]
    }

    pub fn rating_indices(&self) -> &[usize] {
        &self.rating
    }

    pub fn general_indices(&self) -> &[usize] {
        &self.general
    }

    pub fn character_indices(&self) -> &[usize] {
        &self.character
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fix_tag_underscore() {
        assert_eq!(fix_tag_underscore("long_hair"), "long hair");
        assert_eq!(fix_tag_underscore("^_^"), "^_^");
        assert_eq!(fix_tag_underscore("||_||"), "||_||");
        assert_eq!(fix_tag_underscore("hatsune_miku_(append)"), "hatsune miku (append)");
    }

    #[test]
    fn test_index_sets_are_disjoint() {
        let tags = LabelTags::from_labels([
            ("general", TagCategory::Rating),
            ("sensitive", TagCategory::Rating),
            ("1girl", TagCategory::General),
            ("some_artist", TagCategory::Artist),
            ("hatsune_miku", TagCategory::Character),
            ("solo", TagCategory::General),
        ])
        .unwrap();

        assert_eq!(tags.len(), 6);
        assert_eq!(tags.rating_indices(), &[0, 1]);
        assert_eq!(tags.general_indices(), &[2, 5]);
        assert_eq!(tags.character_indices(), &[4]);
        assert_eq!(tags.name(4), "hatsune miku");
    }

    #[test]
    fn test_empty_taxonomy_is_rejected() {
        let labels: Vec<(&str, TagCategory)> = Vec::new();
        assert!(matches!(
            LabelTags::from_labels(labels),
            Err(TaggerError::Taxonomy(_))
        ));
    }
}
