use itertools::Itertools;
use rusqlite::{params_from_iter, types::Value};

use super::TagStore;
use crate::{
    error::{Result, TaggerError},
    tags::fix_tag_underscore,
};

/// A parsed tag query such as `1girl, long_hair, rating:general, char:hatsune miku`.
///
/// General terms must all be present on an image. Rating and character terms
/// match the values stored on the image row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub ratings: Vec<String>,
    pub characters: Vec<String>,
    pub general: Vec<String>,
}

fn strip_prefix_ignore_case<'a>(term: &'a str, prefix: &str) -> Option<&'a str> {
    let head = term.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| term[prefix.len()..].trim())
}

impl SearchQuery {
    pub fn parse(query: &str) -> Self {
        let mut parsed = Self::default();
        for term in query.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if let Some(rating) = strip_prefix_ignore_case(term, "rating:") {
                parsed.ratings.push(rating.to_string());
            } else if let Some(character) = strip_prefix_ignore_case(term, "char:") {
                parsed.characters.push(fix_tag_underscore(character));
            } else {
                parsed.general.push(fix_tag_underscore(term));
            }
        }
        parsed.general = parsed.general.into_iter().unique().collect();
        parsed
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty() && self.characters.is_empty() && self.general.is_empty()
    }

    fn to_sql(&self) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if !self.general.is_empty() {
            clauses.push(format!(
                "i.id IN (
                    SELECT it.image_id FROM image_tags it
                    JOIN tags t ON it.tag_id = t.id
                    WHERE t.name IN ({})
                    GROUP BY it.image_id
                    HAVING COUNT(DISTINCT it.tag_id) = ?
                )",
                vec!["?"; self.general.len()].join(",")
            ));
            values.extend(self.general.iter().cloned().map(Value::Text));
            values.push(Value::Integer(self.general.len() as i64));
        }
        for rating in &self.ratings {
            clauses.push("i.rating = ?".to_string());
            values.push(Value::Text(rating.clone()));
        }
        for character in &self.characters {
            clauses.push("i.character_name = ?".to_string());
            values.push(Value::Text(character.clone()));
        }

        let sql = format!(
            "SELECT DISTINCT i.filepath FROM images i WHERE {} ORDER BY i.filepath",
            clauses.join(" AND ")
        );
        (sql, values)
    }
}

impl TagStore {
    /// Relative paths of every image matching `query`.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<String>> {
        if query.is_empty() {
            return Err(TaggerError::Config("search query has no terms".into()));
        }

        let (sql, values) = query.to_sql();
        let mut stmt = self.conn.prepare(&sql)?;
        let paths = stmt
            .query_map(params_from_iter(values.iter()), |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(paths)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::{ImageRecord, TagIds};

    fn seed() -> TagStore {
        let mut store = TagStore::open_in_memory().unwrap();
        let mut tag_ids = TagIds::new();
        let records = [
            ("a/1.png", "general", "hatsune miku", vec!["1girl", "long hair"]),
            ("a/2.png", "sensitive", "hatsune miku", vec!["1girl"]),
            ("b/1.png", "general", "others/oc", vec!["1girl", "long hair", "smile"]),
        ]
        .into_iter()
        .map(|(path, rating, character, general)| ImageRecord {
            path: path.to_string(),
            rating: rating.to_string(),
            character: character.to_string(),
            general: general.into_iter().map(|g| (g.to_string(), 0.5)).collect(),
        })
        .collect::<Vec<_>>();
        store.insert_batch(&records, &mut tag_ids).unwrap();
        store
    }

    #[test]
    fn test_parse_query() {
        let query = SearchQuery::parse(" 1girl, long_hair ,Rating:general, char:hatsune_miku, 1girl,");
        assert_eq!(query.general, vec!["1girl", "long hair"]);
        assert_eq!(query.ratings, vec!["general"]);
        assert_eq!(query.characters, vec!["hatsune miku"]);
    }

    #[test]
    fn test_general_tags_are_conjunctive() {
        let store = seed();
        let hits = store.search(&SearchQuery::parse("1girl, long_hair")).unwrap();
        assert_eq!(hits, vec!["a/1.png", "b/1.png"]);
    }

    #[test]
    fn test_rating_and_character_filters() {
        let store = seed();
        let hits = store
            .search(&SearchQuery::parse("1girl, rating:general, char:hatsune miku"))
            .unwrap();
        assert_eq!(hits, vec!["a/1.png"]);

        let hits = store.search(&SearchQuery::parse("rating:sensitive")).unwrap();
        assert_eq!(hits, vec!["a/2.png"]);
    }

    #[test]
    fn test_empty_query_is_rejected() {
        let store = seed();
        assert!(store.search(&SearchQuery::parse(" , ")).is_err());
    }
}
