use aen::{
    config::ModelConfig,
    error::TaggerError,
    file::{ModelSource, TagCSVFile},
    tags::LabelTags,
};
use std::fs;
use tempfile::tempdir;
use tokio::runtime::Runtime;

fn run_async<F, T>(future: F) -> T
where
    F: std::future::Future<Output = T>,
{
    Runtime::new().unwrap().block_on(future)
}

const SELECTED_TAGS: &str = "\
tag_id,name,category,count
9999999,general,9,807691
9999998,sensitive,9,3508
470575,1girl,0,4412775
212816,long_hair,0,3180564
1281,^_^,0,49436
402,:d,0,100
1463,ryuuou_no_oshigoto!,3,1000
12345,hatsune_miku,4,97840
";

#[test]
fn test_load_selected_tags() {
    let dir = tempdir().unwrap();
    let csv_path = dir.path().join("selected_tags.csv");
    fs::write(&csv_path, SELECTED_TAGS).unwrap();

    let tags = LabelTags::load(&csv_path).unwrap();
    assert_eq!(tags.len(), 8);
    assert_eq!(tags.rating_indices(), &[0, 1]);
    assert_eq!(tags.general_indices(), &[2, 3, 4, 5]);
    assert_eq!(tags.character_indices(), &[7]);

    assert_eq!(tags.name(3), "long hair");
    assert_eq!(tags.name(4), "^_^");
    assert_eq!(tags.name(7), "hatsune miku");
}

#[test]
fn test_local_model_source() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("selected_tags.csv"), SELECTED_TAGS).unwrap();
    let source = ModelSource::Local(dir.path().to_path_buf());

    let csv_path = run_async(TagCSVFile::new(&source).get()).unwrap();
    assert_eq!(csv_path, dir.path().join("selected_tags.csv"));
    assert!(run_async(LabelTags::from_source(&source)).is_ok());

    // config.json is missing from this directory.
    assert!(run_async(ModelConfig::from_source(&source)).is_err());
}

#[test]
fn test_missing_or_malformed_taxonomy_fails() {
    let dir = tempdir().unwrap();
    assert!(LabelTags::load(dir.path().join("missing.csv")).is_err());

    let bad = dir.path().join("bad.csv");
    fs::write(&bad, "tag_id,label\n1,foo\n").unwrap();
    assert!(matches!(LabelTags::load(&bad), Err(TaggerError::Csv(_))));

    let empty = dir.path().join("empty.csv");
    fs::write(&empty, "tag_id,name,category,count\n").unwrap();
    assert!(matches!(
        LabelTags::load(&empty),
        Err(TaggerError::Taxonomy(_))
    ));
}
