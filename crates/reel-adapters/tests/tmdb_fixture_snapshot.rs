// Fixture snapshot checks for the offline TMDB sample.

use std::path::Path;

use reel_adapters::{load_fixture_records, FixtureSource, DEFAULT_MOVIE_IDS};

#[test]
fn tmdb_sample_fixture_covers_catalog_ids() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let path = root.join("fixtures/tmdb/sample/movies.json");
    assert!(path.exists());

    let records = load_fixture_records(&path).expect("fixture parses");
    assert!(!records.is_empty());
    for record in &records {
        let id = record.id().expect("fixture records carry ids");
        assert!(DEFAULT_MOVIE_IDS.contains(&id), "unexpected fixture id {id}");
        assert!(record.contains_key("credits"), "fixture {id} lacks credits");
    }

    let source = FixtureSource::load(&path).expect("fixture source");
    assert_eq!(source.len(), records.len());
}
