// tests/cluster_order.rs
// Clustering and scoring must not depend on the order feeds deliver entries in.
mod common;

use common::*;
use kona_newsroom::analyze::{by_priority, cluster_items, validate_all, ValidatedStory};
use kona_newsroom::ingest::normalize_entries;
use kona_newsroom::ingest::types::FeedEntry;
use kona_newsroom::ValidationParams;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

fn corpus() -> Vec<FeedEntry> {
    let mut v = four_stories();
    v.push(entry(
        "charlie",
        "typhoon",
        "Typhoon Khanun hits Busan port",
        "Typhoon Khanun forced closure of Busan port terminals.",
        25,
    ));
    v.push(entry(
        "charlie",
        "budget",
        "Parliament passes housing budget",
        "National Assembly approved housing budget of 15 trillion.",
        70,
    ));
    v.push(entry(
        "alpha",
        "quake",
        "Minor earthquake felt in Gyeongju",
        "A magnitude 3.1 earthquake shook Gyeongju overnight.",
        200,
    ));
    v
}

fn stories_for(entries: Vec<FeedEntry>) -> Vec<ValidatedStory> {
    let params = ValidationParams::default();
    let batch = normalize_entries(entries, &weights());
    let clusters = cluster_items(&batch.items, &params);
    let mut stories = validate_all(&clusters, &params);
    stories.sort_by(by_priority);
    stories
}

#[test]
fn shuffled_input_gives_identical_stories() {
    let baseline = stories_for(corpus());
    assert_eq!(baseline.len(), 5);

    let mut rng = StdRng::seed_from_u64(7);
    for round in 0..20 {
        let mut shuffled = corpus();
        shuffled.shuffle(&mut rng);
        let got = stories_for(shuffled);
        assert_eq!(got.len(), baseline.len(), "round {round}");
        for (a, b) in got.iter().zip(&baseline) {
            assert_eq!(a.cluster_id, b.cluster_id, "round {round}");
            assert_eq!(
                a.corroboration_score.to_bits(),
                b.corroboration_score.to_bits(),
                "round {round}"
            );
            assert_eq!(a.consensus_facts, b.consensus_facts, "round {round}");
            assert_eq!(a.divergent_claims, b.divergent_claims, "round {round}");
            assert_eq!(a.hold_reason, b.hold_reason, "round {round}");
        }
    }
}

#[test]
fn cluster_id_follows_earliest_report() {
    let stories = stories_for(corpus());
    let typhoon = stories
        .iter()
        .find(|s| s.headline.starts_with("Typhoon"))
        .unwrap();
    assert_eq!(typhoon.distinct_source_count, 3);
    assert_eq!(
        typhoon.cluster_id,
        kona_newsroom::analyze::cluster_id_for("https://alpha.example/news/typhoon")
    );
    assert_eq!(typhoon.earliest_published_at, base_time());
}

#[test]
fn disputed_figure_lowers_score_but_keeps_majority() {
    let stories = stories_for(corpus());
    let budget = stories
        .iter()
        .find(|s| s.headline.starts_with("Parliament"))
        .unwrap();
    assert!(budget.corroboration_score < 1.0);
    assert!(budget.is_publishable());
    assert!(budget
        .consensus_facts
        .iter()
        .any(|f| f.statement.contains("12 trillion")));
    assert!(budget
        .divergent_claims
        .iter()
        .any(|f| f.statement.contains("15 trillion")));

    // Unanimous stories outrank it.
    let pos = |prefix: &str| stories.iter().position(|s| s.headline.starts_with(prefix)).unwrap();
    assert!(pos("Typhoon") < pos("Parliament"));
    assert!(pos("Samsung") < pos("Parliament"));
}

#[test]
fn lone_report_is_held() {
    let stories = stories_for(corpus());
    let quake = stories
        .iter()
        .find(|s| s.headline.contains("earthquake"))
        .unwrap();
    assert!(!quake.is_publishable());
    assert_eq!(quake.corroboration_score, 0.0);
    // Held stories sort last.
    assert_eq!(stories.last().unwrap().cluster_id, quake.cluster_id);
}
