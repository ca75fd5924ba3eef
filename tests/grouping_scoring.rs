// tests/grouping_scoring.rs
use chrono::NaiveDate;

use world_events::credibility::{
    CredibilityPolicy, CredibilityScorer, ScoringInput, SourceRef, Stage,
};
use world_events::grouping::EventGrouper;
use world_events::ingest::types::Article;
use world_events::reputation::ReputationTable;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn art(source: &str, title: &str) -> Article {
    Article {
        title: title.into(),
        body_text: format!("{title} body"),
        published_date: day(2024, 5, 1),
        source_name: source.into(),
        source_url: format!("https://{}.test/story", source.to_lowercase()),
        image_url: None,
        origin_year: None,
    }
}

#[test]
fn rewordings_group_and_unrelated_titles_do_not() {
    let groups = EventGrouper::default().group(vec![
        art("Wire", "NASA Launches New Mars Rover"),
        art("Daily", "NASA's New Rover Launches to Mars"),
        art("Post", "Senate Passes New Budget Bill"),
    ]);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].len(), 2);
    assert_eq!(groups[0].lead().source_name, "Wire");
    assert_eq!(groups[1].lead().title, "Senate Passes New Budget Bill");
}

#[test]
fn overlap_at_threshold_is_not_enough() {
    // 2 of 4 shared tokens: exactly 0.5.
    let groups = EventGrouper::default().group(vec![
        art("Wire", "alpha bravo charlie delta"),
        art("Daily", "alpha bravo echo foxtrot"),
    ]);
    assert_eq!(groups.len(), 2);

    let loose = EventGrouper::with_threshold(0.4).group(vec![
        art("Wire", "alpha bravo charlie delta"),
        art("Daily", "alpha bravo echo foxtrot"),
    ]);
    assert_eq!(loose.len(), 1);
}

#[test]
fn grouping_is_deterministic_and_keeps_every_article() {
    let input = vec![
        art("Wire", "Earthquake shakes coastal city"),
        art("Daily", "Strong earthquake shakes coastal city overnight"),
        art("Post", "Parliament approves climate bill"),
        art("Wire", "Climate bill approved by parliament"),
        art("Gazette", "Local team wins cup"),
        art("Blog", "?!"),
    ];
    let a = EventGrouper::default().group(input.clone());
    let b = EventGrouper::default().group(input.clone());
    assert_eq!(a, b);

    let total: usize = a.iter().map(|g| g.len()).sum();
    assert_eq!(total, input.len());
    assert!(a.iter().all(|g| !g.is_empty()));
    // A title without significant tokens stands alone.
    assert!(a.iter().any(|g| g.lead().title == "?!" && g.len() == 1));
}

#[test]
fn group_summaries_follow_the_lead() {
    let mut first = art("WireServiceA", "Flooding swamps Danube river towns");
    first.image_url = Some("https://wire-a.test/a.jpg".into());
    first.published_date = day(2024, 5, 2);
    let second = art("WireServiceB", "Danube flooding swamps river villages");

    let groups = EventGrouper::default().group(vec![first, second]);
    assert_eq!(groups.len(), 1);
    let g = &groups[0];
    assert_eq!(g.source_names(), vec!["WireServiceA", "WireServiceB"]);
    assert_eq!(g.earliest_published(), day(2024, 5, 1));
    assert_eq!(g.image_url().as_deref(), Some("https://wire-a.test/a.jpg"));
    assert!((g.agreement_ratio() - 0.8).abs() < 1e-9);
    assert!(!g.is_historical());
}

fn scorer() -> CredibilityScorer {
    CredibilityScorer::new(CredibilityPolicy::default(), ReputationTable::default_seed())
}

fn unknown_sources(n: usize, date: NaiveDate) -> ScoringInput {
    ScoringInput {
        sources: (0..n)
            .map(|i| SourceRef {
                name: format!("Outlet{i}"),
                host: Some(format!("outlet{i}.test")),
            })
            .collect(),
        event_date: date,
        agreement_ratio: 0.6,
        historical: false,
    }
}

#[test]
fn more_independent_sources_never_lower_the_score() {
    let s = scorer();
    let today = day(2024, 5, 2);
    let mut last = 0u8;
    for n in 1..=6 {
        let a = s.assess(&unknown_sources(n, day(2024, 5, 1)), None, Stage::Ingest, today);
        assert!(a.score >= last, "{n} sources scored {} < {last}", a.score);
        assert_eq!(a.source_count, n);
        last = a.score;
    }
}

#[test]
fn same_outlet_twice_is_not_independent() {
    let s = scorer();
    let today = day(2024, 5, 2);
    let twice = ScoringInput {
        sources: vec![
            SourceRef {
                name: "Outlet".into(),
                host: Some("outlet.test".into()),
            },
            SourceRef {
                name: "outlet".into(),
                host: Some("outlet.test".into()),
            },
        ],
        event_date: day(2024, 5, 1),
        agreement_ratio: 1.0,
        historical: false,
    };
    let a = s.assess(&twice, None, Stage::Ingest, today);
    assert_eq!(a.source_count, 1);
    // Single-source rules: 60 + 5 - 10.
    assert_eq!(a.score, 55);
    assert!(!a.accepted);
}

#[test]
fn reputable_single_source_beats_unknown_one() {
    let s = scorer();
    let today = day(2024, 5, 2);
    let mk = |name: &str| ScoringInput {
        sources: vec![SourceRef::named(name)],
        event_date: day(2024, 5, 1),
        agreement_ratio: 0.0,
        historical: false,
    };
    let reuters = s.assess(&mk("Reuters"), None, Stage::Ingest, today);
    let blog = s.assess(&mk("Some Blog"), None, Stage::Ingest, today);
    assert!(reuters.score > blog.score);
    assert_eq!(reuters.score, 70);
    assert!(reuters.accepted);
}

#[test]
fn scores_stay_within_bounds() {
    let generous = CredibilityScorer::new(
        CredibilityPolicy {
            baseline: 100,
            diversity_bonus_two: 50,
            diversity_bonus_three: 50,
            recency_bonus: 50,
            ..Default::default()
        },
        ReputationTable::default_seed(),
    );
    let a = generous.assess(
        &unknown_sources(4, day(2024, 5, 1)),
        None,
        Stage::Ingest,
        day(2024, 5, 1),
    );
    assert_eq!(a.score, 100);
    assert!(a.verified);

    let harsh = CredibilityScorer::new(
        CredibilityPolicy {
            baseline: 0,
            single_source_penalty: 40,
            ..Default::default()
        },
        ReputationTable::default_seed(),
    );
    let a = harsh.assess(
        &unknown_sources(1, day(2020, 1, 1)),
        None,
        Stage::Ingest,
        day(2024, 5, 1),
    );
    assert_eq!(a.score, 0);
    assert!(a.flagged);
}

#[test]
fn old_news_is_discounted_unless_historical() {
    let s = scorer();
    let today = day(2024, 5, 1);
    let mut input = unknown_sources(2, day(2020, 5, 1));
    input.agreement_ratio = 0.0;

    // (60 + 10) * 0.9
    let stale = s.assess(&input, None, Stage::Ingest, today);
    assert_eq!(stale.score, 63);

    input.historical = true;
    let historical = s.assess(&input, None, Stage::Ingest, today);
    assert_eq!(historical.score, 70);
}

#[test]
fn cross_verify_uses_its_own_thresholds() {
    let s = scorer();
    let today = day(2024, 5, 2);
    let mut input = unknown_sources(2, day(2024, 5, 1));
    input.agreement_ratio = 0.8;

    // 60 + 10 + 4 + 5
    let ingest = s.assess(&input, None, Stage::Ingest, today);
    assert_eq!(ingest.score, 79);
    assert!(!ingest.verified);

    let cross = s.assess(&input, Some(79), Stage::CrossVerify, today);
    assert_eq!(cross.score, 79);
    assert!(cross.verified);
    assert!(!cross.flagged);
}
