use ai_paper_updater::client::PdfFetcher;
use ai_paper_updater::config::{DownloadConfig, ScheduleTimezone};
use ai_paper_updater::discovery::rank_papers;
use ai_paper_updater::download::filename_for;
use ai_paper_updater::scheduler::{next_occurrence, next_run_after};
use ai_paper_updater::{
    Config, DownloadManager, Error, InMemoryPaperStore, PaperRecord, PaperStore, Result,
    RetryPolicy,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Timelike, Utc};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

/// Property-based tests for file naming
mod filename_props {
    use super::*;

    proptest! {
        #[test]
        fn test_filename_is_a_safe_pdf_name(identifier in "\\PC{0,40}") {
            let name = filename_for(&identifier);
            prop_assert!(name.ends_with(".pdf"));
            prop_assert!(!name.starts_with('.'), "hidden name for {:?}: {}", identifier, name);
            prop_assert!(name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
        }

        #[test]
        fn test_filename_is_deterministic(identifier in "[0-9]{4}\\.[0-9]{4,5}(v[0-9])?") {
            prop_assert_eq!(filename_for(&identifier), filename_for(&identifier));
            // modern arXiv ids are already safe
            prop_assert_eq!(filename_for(&identifier), format!("{identifier}.pdf"));
        }
    }
}

/// Property-based tests for ranking
mod ranking_props {
    use super::*;

    fn papers(entries: &[(u8, u64)]) -> Vec<PaperRecord> {
        entries
            .iter()
            .map(|(id, citations)| {
                let identifier = format!("2401.{id:05}");
                let mut paper = PaperRecord::new(&format!("Paper {id}"), &identifier, "https://arxiv.org/pdf/x.pdf");
                paper.citations = *citations;
                paper
            })
            .collect()
    }

    proptest! {
        #[test]
        fn test_ranking_is_sorted_unique_and_bounded(
            entries in prop::collection::vec((0u8..30, 0u64..1000), 0..60),
            top_n in 1usize..25,
        ) {
            let unique: HashSet<u8> = entries.iter().map(|(id, _)| *id).collect();
            let ranked = rank_papers(papers(&entries), top_n);

            prop_assert_eq!(ranked.len(), top_n.min(unique.len()));
            prop_assert!(ranked.windows(2).all(|w| w[0].citations >= w[1].citations));

            let ids: HashSet<&str> = ranked.iter().map(|p| p.identifier.as_str()).collect();
            prop_assert_eq!(ids.len(), ranked.len());
        }
    }
}

/// Property-based tests for the download accounting
mod sync_props {
    use super::*;

    /// Serves a PDF for every URL except the ones listed as missing
    struct SelectiveFetcher {
        missing: HashSet<String>,
    }

    #[async_trait]
    impl PdfFetcher for SelectiveFetcher {
        async fn fetch(&self, url: &str, _max_bytes: u64) -> Result<Vec<u8>> {
            if self.missing.contains(url) {
                return Err(Error::HttpStatus {
                    url: url.to_string(),
                    code: 404,
                });
            }
            Ok(b"%PDF-1.4 generated".to_vec())
        }
    }

    fn url(id: u8) -> String {
        format!("https://arxiv.org/pdf/2401.{id:05}.pdf")
    }

    proptest! {
        #[test]
        fn test_every_record_is_accounted_for(
            ids in prop::collection::vec(0u8..12, 0..30),
            present in prop::collection::hash_set(0u8..12, 0..6),
            missing in prop::collection::hash_set(0u8..12, 0..6),
            broken in prop::collection::hash_set(0u8..12, 0..3),
        ) {
            let records: Vec<PaperRecord> = ids
                .iter()
                .map(|id| PaperRecord::new(&format!("Paper {id}"), &format!("2401.{id:05}"), &url(*id)))
                .collect();

            let report = tokio_test::block_on(async {
                let store = InMemoryPaperStore::new();
                for id in &present {
                    store.insert(&format!("2401.{id:05}.pdf"), b"%PDF-1.4 old").await;
                }
                for id in &broken {
                    store.fail_writes_to(&format!("2401.{id:05}.pdf")).await;
                }

                let fetcher = SelectiveFetcher {
                    missing: missing.iter().map(|id| url(*id)).collect(),
                };
                let config = DownloadConfig {
                    requests_per_sec: 100_000.0,
                    ..DownloadConfig::default()
                };
                let manager = DownloadManager::new(Arc::new(fetcher), &config)
                    .with_retry_policy(RetryPolicy::none());
                let report = manager.sync(&records, &store).await;

                // every paper that could be fetched and stored is now present
                for id in ids.iter().filter(|id| !missing.contains(*id) && !broken.contains(*id)) {
                    assert!(store.exists(&format!("2401.{id:05}.pdf")).await.unwrap());
                }
                report
            });

            prop_assert_eq!(report.total(), records.len());

            let unique: HashSet<u8> = ids.iter().copied().collect();
            let expected_downloads = unique
                .iter()
                .filter(|id| !present.contains(*id) && !missing.contains(*id) && !broken.contains(*id))
                .count();
            prop_assert_eq!(report.downloaded, expected_downloads);

            let expected_failures = unique
                .iter()
                .filter(|id| !present.contains(*id) && (missing.contains(*id) || broken.contains(*id)))
                .count();
            prop_assert_eq!(report.failed.len(), expected_failures);
        }
    }
}

/// Property-based tests for schedule computation
mod schedule_props {
    use super::*;

    fn instant(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    proptest! {
        #[test]
        fn test_next_run_is_within_a_day(
            seconds in 0i64..4_102_444_800,
            hour in 0u32..24,
            minute in 0u32..60,
        ) {
            let now = instant(seconds);
            let at = NaiveTime::from_hms_opt(hour, minute, 0).unwrap();
            let next = next_run_after(now, at, ScheduleTimezone::Utc);

            prop_assert!(next > now);
            prop_assert!(next - now <= Duration::days(1));
            prop_assert_eq!(next.time(), at);
        }

        #[test]
        fn test_next_occurrence_in_fixed_offsets(
            seconds in 0i64..4_102_444_800,
            offset_hours in -12i32..=14,
            hour in 0u32..24,
        ) {
            let tz = FixedOffset::east_opt(offset_hours * 3600).unwrap();
            let now = instant(seconds).with_timezone(&tz);
            let at = NaiveTime::from_hms_opt(hour, 30, 0).unwrap();
            let next = next_occurrence(&now, at);

            prop_assert!(next > now);
            prop_assert!(next - now <= Duration::days(1));
            prop_assert_eq!(next.hour(), hour);
            prop_assert_eq!(next.minute(), 30);
        }

        #[test]
        fn test_run_at_validation(hour in 0u32..48, minute in 0u32..90) {
            let mut config = Config::default();
            config.schedule.run_at = format!("{hour:02}:{minute:02}");
            let valid = hour < 24 && minute < 60;
            prop_assert_eq!(config.validate().is_ok(), valid, "run_at {}", config.schedule.run_at);
        }
    }
}

/// Property-based tests for configuration bounds
mod config_props {
    use super::*;

    proptest! {
        #[test]
        fn test_top_n_within_candidate_pool(pool in 1u32..200, top_n in 0usize..300) {
            let mut config = Config::default();
            config.discovery.candidate_pool = pool;
            config.discovery.top_n = top_n;
            let valid = top_n >= 1 && top_n <= pool as usize;
            prop_assert_eq!(config.validate().is_ok(), valid);
        }
    }
}
