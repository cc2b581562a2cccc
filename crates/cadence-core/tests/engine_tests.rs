use cadence_core::config::EngineConfig;
use cadence_core::db::connect_path;
use cadence_core::engine::RecurrenceEngine;
use cadence_core::error::{CoreError, OperationError, ValidationError};
use cadence_core::models::*;
use cadence_core::repository::{CompletionRepository, SeriesRepository, SqliteRepository};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rstest::rstest;
use tempfile::TempDir;
use uuid::Uuid;

type Engine = RecurrenceEngine<SqliteRepository>;

/// Helper function to create a test engine over a fresh database
async fn setup_test_engine() -> (Engine, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let pool = connect_path(&db_path)
        .await
        .expect("Failed to establish test database connection");

    let engine = RecurrenceEngine::new(
        SqliteRepository::new(pool),
        EngineConfig::with_database_path(db_path),
    );
    (engine, temp_dir)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(h, min, 0).unwrap()
}

fn dates(occurrences: &[Occurrence]) -> Vec<NaiveDate> {
    occurrences.iter().map(|o| o.occurrence_date).collect()
}

fn query(max_count: usize) -> UpcomingQuery {
    UpcomingQuery {
        max_count,
        months_ahead: 3,
    }
}

/// Helper function to create a test series
async fn create_test_series(
    engine: &Engine,
    entity_type: EntityType,
    anchor_at: NaiveDateTime,
    config: RecurrenceConfig,
) -> Series {
    engine
        .create_series(NewSeries {
            entity_type,
            title: "Standup".to_string(),
            description: Some("Daily sync".to_string()),
            anchor_at,
            config,
        })
        .await
        .expect("Failed to create test series")
}

/// A daily UTC task, the series most tests start from
async fn create_daily_task(engine: &Engine, anchor_at: NaiveDateTime) -> Series {
    create_test_series(engine, EntityType::Task, anchor_at, RecurrenceConfig::daily("UTC")).await
}

mod creation {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn weekly_series_expands_to_its_weekdays() {
        let (engine, _temp_dir) = setup_test_engine().await;
        let config = RecurrenceConfig::weekly(
            "America/New_York",
            [WeekdayCode::Mo, WeekdayCode::We, WeekdayCode::Fr],
        );
        let series =
            create_test_series(&engine, EntityType::Event, at(2024, 1, 1, 9, 30), config).await;
        assert_eq!(series.rule.as_deref(), Some("FREQ=WEEKLY;BYDAY=MO,WE,FR"));

        let upcoming = engine
            .get_upcoming_as_of(series.id, date(2024, 1, 1), query(6))
            .await
            .unwrap();
        assert_eq!(
            dates(&upcoming),
            vec![
                date(2024, 1, 1),
                date(2024, 1, 3),
                date(2024, 1, 5),
                date(2024, 1, 8),
                date(2024, 1, 10),
                date(2024, 1, 12),
            ]
        );
        // 09:30 EST
        assert_eq!(
            upcoming[0].occurrence_start_at,
            Utc.with_ymd_and_hms(2024, 1, 1, 14, 30, 0).unwrap()
        );
    }

    #[test_log::test(tokio::test)]
    async fn biweekly_monday_with_count() {
        let (engine, _temp_dir) = setup_test_engine().await;
        let config = RecurrenceConfig::weekly("UTC", [WeekdayCode::Mo])
            .with_interval(2)
            .with_end(EndCondition::Count(4));
        let series =
            create_test_series(&engine, EntityType::Task, at(2024, 1, 1, 8, 0), config).await;

        let upcoming = engine
            .get_upcoming_as_of(series.id, date(2024, 1, 1), query(10))
            .await
            .unwrap();
        assert_eq!(
            dates(&upcoming),
            vec![date(2024, 1, 1), date(2024, 1, 15), date(2024, 1, 29), date(2024, 2, 12)]
        );
    }

    #[test_log::test(tokio::test)]
    async fn monthly_second_tuesday() {
        let (engine, _temp_dir) = setup_test_engine().await;
        let config = RecurrenceConfig::monthly_by_weekday("UTC", date(2024, 1, 9));
        let series =
            create_test_series(&engine, EntityType::Event, at(2024, 1, 9, 10, 0), config).await;
        assert_eq!(series.rule.as_deref(), Some("FREQ=MONTHLY;BYDAY=2TU"));

        let upcoming = engine
            .get_upcoming_as_of(series.id, date(2024, 4, 1), query(1))
            .await
            .unwrap();
        assert_eq!(dates(&upcoming), vec![date(2024, 4, 9)]);
    }

    #[rstest]
    #[case::zero_interval(
        RecurrenceConfig::daily("UTC").with_interval(0),
        ValidationError::InvalidInterval(0)
    )]
    #[case::zero_count(
        RecurrenceConfig::daily("UTC").with_end(EndCondition::Count(0)),
        ValidationError::InvalidEndCount(0)
    )]
    #[case::end_before_anchor(
        RecurrenceConfig::daily("UTC").with_end(EndCondition::Date(date(2023, 12, 31))),
        ValidationError::EndDateBeforeAnchor { end: date(2023, 12, 31), anchor: date(2024, 1, 1) }
    )]
    #[case::unknown_timezone(
        RecurrenceConfig::daily("Mars/Olympus_Mons"),
        ValidationError::InvalidTimezone("Mars/Olympus_Mons".to_string())
    )]
    #[tokio::test]
    async fn invalid_config_is_rejected_before_saving(
        #[case] config: RecurrenceConfig,
        #[case] expected: ValidationError,
    ) {
        let (engine, temp_dir) = setup_test_engine().await;
        let result = engine
            .create_series(NewSeries {
                entity_type: EntityType::Task,
                title: "Broken".to_string(),
                description: None,
                anchor_at: at(2024, 1, 1, 8, 0),
                config,
            })
            .await;
        match result {
            Err(CoreError::Validation(error)) => assert_eq!(error, expected),
            other => panic!("expected a validation error, got {other:?}"),
        }

        let pool = connect_path(temp_dir.path().join("test.db")).await.unwrap();
        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM series")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, 0);
    }

    #[test_log::test(tokio::test)]
    async fn empty_timezone_uses_configured_default() {
        let (engine, _temp_dir) = setup_test_engine().await;
        let config = RecurrenceConfig::daily("");
        let series =
            create_test_series(&engine, EntityType::Task, at(2024, 1, 1, 8, 0), config).await;
        assert_eq!(series.timezone, "UTC");
    }

    #[test_log::test(tokio::test)]
    async fn unknown_series_is_not_found() {
        let (engine, _temp_dir) = setup_test_engine().await;
        let result = engine.get_history(Uuid::now_v7()).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[test_log::test(tokio::test)]
    async fn replace_recurrence_validates_first() {
        let (engine, _temp_dir) = setup_test_engine().await;
        let series = create_daily_task(&engine, at(2024, 1, 1, 8, 0)).await;

        let invalid = RecurrenceConfig::weekly("UTC", Vec::<WeekdayCode>::new());
        let result = engine.replace_recurrence(series.id, invalid).await;
        assert!(matches!(
            result,
            Err(CoreError::Validation(ValidationError::EmptyWeekdays))
        ));
        let stored = engine.store().get_template(series.id).await.unwrap().unwrap();
        assert_eq!(stored.rule.as_deref(), Some("FREQ=DAILY"));

        let updated = engine
            .replace_recurrence(series.id, RecurrenceConfig::weekly("UTC", [WeekdayCode::Tu]))
            .await
            .unwrap();
        assert_eq!(updated.rule.as_deref(), Some("FREQ=WEEKLY;BYDAY=TU"));
        let upcoming = engine
            .get_upcoming_as_of(series.id, date(2024, 1, 1), query(2))
            .await
            .unwrap();
        assert_eq!(dates(&upcoming), vec![date(2024, 1, 2), date(2024, 1, 9)]);
    }
}

mod skipping {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn skip_is_idempotent_and_hides_the_occurrence() {
        let (engine, _temp_dir) = setup_test_engine().await;
        let series = create_daily_task(&engine, at(2024, 1, 1, 8, 0)).await;
        let skipped = date(2024, 1, 3);

        assert!(engine.skip(series.id, skipped, Confirmation::Confirmed).await.unwrap());
        assert!(!engine.skip(series.id, skipped, Confirmation::Confirmed).await.unwrap());
        assert_eq!(engine.list_skipped(series.id).await.unwrap(), vec![skipped]);

        let upcoming = engine
            .get_upcoming_as_of(series.id, date(2024, 1, 1), query(4))
            .await
            .unwrap();
        assert_eq!(
            dates(&upcoming),
            vec![date(2024, 1, 1), date(2024, 1, 2), date(2024, 1, 4), date(2024, 1, 5)]
        );

        let history = engine.get_history_as_of(series.id, date(2024, 1, 5)).await.unwrap();
        assert!(!dates(&history).contains(&skipped));
        assert_eq!(history.len(), 4);
    }

    #[test_log::test(tokio::test)]
    async fn skip_requires_confirmation() {
        let (engine, _temp_dir) = setup_test_engine().await;
        let series = create_test_series(
            &engine,
            EntityType::Event,
            at(2024, 1, 1, 8, 0),
            RecurrenceConfig::daily("UTC"),
        )
        .await;

        let result = engine.skip(series.id, date(2024, 1, 2), Confirmation::Pending).await;
        assert!(matches!(
            result,
            Err(CoreError::Operation(OperationError::ConfirmationRequired))
        ));
        assert!(engine.list_skipped(series.id).await.unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn skip_outside_the_rule_is_rejected() {
        let (engine, _temp_dir) = setup_test_engine().await;
        let config = RecurrenceConfig::weekly("UTC", [WeekdayCode::Mo]);
        let series =
            create_test_series(&engine, EntityType::Event, at(2024, 1, 1, 8, 0), config).await;

        let result = engine.skip(series.id, date(2024, 1, 2), Confirmation::Confirmed).await;
        assert!(matches!(
            result,
            Err(CoreError::Operation(OperationError::NotAnOccurrence(_)))
        ));
    }

    #[test_log::test(tokio::test)]
    async fn skip_drops_an_existing_completion() {
        let (engine, _temp_dir) = setup_test_engine().await;
        let series = create_daily_task(&engine, at(2024, 1, 1, 8, 0)).await;
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap();

        engine.complete(series.id, start, false, "alice").await.unwrap();
        engine.skip(series.id, date(2024, 1, 2), Confirmation::Confirmed).await.unwrap();

        assert!(engine.store().list_completions(series.id).await.unwrap().is_empty());
    }
}

mod completion {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn toggling_twice_leaves_no_record() {
        let (engine, _temp_dir) = setup_test_engine().await;
        let series = create_daily_task(&engine, at(2024, 1, 1, 8, 0)).await;

        let upcoming = engine
            .get_upcoming_as_of(series.id, date(2024, 1, 1), query(3))
            .await
            .unwrap();
        let target = upcoming[1].clone();

        let record = engine
            .complete(series.id, target.occurrence_start_at, false, "alice")
            .await
            .unwrap()
            .expect("completion stored");
        assert_eq!(record.completed_by, "alice");

        let upcoming = engine
            .get_upcoming_as_of(series.id, date(2024, 1, 1), query(3))
            .await
            .unwrap();
        assert!(!dates(&upcoming).contains(&target.occurrence_date));

        let history = engine.get_history_as_of(series.id, date(2024, 1, 3)).await.unwrap();
        let done = history
            .iter()
            .find(|o| o.occurrence_date == target.occurrence_date)
            .unwrap();
        assert!(done.is_completed);
        assert_eq!(done.completed_by.as_deref(), Some("alice"));

        let cleared = engine
            .complete(series.id, target.occurrence_start_at, true, "alice")
            .await
            .unwrap();
        assert!(cleared.is_none());
        assert!(engine.store().list_completions(series.id).await.unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn completing_twice_keeps_one_row() {
        let (engine, _temp_dir) = setup_test_engine().await;
        let series = create_daily_task(&engine, at(2024, 1, 1, 8, 0)).await;
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();

        engine.complete(series.id, start, false, "alice").await.unwrap();
        engine.complete(series.id, start, false, "bob").await.unwrap();

        let completions = engine.store().list_completions(series.id).await.unwrap();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].completed_by, "bob");
    }

    #[test_log::test(tokio::test)]
    async fn events_cannot_be_completed() {
        let (engine, _temp_dir) = setup_test_engine().await;
        let series = create_test_series(
            &engine,
            EntityType::Event,
            at(2024, 1, 1, 8, 0),
            RecurrenceConfig::daily("UTC"),
        )
        .await;
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();

        let result = engine.complete(series.id, start, false, "alice").await;
        assert!(matches!(result, Err(CoreError::Operation(OperationError::NotATask))));
    }

    #[test_log::test(tokio::test)]
    async fn skipped_occurrence_cannot_be_completed() {
        let (engine, _temp_dir) = setup_test_engine().await;
        let series = create_daily_task(&engine, at(2024, 1, 1, 8, 0)).await;
        engine
            .skip(series.id, date(2024, 1, 3), Confirmation::Confirmed)
            .await
            .unwrap();

        let start = Utc.with_ymd_and_hms(2024, 1, 3, 8, 0, 0).unwrap();
        let result = engine.complete(series.id, start, false, "alice").await;
        assert!(matches!(
            result,
            Err(CoreError::Operation(OperationError::NotAnOccurrence(d))) if d == date(2024, 1, 3)
        ));
        assert!(engine.store().list_completions(series.id).await.unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn completion_key_must_match_an_occurrence_start() {
        let (engine, _temp_dir) = setup_test_engine().await;
        let series = create_daily_task(&engine, at(2024, 1, 1, 8, 0)).await;
        let off_schedule = Utc.with_ymd_and_hms(2024, 1, 2, 9, 15, 0).unwrap();

        let result = engine.complete(series.id, off_schedule, false, "alice").await;
        assert!(matches!(
            result,
            Err(CoreError::Operation(OperationError::NotAnOccurrence(_)))
        ));
    }
}

mod editing {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn edit_one_overrides_a_single_occurrence() {
        let (engine, _temp_dir) = setup_test_engine().await;
        let series = create_test_series(
            &engine,
            EntityType::Event,
            at(2024, 1, 1, 8, 0),
            RecurrenceConfig::daily("Europe/Berlin"),
        )
        .await;
        let patch = FieldPatch {
            title: Some("Standup (remote)".to_string()),
            description: None,
            start_time: NaiveTime::from_hms_opt(10, 0, 0),
        };

        engine.edit_one(series.id, date(2024, 1, 2), patch.clone()).await.unwrap();
        // A second edit replaces the first.
        let replaced = FieldPatch {
            title: Some("Standup (moved)".to_string()),
            ..patch
        };
        engine.edit_one(series.id, date(2024, 1, 2), replaced).await.unwrap();

        let upcoming = engine
            .get_upcoming_as_of(series.id, date(2024, 1, 1), query(3))
            .await
            .unwrap();
        assert_eq!(upcoming.len(), 3);
        assert_eq!(upcoming[0].title, "Standup");
        assert!(upcoming[1].is_override);
        assert_eq!(upcoming[1].title, "Standup (moved)");
        assert_eq!(upcoming[1].description.as_deref(), Some("Daily sync"));
        assert_eq!(
            upcoming[1].effective_start_at,
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap()
        );
        assert!(!upcoming[2].is_override);
    }

    #[test_log::test(tokio::test)]
    async fn this_and_future_splits_the_series() {
        let (engine, _temp_dir) = setup_test_engine().await;
        let config = RecurrenceConfig::daily("UTC").with_end(EndCondition::Count(10));
        let series =
            create_test_series(&engine, EntityType::Task, at(2024, 1, 1, 8, 0), config).await;

        for day in [2, 6] {
            let start = Utc.with_ymd_and_hms(2024, 1, day, 8, 0, 0).unwrap();
            engine.complete(series.id, start, false, "alice").await.unwrap();
        }
        engine.skip(series.id, date(2024, 1, 7), Confirmation::Confirmed).await.unwrap();

        let patch = FieldPatch {
            title: Some("Standup v2".to_string()),
            description: None,
            start_time: NaiveTime::from_hms_opt(9, 0, 0),
        };
        let outcome = engine
            .edit_this_and_future(series.id, date(2024, 1, 5), patch)
            .await
            .unwrap();

        let previous = engine
            .get_history_as_of(outcome.previous.id, date(2024, 1, 31))
            .await
            .unwrap();
        assert_eq!(
            dates(&previous),
            vec![date(2024, 1, 1), date(2024, 1, 2), date(2024, 1, 3), date(2024, 1, 4)]
        );
        assert_eq!(engine.store().list_completions(series.id).await.unwrap().len(), 1);

        let created = outcome.created;
        assert_eq!(created.split_from, Some(series.id));
        assert_eq!(created.title, "Standup v2");
        assert_eq!(created.recurrence().end, EndCondition::Count(6));
        assert_eq!(engine.list_skipped(created.id).await.unwrap(), vec![date(2024, 1, 7)]);
        assert!(engine.list_skipped(series.id).await.unwrap().is_empty());

        let moved = engine.store().list_completions(created.id).await.unwrap();
        assert_eq!(moved.len(), 1);
        assert_eq!(
            moved[0].occurrence_start_at,
            Utc.with_ymd_and_hms(2024, 1, 6, 9, 0, 0).unwrap()
        );

        let history = engine.get_history_as_of(created.id, date(2024, 1, 31)).await.unwrap();
        assert_eq!(
            dates(&history),
            [5, 6, 8, 9, 10].map(|d| date(2024, 1, d)).to_vec()
        );
        assert!(history[1].is_completed);

        let upcoming = engine
            .get_upcoming_as_of(created.id, date(2024, 1, 5), query(10))
            .await
            .unwrap();
        assert_eq!(
            dates(&upcoming),
            vec![date(2024, 1, 5), date(2024, 1, 8), date(2024, 1, 9), date(2024, 1, 10)]
        );
    }

    #[test_log::test(tokio::test)]
    async fn this_and_future_rejects_invalid_targets() {
        let (engine, _temp_dir) = setup_test_engine().await;
        let task = create_daily_task(&engine, at(2024, 1, 10, 8, 0)).await;

        let at_anchor = engine
            .edit_this_and_future(task.id, date(2024, 1, 10), FieldPatch::default())
            .await;
        assert!(matches!(
            at_anchor,
            Err(CoreError::Operation(OperationError::SplitAtOrBeforeAnchor { .. }))
        ));

        let event = create_test_series(
            &engine,
            EntityType::Event,
            at(2024, 1, 1, 8, 0),
            RecurrenceConfig::daily("UTC"),
        )
        .await;
        let on_event = engine
            .edit_this_and_future(event.id, date(2024, 1, 5), FieldPatch::default())
            .await;
        assert!(matches!(on_event, Err(CoreError::Operation(OperationError::NotATask))));

        // Neither rejected call changed the stored rules.
        let stored = engine.store().get_template(task.id).await.unwrap().unwrap();
        assert_eq!(stored.rule.as_deref(), Some("FREQ=DAILY"));
    }
}
