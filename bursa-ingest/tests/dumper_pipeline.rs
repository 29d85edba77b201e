//! Ingestion pipeline scenarios: watermark diffing, idempotent
//! re-ingestion, bounded parallel loading, and all-or-nothing writes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use bursa_ingest::dumper::{DumpError, Dumper, MAX_WORKERS};
use bursa_ingest::extractor::{ExtractError, ExtractOpts, Extractor, SourceDates};
use bursa_store::schema::ColumnDef;
use bursa_store::{
    ColumnType, Dao, Entity, Frame, SchemaRegistry, StoreContext, StoreError, StoreTarget,
    TableSchema, Value,
};

fn prices_registry() -> Arc<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    registry.register(TableSchema::new(
        "prices",
        vec![
            ColumnDef::indexed("date", ColumnType::Date),
            ColumnDef::indexed("ticker", ColumnType::Text),
            ColumnDef::new("price", ColumnType::Decimal),
        ],
        Some("date"),
    ));
    Arc::new(registry)
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 3, d).unwrap()
}

/// Canned feed: a fixed frame per date.
struct Feed {
    frames: BTreeMap<NaiveDate, Vec<(String, f64)>>,
}

impl Feed {
    fn new(frames: Vec<(NaiveDate, Vec<(&str, f64)>)>) -> Self {
        Self {
            frames: frames
                .into_iter()
                .map(|(d, rows)| {
                    (
                        d,
                        rows.into_iter().map(|(t, p)| (t.to_string(), p)).collect(),
                    )
                })
                .collect(),
        }
    }
}

impl Extractor for Feed {
    fn file_dates(&self, _opts: &ExtractOpts) -> Result<SourceDates, ExtractError> {
        Ok(SourceDates::Dates(self.frames.keys().copied().collect()))
    }

    fn load_single(&self, date: NaiveDate, _opts: &ExtractOpts) -> Result<Frame, ExtractError> {
        let columns = vec!["date".to_string(), "ticker".to_string(), "price".to_string()];
        let rows = self
            .frames
            .get(&date)
            .map(|rows| {
                rows.iter()
                    .map(|(ticker, price)| {
                        vec![
                            Value::Date(date),
                            Value::from(ticker.as_str()),
                            Value::Decimal(*price),
                        ]
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Frame::from_rows(columns, rows))
    }
}

fn dumper(ctx: &Arc<StoreContext>, registry: &Arc<SchemaRegistry>, feed: Feed) -> Dumper {
    let dumper = Dumper::new(
        Arc::clone(ctx),
        Arc::clone(registry),
        Box::new(feed),
        "prices",
    )
    .unwrap();
    dumper.create_table().unwrap();
    dumper
}

fn persisted(ctx: &StoreContext, registry: &Arc<SchemaRegistry>) -> Vec<Vec<Value>> {
    let dao = Dao::new(Arc::clone(registry), "prices").unwrap();
    let schema = registry.schema("prices").unwrap();
    ctx.with_session(&StoreTarget::Default, false, |ss| dao.get_all(ss))
        .unwrap()
        .into_iter()
        .map(|e| {
            let row: BTreeMap<String, Value> = e.to_row(schema).into_iter().collect();
            row.into_values().collect()
        })
        .collect()
}

fn price_entity(registry: &SchemaRegistry, date: NaiveDate, ticker: &str, price: f64) -> Entity {
    let row = HashMap::from([
        ("date".to_string(), Value::Date(date)),
        ("ticker".to_string(), Value::from(ticker)),
        ("price".to_string(), Value::Decimal(price)),
    ]);
    Entity::from_row(registry, "prices", &row).unwrap()
}

#[test]
fn dump_loads_only_dates_past_the_watermark() {
    let registry = prices_registry();
    let ctx = Arc::new(StoreContext::in_memory());
    let feed = Feed::new(vec![
        (day(1), vec![("ES3", 3.1), ("AJBU", 2.2)]),
        (day(2), vec![("ES3", 3.2), ("AJBU", 2.3)]),
    ]);
    let dumper = dumper(&ctx, &registry, feed);

    // Pre-persist 2021-03-01 with a payload the feed would not produce.
    let dao = Dao::new(Arc::clone(&registry), "prices").unwrap();
    let seeded = price_entity(&registry, day(1), "SEEDED", 1.0);
    ctx.with_session(&StoreTarget::Default, true, |ss| {
        dao.add(ss, seeded.clone())
    })
    .unwrap();

    let written = dumper.dump(&ExtractOpts::default()).unwrap();
    assert_eq!(written, 1);

    // 2021-03-01 untouched, 2021-03-02 written.
    let dates = dumper.persisted_dates().unwrap();
    assert_eq!(dates, BTreeSet::from([day(1), day(2)]));
    let rows = ctx
        .with_session(&StoreTarget::Default, false, |ss| dao.get_by_date(ss, day(1)))
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get(dumper_schema(&registry), "ticker"),
        Some(&Value::from("SEEDED"))
    );
}

fn dumper_schema(registry: &SchemaRegistry) -> &TableSchema {
    registry.schema("prices").unwrap()
}

#[test]
fn reingesting_a_date_replaces_instead_of_duplicating() {
    let registry = prices_registry();
    let ctx = Arc::new(StoreContext::in_memory());
    let first = dumper(
        &ctx,
        &registry,
        Feed::new(vec![(day(1), vec![("ES3", 3.1), ("AJBU", 2.2)])]),
    );

    assert!(first.dump_single(day(1), &ExtractOpts::default()).unwrap());
    assert!(first.dump_single(day(1), &ExtractOpts::default()).unwrap());
    assert_eq!(persisted(&ctx, &registry).len(), 2);

    // A revised payload for the same date fully supersedes the old rows.
    let revised = dumper(
        &ctx,
        &registry,
        Feed::new(vec![(day(1), vec![("ES3", 9.9), ("AJBU", 8.8), ("D05", 7.7)])]),
    );
    assert!(revised.dump_single(day(1), &ExtractOpts::default()).unwrap());
    let rows = persisted(&ctx, &registry);
    assert_eq!(rows.len(), 3);
}

#[test]
fn parallel_and_sequential_dumps_reach_the_same_state() {
    let feed_frames = || {
        Feed::new(vec![
            (day(1), vec![("ES3", 3.1), ("AJBU", 2.2)]),
            (day(2), vec![("ES3", 3.2)]),
            (day(3), vec![("D05", 25.0), ("ES3", 3.3)]),
            (day(4), vec![("AJBU", 2.4)]),
            (day(5), vec![("ES3", 3.4), ("D05", 25.5), ("AJBU", 2.5)]),
        ])
    };

    let registry = prices_registry();
    let baseline_ctx = Arc::new(StoreContext::in_memory());
    let baseline = dumper(&baseline_ctx, &registry, feed_frames());
    assert_eq!(baseline.dump(&ExtractOpts::default()).unwrap(), 5);
    let expected = persisted(&baseline_ctx, &registry);

    for n_workers in 1..=MAX_WORKERS {
        let ctx = Arc::new(StoreContext::in_memory());
        let parallel = dumper(&ctx, &registry, feed_frames());
        assert_eq!(
            parallel
                .dump_parallel(n_workers, &ExtractOpts::default())
                .unwrap(),
            5
        );
        assert_eq!(persisted(&ctx, &registry), expected);
    }
}

#[test]
fn worker_counts_outside_the_bound_are_rejected() {
    let registry = prices_registry();
    let ctx = Arc::new(StoreContext::in_memory());
    let dumper = dumper(&ctx, &registry, Feed::new(vec![]));

    for n_workers in [0, MAX_WORKERS + 1] {
        let err = dumper
            .dump_parallel(n_workers, &ExtractOpts::default())
            .unwrap_err();
        assert!(matches!(err, DumpError::WorkerLimit(n) if n == n_workers));
    }
}

#[test]
fn mixed_date_batch_persists_nothing() {
    let registry = prices_registry();
    let ctx = Arc::new(StoreContext::in_memory());
    let dumper = dumper(&ctx, &registry, Feed::new(vec![]));

    let batch = vec![
        price_entity(&registry, day(1), "ES3", 3.1),
        price_entity(&registry, day(2), "ES3", 3.2),
    ];
    let err = dumper.dump_entities(&batch).unwrap_err();
    assert!(matches!(
        err,
        DumpError::Store(StoreError::MultipleDatesInBatch(2))
    ));
    assert!(persisted(&ctx, &registry).is_empty());
}

#[test]
fn dump_all_discards_existing_rows_before_reloading() {
    let registry = prices_registry();
    let ctx = Arc::new(StoreContext::in_memory());
    let feed = Feed::new(vec![
        (day(1), vec![("A", 1.0), ("B", 2.0), ("C", 3.0), ("D", 4.0), ("E", 5.0)]),
        (day(2), vec![("A", 1.1), ("B", 2.1), ("C", 3.1), ("D", 4.1), ("E", 5.1)]),
        (day(3), vec![("A", 1.2), ("B", 2.2), ("C", 3.2), ("D", 4.2), ("E", 5.2)]),
    ]);
    let dumper = dumper(&ctx, &registry, feed);

    // 10 pre-existing rows on a date the feed does not carry.
    let dao = Dao::new(Arc::clone(&registry), "prices").unwrap();
    let old: Vec<Entity> = (0..10)
        .map(|i| price_entity(&registry, day(20), &format!("OLD{i}"), i as f64))
        .collect();
    ctx.with_session(&StoreTarget::Default, true, |ss| dao.add_all(ss, &old))
        .unwrap();
    assert_eq!(persisted(&ctx, &registry).len(), 10);

    assert_eq!(dumper.dump_all().unwrap(), 3);
    let rows = persisted(&ctx, &registry);
    assert_eq!(rows.len(), 15);
    assert_eq!(
        dumper.persisted_dates().unwrap(),
        BTreeSet::from([day(1), day(2), day(3)])
    );
}

/// Feed reporting per-date metadata, recording what each load call
/// observes in its options.
struct MetaFeed {
    meta: BTreeMap<NaiveDate, serde_json::Value>,
    seen: Arc<Mutex<Vec<(NaiveDate, Option<serde_json::Value>)>>>,
}

impl Extractor for MetaFeed {
    fn file_dates(&self, _opts: &ExtractOpts) -> Result<SourceDates, ExtractError> {
        Ok(SourceDates::WithMeta(self.meta.clone()))
    }

    fn load_single(&self, date: NaiveDate, opts: &ExtractOpts) -> Result<Frame, ExtractError> {
        let entry = opts
            .date_meta
            .as_ref()
            .and_then(|meta| meta.get(&date))
            .cloned();
        self.seen.lock().unwrap().push((date, entry));
        Ok(Frame::from_rows(
            vec!["date".to_string(), "ticker".to_string(), "price".to_string()],
            vec![vec![Value::Date(date), Value::from("ES3"), Value::Decimal(1.0)]],
        ))
    }
}

#[test]
fn source_metadata_reaches_every_load_call() {
    let registry = prices_registry();
    let meta = BTreeMap::from([
        (day(1), serde_json::json!("prices_20210301.csv")),
        (day(2), serde_json::json!("prices_20210302.csv")),
    ]);

    for parallel in [false, true] {
        let ctx = Arc::new(StoreContext::in_memory());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let feed = MetaFeed {
            meta: meta.clone(),
            seen: Arc::clone(&seen),
        };
        let dumper = Dumper::new(
            Arc::clone(&ctx),
            Arc::clone(&registry),
            Box::new(feed),
            "prices",
        )
        .unwrap();
        dumper.create_table().unwrap();

        let written = if parallel {
            dumper.dump_parallel(2, &ExtractOpts::default()).unwrap()
        } else {
            dumper.dump(&ExtractOpts::default()).unwrap()
        };
        assert_eq!(written, 2);

        let mut seen = seen.lock().unwrap().clone();
        seen.sort_by_key(|(date, _)| *date);
        assert_eq!(
            seen,
            vec![
                (day(1), Some(serde_json::json!("prices_20210301.csv"))),
                (day(2), Some(serde_json::json!("prices_20210302.csv"))),
            ]
        );
    }
}

#[test]
fn empty_frames_are_skipped_without_error() {
    let registry = prices_registry();
    let ctx = Arc::new(StoreContext::in_memory());
    let dumper = dumper(
        &ctx,
        &registry,
        Feed::new(vec![(day(1), vec![]), (day(2), vec![("ES3", 3.2)])]),
    );

    assert_eq!(dumper.dump(&ExtractOpts::default()).unwrap(), 1);
    assert_eq!(dumper.persisted_dates().unwrap(), BTreeSet::from([day(2)]));
}
