//! Plan execution against a session.
//!
//! Entity-shaped queries return rows in the store's natural order;
//! projection and aggregation queries return alias-keyed rows, converted
//! to a columnar frame.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::Datelike;

use crate::entity::Entity;
use crate::error::StoreError;
use crate::schema::{SchemaRegistry, TableSchema};
use crate::session::Session;
use crate::value::Value;

use super::compile::{compile, QueryPlan};
use super::descriptor::{
    AggregateOp, GroupOp, Grouping, Predicate, Projection, QueryDescriptor, ResultShape,
};
use super::frame::Frame;

/// Result of a query: ordered entities (with their schema), or a
/// columnar frame.
#[derive(Debug, Clone)]
pub enum QueryOutput {
    Entities {
        schema: TableSchema,
        entities: Vec<Entity>,
    },
    Frame(Frame),
}

impl QueryOutput {
    pub fn into_frame(self) -> Frame {
        match self {
            QueryOutput::Frame(frame) => frame,
            QueryOutput::Entities { schema, entities } => {
                Frame::from_entities(&schema, &entities)
            }
        }
    }

    pub fn into_entities(self) -> Vec<Entity> {
        match self {
            QueryOutput::Entities { entities, .. } => entities,
            QueryOutput::Frame(_) => Vec::new(),
        }
    }
}

/// Compile and execute a descriptor against a session.
pub fn run(
    registry: &SchemaRegistry,
    session: &Session,
    table: &str,
    descriptor: &QueryDescriptor,
) -> Result<QueryOutput, StoreError> {
    let QueryPlan {
        schema,
        projections,
        filters,
        grouping,
        shape,
    } = compile(registry, table, descriptor)?;
    let rows = session.rows(table)?;
    let filtered: Vec<Entity> = rows
        .into_iter()
        .filter(|e| filters.iter().all(|p| matches(p, &schema, e)))
        .collect();

    match projections {
        None => match shape {
            ResultShape::Entities => Ok(QueryOutput::Entities {
                schema,
                entities: filtered,
            }),
            ResultShape::Tabular => {
                Ok(QueryOutput::Frame(Frame::from_entities(&schema, &filtered)))
            }
        },
        Some(projections) => Ok(QueryOutput::Frame(project(
            &schema,
            grouping.as_ref(),
            &projections,
            &filtered,
        ))),
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    a.compare(b) == Some(Ordering::Equal)
}

fn matches(predicate: &Predicate, schema: &TableSchema, entity: &Entity) -> bool {
    let get = |field: &str| entity.get(schema, field).unwrap_or(&Value::Null);
    match predicate {
        Predicate::Eq { field, value } => value_eq(get(field), value),
        Predicate::In { field, values } => {
            let v = get(field);
            values.iter().any(|candidate| value_eq(v, candidate))
        }
        Predicate::Between { field, lo, hi } => {
            let v = get(field);
            if let Some(lo) = lo {
                match v.compare(lo) {
                    Some(Ordering::Greater) | Some(Ordering::Equal) => {}
                    _ => return false,
                }
            }
            if let Some(hi) = hi {
                match v.compare(hi) {
                    Some(Ordering::Less) | Some(Ordering::Equal) => {}
                    _ => return false,
                }
            }
            true
        }
    }
}

fn bucket(op: GroupOp, value: &Value) -> Value {
    match op {
        GroupOp::Day => value
            .as_date()
            .map_or(Value::Null, |d| Value::Int(d.day() as i64)),
        GroupOp::Month => value
            .as_date()
            .map_or(Value::Null, |d| Value::Int(d.month() as i64)),
        GroupOp::Year => value
            .as_date()
            .map_or(Value::Null, |d| Value::Int(d.year() as i64)),
        // Non-temporal members of the validated set group by the raw value.
        _ => value.clone(),
    }
}

fn temporal(op: AggregateOp, value: &Value) -> Value {
    match op {
        AggregateOp::Day => value
            .as_date()
            .map_or(Value::Null, |d| Value::Int(d.day() as i64)),
        AggregateOp::Month => value
            .as_date()
            .map_or(Value::Null, |d| Value::Int(d.month() as i64)),
        AggregateOp::Year => value
            .as_date()
            .map_or(Value::Null, |d| Value::Int(d.year() as i64)),
        _ => value.clone(),
    }
}

fn group_key(grouping: &Grouping, schema: &TableSchema, entity: &Entity) -> Vec<Value> {
    let get = |field: &str| entity.get(schema, field).cloned().unwrap_or(Value::Null);
    match grouping {
        Grouping::Fields(fields) => fields.iter().map(|f| get(f)).collect(),
        Grouping::Bucketed(pairs) => pairs.iter().map(|(f, op)| bucket(*op, &get(f))).collect(),
    }
}

/// Collapse a non-empty group of rows into one value per projection.
fn aggregate(projection: &Projection, schema: &TableSchema, group: &[&Entity]) -> Value {
    let values = || {
        group
            .iter()
            .map(|e| e.get(schema, &projection.field).cloned().unwrap_or(Value::Null))
    };
    match projection.op {
        None | Some(AggregateOp::Distinct) => values().next().unwrap_or(Value::Null),
        Some(op @ (AggregateOp::Day | AggregateOp::Month | AggregateOp::Year)) => {
            temporal(op, &values().next().unwrap_or(Value::Null))
        }
        Some(AggregateOp::Sum) => {
            let mut sum = 0.0;
            let mut all_int = true;
            let mut seen = false;
            for v in values() {
                match v {
                    Value::Int(i) => {
                        sum += i as f64;
                        seen = true;
                    }
                    Value::Decimal(d) => {
                        sum += d;
                        all_int = false;
                        seen = true;
                    }
                    _ => {}
                }
            }
            if !seen {
                Value::Null
            } else if all_int {
                Value::Int(sum as i64)
            } else {
                Value::Decimal(sum)
            }
        }
        Some(AggregateOp::Avg) => {
            let nums: Vec<f64> = values().filter_map(|v| v.as_f64()).collect();
            if nums.is_empty() {
                Value::Null
            } else {
                Value::Decimal(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        Some(op @ (AggregateOp::Min | AggregateOp::Max)) => {
            let want = if op == AggregateOp::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut best: Option<Value> = None;
            for v in values() {
                if v.is_null() {
                    continue;
                }
                best = match best {
                    None => Some(v),
                    Some(b) => {
                        if v.compare(&b) == Some(want) {
                            Some(v)
                        } else {
                            Some(b)
                        }
                    }
                };
            }
            best.unwrap_or(Value::Null)
        }
    }
}

fn project(
    schema: &TableSchema,
    grouping: Option<&Grouping>,
    projections: &[Projection],
    filtered: &[Entity],
) -> Frame {
    let aliases: Vec<String> = projections.iter().map(|p| p.alias.clone()).collect();

    if let Some(grouping) = grouping {
        // Groups in first-seen order.
        let mut order: Vec<Vec<&Entity>> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for entity in filtered {
            let key = group_key(grouping, schema, entity);
            let repr = key.iter().map(Value::key_repr).collect::<Vec<_>>().join("\u{1f}");
            match index.get(&repr) {
                Some(&i) => order[i].push(entity),
                None => {
                    index.insert(repr, order.len());
                    order.push(vec![entity]);
                }
            }
        }
        let rows = order
            .iter()
            .map(|group| {
                projections
                    .iter()
                    .map(|p| aggregate(p, schema, group))
                    .collect()
            })
            .collect();
        return Frame::from_rows(aliases, rows);
    }

    if projections.iter().any(|p| p.op.map_or(false, |op| op.is_aggregate())) {
        // Whole-table aggregate: exactly one output row, SQL-style.
        let group: Vec<&Entity> = filtered.iter().collect();
        let row = projections
            .iter()
            .map(|p| aggregate(p, schema, &group))
            .collect();
        return Frame::from_rows(aliases, vec![row]);
    }

    // Row-wise projection; a distinct operator dedups whole output rows,
    // preserving first-seen order.
    let dedup = projections
        .iter()
        .any(|p| p.op == Some(AggregateOp::Distinct));
    let mut seen: HashMap<String, ()> = HashMap::new();
    let mut rows: Vec<Vec<Value>> = Vec::new();
    for entity in filtered {
        let row: Vec<Value> = projections
            .iter()
            .map(|p| {
                let v = entity
                    .get(schema, &p.field)
                    .cloned()
                    .unwrap_or(Value::Null);
                match p.op {
                    Some(op) => temporal(op, &v),
                    None => v,
                }
            })
            .collect();
        if dedup {
            let repr = row.iter().map(Value::key_repr).collect::<Vec<_>>().join("\u{1f}");
            if seen.insert(repr, ()).is_some() {
                continue;
            }
        }
        rows.push(row);
    }
    Frame::from_rows(aliases, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{StoreContext, StoreTarget};
    use chrono::NaiveDate;
    use std::collections::HashMap as Map;

    fn mar(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 3, day).unwrap()
    }

    fn blotter_entity(
        reg: &SchemaRegistry,
        date: NaiveDate,
        name: &str,
        strategy: &str,
        qty: i64,
        amount: f64,
    ) -> Entity {
        let row = Map::from([
            ("date".to_string(), Value::from(date)),
            ("account".to_string(), Value::from("acc")),
            ("name".to_string(), Value::from(name)),
            ("strategy".to_string(), Value::from(strategy)),
            ("price".to_string(), Value::from(amount / qty.max(1) as f64)),
            ("qty".to_string(), Value::from(qty)),
            ("price_qty".to_string(), Value::from(amount)),
            ("action".to_string(), Value::from("BUY")),
            ("execution_status".to_string(), Value::from("FILLED")),
            ("fees".to_string(), Value::from(1.0)),
            ("amount".to_string(), Value::from(amount)),
            ("portfolio".to_string(), Value::from("main")),
            ("book".to_string(), Value::from("b1")),
        ]);
        Entity::from_row(reg, "blotter", &row).unwrap()
    }

    fn seeded() -> (SchemaRegistry, StoreContext) {
        let reg = SchemaRegistry::builtin();
        let ctx = StoreContext::in_memory();
        let schema = reg.schema("blotter").unwrap().clone();
        let entities = vec![
            blotter_entity(&reg, mar(1), "ES3", "trend", 100, 340.0),
            blotter_entity(&reg, mar(1), "AJBU", "carry", 200, 560.0),
            blotter_entity(&reg, mar(2), "ES3", "trend", 50, 170.0),
            blotter_entity(&reg, mar(5), "D05", "carry", 10, 280.0),
        ];
        ctx.with_session(&StoreTarget::Default, true, |ss| {
            ss.create_table(&schema)?;
            ss.insert(&entities)
        })
        .unwrap();
        (reg, ctx)
    }

    fn run_query(reg: &SchemaRegistry, ctx: &StoreContext, d: &QueryDescriptor) -> QueryOutput {
        let session = ctx.open_session(&StoreTarget::Default).unwrap();
        let out = run(reg, &session, "blotter", d).unwrap();
        session.close();
        out
    }

    #[test]
    fn no_filter_returns_every_row_with_full_header() {
        let (reg, ctx) = seeded();
        let out = run_query(&reg, &ctx, &QueryDescriptor::new());
        let frame = out.into_frame();
        assert_eq!(frame.len(), 4);
        assert_eq!(frame.columns().len(), 13);
    }

    #[test]
    fn eq_filter_selects_matching_rows() {
        let (reg, ctx) = seeded();
        let d = QueryDescriptor::new()
            .fields(["name"])
            .filter(Predicate::eq("strategy", "trend"));
        let frame = run_query(&reg, &ctx, &d).into_frame();
        assert_eq!(frame.len(), 2);
        assert_eq!(
            frame.column("name").unwrap(),
            vec![&Value::from("ES3"), &Value::from("ES3")]
        );
    }

    #[test]
    fn in_filter() {
        let (reg, ctx) = seeded();
        let d = QueryDescriptor::new().filter(Predicate::is_in(
            "name",
            vec![Value::from("AJBU"), Value::from("D05")],
        ));
        let frame = run_query(&reg, &ctx, &d).into_frame();
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn between_lower_bound_only() {
        let (reg, ctx) = seeded();
        let d = QueryDescriptor::new().filter(Predicate::between(
            "date",
            Some(Value::from(mar(2))),
            None,
        ));
        let frame = run_query(&reg, &ctx, &d).into_frame();
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn between_upper_bound_only() {
        let (reg, ctx) = seeded();
        let d = QueryDescriptor::new().filter(Predicate::between(
            "date",
            None,
            Some(Value::from(mar(1))),
        ));
        let frame = run_query(&reg, &ctx, &d).into_frame();
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn between_closed_interval_is_inclusive() {
        let (reg, ctx) = seeded();
        let d = QueryDescriptor::new().filter(Predicate::between(
            "date",
            Some(Value::from(mar(1))),
            Some(Value::from(mar(2))),
        ));
        let frame = run_query(&reg, &ctx, &d).into_frame();
        assert_eq!(frame.len(), 3);
    }

    #[test]
    fn between_with_no_bounds_filters_nothing() {
        let (reg, ctx) = seeded();
        let d = QueryDescriptor::new().filter(Predicate::between("date", None, None));
        let frame = run_query(&reg, &ctx, &d).into_frame();
        assert_eq!(frame.len(), 4);
    }

    #[test]
    fn grouped_sum() {
        let (reg, ctx) = seeded();
        let d = QueryDescriptor::new()
            .project("strategy", None, "strategy")
            .project("total", Some(AggregateOp::Sum), "amount")
            .group_by(["strategy"]);
        let frame = run_query(&reg, &ctx, &d).into_frame();
        assert_eq!(frame.columns(), ["strategy", "total"]);
        assert_eq!(frame.len(), 2);
        // First-seen order: trend before carry.
        assert_eq!(frame.rows()[0][0], Value::from("trend"));
        assert_eq!(frame.rows()[0][1], Value::Decimal(510.0));
        assert_eq!(frame.rows()[1][1], Value::Decimal(840.0));
    }

    #[test]
    fn sum_of_integer_column_stays_integer() {
        let (reg, ctx) = seeded();
        let d = QueryDescriptor::new()
            .project("strategy", None, "strategy")
            .project("qty", Some(AggregateOp::Sum), "qty")
            .group_by(["strategy"]);
        let frame = run_query(&reg, &ctx, &d).into_frame();
        assert_eq!(frame.rows()[0][1], Value::Int(150));
    }

    #[test]
    fn month_bucketed_grouping() {
        let (reg, ctx) = seeded();
        let d = QueryDescriptor::new()
            .project("latest", Some(AggregateOp::Max), "date")
            .group_by_bucketed(vec![("date".to_string(), GroupOp::Month)]);
        let frame = run_query(&reg, &ctx, &d).into_frame();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.rows()[0][0], Value::from(mar(5)));
    }

    #[test]
    fn distinct_dedups_preserving_first_seen_order() {
        let (reg, ctx) = seeded();
        let d = QueryDescriptor::new().project("name", Some(AggregateOp::Distinct), "name");
        let frame = run_query(&reg, &ctx, &d).into_frame();
        assert_eq!(
            frame.column("name").unwrap(),
            vec![&Value::from("ES3"), &Value::from("AJBU"), &Value::from("D05")]
        );
    }

    #[test]
    fn whole_table_aggregate_yields_one_row() {
        let (reg, ctx) = seeded();
        let d = QueryDescriptor::new().project("latest", Some(AggregateOp::Max), "date");
        let frame = run_query(&reg, &ctx, &d).into_frame();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.rows()[0][0], Value::from(mar(5)));
    }

    #[test]
    fn avg_is_always_decimal() {
        let (reg, ctx) = seeded();
        let d = QueryDescriptor::new().project("mean_qty", Some(AggregateOp::Avg), "qty");
        let frame = run_query(&reg, &ctx, &d).into_frame();
        assert_eq!(frame.rows()[0][0], Value::Decimal(90.0));
    }

    #[test]
    fn year_projection_extracts_per_row() {
        let (reg, ctx) = seeded();
        let d = QueryDescriptor::new().project("yr", Some(AggregateOp::Year), "date");
        let frame = run_query(&reg, &ctx, &d).into_frame();
        assert_eq!(frame.len(), 4);
        assert!(frame.rows().iter().all(|r| r[0] == Value::Int(2021)));
    }

    #[test]
    fn entity_shape_preserves_natural_order() {
        let (reg, ctx) = seeded();
        let d = QueryDescriptor::new().as_entities();
        let entities = run_query(&reg, &ctx, &d).into_entities();
        assert_eq!(entities.len(), 4);
        let ids: Vec<i64> = entities.iter().map(|e| e.id.unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn entity_output_flattens_with_schema_columns() {
        let (reg, ctx) = seeded();
        let d = QueryDescriptor::new().as_entities();
        let frame = run_query(&reg, &ctx, &d).into_frame();
        assert_eq!(frame.len(), 4);
        assert_eq!(frame.columns().len(), 13);
        assert_eq!(frame.columns()[0], "date");
        assert_eq!(frame.columns()[12], "book");
    }

    #[test]
    fn empty_result_still_carries_columns() {
        let (reg, ctx) = seeded();
        let d = QueryDescriptor::new().filter(Predicate::eq("name", "MISSING"));
        let frame = run_query(&reg, &ctx, &d).into_frame();
        assert!(frame.is_empty());
        assert_eq!(frame.columns().len(), 13);
    }
}
