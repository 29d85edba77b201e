//! Bursa CLI — create, seed, and inspect managed tables.
//!
//! Commands:
//! - `create` — drop and recreate every managed table from its schema
//! - `seed` — load `template_<table>.csv` files into the managed tables
//! - `dates` — print the persisted date watermark for one table

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use bursa_ingest::{read_config, read_creds, store_settings, AppConfig};
use bursa_store::{
    ColumnType, Dao, Entity, SchemaRegistry, StoreContext, StoreTarget, TableSchema, Value,
};

#[derive(Parser)]
#[command(name = "bursa", about = "Bursa CLI — managed-table administration")]
struct Cli {
    /// Path to the application config (tables, data dir).
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Path to the store credentials file.
    #[arg(long, default_value = "creds.json")]
    creds: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop and recreate every managed table.
    Create,

    /// Seed every managed table from its CSV template.
    Seed {
        /// Directory holding template_<table>.csv files.
        #[arg(long, default_value = "templates")]
        templates: PathBuf,
    },

    /// Print the persisted date watermark for one table.
    Dates {
        #[arg(long)]
        table: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = read_config(&cli.config)?;
    let conn = read_creds(&cli.creds)?;
    let ctx = Arc::new(StoreContext::new(store_settings(&config, &conn)));
    let registry = Arc::new(SchemaRegistry::builtin());

    match cli.command {
        Commands::Create => create(&ctx, &registry, &config),
        Commands::Seed { templates } => seed(&ctx, &registry, &config, &templates),
        Commands::Dates { table } => dates(&ctx, &registry, &table),
    }
}

fn create(ctx: &StoreContext, registry: &SchemaRegistry, config: &AppConfig) -> Result<()> {
    for table in &config.tables {
        log::info!("creating table '{table}'");
        let schema = registry.schema(table)?.clone();
        ctx.with_session(&StoreTarget::Default, true, |ss| {
            ss.drop_table(&schema.table)?;
            ss.create_table(&schema)
        })?;
    }
    Ok(())
}

fn seed(
    ctx: &StoreContext,
    registry: &Arc<SchemaRegistry>,
    config: &AppConfig,
    templates: &Path,
) -> Result<()> {
    for table in &config.tables {
        let path = templates.join(format!("template_{table}.csv"));
        log::info!("seeding '{table}' from {}", path.display());
        let schema = registry.schema(table)?.clone();
        let entities = read_template(registry, &schema, &path)
            .with_context(|| format!("seeding '{table}' from {}", path.display()))?;

        let dao = Dao::new(Arc::clone(registry), table)?;
        ctx.with_session(&StoreTarget::Default, true, |ss| {
            ss.create_table(&schema)?;
            dao.add_all(ss, &entities)
        })?;
        log::info!("seeded {} rows into '{table}'", entities.len());
    }
    Ok(())
}

fn dates(ctx: &StoreContext, registry: &Arc<SchemaRegistry>, table: &str) -> Result<()> {
    let dao = Dao::new(Arc::clone(registry), table)?;
    let dates = ctx.with_session(&StoreTarget::Default, false, |ss| dao.distinct_dates(ss))?;
    if dates.is_empty() {
        println!("{table}: no persisted dates");
    } else {
        for date in dates {
            println!("{date}");
        }
    }
    Ok(())
}

/// Parse one CSV template against the table schema. Empty cells become
/// `Null`; dates must be `YYYY-MM-DD`.
fn read_template(
    registry: &SchemaRegistry,
    schema: &TableSchema,
    path: &Path,
) -> Result<Vec<Entity>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut header_types = Vec::new();
    for header in reader.headers()?.iter() {
        match schema.column(header) {
            Some(col) => header_types.push((header.to_string(), col.ty)),
            None => bail!("column '{header}' is not part of table '{}'", schema.table),
        }
    }

    let mut entities = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = HashMap::new();
        for ((header, ty), raw) in header_types.iter().zip(record.iter()) {
            row.insert(header.clone(), parse_cell(raw, *ty)?);
        }
        // Columns absent from the template stay Null.
        for col in &schema.columns {
            row.entry(col.name.clone()).or_insert(Value::Null);
        }
        entities.push(Entity::from_row(registry, &schema.table, &row)?);
    }
    Ok(entities)
}

fn parse_cell(raw: &str, ty: ColumnType) -> Result<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    Ok(match ty {
        ColumnType::Integer => Value::Int(raw.parse::<i64>()?),
        ColumnType::Decimal => Value::Decimal(raw.parse::<f64>()?),
        ColumnType::Text => Value::Text(raw.to_string()),
        ColumnType::Date => Value::Date(NaiveDate::parse_from_str(raw, "%Y-%m-%d")?),
        ColumnType::Boolean => match raw {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            other => bail!("'{other}' is not a boolean"),
        },
    })
}
