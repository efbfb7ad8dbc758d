use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlite_dbadmin::db::{query, server};
use sqlite_dbadmin::types::{QueryResult, TableChange};
use sqlite_dbadmin::{describe_failure, DriverError, DriverOptions, Session};
use std::path::PathBuf;

/// Width of a cell in table output
const CELL_WIDTH: usize = 40;

#[derive(Parser)]
#[command(name = "sqlite-dbadmin")]
#[command(about = "Inspect and reshape SQLite databases")]
struct Cli {
    /// Directory holding the database files
    #[arg(long, short = 'C', default_value = ".", global = true)]
    directory: PathBuf,

    /// Open databases read-only
    #[arg(long, global = true)]
    read_only: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List database files in the directory
    Databases,
    /// Size of a database file in bytes
    Size { database: String },
    /// List tables and views with row counts
    Tables { database: String },
    /// Print a table's columns, indexes, foreign keys and triggers as JSON
    Describe { database: String, table: String },
    /// Print the CREATE statements of a table, its indexes and triggers
    Dump { database: String, table: String },
    /// Create an empty database file
    Create { database: String },
    /// Create or alter a table from a JSON table change
    Alter {
        database: String,
        /// Table to alter; created when missing
        table: String,
        /// JSON file holding the desired table state
        #[arg(long, short)]
        change: PathBuf,
    },
    /// Drop tables
    Drop {
        database: String,
        names: Vec<String>,
        /// Drop views instead of tables
        #[arg(long)]
        views: bool,
    },
    /// Delete every row of the given tables
    Truncate {
        database: String,
        tables: Vec<String>,
    },
    /// Page through a table
    Rows {
        database: String,
        table: String,
        #[arg(long, default_value = "100")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Run a SQL statement
    Query {
        database: String,
        sql: String,
        #[arg(long)]
        max_rows: Option<usize>,
    },
    /// Show the query plan of a statement
    Explain { database: String, sql: String },
    /// Show engine settings and compile options
    Variables { database: String },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = DriverOptions {
        read_only: cli.read_only,
        ..DriverOptions::new(cli.directory)
    };

    if let Err(e) = run(&options, cli.command) {
        match e.downcast_ref::<DriverError>() {
            Some(error) => eprintln!("{:#}\n\n{}", e, describe_failure(error)),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
    Ok(())
}

fn open(options: &DriverOptions, database: &str) -> Result<Session> {
    Session::open(options, database)
        .with_context(|| format!("Failed to open database: {}", database))
}

fn run(options: &DriverOptions, command: Commands) -> Result<()> {
    match command {
        Commands::Databases => {
            for name in server::databases(options)? {
                println!("{}", name);
            }
        }
        Commands::Size { database } => {
            println!("{}", server::database_size(options, &database)?);
        }
        Commands::Tables { database } => {
            let session = open(options, &database)?;
            for (name, table) in session.table_list()? {
                let rows = table
                    .row_count
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}\t{:?}\t{}", name, table.kind, rows);
            }
        }
        Commands::Describe { database, table } => {
            let session = open(options, &database)?;
            let descriptor = session
                .table_descriptor(&table)?
                .with_context(|| format!("No such table: {}", table))?;
            println!("{}", serde_json::to_string_pretty(&descriptor)?);
        }
        Commands::Dump { database, table } => {
            let session = open(options, &database)?;
            let catalog = session.catalog();
            let sql = catalog
                .create_table_sql(&table)?
                .with_context(|| format!("No such table: {}", table))?;
            println!("{};", sql);
            let triggers = catalog.create_trigger_sql(&table)?;
            if !triggers.is_empty() {
                println!("\n{}", triggers);
            }
        }
        Commands::Create { database } => {
            server::create_database(options, &database)
                .with_context(|| format!("Failed to create database: {}", database))?;
            println!("Created: {}", database);
        }
        Commands::Alter {
            database,
            table,
            change,
        } => {
            let text = std::fs::read_to_string(&change)
                .with_context(|| format!("Failed to read {}", change.display()))?;
            let desired: TableChange = serde_json::from_str(&text)
                .with_context(|| format!("Invalid table change in {}", change.display()))?;
            let session = open(options, &database)?;
            session.save_table(&table, &desired)?;
            println!("Table {} saved", desired.name);
        }
        Commands::Drop {
            database,
            names,
            views,
        } => {
            let session = open(options, &database)?;
            if views {
                session.drop_views(&names)?;
            } else {
                session.drop_tables(&names)?;
            }
        }
        Commands::Truncate { database, tables } => {
            let session = open(options, &database)?;
            session.truncate_tables(&tables)?;
        }
        Commands::Rows {
            database,
            table,
            limit,
            offset,
        } => {
            let session = open(options, &database)?;
            print_result(&query::select_rows(session.engine(), &table, limit, offset)?);
        }
        Commands::Query {
            database,
            sql,
            max_rows,
        } => {
            let session = open(options, &database)?;
            let result = query::execute_query(session.engine(), &sql, max_rows)?;
            if result.columns.is_empty() {
                println!("{} row(s) affected", session.engine().affected_rows());
            } else {
                print_result(&result);
            }
        }
        Commands::Explain { database, sql } => {
            let session = open(options, &database)?;
            print_result(&query::explain(session.engine(), &sql)?);
        }
        Commands::Variables { database } => {
            let session = open(options, &database)?;
            println!("SQLite {}", session.engine().server_info());
            for (key, value) in server::variables(session.engine())? {
                println!("{}\t{}", key, value.unwrap_or_default());
            }
            for (key, value) in server::status_variables(session.engine())? {
                println!("{}\t{}", key, value);
            }
        }
    }
    Ok(())
}

fn print_result(result: &QueryResult) {
    println!("{}", result.columns.join("\t"));
    for row in &result.rows {
        let cells: Vec<String> = row.iter().map(|v| v.display(CELL_WIDTH)).collect();
        println!("{}", cells.join("\t"));
    }
    if result.truncated {
        println!("... (truncated)");
    }
    println!("({} rows, {} ms)", result.rows.len(), result.exec_ms);
}
