pub mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use render::TableRenderer;
use serde::Serialize;
use std::path::PathBuf;
use vera::{
    AppConfig, Attribute, Class, ConfigLocator, DataContext, DbError, Domain, Entity, EntityRef,
    QCriteria, QSelection, VeraApplication,
};

/// vera - manage domains, classes and attributes
#[derive(Parser, Debug)]
#[command(name = "vera")]
#[command(version)]
#[command(about = "Manage domains, classes and attributes", long_about = None)]
pub struct Cli {
    /// Properties file: an absolute path, or a name looked up in the home
    /// directory and then in <app root>/conf
    #[arg(short = 'c', long = "config", env = "VERA_CONFIG")]
    pub config: Option<String>,

    /// Application root holding the conf/ directory
    #[arg(long = "app-root", default_value = ".")]
    pub app_root: PathBuf,

    /// Print results as JSON instead of a table
    #[arg(long = "json")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Business domains
    Domain {
        #[command(subcommand)]
        action: DomainAction,
    },
    /// Classes of a domain
    Class {
        #[command(subcommand)]
        action: ClassAction,
    },
    /// Attributes of a class
    Attribute {
        #[command(subcommand)]
        action: AttributeAction,
    },
    /// Configuration, storage and table statistics
    Info,
}

#[derive(Subcommand, Debug)]
pub enum DomainAction {
    Add {
        #[arg(long)]
        name: String,
        /// Three-letter code
        #[arg(long)]
        mnemonic: String,
        /// Six hex digits, e.g. FF0000
        #[arg(long)]
        color: String,
    },
    List,
    Delete {
        /// Domain id or mnemonic
        domain: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ClassAction {
    Add {
        #[arg(long)]
        name: String,
        /// Owning domain id or mnemonic
        #[arg(long)]
        domain: String,
    },
    List {
        /// Only classes of this domain (id or mnemonic)
        #[arg(long)]
        domain: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum AttributeAction {
    Add {
        #[arg(long)]
        name: String,
        /// Owning class id
        #[arg(long)]
        class: String,
    },
    List {
        /// Only attributes of this class
        #[arg(long)]
        class: Option<String>,
    },
    Delete {
        id: String,
    },
}

pub async fn run(cli: Cli) -> Result<()> {
    let locator = ConfigLocator::new(&cli.app_root).explicit(cli.config.clone());
    let config = AppConfig::load(&locator).context("Failed to load configuration")?;
    let app = VeraApplication::initialize(config)
        .await
        .context("Failed to start vera")?;

    let mut dc = app.data_contexts().get_data_context().await?;
    let result = execute(&app, &mut dc, cli.command, cli.json).await;
    dc.close().await?;
    app.shutdown().await?;
    result
}

async fn execute(
    app: &VeraApplication,
    dc: &mut DataContext,
    command: Command,
    json: bool,
) -> Result<()> {
    match command {
        Command::Domain { action } => domain(dc, action, json).await,
        Command::Class { action } => class(dc, action, json).await,
        Command::Attribute { action } => attribute(dc, action, json).await,
        Command::Info => info(app, dc, json).await,
    }
}

async fn domain(dc: &mut DataContext, action: DomainAction, json: bool) -> Result<()> {
    match action {
        DomainAction::Add {
            name,
            mnemonic,
            color,
        } => {
            let mut domain = Domain::new(name, mnemonic, color);
            dc.save(&mut domain).await?;
            print_saved(&domain, json)
        }
        DomainAction::List => {
            let domains = dc
                .query(&QCriteria::<Domain>::create().ascending(Domain::NAME))
                .await?;
            if json {
                return print_json(&domains);
            }
            let mut table = TableRenderer::new(["Id", "Name", "Mnemonic", "Color"]);
            for d in &domains {
                table.row(vec![
                    d.id().unwrap_or_default().to_string(),
                    d.name.clone(),
                    d.mnemonic.clone(),
                    d.rgb_color.clone(),
                ]);
            }
            print!("{}", table.render());
            Ok(())
        }
        DomainAction::Delete { domain } => {
            let domain = find_domain(dc, &domain).await?;
            dc.delete(&domain).await?;
            println!("Deleted domain {}", domain.name);
            Ok(())
        }
    }
}

async fn class(dc: &mut DataContext, action: ClassAction, json: bool) -> Result<()> {
    match action {
        ClassAction::Add { name, domain } => {
            let domain = find_domain(dc, &domain).await?;
            let mut class = Class::new(name, EntityRef::to(&domain)?);
            dc.save(&mut class).await?;
            print_saved(&class, json)
        }
        ClassAction::List { domain } => {
            let mut criteria = QCriteria::<Class>::create().ascending(Class::NAME);
            if let Some(domain) = domain {
                let domain = find_domain(dc, &domain).await?;
                criteria = criteria.eq(Class::DOMAIN, EntityRef::to(&domain)?);
            }
            let classes = dc.query(&criteria).await?;
            if json {
                return print_json(&classes);
            }
            let mut table = TableRenderer::new(["Id", "Name", "Domain"]);
            for c in &classes {
                let domain = dc.resolve(&c.domain).await?;
                table.row(vec![
                    c.id().unwrap_or_default().to_string(),
                    c.name.clone(),
                    domain.name,
                ]);
            }
            print!("{}", table.render());
            Ok(())
        }
        ClassAction::Delete { id } => {
            let class: Class = dc.get(&id).await?;
            dc.delete(&class).await?;
            println!("Deleted class {}", class.name);
            Ok(())
        }
    }
}

async fn attribute(dc: &mut DataContext, action: AttributeAction, json: bool) -> Result<()> {
    match action {
        AttributeAction::Add { name, class } => {
            let class: Class = dc.get(&class).await?;
            let mut attribute = Attribute::new(name, EntityRef::to(&class)?);
            dc.save(&mut attribute).await?;
            print_saved(&attribute, json)
        }
        AttributeAction::List { class } => {
            let mut criteria = QCriteria::<Attribute>::create().ascending(Attribute::NAME);
            if let Some(class) = class {
                criteria = criteria.eq(Attribute::CLASS, EntityRef::from_id(class));
            }
            let attributes = dc.query(&criteria).await?;
            if json {
                return print_json(&attributes);
            }
            let mut table = TableRenderer::new(["Id", "Name", "Class"]);
            for a in &attributes {
                let class = dc.resolve(&a.class).await?;
                table.row(vec![
                    a.id().unwrap_or_default().to_string(),
                    a.name.clone(),
                    class.name,
                ]);
            }
            print!("{}", table.render());
            Ok(())
        }
        AttributeAction::Delete { id } => {
            let attribute: Attribute = dc.get(&id).await?;
            dc.delete(&attribute).await?;
            println!("Deleted attribute {}", attribute.name);
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct Info {
    config_file: Option<String>,
    application_url: Option<String>,
    database: String,
    tables: Vec<TableInfo>,
    pool: String,
}

#[derive(Serialize)]
struct TableInfo {
    table: String,
    rows: i64,
}

async fn info(app: &VeraApplication, dc: &DataContext, json: bool) -> Result<()> {
    let tables = vec![
        table_info::<Domain>(dc).await?,
        table_info::<Class>(dc).await?,
        table_info::<Attribute>(dc).await?,
    ];
    let database = app.pool().database().read().await.location().to_string();
    let info = Info {
        config_file: app
            .config()
            .property_file
            .as_ref()
            .map(|p| p.display().to_string()),
        application_url: app.application_url().map(str::to_string),
        database,
        tables,
        pool: app.pool().stats().await.to_string(),
    };

    if json {
        return print_json(&info);
    }

    println!("Config file:     {}", info.config_file.as_deref().unwrap_or("-"));
    println!("Application URL: {}", info.application_url.as_deref().unwrap_or("-"));
    println!("Database:        {}", info.database);
    println!("{}", info.pool);
    println!();
    let mut table = TableRenderer::new(["Table", "Rows"]);
    for t in &info.tables {
        table.row(vec![t.table.clone(), t.rows.to_string()]);
    }
    print!("{}", table.render());
    Ok(())
}

async fn table_info<E: Entity>(dc: &DataContext) -> Result<TableInfo> {
    let rows = dc.select(&QSelection::<E>::create().row_count()).await?;
    let count = rows
        .first()
        .and_then(|row| row.first())
        .and_then(|v| v.as_i64())
        .unwrap_or_default();
    Ok(TableInfo {
        table: E::mapping().table.to_string(),
        rows: count,
    })
}

/// A domain by id, falling back to its mnemonic.
async fn find_domain(dc: &DataContext, key: &str) -> Result<Domain> {
    if let Some(domain) = dc.find::<Domain>(key).await? {
        return Ok(domain);
    }
    dc.query_one(&QCriteria::<Domain>::create().eq(Domain::MNEMONIC, key))
        .await?
        .ok_or_else(|| DbError::NotFound("vra_domain".into(), key.into()).into())
}

fn print_saved<E: Entity + Serialize>(entity: &E, json: bool) -> Result<()> {
    if json {
        return print_json(entity);
    }
    println!(
        "Saved {} {}",
        E::mapping().entity,
        entity.id().unwrap_or_default()
    );
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
