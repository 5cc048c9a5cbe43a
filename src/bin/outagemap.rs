use clap::Parser;
use log::LevelFilter;
use outagemap::{BatchRun, Config, EventCatalog, MapDatabase, OutageDatabase, OutageMapResult};
use simple_logger::SimpleLogger;
use std::{
    fmt::{self, Display},
    path::PathBuf,
};

/*-------------------------------------------------------------------------------------------------
 *                                     Command Line Options
 *-----------------------------------------------------------------------------------------------*/

///
/// Turn the current outage records into map polygons.
///
/// This program reads every outage record from the source database, groups them by event and
/// supply node, and writes a polygon layer for each event as KML, GeoJSON, and/or a SQLite table.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "outagemap")]
#[clap(author, version, about)]
struct OutageMapOptionsInit {
    /// The path to the JSON configuration file.
    ///
    /// If this is not specified, then the program will check for it in the "OUTAGEMAP_CONFIG"
    /// environment variable. If that isn't set either, the built in defaults are used.
    #[clap(short, long)]
    #[clap(env = "OUTAGEMAP_CONFIG")]
    config: Option<PathBuf>,

    /// The path to the outage database, overrides the configuration file.
    #[clap(short, long)]
    source_db: Option<PathBuf>,

    /// The directory to put output files in, overrides the configuration file.
    #[clap(short, long)]
    output_dir: Option<PathBuf>,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

#[derive(Debug)]
struct OutageMapOptionsChecked {
    /// Where the configuration came from, if not the defaults.
    config_file: Option<PathBuf>,

    /// The configuration with the command line overrides applied.
    config: Config,

    /// Verbose output
    verbose: bool,
}

impl Display for OutageMapOptionsChecked {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        let config_file = self
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "defaults".to_owned());

        writeln!(f, "\n")?; // yes, two blank lines.
        writeln!(f, "     Configuration: {}", config_file)?;
        writeln!(f, "       Environment: {}", self.config.environment_label)?;
        writeln!(f, "   Source database: {}", self.config.source_db.display())?;
        writeln!(f, "  Output directory: {}", self.config.output_directory.display())?;
        writeln!(f, "           Workers: {}", self.config.workers())?;
        writeln!(f, "\n")?; // yes, two blank lines.

        Ok(())
    }
}

/// Get the command line arguments, load the configuration, and apply the overrides.
fn parse_args() -> OutageMapResult<OutageMapOptionsChecked> {
    let OutageMapOptionsInit {
        config: config_file,
        source_db,
        output_dir,
        verbose,
    } = OutageMapOptionsInit::parse();

    let mut config = match config_file {
        Some(ref path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(source_db) = source_db {
        config.source_db = source_db;
    }

    if let Some(output_dir) = output_dir {
        config.output_directory = output_dir;
    }

    Ok(OutageMapOptionsChecked {
        config_file,
        config,
        verbose,
    })
}

/*-------------------------------------------------------------------------------------------------
 *                                             MAIN
 *-----------------------------------------------------------------------------------------------*/
fn main() -> OutageMapResult<()> {
    SimpleLogger::new().with_level(LevelFilter::Debug).init()?;
    log::set_max_level(LevelFilter::Info);

    let opts = parse_args()?;

    if opts.verbose || opts.config.debug_mode {
        log::set_max_level(LevelFilter::Debug);
    }

    log::debug!("Debug messages enabled.");
    log::debug!("{}", opts);

    let environment = opts.config.environment_label.clone();

    match run(&opts.config) {
        Ok(()) => {
            log::info!("Outage map complete. (environment={})", environment);
            Ok(())
        }
        Err(err) => {
            log::error!("Outage map failed: {} (environment={})", err, environment);
            std::process::exit(1);
        }
    }
}

fn run(config: &Config) -> OutageMapResult<()> {
    let environment = &config.environment_label;

    //
    // Load the outage records into events.
    //
    let mut batch = BatchRun::new(config)?;
    {
        let db = OutageDatabase::connect(&config.source_db)?;
        let mut query = db.outage_query(&config.source_db_sql)?;
        batch.ingest_all(query.records()?)?;
    }

    let (catalog, metrics) = batch.finish(config.workers())?;
    log::info!("{} (environment={})", metrics, environment);
    log::info!("{} (environment={})", catalog.metrics(), environment);

    //
    // Write the outputs.
    //
    write_outputs(config, &catalog)
}

fn write_outputs(config: &Config, catalog: &EventCatalog) -> OutageMapResult<()> {
    let environment = &config.environment_label;
    let generalize = config.convex_hull_events;

    if config.output_to_kml || config.output_to_geo_json {
        std::fs::create_dir_all(&config.output_directory)?;
    }

    if config.output_to_kml {
        catalog.save_kml(
            config.output_path("kml"),
            generalize,
            config.file_max_size_bytes,
            environment,
        )?;
    }

    if config.output_to_geo_json {
        catalog.save_geojson(config.output_path("geojson"), generalize, environment)?;
    }

    if config.output_to_geo_db {
        log::info!(
            "Attempting to write polygons to {} table {}. (environment={})",
            config.geo_db.display(),
            config.geo_db_table,
            environment
        );

        let db = MapDatabase::connect(&config.geo_db, &config.geo_db_table)?;
        let metrics = db.write_catalog(catalog, generalize, config.geo_db_batch_size)?;
        log::info!("Geodatabase metric: {}. (environment={})", metrics, environment);
    }

    Ok(())
}
