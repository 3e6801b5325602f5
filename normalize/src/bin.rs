use std::path::Path;
use anyhow::Result;
use clap::{App, Arg};
use normalize::config::{DestinationCapabilities, NormalizeConfiguration};

pub fn main() -> Result<()> {
    let options = App::new("normalize")
        .version("1.0")
        .about("Normalize reconciles extracted load packages into writer-native load packages between extract and load in the OpenRec ingestion pipeline.")
        .arg(Arg::with_name("base_dir")
            .help("The base directory containing extracted/, load/ and schemas/ sub-folders")
            .required(true)
            .takes_value(true))
        .arg(Arg::with_name("loader_file_format")
            .long("loader-file-format")
            .help("Force every table's writer to this file format, where the destination supports it")
            .takes_value(true))
        .arg(Arg::with_name("pool_width")
            .long("pool-width")
            .help("Number of worker threads to normalize files with (defaults to the number of CPUs)")
            .takes_value(true))
        .get_matches();

    dotenv::dotenv().ok();
    let _ = env_logger::try_init();

    let base_dir = options.value_of("base_dir").expect("no base dir specified");
    let config = NormalizeConfiguration {
        loader_file_format: options.value_of("loader_file_format").map(String::from),
        pool_width: options.value_of("pool_width")
            .and_then(|w| w.parse().ok())
            .unwrap_or_else(num_cpus::get),
        normalize_storage_root: Path::new(base_dir).join("extracted"),
        load_storage_root: Path::new(base_dir).join("load"),
        schema_storage_root: Path::new(base_dir).join("schemas"),
    };

    let metrics = normalize::run(config, DestinationCapabilities::default())?;
    log::info!("Normalize run complete: done={} pending={}", metrics.done, metrics.pending);

    Ok(())
}
