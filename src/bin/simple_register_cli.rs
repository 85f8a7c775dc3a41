use clap::Parser;
use simple_register::{
    config::Config,
    io,
    loader::PcdScanLoader,
    pipeline::RegistrationPipeline,
    rigid,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct SimpleRegisterCli {
    /// directory holding <name>.pcd, <name>_keypoints.pcd and <name>_fpfh.pcd
    data_dir: PathBuf,

    #[arg(long, default_value = "room1")]
    source: String,

    #[arg(long, default_value = "room2")]
    target: String,

    /// json file with thresholds, see --dump-config
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "output.pcd")]
    output: PathBuf,

    /// write the default config to this path and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = SimpleRegisterCli::parse();

    if let Some(path) = cli.dump_config {
        io::write_config_json(&path, &Config::default_values())?;
        log::info!("wrote default config to {}", path.display());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => io::json_to_config(path)?,
        None => Config::default_values(),
    };
    let pipeline = RegistrationPipeline::new(config)?;
    let loader = PcdScanLoader::new(&cli.data_dir);

    let outcome = match pipeline.run_and_save(&loader, &cli.source, &cli.target, &cli.output) {
        Ok(outcome) => outcome,
        Err(e) => {
            let mut msg = e.to_string();
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                msg.push_str(&format!(": {cause}"));
                source = cause.source();
            }
            log::error!("{}", msg);
            std::process::exit(1);
        }
    };
    log::info!(
        "{} -> {} transform:{}",
        cli.source,
        cli.target,
        rigid::to_matrix(&outcome.transform)
    );
    Ok(())
}
