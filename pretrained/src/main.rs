use std::{env, process};

use log::{error, info};
use machine_learning::Classifier;
use pretrained::{LoaderConfig, ModelKind, ModelLoader, PretrainedModel, Result};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("{}", usage(&args));
        process::exit(1);
    }

    if let Err(e) = run(&args[1], &args[2], args.get(3)) {
        error!("{e}");
        process::exit(1);
    }
}

fn usage(args: &[String]) -> String {
    let program = args.first().map_or("pretrained", String::as_str);
    format!("Usage: {program} <dataset> <linear|multilayer> [config.json]")
}

fn run(dataset: &str, kind: &str, config_path: Option<&String>) -> Result<()> {
    let kind: ModelKind = kind.parse()?;
    let config = match config_path {
        Some(path) => LoaderConfig::from_json_file(path)?,
        None => LoaderConfig::default(),
    };

    let loader = ModelLoader::from_config(config)?;
    let model = loader.load(dataset, kind, true)?;

    match &model {
        PretrainedModel::Linear(m) => info!(
            "{kind} model for `{dataset}`: {} features, {} classes",
            m.input_dim(),
            m.class_count()
        ),
        PretrainedModel::Multilayer(m) => info!(
            "{kind} model for `{dataset}`: {} features, {} hidden layers of {} activations, {} classes",
            m.input_dim(),
            m.hidden_layer_count(),
            m.activation(),
            m.class_count()
        ),
    }

    Ok(())
}
