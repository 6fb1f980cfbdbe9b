// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use udaq_recorder::config::{load_config_with_env, AppConfig, VariableConfig};
use udaq_recorder::{
    ChannelSource, DaqStatus, DataSource, TriggerEngine, TriggerEvent, Value, ValueType,
    VariableRegistry,
};

/// uDAQ Recorder - Record triggered snapshots of process variables to rotating files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.yaml")]
    config: PathBuf,

    /// Output directory (overrides config file)
    #[arg(short, long)]
    directory: Option<String>,

    /// Output format: hdf5, root or arrow (overrides config file)
    #[arg(short, long)]
    format: Option<String>,
}

fn init_tracing(config: &AppConfig) -> Result<()> {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.logging.level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.logging.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

/// Synthetic value of `variable` at trigger `step`: element `j` is `step + j`
fn ramp_value(variable: &VariableConfig, step: u64) -> Value {
    let ramp = (0..variable.length as u64).map(move |j| step.wrapping_add(j));
    match variable.value_type {
        ValueType::Int8 => Value::Int8(ramp.map(|x| x as i8).collect()),
        ValueType::UInt8 => Value::UInt8(ramp.map(|x| x as u8).collect()),
        ValueType::Int16 => Value::Int16(ramp.map(|x| x as i16).collect()),
        ValueType::UInt16 => Value::UInt16(ramp.map(|x| x as u16).collect()),
        ValueType::Int32 => Value::Int32(ramp.map(|x| x as i32).collect()),
        ValueType::UInt32 => Value::UInt32(ramp.map(|x| x as u32).collect()),
        ValueType::Int64 => Value::Int64(ramp.map(|x| x as i64).collect()),
        ValueType::UInt64 => Value::UInt64(ramp.collect()),
        ValueType::Float32 => Value::Float32(ramp.map(|x| x as f32).collect()),
        ValueType::Float64 => Value::Float64(ramp.map(|x| x as f64).collect()),
        ValueType::Bool => Value::Bool(ramp.map(|x| x % 2 == 0).collect()),
        ValueType::String => Value::String(ramp.map(|x| x.to_string()).collect()),
    }
}

/// Emit `count` triggers (forever if 0) carrying ramp values
async fn feed_triggers(config: AppConfig, sender: mpsc::Sender<TriggerEvent>) {
    let mut ticker = tokio::time::interval(config.trigger.interval());
    let mut step: u64 = 0;
    while config.trigger.count == 0 || step < config.trigger.count {
        ticker.tick().await;
        let event = config
            .variables
            .iter()
            .fold(TriggerEvent::now(step), |event, variable| {
                event.with_value(variable.name.clone(), ramp_value(variable, step))
            });
        if sender.send(event).await.is_err() {
            break;
        }
        step += 1;
    }
    info!("Trigger generator finished after {} triggers", step);
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration from file
    let mut config = load_config_with_env(&args.config)?;

    // Apply CLI overrides
    if let Some(directory) = args.directory {
        config.daq.directory = directory;
    }
    if let Some(format) = args.format {
        config.daq.output_format = format;
    }

    init_tracing(&config)?;

    info!("Starting uDAQ Recorder");
    info!("Loaded configuration from: {:?}", args.config);
    info!("Output format: {}", config.daq.output_format);

    // Register the variables offered by the source
    let descriptors = config.variables.iter().map(|v| v.descriptor()).collect();
    let (mut source, sender) = ChannelSource::new(descriptors, 16);

    let mut registry = VariableRegistry::new();
    registry
        .add_source("/", source.sources())
        .context("Failed to register DAQ variables")?;
    let layout = registry
        .finalize(&config.daq.decimation_policy())
        .context("Failed to prepare DAQ session")?;

    let mut engine = TriggerEngine::new(config.daq.clone(), layout)
        .context("Failed to create DAQ engine")?;

    let (_settings_tx, settings_rx) = watch::channel(config.daq.clone());
    let (status_tx, mut status_rx) = watch::channel(DaqStatus::default());

    // Report error flag changes
    tokio::spawn(async move {
        let mut error = false;
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            if status.error != error {
                error = status.error;
                if error {
                    warn!("DAQ error flag raised (state {:?})", status.state);
                } else {
                    info!("DAQ error flag cleared");
                }
            }
        }
    });

    let feeder = tokio::spawn(feed_triggers(config.clone(), sender));

    // Run the engine (returns when the generator is done or on Ctrl+C)
    tokio::select! {
        _ = engine.run(&mut source, settings_rx, status_tx) => {
            info!("Trigger source finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    // Cleanup
    feeder.abort();
    engine.shutdown();

    let status = engine.status();
    println!("{}", serde_json::to_string_pretty(&status)?);
    info!("uDAQ Recorder shut down successfully");

    Ok(())
}
