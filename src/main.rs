use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use testbed_control::config::load_config;
use testbed_control::experiment::{Experiment, Trigger};
use testbed_control::framework::{CreateOptions, TypeRegistry};
use testbed_control::garage::{self, ENGINE, GARAGE};
use testbed_control::lifecycle::{setup_tracing, wait_for_signal, Testbed};
use tracing::{info, warn};

const ENGINES: [&str; 2] = ["engine-1", "engine-2"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("testbed.toml"));
    let config = load_config(&path)?;
    setup_tracing(&config.log_filter);

    let mut registry = TypeRegistry::new();
    garage::register(&mut registry);
    let testbed = Testbed::start(Arc::new(registry), &config.controller);
    let client = testbed.client().clone();

    let garage = client
        .create_root(GARAGE, CreateOptions::new().with_uid("garage-1"))
        .await?;
    for (uid, throttle) in ENGINES.into_iter().zip([0.5, 0.3]) {
        client
            .create_child(
                &garage,
                ENGINE,
                CreateOptions::new()
                    .with_uid(uid)
                    .with_property("throttle", throttle),
            )
            .await?;
    }

    let mut experiment = Experiment::from_config(&config.experiment, Arc::new(client.clone()));
    experiment.def_group("engines", ENGINES);
    experiment.def_event(
        "OVERHEAT",
        Trigger::condition(|observed| {
            ENGINES
                .iter()
                .any(|e| observed.get_f64(e, "rpm").is_some_and(|rpm| rpm > 10000.0))
        }),
    );
    experiment.on_event("OVERHEAT", true, |exp| {
        warn!("Engines running hot, stopping them");
        if let Err(error) = exp.group("engines").exec("stop") {
            warn!(%error, "Stop failed");
        }
    })?;
    experiment.every(Duration::from_secs(2), |exp| {
        if let Err(error) = exp.group("engines").request("rpm") {
            warn!(%error, "Polling failed");
        }
    });

    info!(experiment = %experiment.name(), "Running until SIGINT/SIGTERM");
    tokio::select! {
        _ = experiment.run() => {}
        _ = wait_for_signal() => {}
    }

    // Every client clone must be gone before the controller can stop.
    drop(experiment);
    drop(client);
    testbed.shutdown().await?;
    Ok(())
}
