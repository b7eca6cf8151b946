#[macro_use] extern crate log;
extern crate env_logger;

use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_std::task;
use serde_json::json;

use fleetwatch::app::{ App, AppMonitor, Services };
use fleetwatch::backend::memory::{ MemoryBackend, MemoryIdentity };
use fleetwatch::backend::IdentityProvider;
use fleetwatch::model::LocationSample;
use fleetwatch::session::{ CurrentUser, Role };
use fleetwatch::tracking::simulated::SimulatedLocation;
use fleetwatch::{ Config, Result };

const DEFAULT_CONFIG: &str = "fleetwatch.yaml";
const TRUCK_TYPES: [&str; 4] = ["bitrem", "truck", "carreta", "rodotrem"];

/// `fleetwatch <path>` or `fleetwatch --config <path>`
fn config_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    args.get(1).filter(|arg| !arg.starts_with('-')).cloned()
}

fn load_config() -> Result<Config> {
    match config_path() {
        Some(path) => Config::load(path),
        None if Path::new(DEFAULT_CONFIG).exists() => Config::load(DEFAULT_CONFIG),
        None => {
            info!["No {} found, using defaults", DEFAULT_CONFIG];
            Ok(Config::default())
        },
    }
}

fn seed(backend: &MemoryBackend, config: &Config) {
    backend.seed(&config.tables.admins, vec![json!({ "id": "admin-1", "name": "Dispatch" })]);

    let mut drivers = vec![json!({
        "id": "admin-1",
        "email": "dispatch@fleet.test",
        "isAdmin": true,
        "latitude": config.demo.center_lat,
        "longitude": config.demo.center_lon,
    })];
    for i in 0..config.demo.drivers {
        drivers.push(json!({
            "id": format!("driver-{}", i + 1),
            "email": format!("driver{}@fleet.test", i + 1),
            "phoneNumber": format!("+55 77 9{:04}-{:04}", i + 1, 1000 + i),
            "truckType": TRUCK_TYPES[i % TRUCK_TYPES.len()],
            "isAdmin": false,
        }));
    }
    backend.seed(&config.tables.drivers, drivers);
}

fn services(backend: &MemoryBackend, identity: &MemoryIdentity, location: SimulatedLocation) -> Services {
    Services {
        identity: Arc::new(identity.clone()),
        store: Arc::new(backend.clone()),
        feed: Arc::new(backend.clone()),
        location: Arc::new(location),
        blobs: Arc::new(backend.clone()),
    }
}

fn draw(monitor: &AppMonitor, last_revision: &mut u64) {
    let roster = match monitor.roster() {
        Some(roster) => roster,
        None => return,
    };
    if roster.revision() == *last_revision {
        return;
    }
    *last_revision = roster.revision();

    info!["Roster revision {} ({:?}), {} drivers", roster.revision(), roster.feed_status(), roster.len()];
    for marker in roster.markers() {
        info!["  {:<22} {:>10.5} {:>10.5}  {}", marker.title, marker.latitude, marker.longitude, marker.description];
    }
}

async fn run_demo(config: Config) -> Result<()> {
    let backend = MemoryBackend::new();
    seed(&backend, &config);

    let mut identities = vec![];
    let mut sessions = vec![];

    for i in 0..config.demo.drivers {
        let identity = MemoryIdentity::signed_in(CurrentUser {
            id: format!("driver-{}", i + 1),
            email: format!("driver{}@fleet.test", i + 1),
            role_hint: Some(Role::Driver),
        });
        let location = SimulatedLocation::circuit(
            config.demo.center_lat,
            config.demo.center_lon,
            300.0 + 150.0 * i as f64,
            i as f64 / config.demo.drivers as f64,
            config.demo.tick,
        );
        let (app, _monitor) = App::new(services(&backend, &identity, location), config.clone());
        sessions.push(task::spawn(app.run()));
        identities.push(identity);
    }

    // The admin has no role hint; the admins table decides
    let admin = MemoryIdentity::signed_in(CurrentUser {
        id: "admin-1".to_string(),
        email: "dispatch@fleet.test".to_string(),
        role_hint: None,
    });
    let office = LocationSample::new(config.demo.center_lat, config.demo.center_lon, 0);
    let (app, monitor) = App::new(services(&backend, &admin, SimulatedLocation::scripted(office, vec![])), config.clone());
    sessions.push(task::spawn(app.run()));
    identities.push(admin);

    let started = Instant::now();
    let mut last_revision = 0;
    let mut greeted = false;
    while started.elapsed() < config.demo.duration {
        task::sleep(config.demo.tick).await;
        draw(&monitor, &mut last_revision);

        if !greeted && config.demo.drivers > 0 {
            if let Some(chat) = monitor.chat() {
                match chat.send_text("driver-1", "Are you free for a pickup near the depot?").await {
                    Ok(message) => info!["Sent message {} to driver-1", message.id],
                    Err(err) => error!["Failed to message driver-1: {}", err],
                }
                greeted = true;
            }
        }
    }

    for identity in &identities {
        identity.sign_out().await?;
        identity.shutdown();
    }
    for session in sessions {
        if let Err(err) = session.await {
            error!["Session ended with error: {}", err];
        }
    }

    info!["{} driver rows, {} messages", backend.rows(&config.tables.drivers).len(), backend.rows(&config.tables.messages).len()];
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            error!["Failed to load configuration: {}", err];
            std::process::exit(1);
        }
    };

    if let Err(err) = task::block_on(run_demo(config)) {
        error!["Demo failed: {}", err];
        std::process::exit(1);
    }
}
