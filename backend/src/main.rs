#[macro_use]
extern crate rocket;

mod api;
mod config;
mod error;
mod models;
mod services;
mod utils;

use crate::services::analysis_service::Analyzer;
use log::error;
use rocket::{Build, Rocket};

pub struct AppState {
    pub analyzer: Analyzer,
}

pub fn build_rocket(state: AppState, cors: Option<rocket_cors::Cors>) -> Rocket<Build> {
    let rocket = rocket::build()
        .manage(state)
        .mount("/", routes![api::analyze_video, api::health])
        .register("/", catchers![api::default_catcher]);

    match cors {
        Some(cors) => rocket.attach(cors),
        None => rocket,
    }
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    config::load_environment();
    config::init_logger();

    let state = config::create_app_state().inspect_err(|e| error!("Startup failed: {e:#}"))?;
    let cors = config::create_cors()?;

    build_rocket(state, Some(cors))
        .launch()
        .await
        .map_err(|e| anyhow::anyhow!("Rocket failed: {e}"))?;

    Ok(())
}
