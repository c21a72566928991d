use std::process::exit;

use clap::CommandFactory;
use env::Args;
use log::{info, warn};
use sys_service::control::control;

mod config;
mod env;
mod error;
mod logger;
mod registrar;
mod supervisor;
mod sys_service;

fn main() {
    // default level until a config says otherwise
    if let Err(e) = logger::init_log("") {
        eprintln!("log init failed: {}", e);
    }
    let Some(action) = Args::parse_env().action() else {
        if let Err(e) = Args::command().print_help() {
            warn!("couldn't print help: {}", e);
        }
        return;
    };
    info!("servicify {:?}", action);
    exit(control(&action));
}
