use std::env;
use std::sync::Mutex;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use qcapi::local::AppState;
use qcapi::server::configure;

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();

    let address: String = args
        .get(1)
        .cloned()
        .context("usage: qc_local_server <address> <port> [pending_reads]")?;
    let port: u16 = args
        .get(2)
        .context("missing port")?
        .parse()
        .context("port must be a number")?;
    let pending_reads: u32 = match args.get(3) {
        Some(reads) => reads.parse().context("pending_reads must be a number")?,
        None => 3,
    };

    let app_state = Mutex::new(AppState::new().with_pending_reads(pending_reads));
    let local_state = web::Data::new(app_state);

    log::info!("SERVER: Listening on {}:{}", address, port);
    HttpServer::new(move || {
        App::new()
            .app_data(local_state.clone())
            .configure(configure)
    })
    .bind((address, port))?
    .run()
    .await?;
    Ok(())
}
