#![deny(missing_docs)]

//! Entry point for the Sentinel audio distress detection service.

use std::sync::Arc;

use sentinel::app::AppContext;
use sentinel::{api, logging};

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }

    let ctx = AppContext::initialize()?;
    tracing::info!("Dataset root at {}", ctx.data_dir.display());
    if !ctx.audit.is_enabled() {
        tracing::info!("Audit logging disabled; predictions and retraining still work");
    }

    let _rocket = api::rocket(Arc::new(ctx)).launch().await?;
    Ok(())
}
