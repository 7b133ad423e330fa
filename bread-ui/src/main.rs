//! Demo server rendering the BREAD views of a site file.

mod errors;
mod render;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use bread::io::config::DEFAULT_CONFIG_PATH;
use bread::site::Site;
use clap::Parser;
use tracing::info;

use crate::render::Renderer;

#[derive(Parser)]
#[command(name = "bread-ui")]
#[command(about = "Serve browse/read/edit/add/delete pages for a BREAD site file")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Site file with models, breads, records and users
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory searched for app-specific templates before the built-in ones
    #[arg(long)]
    template_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bread::logging::init_with_default("bread_ui=info,bread=warn");

    let args = Args::parse();

    let site = Site::load(&args.config)?;
    info!(
        config = %args.config.display(),
        breads = site.breads.len(),
        "starting bread-ui"
    );
    if let Some(dir) = &args.template_dir {
        info!(template_dir = %dir.display(), "serving custom templates");
    }
    let renderer = Renderer::new(args.template_dir.as_deref())?;
    let app = routes::app(site, renderer)?;

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
