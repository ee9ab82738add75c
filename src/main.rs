use log::{debug, error};

#[tokio::main]
async fn main()
{   dotenvy::dotenv().ok();
    env_logger::Builder::from_env(
      env_logger::Env::default().default_filter_or("info")
    ).init();

    let config = novel_ai_proxy::AppConfig::from_env();
    debug!("Starting with {:?}", config);

    if let Err(e) = novel_ai_proxy::server::serve(config).await
    {   error!("Server failed: {}", e);
        std::process::exit(1);
    }
}
