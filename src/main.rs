use spin_decide::web::app::App;
use spin_decide::web::state::AppState;
use spin_decide::AppConfig;
use std::env::args;
use std::process::exit;
use tracing::Level;

fn main() {
    let args: Vec<String> = args().collect();
    if args.len() < 2 {
        println!(
            "usage: {} CFG",
            args.first().map(String::as_str).unwrap_or("spin-decide")
        );
        exit(1);
    }

    let cfg: AppConfig = AppConfig::new_from_file_and_env(args[1].as_ref()).unwrap_or_else(|e| {
        eprintln!("error: {}", e);
        exit(1);
    });

    // Without a DSN the client is disabled and captures are dropped.
    let _guard = sentry::init((
        cfg.sentry_dsn.clone(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(cfg.env.clone().into()),
            ..Default::default()
        },
    ));

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async {
            // initialize tracing
            let level = cfg.log_level.parse::<Level>().unwrap_or(Level::INFO);
            let subscriber = tracing_subscriber::fmt().with_max_level(level).finish();
            let _ = tracing::subscriber::set_global_default(subscriber);

            tracing::debug!("config: {:?}", cfg);

            let store = cfg.connect_store().await.unwrap_or_else(|e| {
                eprintln!("error opening storage: {}", e);
                exit(1);
            });

            let state = AppState::new(cfg, store);

            App::new(state).serve().await.unwrap_or_else(|e| {
                eprintln!("error: {}", e);
                exit(1);
            })
        });
}
