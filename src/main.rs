use std::error::Error;
use std::path::PathBuf;

use dotenvy::dotenv;
use tracing::info;

mod config;
mod handlers;
mod llm;
mod storyboard;
mod utils;

use config::CONFIG;
use handlers::compose::{parse_compose_args, run_compose};
use handlers::repl::run_repl;
use llm::GeminiSceneAnalyzer;
use utils::logging::init_logging;

type MainResult = Result<(), Box<dyn Error + Send + Sync>>;

#[tokio::main]
async fn main() -> MainResult {
    dotenv().ok();
    let logs_dir = PathBuf::from(&CONFIG.log_dir);
    let _guards = init_logging(&CONFIG.log_level, &logs_dir);

    let analyzer = GeminiSceneAnalyzer::from_config(&CONFIG);
    info!(
        "Starting Storyboard Matrix (model={}, language={})",
        analyzer.model(),
        CONFIG.default_language
    );

    let args: Vec<String> = std::env::args().collect();
    if let Some(compose_args) = parse_compose_args(&args, CONFIG.default_language)? {
        let to_stdout = compose_args.out.is_none();
        let prompt = run_compose(compose_args, &analyzer).await?;
        if to_stdout {
            print!("{prompt}");
        }
        return Ok(());
    }

    if let Some(extra) = args.get(1) {
        return Err(format!(
            "Unknown command: {extra}\n{}",
            handlers::compose::compose_usage()
        )
        .into());
    }

    run_repl(analyzer, CONFIG.default_language, &logs_dir).await?;
    Ok(())
}
