use canal_conflate::utils::error::ErrorSeverity;
use canal_conflate::utils::{logger, validation::Validate};
use canal_conflate::{CliConfig, ConflateEngine, ConflateError, FilePipeline, LocalStorage};
use clap::Parser;

fn exit_code(e: &ConflateError) -> i32 {
    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

fn fail(stage: &str, e: &ConflateError) -> ! {
    tracing::error!(
        "❌ {} failed: {} (Category: {:?}, Severity: {:?})",
        stage,
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());
    std::process::exit(exit_code(e));
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    logger::init_logger(cli.verbose, cli.log_json);
    tracing::info!("🚀 Starting canal-conflate");
    tracing::debug!("CLI config: {:?}", cli);

    if let Err(e) = cli.validate() {
        fail("Configuration validation", &e);
    }
    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => fail("Loading configuration", &e),
    };

    let monitor_enabled = cli.monitor || config.monitoring_enabled();
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let pipeline = match FilePipeline::new(LocalStorage::new("."), config) {
        Ok(pipeline) => pipeline,
        Err(e) => fail("Loading parameter options", &e),
    };

    if cli.dry_run {
        match pipeline.plan().await {
            Ok(params) => {
                tracing::info!("✅ Dry run passed, nothing written");
                println!("{}", serde_json::to_string_pretty(&params)?);
                return Ok(());
            }
            Err(e) => fail("Dry run", &e),
        }
    }

    let token = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("🛑 Interrupt received, canceling after the current group");
            token.cancel();
        }
    });

    let engine = ConflateEngine::new_with_monitoring(pipeline, monitor_enabled);
    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ Conflation completed");
            println!("✅ Conflation completed");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => fail("Conflation", &e),
    }

    Ok(())
}
