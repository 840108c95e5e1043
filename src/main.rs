use clap::Parser;
use hr_convert::core::FieldCatalog;
use hr_convert::utils::error::{ConvertError, ErrorSeverity};
use hr_convert::utils::{logger, validation::Validate};
use hr_convert::{
    CancelFlag, CliArgs, ConversionJob, HttpTransport, JobConfig, LocalStorage, StaticCatalog,
};
use std::path::Path;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    if args.log_json {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("📁 Loading job from: {}", args.config);

    let mut config = match JobConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load job file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    if let Some(stop) = args.stop_on_auth_failure {
        config.dispatch.stop_on_auth_failure = stop;
        tracing::info!("🔧 stop_on_auth_failure overridden to: {}", stop);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Job validation failed: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());
        std::process::exit(1);
    }
    if args.verbose {
        tracing::debug!("Job config: {:?}", config);
    }

    // Relative paths in the job file are resolved against its directory.
    let base_dir = Path::new(&args.config)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let storage = LocalStorage::new(base_dir.to_string_lossy().into_owned());
    let catalog = match StaticCatalog::from_file(base_dir.join(&config.webservice.catalog)) {
        Ok(catalog) => catalog,
        Err(e) => exit_with(e),
    };

    if args.list_webservices {
        for id in catalog.list_webservices()? {
            let fields = catalog.list_fields(&id)?;
            println!("{}: {}", id, fields.join(", "));
        }
        return Ok(());
    }

    let transport = HttpTransport::with_timeout(config.endpoint.timeout())?;

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("🛑 Interrupt received, stopping after the current record");
                cancel.cancel();
            }
        });
    }

    let job = ConversionJob::new(config, storage, catalog, transport).with_cancel_flag(cancel);

    match job.run(args.dry_run).await {
        Ok(outcome) => {
            if let Some(preview) = &outcome.preview {
                println!("--- first payload ---\n{}\n---------------------", preview);
            }
            if let Some(path) = &outcome.mapped_path {
                println!("📁 Mapped table saved to: {}", path);
            }

            match &outcome.report {
                Some(report) => {
                    println!(
                        "✅ {} of {} records delivered ({} failed, {} skipped){}",
                        report.delivered,
                        outcome.mapped.len(),
                        report.failed,
                        report.skipped,
                        if report.cancelled { ", cancelled" } else { "" }
                    );
                    if let Some(path) = &outcome.report_path {
                        println!("📁 Send report saved to: {}", path);
                    }
                    if !report.all_delivered() {
                        std::process::exit(2);
                    }
                }
                None => println!(
                    "🔍 Dry run complete: {} rows mapped from {} input rows",
                    outcome.mapped.len(),
                    outcome.input_rows
                ),
            }
        }
        Err(e) => exit_with(e),
    }

    Ok(())
}

fn exit_with(e: ConvertError) -> ! {
    tracing::error!(
        "❌ Job failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}
