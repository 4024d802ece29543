use dotenv::dotenv;
use ifs_action_plan::llm::{GeminiClient, GroqClient, PipelineEvent, TextGenerator};
use ifs_action_plan::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

fn usage() -> ! {
    eprintln!("Usage: generate_action_plan <action_plan.xlsx> [config.json] [gemini|groq]");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let plan_path = PathBuf::from(args.next().unwrap_or_else(|| usage()));
    let config = match args.next() {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default().with_header(HeaderLocation::Search { within: 20 }),
    };
    let provider = args.next().unwrap_or_else(|| "gemini".to_string());

    println!("📄 Loading action plan from {}", plan_path.display());
    let table = Table::from_workbook_path(&plan_path)?;
    let items = load_action_plan(&table, config.header, &config.columns)?;
    println!("   {} non-conformities found", items.len());

    println!("📚 Fetching IFS guidance checklist...");
    let guidance = GuidanceTable::fetch(config.guidance_url()).await?;

    let generator: Arc<dyn TextGenerator> = match provider.as_str() {
        "groq" => Arc::new(GroqClient::from_env()?),
        "gemini" => Arc::new(GeminiClient::from_env()?),
        _ => usage(),
    };

    let pipeline = ActionPlanPipeline::new(generator, guidance, &config)?;
    let (tx, mut rx) = mpsc::channel(32);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                PipelineEvent::Requesting {
                    index,
                    requirement_no,
                } => println!("🤖 [{}] Requesting recommendation for {}", index + 1, requirement_no),
                PipelineEvent::Retrying { attempt, error } => {
                    println!("   ⏳ Attempt {} failed: {}", attempt, error)
                }
                PipelineEvent::MissingField { index, field } => {
                    println!("   ⚠️  [{}] Section '{}' missing from reply", index + 1, field)
                }
                PipelineEvent::PlaceholderUsed { index, reason } => {
                    println!("   ⚠️  [{}] No recommendation generated: {}", index + 1, reason)
                }
                PipelineEvent::QuotaExhausted { message, .. } => {
                    println!("   ❌ Quota exhausted: {}", message)
                }
                _ => {}
            }
        }
    });

    let summary = pipeline.run(&items, Some(tx)).await;
    printer.await?;

    let stem = plan_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("plan_actions");
    let out_dir = plan_path.parent().unwrap_or(Path::new("."));
    for format in [ExportFormat::Csv, ExportFormat::Text, ExportFormat::Xlsx] {
        let out = out_dir.join(format!("{}_recommandations.{}", stem, format.file_extension()));
        std::fs::write(&out, summary.report.export(format)?)?;
        println!("💾 Wrote {}", out.display());
    }

    if let Some(reason) = summary.halted {
        println!(
            "⚠️  Run stopped early ({}); {} items were not processed.",
            reason,
            summary.unprocessed.len()
        );
    }

    Ok(())
}
