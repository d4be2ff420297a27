use drawmode::replay;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let Some(path) = std::env::args().nth(1) else {
        return Err("usage: drawmode <script.json>".into());
    };

    let script = replay::load_script(&path).await?;
    let summary = replay::run_script(script).await?;
    tracing::info!(%path, stored = summary.stored, "replay complete");
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
