use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nl2sql_agent::init_tracing();

    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let path = nl2sql_agent::config::find_config_path(&cwd)?;
    let config = nl2sql_agent::config::load_config(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    tracing::info!(config = %path.display(), "configuration loaded");

    if let Err(e) = nl2sql_agent::run(config).await {
        tracing::error!(error = %e, "service stopped with error");
        return Err(e.into());
    }
    Ok(())
}
