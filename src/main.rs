#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = academia_cbt::run().await {
        eprintln!("academia-cbt fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
