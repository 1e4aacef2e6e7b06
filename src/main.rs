use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    auth_hub::app::run().await?;
    Ok(())
}
